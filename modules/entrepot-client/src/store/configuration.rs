//! Configuration: the description layer between stored data and offerings.

use serde_json::{Map, Value};

use gpf_common::Result;

use crate::requester::RequestOptions;
use crate::store::interfaces::{CommentInterface, FullEditInterface, TagInterface};
use crate::store::{Entity, Offering, StoreEntity};

pub struct Configuration {
    entity: Entity,
}

impl StoreEntity for Configuration {
    const ENTITY_NAME: &'static str = "configuration";
    const ENTITY_TITLE: &'static str = "configuration";

    fn from_entity(entity: Entity) -> Self {
        Self { entity }
    }

    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

impl TagInterface for Configuration {}
impl CommentInterface for Configuration {}
impl FullEditInterface for Configuration {}

impl Configuration {
    /// Offerings published from this configuration.
    pub async fn api_list_offerings(&self) -> Result<Vec<Offering>> {
        let mut route_params = vec![(Self::ENTITY_NAME, self.entity.id())];
        if let Some(ds) = self.entity.datastore() {
            route_params.push(("datastore", ds));
        }
        let response = self
            .entity
            .api()
            .route_request(
                "configuration_list_offerings",
                &route_params,
                RequestOptions::new(),
            )
            .await?;
        let items: Vec<Map<String, Value>> = response.json()?;
        items
            .into_iter()
            .map(|data| {
                Entity::new(
                    self.entity.api().clone(),
                    data,
                    self.entity.datastore().map(String::from),
                )
                .map(Offering::from_entity)
            })
            .collect()
    }
}
