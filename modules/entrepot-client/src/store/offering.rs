//! Offering (offre): a publication of a stored data on an endpoint.

use serde_json::Value;

use gpf_common::Result;

use crate::requester::RequestOptions;
use crate::store::{Entity, StoreEntity};

pub struct Offering {
    entity: Entity,
}

impl StoreEntity for Offering {
    const ENTITY_NAME: &'static str = "offering";
    const ENTITY_TITLE: &'static str = "offre";

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

impl Offering {
    pub const STATUS_PUBLISHED: &'static str = "PUBLISHED";
    pub const STATUS_UNSTABLE: &'static str = "UNSTABLE";

    pub fn status(&self) -> &str {
        self.entity.status()
    }

    /// Publication links. The API returns either a list of strings or a list
    /// of `{url, …}` objects; both shapes are accepted.
    pub fn urls(&self) -> Vec<String> {
        match self.entity.get("urls") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(url) => Some(url.clone()),
                    Value::Object(map) => map
                        .get("url")
                        .and_then(Value::as_str)
                        .map(String::from),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Ask the platform to re-synchronize the offering with its
    /// configuration.
    pub async fn api_synchronize(&self) -> Result<()> {
        let mut route_params = vec![(Self::ENTITY_NAME, self.entity.id())];
        if let Some(ds) = self.entity.datastore() {
            route_params.push(("datastore", ds));
        }
        self.entity
            .api()
            .route_request("offering_synchronize", &route_params, RequestOptions::new())
            .await?;
        Ok(())
    }
}
