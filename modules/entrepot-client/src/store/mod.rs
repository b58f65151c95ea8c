//! Typed accessors over the Entrepôt remote resources.
//!
//! Every entity is an attribute map cached from the most recent fetch, keyed
//! by an immutable `_id`. The `StoreEntity` trait carries the canonical CRUD
//! verbs as default methods (route names derive from `ENTITY_NAME`);
//! orthogonal capabilities (tags, comments, sharing, re-upload, full edit)
//! are separate traits composed by each kind.

pub mod annexe;
pub mod configuration;
pub mod datastore;
pub mod interfaces;
pub mod offering;
pub mod processing_execution;
pub mod stored_data;
pub mod upload;

pub use annexe::Annexe;
pub use configuration::Configuration;
pub use datastore::Datastore;
pub use interfaces::{
    CommentInterface, FullEditInterface, ReUploadFileInterface, SharingInterface, TagInterface,
};
pub use offering::Offering;
pub use processing_execution::ProcessingExecution;
pub use stored_data::StoredData;
pub use upload::Upload;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use gpf_common::{GpfError, Result};

use crate::requester::{ApiRequester, RequestOptions};

/// Shared state of every remote entity: the requester handle, the last
/// fetched attribute map and the datastore the entity lives in.
#[derive(Clone)]
pub struct Entity {
    api: Arc<ApiRequester>,
    data: Map<String, Value>,
    datastore: Option<String>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("datastore", &self.datastore)
            .finish()
    }
}

impl Entity {
    pub fn new(
        api: Arc<ApiRequester>,
        data: Map<String, Value>,
        datastore: Option<String>,
    ) -> Result<Self> {
        if !data.get("_id").map(Value::is_string).unwrap_or(false) {
            return Err(GpfError::sdk("Entité sans attribut '_id'"));
        }
        Ok(Self {
            api,
            data,
            datastore,
        })
    }

    /// Entity known only by its id (no attributes fetched yet).
    pub fn from_id(api: Arc<ApiRequester>, id: &str, datastore: Option<String>) -> Self {
        let mut data = Map::new();
        data.insert("_id".to_string(), Value::String(id.to_string()));
        Self {
            api,
            data,
            datastore,
        }
    }

    pub fn api(&self) -> &Arc<ApiRequester> {
        &self.api
    }

    pub fn id(&self) -> &str {
        self.data
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn datastore(&self) -> Option<&str> {
        self.datastore.as_deref()
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn status(&self) -> &str {
        self.get_str("status").unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    fn replace_data(&mut self, data: Map<String, Value>) {
        self.data = data;
    }
}

#[async_trait]
pub trait StoreEntity: Sized + Send + Sync {
    /// Path segment used to build route names (`<entity_name>_get`, …) and
    /// the id placeholder of those routes.
    const ENTITY_NAME: &'static str;
    /// Human-facing kind name used in messages.
    const ENTITY_TITLE: &'static str;

    fn from_entity(entity: Entity) -> Self;
    fn entity(&self) -> &Entity;
    fn entity_mut(&mut self) -> &mut Entity;

    fn id(&self) -> &str {
        self.entity().id()
    }

    fn datastore(&self) -> Option<&str> {
        self.entity().datastore()
    }

    fn get_store_properties(&self) -> &Map<String, Value> {
        self.entity().data()
    }

    fn to_json(&self) -> Value {
        Value::Object(self.entity().data().clone())
    }

    /// `<title> 'name' (<id>)`, for user-facing messages.
    fn describe(&self) -> String {
        match self.entity().name() {
            Some(name) => format!("{} '{}' ({})", Self::ENTITY_TITLE, name, self.id()),
            None => format!("{} {}", Self::ENTITY_TITLE, self.id()),
        }
    }

    async fn api_get(api: &Arc<ApiRequester>, id: &str, datastore: Option<&str>) -> Result<Self> {
        let route = format!("{}_get", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id)];
        if let Some(ds) = datastore {
            route_params.push(("datastore", ds));
        }
        let response = api
            .route_request(&route, &route_params, RequestOptions::new())
            .await?;
        let data = response.json_object()?;
        let entity = Entity::new(api.clone(), data, datastore.map(String::from))?;
        Ok(Self::from_entity(entity))
    }

    async fn api_create(
        api: &Arc<ApiRequester>,
        body: &Value,
        route_params: &[(&str, &str)],
    ) -> Result<Self> {
        let route = format!("{}_create", Self::ENTITY_NAME);
        let response = api
            .route_request(
                &route,
                route_params,
                RequestOptions::new().with_data(body.clone()),
            )
            .await?;
        let data = response.json_object()?;
        let datastore = route_params
            .iter()
            .find(|(key, _)| *key == "datastore")
            .map(|(_, value)| value.to_string());
        Ok(Self::from_entity(Entity::new(api.clone(), data, datastore)?))
    }

    /// Paginated listing. Filters translate to query parameters, tag filters
    /// to `tags[key]=value`; pages are fetched until the `Content-Range`
    /// total is reached.
    async fn api_list(
        api: &Arc<ApiRequester>,
        infos_filter: &[(String, String)],
        tags_filter: &[(String, String)],
        datastore: Option<&str>,
    ) -> Result<Vec<Self>> {
        let route = format!("{}_list", Self::ENTITY_NAME);
        let page_size = api.config().get_int("store_api", "nb_limit_page")?.max(1) as usize;
        let mut route_params: Vec<(&str, &str)> = Vec::new();
        if let Some(ds) = datastore {
            route_params.push(("datastore", ds));
        }

        let mut collected: Vec<Map<String, Value>> = Vec::new();
        let mut page = 1usize;
        loop {
            let mut options = RequestOptions::new()
                .with_param("page", page)
                .with_param("limit", page_size);
            for (key, value) in infos_filter {
                options = options.with_param(key, value.as_str());
            }
            for (key, value) in tags_filter {
                options = options.with_param(&format!("tags[{key}]"), value.as_str());
            }
            let response = api.route_request(&route, &route_params, options).await?;
            let items: Vec<Map<String, Value>> = response.json()?;
            collected.extend(items);
            if !ApiRequester::range_next_page(response.content_range().as_deref(), collected.len())
            {
                break;
            }
            page += 1;
        }

        collected
            .into_iter()
            .map(|data| {
                Entity::new(api.clone(), data, datastore.map(String::from)).map(Self::from_entity)
            })
            .collect()
    }

    /// Replace the local attribute map with the authoritative remote
    /// snapshot. No merging; the `_id` must not change.
    async fn api_update(&mut self) -> Result<()> {
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_get", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        let response = api
            .route_request(&route, &route_params, RequestOptions::new())
            .await?;
        let data = response.json_object()?;
        let remote_id = data.get("_id").and_then(Value::as_str).unwrap_or_default();
        if remote_id != id {
            return Err(GpfError::Sdk(format!(
                "L'identifiant de {} a changé côté Entrepôt ({id} → {remote_id})",
                Self::ENTITY_TITLE
            )));
        }
        self.entity_mut().replace_data(data);
        Ok(())
    }

    async fn api_delete(&self) -> Result<()> {
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_delete", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_request(&route, &route_params, RequestOptions::new())
            .await?;
        Ok(())
    }
}
