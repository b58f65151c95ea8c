//! Orthogonal entity capabilities, composed by each kind instead of a
//! class hierarchy: tags, comments, sharing, file re-upload and full edit.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use gpf_common::Result;

use crate::requester::RequestOptions;
use crate::store::StoreEntity;

#[async_trait]
pub trait TagInterface: StoreEntity {
    async fn api_add_tags(&self, tags: &Map<String, Value>) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_add_tags", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_request(
            &route,
            &route_params,
            RequestOptions::new().with_data(Value::Object(tags.clone())),
        )
        .await?;
        Ok(())
    }

    async fn api_remove_tags(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_delete_tags", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_request(
            &route,
            &route_params,
            RequestOptions::new().with_param("tags", keys.to_vec()),
        )
        .await?;
        Ok(())
    }

    /// Tags as of the last fetched snapshot (the API embeds them in the
    /// entity body).
    fn api_list_tags(&self) -> Map<String, Value> {
        self.entity()
            .get("tags")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait CommentInterface: StoreEntity {
    async fn api_add_comment(&self, text: &str) -> Result<()> {
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_add_comment", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_request(
            &route,
            &route_params,
            RequestOptions::new().with_data(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn api_list_comments(&self) -> Result<Vec<Value>> {
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_list_comments", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        let response = api
            .route_request(&route, &route_params, RequestOptions::new())
            .await?;
        response.json()
    }
}

#[async_trait]
pub trait SharingInterface: StoreEntity {
    async fn api_add_sharings(&self, datastore_ids: &[String]) -> Result<()> {
        if datastore_ids.is_empty() {
            return Ok(());
        }
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_add_sharings", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_request(
            &route,
            &route_params,
            RequestOptions::new().with_data(Value::Array(
                datastore_ids
                    .iter()
                    .map(|s| Value::String(s.clone()))
                    .collect(),
            )),
        )
        .await?;
        Ok(())
    }

    async fn api_list_sharings(&self) -> Result<Vec<Value>> {
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_list_sharings", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        let response = api
            .route_request(&route, &route_params, RequestOptions::new())
            .await?;
        response.json()
    }

    async fn api_remove_sharings(&self, datastore_ids: &[String]) -> Result<()> {
        if datastore_ids.is_empty() {
            return Ok(());
        }
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_delete_sharings", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_request(
            &route,
            &route_params,
            RequestOptions::new().with_param("sharings", datastore_ids.to_vec()),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
pub trait ReUploadFileInterface: StoreEntity {
    /// PUT a replacement file on the shared `store_entity_re_upload` route,
    /// then refresh the local snapshot.
    async fn api_re_upload(&mut self, file_path: &Path) -> Result<()> {
        let api = self.entity().api().clone();
        let file_key = api.config().get_str("upload", "push_data_file_key")?;
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let mut route_params: Vec<(&str, &str)> = vec![("store_entity", id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_upload_file(
            "store_entity_re_upload",
            file_path,
            &file_key,
            &route_params,
            RequestOptions::new(),
        )
        .await?;
        self.api_update().await
    }
}

#[async_trait]
pub trait FullEditInterface: StoreEntity {
    /// PUT a full replacement of the entity, then refresh the local snapshot.
    async fn api_full_edit(&mut self, body: &Value) -> Result<()> {
        let api = self.entity().api().clone();
        let id = self.id().to_string();
        let datastore = self.datastore().map(String::from);
        let route = format!("{}_full_edit", Self::ENTITY_NAME);
        let mut route_params: Vec<(&str, &str)> = vec![(Self::ENTITY_NAME, id.as_str())];
        if let Some(ds) = datastore.as_deref() {
            route_params.push(("datastore", ds));
        }
        api.route_request(
            &route,
            &route_params,
            RequestOptions::new().with_data(body.clone()),
        )
        .await?;
        self.api_update().await
    }
}
