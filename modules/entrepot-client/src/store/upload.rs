//! Upload (livraison): a server-side collection of files prior to processing.

use std::path::Path;

use gpf_common::Result;

use crate::requester::RequestOptions;
use crate::store::interfaces::{CommentInterface, SharingInterface, TagInterface};
use crate::store::{Entity, StoreEntity};

pub struct Upload {
    entity: Entity,
}

impl StoreEntity for Upload {
    const ENTITY_NAME: &'static str = "upload";
    const ENTITY_TITLE: &'static str = "livraison";

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

impl TagInterface for Upload {}
impl CommentInterface for Upload {}
impl SharingInterface for Upload {}

impl Upload {
    pub const STATUS_OPEN: &'static str = "OPEN";
    pub const STATUS_CLOSED: &'static str = "CLOSED";
    pub const STATUS_CHECKING: &'static str = "CHECKING";
    pub const STATUS_UNSTABLE: &'static str = "UNSTABLE";

    pub fn status(&self) -> &str {
        self.entity.status()
    }

    fn own_route_params(&self) -> Vec<(&str, &str)> {
        let mut params = vec![(Self::ENTITY_NAME, self.entity.id())];
        if let Some(ds) = self.entity.datastore() {
            params.push(("datastore", ds));
        }
        params
    }

    /// Send a data file, stored remotely under `api_path`.
    pub async fn api_push_data_file(&self, file_path: &Path, api_path: &str) -> Result<()> {
        self.entity
            .api()
            .route_upload_file(
                "upload_push_data",
                file_path,
                "file",
                &self.own_route_params(),
                RequestOptions::new().with_param("path", api_path),
            )
            .await?;
        Ok(())
    }

    /// Send a `.md5` checksum file.
    pub async fn api_push_md5_file(&self, file_path: &Path) -> Result<()> {
        self.entity
            .api()
            .route_upload_file(
                "upload_push_md5",
                file_path,
                "file",
                &self.own_route_params(),
                RequestOptions::new(),
            )
            .await?;
        Ok(())
    }

    /// Remove a previously pushed data file.
    pub async fn api_delete_data_file(&self, api_path: &str) -> Result<()> {
        self.entity
            .api()
            .route_request(
                "upload_delete_data",
                &self.own_route_params(),
                RequestOptions::new().with_param("path", api_path),
            )
            .await?;
        Ok(())
    }

    /// Re-open a closed upload, then refresh the snapshot.
    pub async fn api_open(&mut self) -> Result<()> {
        self.entity
            .api()
            .route_request("upload_open", &self.own_route_params(), RequestOptions::new())
            .await?;
        self.api_update().await
    }

    /// Close the upload (triggers the server-side checks), then refresh.
    pub async fn api_close(&mut self) -> Result<()> {
        self.entity
            .api()
            .route_request(
                "upload_close",
                &self.own_route_params(),
                RequestOptions::new(),
            )
            .await?;
        self.api_update().await
    }
}
