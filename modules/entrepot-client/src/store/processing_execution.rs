//! Processing execution: a server-side job consuming uploads/stored data and
//! producing at most one output entity.

use serde_json::Value;

use gpf_common::Result;

use crate::requester::RequestOptions;
use crate::store::{Entity, StoreEntity};

pub struct ProcessingExecution {
    entity: Entity,
}

impl StoreEntity for ProcessingExecution {
    const ENTITY_NAME: &'static str = "processing_execution";
    const ENTITY_TITLE: &'static str = "exécution de traitement";

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

impl ProcessingExecution {
    pub const STATUS_CREATED: &'static str = "CREATED";
    pub const STATUS_WAITING: &'static str = "WAITING";
    pub const STATUS_PROGRESS: &'static str = "PROGRESS";
    pub const STATUS_SUCCESS: &'static str = "SUCCESS";
    pub const STATUS_FAILURE: &'static str = "FAILURE";
    pub const STATUS_ABORTED: &'static str = "ABORTED";

    pub fn status(&self) -> &str {
        self.entity.status()
    }

    pub fn is_terminal(status: &str) -> bool {
        matches!(
            status,
            Self::STATUS_SUCCESS | Self::STATUS_FAILURE | Self::STATUS_ABORTED
        )
    }

    /// `output` block of the job: exactly one of `upload`, `stored_data` or
    /// the `no_output` sentinel.
    pub fn output(&self) -> Option<&Value> {
        self.entity.get("output")
    }

    pub fn inputs(&self) -> Option<&Value> {
        self.entity.get("inputs")
    }

    fn own_route_params(&self) -> Vec<(&str, &str)> {
        let mut params = vec![(Self::ENTITY_NAME, self.entity.id())];
        if let Some(ds) = self.entity.datastore() {
            params.push(("datastore", ds));
        }
        params
    }

    pub async fn api_launch(&self) -> Result<()> {
        self.entity
            .api()
            .route_request(
                "processing_execution_launch",
                &self.own_route_params(),
                RequestOptions::new(),
            )
            .await?;
        Ok(())
    }

    pub async fn api_abort(&self) -> Result<()> {
        self.entity
            .api()
            .route_request(
                "processing_execution_abort",
                &self.own_route_params(),
                RequestOptions::new(),
            )
            .await?;
        Ok(())
    }

    /// Job logs as one text blob. The server returns either raw text or a
    /// JSON array of lines; arrays are joined with newlines (the JSON parse
    /// already unescapes quotes).
    pub async fn api_logs(&self) -> Result<String> {
        let response = self
            .entity
            .api()
            .route_request(
                "processing_execution_logs",
                &self.own_route_params(),
                RequestOptions::new(),
            )
            .await?;
        let text = response.text();
        match serde_json::from_str::<Vec<String>>(&text) {
            Ok(lines) => Ok(lines.join("\n")),
            Err(_) => Ok(text),
        }
    }
}
