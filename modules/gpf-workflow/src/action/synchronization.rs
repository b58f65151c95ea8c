//! Synchronization action: ask the platform to re-synchronize a published
//! offering with its configuration. Single call, no monitoring.

use serde_json::Value;

use entrepot_client::{Offering, StoreEntity};
use gpf_common::{GpfError, Result};
use tracing::info;

use crate::action::ActionContext;

pub struct SynchronizationAction {
    context: ActionContext,
    workflow_context: String,
    definition: Value,
}

impl SynchronizationAction {
    pub fn new(context: ActionContext, workflow_context: &str, definition: Value) -> Self {
        Self {
            context,
            workflow_context: workflow_context.to_string(),
            definition,
        }
    }

    pub async fn run(&mut self, datastore: Option<&str>) -> Result<()> {
        let offering_id = self
            .definition
            .get("url_parameters")
            .and_then(|params| params.get("offering"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GpfError::Workflow(format!(
                    "Action synchronization (étape {}) sans 'url_parameters.offering'",
                    self.workflow_context
                ))
            })?;
        let offering = Offering::api_get(&self.context.api, offering_id, datastore).await?;
        offering.api_synchronize().await?;
        info!(offering = %offering.describe(), "synchronisation demandée");
        Ok(())
    }
}
