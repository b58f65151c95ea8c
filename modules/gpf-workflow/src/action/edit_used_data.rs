//! Edit-used-data action: replace or extend the `used_data` block of a
//! configuration, then PUT the full edited body.

use serde_json::Value;

use entrepot_client::{Configuration, FullEditInterface, StoreEntity};
use gpf_common::{GpfError, Result};
use tracing::info;

use crate::action::ActionContext;

/// Entity attributes the full-edit route does not accept back.
const SERVER_MANAGED_KEYS: [&str; 4] = ["_id", "status", "tags", "last_event"];

pub struct EditUsedDataAction {
    context: ActionContext,
    workflow_context: String,
    definition: Value,
}

impl EditUsedDataAction {
    pub fn new(context: ActionContext, workflow_context: &str, definition: Value) -> Self {
        Self {
            context,
            workflow_context: workflow_context.to_string(),
            definition,
        }
    }

    pub async fn run(&mut self, datastore: Option<&str>) -> Result<()> {
        let configuration_id = self
            .definition
            .get("url_parameters")
            .and_then(|params| params.get("configuration"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GpfError::Workflow(format!(
                    "Action edit-used-data (étape {}) sans 'url_parameters.configuration'",
                    self.workflow_context
                ))
            })?;
        let used_data = self
            .definition
            .get("body_parameters")
            .and_then(|body| body.get("used_data"))
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                GpfError::Workflow(format!(
                    "Action edit-used-data (étape {}) sans 'body_parameters.used_data'",
                    self.workflow_context
                ))
            })?;
        let append = self
            .definition
            .get("body_parameters")
            .and_then(|body| body.get("append"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut configuration =
            Configuration::api_get(&self.context.api, configuration_id, datastore).await?;
        configuration.api_update().await?;

        let mut body = configuration.to_json();
        if let Some(map) = body.as_object_mut() {
            for key in SERVER_MANAGED_KEYS {
                map.remove(key);
            }
        }
        let type_infos = body
            .get_mut("type_infos")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                GpfError::step_action(
                    "La configuration ne porte pas de bloc 'type_infos', impossible d'éditer used_data.",
                )
            })?;
        let new_used_data = if append {
            let mut merged = type_infos
                .get("used_data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            merged.extend(used_data);
            merged
        } else {
            used_data
        };
        type_infos.insert("used_data".to_string(), Value::Array(new_used_data));

        configuration.api_full_edit(&body).await?;
        info!(configuration = %configuration.describe(), "used_data mis à jour");
        Ok(())
    }
}
