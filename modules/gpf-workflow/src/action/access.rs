//! Access action: grant a key access to an offering. Single create call.

use serde_json::Value;

use entrepot_client::RequestOptions;
use gpf_common::Result;
use tracing::info;

use crate::action::ActionContext;

pub struct AccessAction {
    context: ActionContext,
    workflow_context: String,
    definition: Value,
}

impl AccessAction {
    pub fn new(context: ActionContext, workflow_context: &str, definition: Value) -> Self {
        Self {
            context,
            workflow_context: workflow_context.to_string(),
            definition,
        }
    }

    pub async fn run(&mut self, datastore: Option<&str>) -> Result<()> {
        let body = self
            .definition
            .get("body_parameters")
            .cloned()
            .unwrap_or(Value::Null);
        let url_parameters = owned_url_parameters(&self.definition);
        let mut route_params: Vec<(&str, &str)> = url_parameters
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        if let Some(ds) = datastore {
            route_params.push(("datastore", ds));
        }
        self.context
            .api
            .route_request(
                "access_create",
                &route_params,
                RequestOptions::new().with_data(body),
            )
            .await?;
        info!(workflow = %self.workflow_context, "accès créé");
        Ok(())
    }
}

pub(crate) fn owned_url_parameters(definition: &Value) -> Vec<(String, String)> {
    definition
        .get("url_parameters")
        .and_then(Value::as_object)
        .map(|params| {
            params
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|v| (key.clone(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}
