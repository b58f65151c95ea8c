//! Configuration action: find-or-create a configuration, then apply tags
//! and comments.

use serde_json::Value;

use entrepot_client::{Configuration, StoreEntity, TagInterface};
use gpf_common::{GpfError, Result};
use tracing::info;

use crate::action::{apply_comments, get_filters, ActionContext};

pub struct ConfigurationAction {
    context: ActionContext,
    workflow_context: String,
    definition: Value,
    configuration: Option<Configuration>,
}

impl ConfigurationAction {
    pub fn new(context: ActionContext, workflow_context: &str, definition: Value) -> Self {
        Self {
            context,
            workflow_context: workflow_context.to_string(),
            definition,
            configuration: None,
        }
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    pub async fn run(&mut self, datastore: Option<&str>) -> Result<()> {
        info!(workflow = %self.workflow_context, "création d'une configuration");
        let body = self
            .definition
            .get("body_parameters")
            .cloned()
            .unwrap_or(Value::Null);

        if let Some(existing) = self.find_configuration(datastore).await? {
            info!(configuration = %existing.describe(), "configuration déjà existante, complétion uniquement");
            self.configuration = Some(existing);
        } else {
            let mut route_params: Vec<(&str, &str)> = Vec::new();
            if let Some(ds) = datastore {
                route_params.push(("datastore", ds));
            }
            self.configuration =
                Some(Configuration::api_create(&self.context.api, &body, &route_params).await?);
        }

        let Some(configuration) = &self.configuration else {
            return Err(GpfError::step_action(
                "Erreur à la création de la configuration.",
            ));
        };
        if let Some(tags) = self.definition.get("tags").and_then(Value::as_object) {
            if !tags.is_empty() {
                configuration.api_add_tags(tags).await?;
            }
        }
        if let Some(comments) = self.definition.get("comments").and_then(Value::as_array) {
            apply_comments(configuration, comments).await?;
        }
        Ok(())
    }

    async fn find_configuration(&self, datastore: Option<&str>) -> Result<Option<Configuration>> {
        let body = self
            .definition
            .get("body_parameters")
            .cloned()
            .unwrap_or(Value::Null);
        let (infos_filter, tags_filter) = get_filters(
            &self.context.config,
            "configuration",
            &body,
            self.definition.get("tags"),
        )?;
        let mut found =
            Configuration::api_list(&self.context.api, &infos_filter, &tags_filter, datastore)
                .await?;
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.remove(0)))
        }
    }
}
