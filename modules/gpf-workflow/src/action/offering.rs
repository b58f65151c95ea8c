//! Offering action: publish a configuration on an endpoint, then wait for
//! the publication to settle.

use std::time::Duration;

use serde_json::Value;

use entrepot_client::{Configuration, Offering, StoreEntity};
use gpf_common::{GpfError, Result};
use tracing::info;

use crate::action::ActionContext;

pub struct OfferingAction {
    context: ActionContext,
    workflow_context: String,
    definition: Value,
    offering: Option<Offering>,
}

impl OfferingAction {
    pub fn new(context: ActionContext, workflow_context: &str, definition: Value) -> Self {
        Self {
            context,
            workflow_context: workflow_context.to_string(),
            definition,
            offering: None,
        }
    }

    pub fn offering(&self) -> Option<&Offering> {
        self.offering.as_ref()
    }

    pub async fn run(&mut self, datastore: Option<&str>) -> Result<()> {
        info!(workflow = %self.workflow_context, "création d'une offre");
        self.create_offering(datastore).await?;
        let Some(offering) = self.offering.as_mut() else {
            return Err(GpfError::step_action("Erreur à la création de l'offre."));
        };

        offering.api_update().await?;
        for url in offering.urls() {
            info!(url = %url, "lien de l'offre");
        }

        // Publication is normally near-instant; poll every second.
        loop {
            offering.api_update().await?;
            match offering.status() {
                Offering::STATUS_PUBLISHED => {
                    info!(offering = %offering.describe(), "offre publiée");
                    return Ok(());
                }
                Offering::STATUS_UNSTABLE => {
                    return Err(GpfError::step_action(
                        "Création d'une offre : terminé en erreur.",
                    ))
                }
                _ => tokio::time::sleep(Duration::from_secs(1)).await,
            }
        }
    }

    async fn create_offering(&mut self, datastore: Option<&str>) -> Result<()> {
        if let Some(existing) = self.find_offering(datastore).await? {
            info!(offering = %existing.describe(), "offre déjà existante, complétion uniquement");
            self.offering = Some(existing);
            return Ok(());
        }

        let body = self
            .definition
            .get("body_parameters")
            .cloned()
            .unwrap_or(Value::Null);
        let configuration_id = self.configuration_id()?;
        let mut route_params: Vec<(&str, &str)> = vec![("configuration", configuration_id.as_str())];
        if let Some(ds) = datastore {
            route_params.push(("datastore", ds));
        }
        match Offering::api_create(&self.context.api, &body, &route_params).await {
            Ok(offering) => {
                self.offering = Some(offering);
                Ok(())
            }
            Err(GpfError::Conflict { message }) => Err(GpfError::StepAction(format!(
                "Impossible de créer l'offre il y a un conflict : \n{message}"
            ))),
            Err(e) => Err(e),
        }
    }

    /// Offering already published from the referenced configuration on the
    /// requested endpoint, if any.
    async fn find_offering(&self, datastore: Option<&str>) -> Result<Option<Offering>> {
        let configuration_id = self.configuration_id()?;
        let Some(endpoint_id) = self.endpoint_id() else {
            return Ok(None);
        };
        let configuration =
            Configuration::api_get(&self.context.api, &configuration_id, datastore).await?;
        for mut offering in configuration.api_list_offerings().await? {
            offering.api_update().await?;
            let offering_endpoint = offering
                .get_store_properties()
                .get("endpoint")
                .and_then(|endpoint| endpoint.get("_id"))
                .and_then(Value::as_str)
                .map(String::from);
            if offering_endpoint.as_deref() == Some(endpoint_id.as_str()) {
                return Ok(Some(offering));
            }
        }
        Ok(None)
    }

    fn configuration_id(&self) -> Result<String> {
        self.definition
            .get("url_parameters")
            .and_then(|params| params.get("configuration"))
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                GpfError::Workflow(format!(
                    "Action offering (étape {}) sans 'url_parameters.configuration'",
                    self.workflow_context
                ))
            })
    }

    /// `body_parameters.endpoint` accepts both a plain id and `{_id}`.
    fn endpoint_id(&self) -> Option<String> {
        let endpoint = self.definition.get("body_parameters")?.get("endpoint")?;
        match endpoint {
            Value::String(id) => Some(id.clone()),
            Value::Object(map) => map.get("_id").and_then(Value::as_str).map(String::from),
            _ => None,
        }
    }
}
