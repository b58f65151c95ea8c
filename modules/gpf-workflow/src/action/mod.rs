//! Declarative action executors.
//!
//! An action is built from its workflow context, a JSON definition (required
//! `type` and `body_parameters`, optional `url_parameters`, `tags`,
//! `comments`) and a behavior policy. All behavioural depth lives in the
//! processing-execution action; the other kinds follow the same
//! find-or-create pattern with simpler state.

pub mod access;
pub mod configuration;
pub mod edit_used_data;
pub mod offering;
pub mod permission;
pub mod processing_execution;
pub mod synchronization;
pub mod upload;

pub use access::AccessAction;
pub use configuration::ConfigurationAction;
pub use edit_used_data::EditUsedDataAction;
pub use offering::OfferingAction;
pub use permission::PermissionAction;
pub use processing_execution::ProcessingExecutionAction;
pub use synchronization::SynchronizationAction;
pub use upload::UploadAction;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use entrepot_client::{ApiRequester, CommentInterface, ProcessingExecution, TagInterface};
use gpf_common::{Config, GpfError, Result};

use crate::behavior::Behavior;
use crate::interrupt::InterruptSignal;

/// Shared dependencies of every action: the loaded configuration and the
/// authenticated requester.
#[derive(Clone)]
pub struct ActionContext {
    pub config: Arc<Config>,
    pub api: Arc<ApiRequester>,
}

impl ActionContext {
    pub fn new(config: Arc<Config>, api: Arc<ApiRequester>) -> Self {
        Self { config, api }
    }
}

/// Build the `(infos_filter, tags_filter)` pair used to look up an entity
/// equivalent to the one an action would create. The attribute and tag names
/// come from the `filter_infos` / `filter_tags` keys of the entity's config
/// section; values are projected from the definition.
pub fn get_filters(
    config: &Config,
    section: &str,
    infos: &Value,
    tags: Option<&Value>,
) -> Result<(Vec<(String, String)>, Vec<(String, String)>)> {
    let mut infos_filter = Vec::new();
    for key in config.get_str_list(section, "filter_infos")? {
        if let Some(value) = infos.get(&key) {
            infos_filter.push((key, value_to_string(value)));
        }
    }
    let mut tags_filter = Vec::new();
    if let Some(Value::Object(map)) = tags {
        for key in config.get_str_list(section, "filter_tags")? {
            if let Some(value) = map.get(&key) {
                tags_filter.push((key, value_to_string(value)));
            }
        }
    }
    Ok((infos_filter, tags_filter))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Add every definition comment the entity does not already carry.
/// Running the same action twice therefore adds each comment at most once.
pub async fn apply_comments<E: CommentInterface>(entity: &E, comments: &[Value]) -> Result<()> {
    let existing: HashSet<String> = entity
        .api_list_comments()
        .await?
        .iter()
        .filter_map(|comment| comment.get("text").and_then(Value::as_str).map(String::from))
        .collect();
    for comment in comments {
        if let Some(text) = comment.as_str() {
            if !existing.contains(text) {
                entity.api_add_comment(text).await?;
            }
        }
    }
    Ok(())
}

/// Cartes compatibility stage tag: `integration_progress = <configured text>`
/// for the given stage key.
pub async fn add_carte_tags<E: TagInterface>(
    config: &Config,
    mode_cartes: bool,
    entity: &E,
    stage: &str,
) -> Result<()> {
    if !mode_cartes {
        return Ok(());
    }
    let value = config.get_str("compatibility_cartes", &format!("{stage}_integration_progress"))?;
    let mut tags = Map::new();
    tags.insert("integration_progress".to_string(), Value::String(value));
    entity.api_add_tags(&tags).await
}

/// Tagged variant over the definition `type` field.
pub enum Action {
    Upload(UploadAction),
    Configuration(ConfigurationAction),
    Offering(OfferingAction),
    ProcessingExecution(ProcessingExecutionAction),
    Synchronization(SynchronizationAction),
    EditUsedData(EditUsedDataAction),
    Access(AccessAction),
    Permission(PermissionAction),
}

impl Action {
    pub fn from_definition(
        context: &ActionContext,
        workflow_context: &str,
        definition: Value,
        behavior: Option<Behavior>,
    ) -> Result<Self> {
        let kind = definition
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GpfError::Workflow(format!("Action sans clé 'type' (étape {workflow_context})"))
            })?;
        match kind {
            "upload" => Ok(Action::Upload(UploadAction::new(
                context.clone(),
                workflow_context,
                definition,
                behavior,
            )?)),
            "configuration" => Ok(Action::Configuration(ConfigurationAction::new(
                context.clone(),
                workflow_context,
                definition,
            ))),
            "offering" => Ok(Action::Offering(OfferingAction::new(
                context.clone(),
                workflow_context,
                definition,
            ))),
            "processing-execution" => Ok(Action::ProcessingExecution(
                ProcessingExecutionAction::new(
                    context.clone(),
                    workflow_context,
                    definition,
                    behavior,
                    None,
                )?,
            )),
            "synchronization" => Ok(Action::Synchronization(SynchronizationAction::new(
                context.clone(),
                workflow_context,
                definition,
            ))),
            "edit-used-data" => Ok(Action::EditUsedData(EditUsedDataAction::new(
                context.clone(),
                workflow_context,
                definition,
            ))),
            "access" => Ok(Action::Access(AccessAction::new(
                context.clone(),
                workflow_context,
                definition,
            ))),
            "permission" => Ok(Action::Permission(PermissionAction::new(
                context.clone(),
                workflow_context,
                definition,
            ))),
            other => Err(GpfError::Workflow(format!(
                "Type d'action inconnu '{other}' (étape {workflow_context})"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::Upload(_) => "upload",
            Action::Configuration(_) => "configuration",
            Action::Offering(_) => "offering",
            Action::ProcessingExecution(_) => "processing-execution",
            Action::Synchronization(_) => "synchronization",
            Action::EditUsedData(_) => "edit-used-data",
            Action::Access(_) => "access",
            Action::Permission(_) => "permission",
        }
    }

    /// Run the action to completion. Long-running kinds monitor their remote
    /// job/check and fail when it ends in a non-success status.
    pub async fn run(&mut self, datastore: Option<&str>, interrupt: &InterruptSignal) -> Result<()> {
        match self {
            Action::Upload(action) => action.run(datastore, interrupt).await,
            Action::Configuration(action) => action.run(datastore).await,
            Action::Offering(action) => action.run(datastore).await,
            Action::ProcessingExecution(action) => {
                action.run(datastore).await?;
                let status = action.monitoring_until_end(None, None, interrupt).await?;
                if status == ProcessingExecution::STATUS_SUCCESS {
                    Ok(())
                } else {
                    Err(GpfError::StepAction(format!(
                        "L'exécution de traitement s'est terminée en statut {status}"
                    )))
                }
            }
            Action::Synchronization(action) => action.run(datastore).await,
            Action::EditUsedData(action) => action.run(datastore).await,
            Action::Access(action) => action.run(datastore).await,
            Action::Permission(action) => action.run(datastore).await,
        }
    }
}
