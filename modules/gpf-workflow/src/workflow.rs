//! Workflow driver: a validated JSON document expands into a DAG of named
//! steps, each holding an ordered list of actions. Steps run in dependency
//! order, actions within a step sequentially; the driver only catches errors
//! to add the step/action context to the message.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde_json::{Map, Value};

use gpf_common::{json, GpfError, Result};
use tracing::info;

use crate::action::{Action, ActionContext};
use crate::behavior::Behavior;
use crate::interrupt::InterruptSignal;

const WORKFLOW_SCHEMA: &str = include_str!("workflow-schema.json");

#[derive(Debug)]
pub struct Workflow {
    name: String,
    document: Value,
}

impl Workflow {
    /// Load a workflow file (JSON, comments allowed) and validate it against
    /// the embedded schema.
    pub fn from_file(path: &Path) -> Result<Self> {
        let document = json::load_jsonc(path)?;
        Self::from_value(&path.display().to_string(), document)
    }

    pub fn from_value(name: &str, document: Value) -> Result<Self> {
        let schema: Value = serde_json::from_str(WORKFLOW_SCHEMA)
            .map_err(|e| GpfError::Sdk(format!("Schéma de workflow embarqué invalide : {e}")))?;
        json::validate(&document, &schema, name)?;
        Ok(Self {
            name: name.to_string(),
            document,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn steps(&self) -> Result<&Map<String, Value>> {
        self.document
            .get("workflow")
            .and_then(|workflow| workflow.get("steps"))
            .and_then(Value::as_object)
            .ok_or_else(|| {
                GpfError::Workflow(format!(
                    "Le workflow «{}» ne contient pas de bloc 'workflow.steps'",
                    self.name
                ))
            })
    }

    pub fn step_names(&self) -> Result<Vec<String>> {
        Ok(self.steps()?.keys().cloned().collect())
    }

    fn step_parents(step: &Value) -> Vec<String> {
        step.get("parents")
            .and_then(Value::as_array)
            .map(|parents| {
                parents
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Step names in dependency order. Unknown parents and cycles are
    /// workflow errors; ready steps keep a stable (name) order.
    pub fn topological_steps(&self) -> Result<Vec<String>> {
        let steps = self.steps()?;
        let known: HashSet<&String> = steps.keys().collect();
        for (name, step) in steps {
            for parent in Self::step_parents(step) {
                if !known.contains(&parent) {
                    return Err(GpfError::Workflow(format!(
                        "L'étape «{name}» référence une étape parente inconnue «{parent}»"
                    )));
                }
            }
        }

        let mut remaining: BTreeMap<String, Vec<String>> = steps
            .iter()
            .map(|(name, step)| (name.clone(), Self::step_parents(step)))
            .collect();
        let mut order = Vec::with_capacity(remaining.len());
        let mut done: HashSet<String> = HashSet::new();
        while !remaining.is_empty() {
            let ready: Vec<String> = remaining
                .iter()
                .filter(|(_, parents)| parents.iter().all(|p| done.contains(p)))
                .map(|(name, _)| name.clone())
                .collect();
            if ready.is_empty() {
                return Err(GpfError::Workflow(format!(
                    "Le workflow «{}» contient un cycle entre les étapes : {}",
                    self.name,
                    remaining.keys().cloned().collect::<Vec<_>>().join(", ")
                )));
            }
            for name in ready {
                remaining.remove(&name);
                done.insert(name.clone());
                order.push(name);
            }
        }
        Ok(order)
    }

    /// Run one named step: its actions, in declared order, each to
    /// completion.
    pub async fn run_step(
        &self,
        step_name: &str,
        context: &ActionContext,
        behavior: Option<Behavior>,
        datastore: Option<&str>,
        interrupt: &InterruptSignal,
    ) -> Result<()> {
        let steps = self.steps()?;
        let step = steps.get(step_name).ok_or_else(|| {
            GpfError::Workflow(format!(
                "L'étape «{step_name}» n'existe pas dans le workflow «{}»",
                self.name
            ))
        })?;
        let actions = step
            .get("actions")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                GpfError::Workflow(format!("L'étape «{step_name}» ne contient pas d'actions"))
            })?;

        info!(step = step_name, count = actions.len(), "exécution d'une étape");
        for (index, definition) in actions.iter().enumerate() {
            let workflow_context = format!("{}/{step_name}", self.name);
            let mut action = Action::from_definition(
                context,
                &workflow_context,
                definition.clone(),
                behavior,
            )?;
            let kind = action.kind();
            action
                .run(datastore, interrupt)
                .await
                .map_err(|e| match e {
                    // interruption must stay recognizable for the caller
                    GpfError::Interrupted => GpfError::Interrupted,
                    other => GpfError::Workflow(format!(
                        "Étape «{step_name}», action n°{} ({kind}) : {other}",
                        index + 1
                    )),
                })?;
        }
        Ok(())
    }

    /// Run every step in dependency order.
    pub async fn run(
        &self,
        context: &ActionContext,
        behavior: Option<Behavior>,
        datastore: Option<&str>,
        interrupt: &InterruptSignal,
    ) -> Result<()> {
        for step_name in self.topological_steps()? {
            self.run_step(&step_name, context, behavior, datastore, interrupt)
                .await?;
        }
        Ok(())
    }
}
