//! Processing-execution action: create or reconcile a server-side job from a
//! declarative definition, complete its output entity (tags, comments),
//! launch it, and optionally monitor it to a terminal status.
//!
//! The definition's `body_parameters` mirrors what the server expects:
//! `{processing, inputs: {upload?, stored_data?}, output: {upload|stored_data:
//! {name | _id, …}}, parameters}`. An output carrying a `name` requests the
//! creation of a new entity; an `_id` requests the mutation of an existing
//! one. Pre-existing remote state is resolved against the selected behavior
//! policy before anything is created.

use std::time::Duration;

use serde_json::{json, Map, Value};

use entrepot_client::{ProcessingExecution, StoreEntity, StoredData, TagInterface, Upload};
use gpf_common::{GpfError, Result};
use tracing::{info, warn};

use crate::action::{add_carte_tags, apply_comments, get_filters, ActionContext};
use crate::behavior::Behavior;
use crate::interrupt::InterruptSignal;

/// Poll cadence while waiting for an aborted job to settle.
const ABORT_POLL_SECS: u64 = 2;

pub type MonitorCallback<'a> = &'a (dyn Fn(&ProcessingExecution) + Send + Sync);
pub type CtrlCHandler<'a> = &'a (dyn Fn() -> bool + Send + Sync);

pub struct ProcessingExecutionAction {
    context: ActionContext,
    workflow_context: String,
    definition: Value,
    behavior: Behavior,
    mode_cartes: bool,
    processing_execution: Option<ProcessingExecution>,
    upload: Option<Upload>,
    stored_data: Option<StoredData>,
    no_output: bool,
    inputs_upload: Vec<Upload>,
    inputs_stored_data: Vec<StoredData>,
}

impl ProcessingExecutionAction {
    pub fn new(
        context: ActionContext,
        workflow_context: &str,
        definition: Value,
        behavior: Option<Behavior>,
        compatibility_cartes: Option<bool>,
    ) -> Result<Self> {
        let behavior = match behavior {
            Some(behavior) => behavior,
            None => Behavior::from_config(&context.config, "processing_execution")?,
        };
        let mode_cartes = match compatibility_cartes {
            Some(mode) => mode,
            None => context.config.get_bool("compatibility_cartes", "activate")?,
        };
        Ok(Self {
            context,
            workflow_context: workflow_context.to_string(),
            definition,
            behavior,
            mode_cartes,
            processing_execution: None,
            upload: None,
            stored_data: None,
            no_output: false,
            inputs_upload: Vec::new(),
            inputs_stored_data: Vec::new(),
        })
    }

    pub fn processing_execution(&self) -> Option<&ProcessingExecution> {
        self.processing_execution.as_ref()
    }

    pub fn upload(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }

    pub fn stored_data(&self) -> Option<&StoredData> {
        self.stored_data.as_ref()
    }

    pub fn no_output(&self) -> bool {
        self.no_output
    }

    pub fn workflow_context(&self) -> &str {
        &self.workflow_context
    }

    fn body_parameters(&self) -> &Value {
        self.definition.get("body_parameters").unwrap_or(&Value::Null)
    }

    fn output_element(&self) -> Option<&Value> {
        let output = self.body_parameters().get("output")?;
        output.get("upload").or_else(|| output.get("stored_data"))
    }

    /// The definition requests the creation of a new output entity
    /// (`output.{upload|stored_data}` carries a `name`).
    pub fn output_new_entity(&self) -> bool {
        self.output_element()
            .map(|element| element.get("name").is_some())
            .unwrap_or(false)
    }

    /// The definition requests the mutation of an existing output entity
    /// (`output.{upload|stored_data}` carries an `_id`).
    pub fn output_update_entity(&self) -> bool {
        self.output_element()
            .map(|element| element.get("_id").is_some())
            .unwrap_or(false)
    }

    /// Create or reuse the job, resolve its I/O handles, apply tags and
    /// comments on the output entity, then launch.
    pub async fn run(&mut self, datastore: Option<&str>) -> Result<()> {
        info!(
            workflow = %self.workflow_context,
            "création d'une exécution de traitement et complétion de l'entité en sortie"
        );
        self.create_processing_execution(datastore).await?;
        self.add_tags().await?;
        self.add_comments().await?;
        self.launch().await?;
        info!(
            workflow = %self.workflow_context,
            "exécution de traitement créée et lancée, entité en sortie complétée"
        );
        Ok(())
    }

    async fn create_processing_execution(&mut self, datastore: Option<&str>) -> Result<()> {
        if self.output_new_entity() {
            self.handle_new_output(datastore).await?;
        }
        if self.output_update_entity() {
            self.handle_update_entity(datastore).await?;
        }

        // Reconciliation left nothing to reuse: create the job remotely.
        if self.processing_execution.is_none() {
            let body = self.body_parameters().clone();
            let mut route_params: Vec<(&str, &str)> = Vec::new();
            if let Some(ds) = datastore {
                route_params.push(("datastore", ds));
            }
            self.processing_execution =
                Some(ProcessingExecution::api_create(&self.context.api, &body, &route_params).await?);
        }

        let data = match &self.processing_execution {
            Some(job) => job.get_store_properties().clone(),
            None => {
                return Err(GpfError::sdk(
                    "Erreur à la création de l'exécution de traitement : aucune exécution disponible.",
                ))
            }
        };

        // Input handles, fetched from the ids embedded in the job.
        if let Some(uploads) = data
            .get("inputs")
            .and_then(|inputs| inputs.get("upload"))
            .and_then(Value::as_array)
        {
            for item in uploads {
                if let Some(id) = item.get("_id").and_then(Value::as_str) {
                    self.inputs_upload
                        .push(Upload::api_get(&self.context.api, id, datastore).await?);
                }
            }
        }
        if let Some(stored) = data
            .get("inputs")
            .and_then(|inputs| inputs.get("stored_data"))
            .and_then(Value::as_array)
        {
            for item in stored {
                if let Some(id) = item.get("_id").and_then(Value::as_str) {
                    self.inputs_stored_data
                        .push(StoredData::api_get(&self.context.api, id, datastore).await?);
                }
            }
        }

        // Output handle: exactly one of upload, stored_data or no_output.
        let output = data
            .get("output")
            .cloned()
            .unwrap_or_else(|| json!({ "no_output": "" }));
        let Some(info) = output.as_object() else {
            return Err(GpfError::sdk(
                "Erreur à la création de l'exécution de traitement : impossible de récupérer l'entité en sortie.",
            ));
        };
        if info.contains_key("no_output") {
            info!("traitement sans donnée en sortie");
            self.no_output = true;
            return Ok(());
        }
        if let Some(id) = info
            .get("upload")
            .and_then(|upload| upload.get("_id"))
            .and_then(Value::as_str)
        {
            self.upload = Some(Upload::api_get(&self.context.api, id, datastore).await?);
            return Ok(());
        }
        if let Some(id) = info
            .get("stored_data")
            .and_then(|stored_data| stored_data.get("_id"))
            .and_then(Value::as_str)
        {
            self.stored_data = Some(StoredData::api_get(&self.context.api, id, datastore).await?);
            return Ok(());
        }
        Err(GpfError::StepAction(format!(
            "Aucune correspondance pour la sortie ({})",
            info.keys().cloned().collect::<Vec<_>>().join(", ")
        )))
    }

    /// New-entity path: a stored data equivalent to the requested output may
    /// already exist; resolve it against the behavior policy. Only
    /// stored-data outputs participate; an upload output never matches
    /// pre-existing state here.
    async fn handle_new_output(&mut self, datastore: Option<&str>) -> Result<()> {
        if self
            .body_parameters()
            .get("output")
            .and_then(|output| output.get("stored_data"))
            .is_none()
        {
            return Ok(());
        }
        let Some(mut stored_data) = self.find_stored_data(datastore).await? else {
            return Ok(());
        };
        if self.behavior == Behavior::Stop {
            return Err(GpfError::Sdk(format!(
                "Impossible de créer l'exécution de traitement, une donnée stockée en sortie équivalente {} existe déjà.",
                stored_data.describe()
            )));
        }

        stored_data.api_update().await?;
        let status = stored_data.status().to_string();

        if self.behavior == Behavior::Delete
            || (status == StoredData::STATUS_UNSTABLE && self.behavior == Behavior::Resume)
        {
            warn!(
                stored_data = %stored_data.describe(),
                "donnée stockée équivalente supprimée puis recréée"
            );
            stored_data.api_delete().await?;
            self.processing_execution = None;
            return Ok(());
        }

        // CONTINUE / RESUME on a live output: reuse the job that produced it.
        if status == StoredData::STATUS_UNSTABLE {
            return Err(GpfError::Sdk(format!(
                "Le traitement précédent a échoué sur la donnée stockée en sortie {}. Impossible de lancer le traitement demandé.",
                stored_data.describe()
            )));
        }
        let filter = vec![("output_stored_data".to_string(), stored_data.id().to_string())];
        let jobs = ProcessingExecution::api_list(&self.context.api, &filter, &[], datastore).await?;
        let Some(mut job) = jobs.into_iter().next() else {
            return Err(GpfError::Sdk(format!(
                "Impossible de trouver l'exécution de traitement liée à la donnée stockée {}",
                stored_data.describe()
            )));
        };
        job.api_update().await?;
        info!(
            stored_data = %stored_data.describe(),
            job = job.id(),
            "donnée stockée en sortie déjà existante, reprise du traitement associé"
        );
        self.stored_data = Some(stored_data);
        self.processing_execution = Some(job);
        Ok(())
    }

    /// Update path: the output `_id` may already be the target of an
    /// equivalent job (same processing, same inputs, same parameters).
    async fn handle_update_entity(&mut self, datastore: Option<&str>) -> Result<()> {
        let body = self.body_parameters().clone();
        let Some(output_id) = body
            .get("output")
            .and_then(|output| output.get("stored_data"))
            .and_then(|stored_data| stored_data.get("_id"))
            .and_then(Value::as_str)
        else {
            // only stored-data updates are reconciled
            return Ok(());
        };

        let mut stored_data =
            match StoredData::api_get(&self.context.api, output_id, datastore).await {
                Ok(stored_data) => stored_data,
                Err(GpfError::NotFound { .. }) => {
                    return Err(GpfError::sdk(
                        "La donnée en sortie est introuvable, impossible de faire la mise à jour.",
                    ))
                }
                Err(e) => return Err(e),
            };

        let processing = body
            .get("processing")
            .map(value_as_filter_string)
            .unwrap_or_default();
        let mut filter = vec![
            ("output_stored_data".to_string(), output_id.to_string()),
            ("processing".to_string(), processing),
        ];
        // The server is expected to match on a single input even when several
        // exist; only the first element feeds the filter.
        if let Some(first) = first_input_id(&body, "upload") {
            filter.push(("input_upload".to_string(), first));
        } else if let Some(first) = first_input_id(&body, "stored_data") {
            filter.push(("input_stored_data".to_string(), first));
        }

        let candidates =
            ProcessingExecution::api_list(&self.context.api, &filter, &[], datastore).await?;

        // Refine: strict set-equality of the sorted input id lists and deep
        // equality of the parameters.
        let expected_uploads = sorted_definition_inputs(&body, "upload");
        let expected_stored = sorted_definition_inputs(&body, "stored_data");
        let expected_parameters = body.get("parameters").cloned().unwrap_or_else(|| json!({}));

        let mut matched: Option<ProcessingExecution> = None;
        for mut job in candidates {
            job.api_update().await?;
            let data = job.get_store_properties();
            let job_uploads = sorted_job_inputs(data, "upload");
            let job_stored = sorted_job_inputs(data, "stored_data");
            let job_parameters = data.get("parameters").cloned().unwrap_or_else(|| json!({}));
            if job_uploads == expected_uploads
                && job_stored == expected_stored
                && job_parameters == expected_parameters
            {
                matched = Some(job);
                break;
            }
        }
        let Some(job) = matched else {
            return Ok(());
        };

        if self.behavior == Behavior::Stop {
            return Err(GpfError::Sdk(format!(
                "Le traitement a déjà été lancé pour mettre à jour cette donnée ({}).",
                job.describe()
            )));
        }

        stored_data.api_update().await?;
        let job_status = job.status().to_string();

        // The previous update cannot be deleted; a fresh job is simply
        // launched on top of it.
        if self.behavior == Behavior::Delete
            || (matches!(
                job_status.as_str(),
                ProcessingExecution::STATUS_FAILURE | ProcessingExecution::STATUS_ABORTED
            ) && self.behavior == Behavior::Resume)
        {
            warn!(
                job = job.id(),
                status = %job_status,
                "traitement précédent sans succès, relance de la mise à jour"
            );
            self.processing_execution = None;
            return Ok(());
        }

        if stored_data.status() == StoredData::STATUS_UNSTABLE {
            return Err(GpfError::Sdk(format!(
                "Le traitement précédent a échoué sur la donnée stockée en sortie {}. Impossible de lancer le traitement demandé : contactez le support de l'Entrepôt Géoplateforme pour faire réinitialiser son statut.",
                stored_data.describe()
            )));
        }
        info!(
            stored_data = %stored_data.describe(),
            job = job.id(),
            "donnée stockée en cours de mise à jour, reprise du traitement associé"
        );
        self.stored_data = Some(stored_data);
        self.processing_execution = Some(job);
        Ok(())
    }

    /// Stored data equivalent to the one this job would create, according to
    /// the configured filters.
    pub async fn find_stored_data(&self, datastore: Option<&str>) -> Result<Option<StoredData>> {
        let output = self
            .body_parameters()
            .get("output")
            .and_then(|output| output.get("stored_data"))
            .cloned()
            .unwrap_or(Value::Null);
        let (infos_filter, tags_filter) = get_filters(
            &self.context.config,
            "processing_execution",
            &output,
            self.definition.get("tags"),
        )?;
        let mut found = StoredData::api_list(
            &self.context.api,
            &infos_filter,
            &tags_filter,
            datastore,
        )
        .await?;
        if found.is_empty() {
            Ok(None)
        } else {
            Ok(Some(found.remove(0)))
        }
    }

    async fn add_tags(&mut self) -> Result<()> {
        let mut tags: Map<String, Value> = self
            .definition
            .get("tags")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if self.mode_cartes {
            if let Some(job) = &self.processing_execution {
                let processing_id = job
                    .get_store_properties()
                    .get("processing")
                    .and_then(|processing| processing.get("_id"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let id_mise_en_base = self
                    .context
                    .config
                    .get_str("compatibility_cartes", "id_mise_en_base")?;
                let id_pyramide = self
                    .context
                    .config
                    .get_str("compatibility_cartes", "id_pyramide_vecteur")?;

                if !processing_id.is_empty() && processing_id == id_mise_en_base {
                    if !tags.contains_key("datasheet_name") {
                        return Err(GpfError::sdk(
                            "Mode compatibility_cartes activé, il faut obligatoirement définir le tag 'datasheet_name'",
                        ));
                    }
                    let Some(stored_data) = &self.stored_data else {
                        return Err(GpfError::sdk(
                            "Intégration de données vecteur livrées en base : input et output obligatoires",
                        ));
                    };
                    if self.inputs_upload.is_empty() {
                        return Err(GpfError::sdk(
                            "Intégration de données vecteur livrées en base : input et output obligatoires",
                        ));
                    }
                    let mut cartes_tags = Map::new();
                    cartes_tags.insert(
                        "proc_int_id".to_string(),
                        Value::String(job.id().to_string()),
                    );
                    cartes_tags.insert(
                        "vectordb_id".to_string(),
                        Value::String(stored_data.id().to_string()),
                    );
                    for upload in &self.inputs_upload {
                        upload.api_add_tags(&cartes_tags).await?;
                        add_carte_tags(&self.context.config, true, upload, "execution_start")
                            .await?;
                    }
                    tags.insert(
                        "uuid_upload".to_string(),
                        Value::String(self.inputs_upload[0].id().to_string()),
                    );
                } else if !processing_id.is_empty() && processing_id == id_pyramide {
                    if !tags.contains_key("datasheet_name") {
                        return Err(GpfError::sdk(
                            "Mode compatibility_cartes activé, il faut obligatoirement définir le tag 'datasheet_name'",
                        ));
                    }
                    if self.inputs_stored_data.is_empty() || self.stored_data.is_none() {
                        return Err(GpfError::sdk(
                            "Création de pyramide vecteur : input et output obligatoires",
                        ));
                    }
                    tags.insert(
                        "vectordb_id".to_string(),
                        Value::String(self.inputs_stored_data[0].id().to_string()),
                    );
                    tags.insert(
                        "proc_pyr_creat_id".to_string(),
                        Value::String(job.id().to_string()),
                    );
                }
            }
        }

        let definition_has_tags = self
            .definition
            .get("tags")
            .and_then(Value::as_object)
            .map(|map| !map.is_empty())
            .unwrap_or(false);
        if !definition_has_tags || self.no_output {
            return Ok(());
        }

        if let Some(upload) = &self.upload {
            info!(upload = %upload.describe(), count = tags.len(), "ajout des tags");
            upload.api_add_tags(&tags).await?;
        } else if let Some(stored_data) = &self.stored_data {
            info!(stored_data = %stored_data.describe(), count = tags.len(), "ajout des tags");
            stored_data.api_add_tags(&tags).await?;
        } else {
            return Err(GpfError::step_action(
                "ni upload ni stored-data trouvé. Impossible d'ajouter les tags",
            ));
        }
        Ok(())
    }

    async fn add_comments(&self) -> Result<()> {
        let Some(comments) = self.definition.get("comments").and_then(Value::as_array) else {
            return Ok(());
        };
        if self.no_output {
            return Ok(());
        }
        if let Some(upload) = &self.upload {
            apply_comments(upload, comments).await
        } else if let Some(stored_data) = &self.stored_data {
            apply_comments(stored_data, comments).await
        } else {
            Err(GpfError::step_action(
                "ni upload ni stored-data trouvé. Impossible d'ajouter les commentaires",
            ))
        }
    }

    async fn launch(&self) -> Result<()> {
        let Some(job) = &self.processing_execution else {
            return Err(GpfError::step_action(
                "Aucune exécution de traitement trouvée. Impossible de lancer le traitement",
            ));
        };
        if job.status() == ProcessingExecution::STATUS_CREATED {
            info!(job = job.id(), "lancement de l'exécution de traitement");
            job.api_launch().await?;
        } else if self.behavior.reuses_existing() {
            info!(job = job.id(), "exécution de traitement déjà lancée");
        } else {
            return Err(GpfError::step_action(
                "L'exécution de traitement est déjà lancée.",
            ));
        }
        Ok(())
    }

    /// Poll the job until it reaches `SUCCESS`, `FAILURE` or `ABORTED`,
    /// invoking `callback` after every status refresh (terminal one
    /// included). On interrupt: refresh once — already terminal means
    /// callback then `Interrupted`; otherwise `ctrl_c` decides whether to
    /// keep polling or to abort the job, wait for it to settle, delete a
    /// freshly created output if the job ended `ABORTED`, and return
    /// `Interrupted`.
    pub async fn monitoring_until_end(
        &mut self,
        callback: Option<MonitorCallback<'_>>,
        ctrl_c: Option<CtrlCHandler<'_>>,
        interrupt: &InterruptSignal,
    ) -> Result<String> {
        let check_interval = self
            .context
            .config
            .get_int("processing_execution", "nb_sec_between_check_updates")?
            .max(0) as u64;
        info!(
            interval_secs = check_interval,
            "monitoring du traitement"
        );

        self.refresh_job().await?;
        let mut status = self.job_status();
        while !ProcessingExecution::is_terminal(&status) {
            self.emit(callback);

            // biased: a pending interrupt must win over an elapsed sleep
            let interrupted = tokio::select! {
                biased;
                _ = interrupt.wait() => true,
                _ = tokio::time::sleep(Duration::from_secs(check_interval)) => false,
            };

            if interrupted {
                self.refresh_job().await?;
                status = self.job_status();
                if ProcessingExecution::is_terminal(&status) {
                    self.emit(callback);
                    warn!("traitement déjà terminé");
                    return Err(GpfError::Interrupted);
                }
                let stop = match ctrl_c {
                    Some(handler) => handler(),
                    None => true,
                };
                if !stop {
                    continue;
                }

                warn!("Ctrl+C : traitement en cours d'interruption, veuillez patienter");
                if let Some(job) = &self.processing_execution {
                    job.api_abort().await?;
                }
                self.refresh_job().await?;
                status = self.job_status();
                while !ProcessingExecution::is_terminal(&status) {
                    tokio::time::sleep(Duration::from_secs(ABORT_POLL_SECS)).await;
                    self.refresh_job().await?;
                    status = self.job_status();
                }
                self.emit(callback);

                if status == ProcessingExecution::STATUS_ABORTED && self.output_new_entity() {
                    if let Some(upload) = &self.upload {
                        warn!(upload = %upload.describe(), "suppression de la livraison en cours de remplissage");
                        upload.api_delete().await?;
                    } else if let Some(stored_data) = &self.stored_data {
                        warn!(stored_data = %stored_data.describe(), "suppression de la donnée stockée en cours de remplissage");
                        stored_data.api_delete().await?;
                    }
                }
                return Err(GpfError::Interrupted);
            }

            self.refresh_job().await?;
            status = self.job_status();
        }

        self.emit(callback);
        self.tag_inputs_after_end(&status).await?;
        Ok(status)
    }

    /// Cartes compatibility: after a mise-en-base job settles, every input
    /// upload is tagged with the configured progress text.
    async fn tag_inputs_after_end(&self, status: &str) -> Result<()> {
        if !self.mode_cartes {
            return Ok(());
        }
        let Some(job) = &self.processing_execution else {
            return Ok(());
        };
        let processing_id = job
            .get_store_properties()
            .get("processing")
            .and_then(|processing| processing.get("_id"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let id_mise_en_base = self
            .context
            .config
            .get_str("compatibility_cartes", "id_mise_en_base")?;
        if processing_id.is_empty() || processing_id != id_mise_en_base {
            return Ok(());
        }
        if self.inputs_upload.is_empty() {
            return Err(GpfError::sdk(
                "Intégration de données vecteur livrées en base : input et output obligatoires",
            ));
        }
        let stage = if status == ProcessingExecution::STATUS_SUCCESS {
            "execution_end_ok"
        } else {
            "execution_end_ko"
        };
        for upload in &self.inputs_upload {
            add_carte_tags(&self.context.config, true, upload, stage).await?;
        }
        Ok(())
    }

    async fn refresh_job(&mut self) -> Result<()> {
        match self.processing_execution.as_mut() {
            Some(job) => job.api_update().await,
            None => Err(GpfError::step_action(
                "Aucune processing-execution trouvée. Impossible de suivre le déroulement du traitement",
            )),
        }
    }

    fn job_status(&self) -> String {
        self.processing_execution
            .as_ref()
            .map(|job| job.status().to_string())
            .unwrap_or_default()
    }

    fn emit(&self, callback: Option<MonitorCallback<'_>>) {
        if let (Some(callback), Some(job)) = (callback, &self.processing_execution) {
            callback(job);
        }
    }
}

fn value_as_filter_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_input_id(body: &Value, kind: &str) -> Option<String> {
    body.get("inputs")?
        .get(kind)?
        .as_array()?
        .first()?
        .as_str()
        .map(String::from)
}

/// Input ids as declared in the definition (plain strings), sorted.
fn sorted_definition_inputs(body: &Value, kind: &str) -> Vec<String> {
    let mut ids: Vec<String> = body
        .get("inputs")
        .and_then(|inputs| inputs.get(kind))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids
}

/// Input ids as embedded in a job snapshot (`[{_id}, …]`), sorted.
fn sorted_job_inputs(data: &Map<String, Value>, kind: &str) -> Vec<String> {
    let mut ids: Vec<String> = data
        .get("inputs")
        .and_then(|inputs| inputs.get(kind))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("_id").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    ids.sort();
    ids
}
