//! Upload action: create or find a livraison, push its data and checksum
//! files, close it, then wait for the server-side checks to settle.
//!
//! The definition carries the creation body plus a `dataset` block:
//! `{data_files: {"<local path>": "<remote subdir>"}, md5_files: [path, …]}`.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use entrepot_client::{StoreEntity, TagInterface, Upload};
use gpf_common::{GpfError, Result};
use tracing::{info, warn};

use crate::action::{add_carte_tags, apply_comments, get_filters, ActionContext};
use crate::behavior::Behavior;
use crate::interrupt::InterruptSignal;

pub struct UploadAction {
    context: ActionContext,
    workflow_context: String,
    definition: Value,
    behavior: Behavior,
    mode_cartes: bool,
    upload: Option<Upload>,
}

impl UploadAction {
    pub fn new(
        context: ActionContext,
        workflow_context: &str,
        definition: Value,
        behavior: Option<Behavior>,
    ) -> Result<Self> {
        let behavior = match behavior {
            Some(behavior) => behavior,
            None => Behavior::from_config(&context.config, "upload")?,
        };
        let mode_cartes = context.config.get_bool("compatibility_cartes", "activate")?;
        Ok(Self {
            context,
            workflow_context: workflow_context.to_string(),
            definition,
            behavior,
            mode_cartes,
            upload: None,
        })
    }

    pub fn upload(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }

    pub async fn run(&mut self, datastore: Option<&str>, interrupt: &InterruptSignal) -> Result<()> {
        info!(workflow = %self.workflow_context, "création et remplissage d'une livraison");
        let fresh = self.create_upload(datastore).await?;
        let Some(upload) = &self.upload else {
            return Err(GpfError::step_action("Erreur à la création de la livraison."));
        };

        // Tags and comments apply to reused uploads too.
        if let Some(tags) = self.definition.get("tags").and_then(Value::as_object) {
            if !tags.is_empty() {
                upload.api_add_tags(tags).await?;
            }
        }
        if let Some(comments) = self.definition.get("comments").and_then(Value::as_array) {
            apply_comments(upload, comments).await?;
        }

        let already_delivered = !fresh && upload.status() != Upload::STATUS_OPEN;
        if already_delivered {
            info!(upload = %upload.describe(), "livraison déjà fermée, aucun fichier à envoyer");
        } else {
            add_carte_tags(&self.context.config, self.mode_cartes, upload, "upload_start").await?;
            self.push_files().await?;
            if let Some(upload) = self.upload.as_mut() {
                upload.api_close().await?;
            }
        }
        self.wait_checks(interrupt).await
    }

    /// Find-or-create step. Returns `true` when the upload was created by
    /// this run.
    async fn create_upload(&mut self, datastore: Option<&str>) -> Result<bool> {
        let body = self
            .definition
            .get("body_parameters")
            .cloned()
            .unwrap_or(Value::Null);
        if let Some(existing) = self.find_upload(datastore).await? {
            match self.behavior {
                Behavior::Stop => {
                    return Err(GpfError::Sdk(format!(
                        "Impossible de créer la livraison, une livraison équivalente {} existe déjà.",
                        existing.describe()
                    )))
                }
                Behavior::Delete => {
                    warn!(upload = %existing.describe(), "livraison équivalente supprimée puis recréée");
                    existing.api_delete().await?;
                }
                Behavior::Continue | Behavior::Resume => {
                    if existing.status() == Upload::STATUS_UNSTABLE {
                        return Err(GpfError::Sdk(format!(
                            "La livraison précédente {} est instable. Impossible de reprendre la livraison.",
                            existing.describe()
                        )));
                    }
                    info!(upload = %existing.describe(), "livraison équivalente déjà existante, reprise");
                    self.upload = Some(existing);
                    return Ok(false);
                }
            }
        }

        let mut route_params: Vec<(&str, &str)> = Vec::new();
        if let Some(ds) = datastore {
            route_params.push(("datastore", ds));
        }
        self.upload = Some(Upload::api_create(&self.context.api, &body, &route_params).await?);
        Ok(true)
    }

    async fn find_upload(&self, datastore: Option<&str>) -> Result<Option<Upload>> {
        let body = self
            .definition
            .get("body_parameters")
            .cloned()
            .unwrap_or(Value::Null);
        let (infos_filter, tags_filter) = get_filters(
            &self.context.config,
            "upload",
            &body,
            self.definition.get("tags"),
        )?;
        let mut found =
            Upload::api_list(&self.context.api, &infos_filter, &tags_filter, datastore).await?;
        if found.is_empty() {
            Ok(None)
        } else {
            let mut first = found.remove(0);
            first.api_update().await?;
            Ok(Some(first))
        }
    }

    async fn push_files(&self) -> Result<()> {
        let Some(upload) = &self.upload else {
            return Err(GpfError::step_action("Aucune livraison à remplir."));
        };
        let dataset = self.definition.get("dataset").cloned().unwrap_or(Value::Null);

        if let Some(files) = dataset.get("data_files").and_then(Value::as_object) {
            info!(count = files.len(), "envoi des fichiers de donnée");
            for (local, remote) in files {
                let api_path = remote.as_str().unwrap_or_default();
                upload
                    .api_push_data_file(Path::new(local), api_path)
                    .await?;
            }
        }
        if let Some(md5_files) = dataset.get("md5_files").and_then(Value::as_array) {
            for file in md5_files.iter().filter_map(Value::as_str) {
                upload.api_push_md5_file(Path::new(file)).await?;
            }
        }
        Ok(())
    }

    /// Poll until the upload leaves `CHECKING`: `CLOSED` is the success
    /// terminal state, `UNSTABLE` the failure one.
    async fn wait_checks(&mut self, interrupt: &InterruptSignal) -> Result<()> {
        let check_interval = self
            .context
            .config
            .get_int("upload", "nb_sec_between_check_updates")?
            .max(0) as u64;
        loop {
            let status = {
                let Some(upload) = self.upload.as_mut() else {
                    return Err(GpfError::step_action("Aucune livraison à surveiller."));
                };
                upload.api_update().await?;
                upload.status().to_string()
            };
            match status.as_str() {
                Upload::STATUS_CLOSED => {
                    if let Some(upload) = &self.upload {
                        add_carte_tags(
                            &self.context.config,
                            self.mode_cartes,
                            upload,
                            "upload_end_ok",
                        )
                        .await?;
                        info!(upload = %upload.describe(), "vérifications de la livraison terminées");
                    }
                    return Ok(());
                }
                Upload::STATUS_UNSTABLE => {
                    if let Some(upload) = &self.upload {
                        add_carte_tags(
                            &self.context.config,
                            self.mode_cartes,
                            upload,
                            "upload_end_ko",
                        )
                        .await?;
                    }
                    return Err(GpfError::step_action(
                        "Livraison terminée en erreur : statut UNSTABLE.",
                    ));
                }
                _ => {
                    let interrupted = tokio::select! {
                        biased;
                        _ = interrupt.wait() => true,
                        _ = tokio::time::sleep(Duration::from_secs(check_interval)) => false,
                    };
                    if interrupted {
                        return Err(GpfError::Interrupted);
                    }
                }
            }
        }
    }
}
