//! Bearer-token acquisition against the Géoplateforme SSO (password grant).
//!
//! One instance per process, shared via `Arc`. The cached token is refreshed
//! when its margin-adjusted expiry has passed, and can be revoked explicitly
//! (the requester does so on 401/403 before retrying).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use gpf_common::{Config, GpfError, Result};

#[derive(Debug, Clone)]
struct Token {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

pub struct Authenticator {
    config: Arc<Config>,
    http: reqwest::Client,
    token: Mutex<Option<Token>>,
}

impl Authenticator {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, acquiring or refreshing it if needed.
    /// Successive calls within the token TTL perform no HTTP exchange.
    pub async fn get_access_token_string(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }
        let token = self.request_new_token().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    /// Authorization header, plus `content-type: application/json` on demand.
    pub async fn get_http_header(&self, json_content_type: bool) -> Result<HeaderMap> {
        let token = self.get_access_token_string().await?;
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| GpfError::Authentification("Jeton d'authentification invalide".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        if json_content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    /// Drop the cached token; the next call re-acquires one.
    pub async fn revoke_token(&self) {
        *self.token.lock().await = None;
    }

    async fn request_new_token(&self) -> Result<Token> {
        let url = self.config.get_str("store_authentification", "token_url")?;
        let nb_attempts = self
            .config
            .get_int("store_authentification", "nb_attempts")?
            .max(1) as usize;
        let delay = self.config.get_int("store_authentification", "sec_between_attempts")? as u64;
        let margin = self.config.get_int("store_authentification", "sec_duration_margin")?;

        // Field order on the wire is part of the contract with the SSO.
        let form: Vec<(&str, String)> = vec![
            ("grant_type", self.config.get_str("store_authentification", "grant_type")?),
            ("username", self.config.get_str("store_authentification", "login")?),
            ("password", self.config.get_str("store_authentification", "password")?),
            ("client_id", self.config.get_str("store_authentification", "client_id")?),
            ("client_secret", self.config.get_str("store_authentification", "client_secret")?),
        ];

        for attempt in 1..=nb_attempts {
            match self.http.post(&url).form(&form).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.bytes().await.unwrap_or_default();
                    let payload: Option<Value> = serde_json::from_slice(&body).ok();

                    if let Some(description) = payload
                        .as_ref()
                        .and_then(|v| v.get("error_description"))
                        .and_then(Value::as_str)
                    {
                        if description.contains("Account is not fully set up") {
                            return Err(GpfError::Authentification(format!(
                                "Problème lors de l'authentification, veuillez vous connecter via l'interface en ligne KeyCloak pour vérifier votre compte. Votre mot de passe est sûrement expiré. ({description})"
                            )));
                        }
                    }

                    if status.is_success() {
                        if let Some(token) = payload.as_ref().and_then(|v| parse_token(v, margin)) {
                            debug!("jeton d'authentification récupéré");
                            return Ok(token);
                        }
                    }
                    warn!(status = %status, attempt, "échec de récupération du jeton");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "échec de récupération du jeton");
                }
            }
            if attempt < nb_attempts {
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
        }
        Err(GpfError::Authentification(format!(
            "La récupération du jeton d'authentification a échoué après {nb_attempts} tentatives"
        )))
    }
}

fn parse_token(payload: &Value, margin: i64) -> Option<Token> {
    let access_token = payload.get("access_token")?.as_str()?.to_string();
    let expires_in = payload.get("expires_in")?.as_i64()?;
    Some(Token {
        access_token,
        expires_at: Utc::now() + chrono::Duration::seconds(expires_in - margin),
    })
}
