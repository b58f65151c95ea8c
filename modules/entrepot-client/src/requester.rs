//! Authenticated requester over the Entrepôt REST API.
//!
//! Resolves symbolic route names from the config route table, performs the
//! HTTP call with bearer headers, classifies failures into the SDK error
//! taxonomy and retries the transient ones. File uploads stream from disk
//! and rebuild their multipart body on every attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use gpf_common::{Config, GpfError, Result, DEFAULT_REQUEST_TIMEOUT_SECS};

use crate::auth::Authenticator;

const INVALID_URL_MESSAGE: &str =
    "L'URL indiquée en configuration est invalide ou inexistante. Contactez le support.";

/// Request timeout: either disabled or a fixed number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Disabled,
    Secs(u64),
}

impl Timeout {
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            None => Timeout::Disabled,
            Some(secs) => Timeout::Secs(secs),
        }
    }

    fn as_duration(self) -> Option<Duration> {
        match self {
            Timeout::Disabled => None,
            Timeout::Secs(secs) => Some(Duration::from_secs(secs)),
        }
    }
}

/// Query parameter value. List values serialise with a bracketed key
/// (`k[]=v1&k[]=v2`), order preserved.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Single(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Single(value)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::List(value)
    }
}

pub type Params = Vec<(String, ParamValue)>;

/// File to send as a multipart part; the stream is (re)opened per attempt.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub path: PathBuf,
    pub key: String,
}

/// Optional pieces of a request. `method` overrides the route table's verb,
/// `timeout` overrides the route's timeout.
#[derive(Debug, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub params: Params,
    pub data: Option<Value>,
    pub file: Option<FileUpload>,
    pub headers: HeaderMap,
    pub timeout: Option<Timeout>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status, headers and body of a completed call.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| GpfError::Sdk(format!("Réponse de l'API Entrepôt non parsable : {e}")))
    }

    pub fn json_object(&self) -> Result<Map<String, Value>> {
        self.json()
    }

    pub fn content_range(&self) -> Option<String> {
        self.headers
            .get("Content-Range")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }
}

enum SendFailure {
    Fatal(GpfError),
    Connection(String),
    Retryable(String),
}

pub struct ApiRequester {
    config: Arc<Config>,
    auth: Arc<Authenticator>,
    http: reqwest::Client,
}

impl ApiRequester {
    pub fn new(config: Arc<Config>, auth: Arc<Authenticator>) -> Self {
        Self {
            config,
            auth,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn auth(&self) -> &Arc<Authenticator> {
        &self.auth
    }

    /// Resolve `route_name` against the route table, substitute `{datastore}`
    /// (from `route_params` or the configured default) and every other
    /// placeholder, then delegate to [`url_request`](Self::url_request).
    pub async fn route_request(
        &self,
        route_name: &str,
        route_params: &[(&str, &str)],
        mut options: RequestOptions,
    ) -> Result<ApiResponse> {
        let route = self.config.route(route_name)?;
        let url = self.resolve_route_url(route_name, &route.url, route_params)?;
        let method = match options.method.take() {
            Some(method) => method,
            None => Method::from_bytes(route.method.as_bytes())
                .map_err(|_| GpfError::Sdk(format!("Route '{route_name}' : méthode HTTP invalide")))?,
        };
        if options.timeout.is_none() {
            options.timeout = Some(Timeout::from_secs(route.request_timeout()));
        }
        self.url_request(&url, method, options).await
    }

    /// Read the file size, derive the timeout from the route's size-indexed
    /// table and send the file as a streamed multipart part.
    pub async fn route_upload_file(
        &self,
        route_name: &str,
        file_path: &Path,
        file_key: &str,
        route_params: &[(&str, &str)],
        mut options: RequestOptions,
    ) -> Result<ApiResponse> {
        let size = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| {
                GpfError::Sdk(format!("Fichier {} illisible : {e}", file_path.display()))
            })?
            .len();
        let route = self.config.route(route_name)?;
        options.timeout = Some(Timeout::from_secs(route.upload_timeout(size)));
        options.file = Some(FileUpload {
            path: file_path.to_path_buf(),
            key: file_key.to_string(),
        });
        self.route_request(route_name, route_params, options).await
    }

    /// Perform the call with authenticated headers and the retry loop of the
    /// request layer: 2xx returns, 404/409/400 raise immediately, 401/403
    /// revoke the token and retry, 5xx and network errors retry after a fixed
    /// delay, exhaustion raises a `Sdk` error.
    pub async fn url_request(
        &self,
        url: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<ApiResponse> {
        let mut parsed: url::Url = url
            .parse()
            .map_err(|_| GpfError::sdk(INVALID_URL_MESSAGE))?;
        if !options.params.is_empty() {
            let mut pairs = parsed.query_pairs_mut();
            for (key, value) in &options.params {
                match value {
                    ParamValue::Single(v) => {
                        pairs.append_pair(key, v);
                    }
                    ParamValue::List(items) => {
                        let bracketed = format!("{key}[]");
                        for item in items {
                            pairs.append_pair(&bracketed, item);
                        }
                    }
                }
            }
        }

        let nb_attempts = self.config.get_int("store_api", "nb_attempts")?.max(1) as usize;
        let delay = self.config.get_int("store_api", "sec_between_attempts")? as u64;
        let timeout = options
            .timeout
            .unwrap_or(Timeout::Secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        let mut connection_error = false;
        for attempt in 1..=nb_attempts {
            debug!(method = %method, url = %parsed, attempt, "requête Entrepôt");
            match self.send_once(&parsed, &method, &options, timeout).await {
                Ok(response) => {
                    let status = response.status;
                    if status.is_success() {
                        return Ok(response);
                    }
                    match status {
                        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                            warn!(status = %status, "jeton refusé, révocation puis nouvel essai");
                            self.auth.revoke_token().await;
                        }
                        StatusCode::NOT_FOUND => {
                            return Err(GpfError::NotFound {
                                url: parsed.to_string(),
                            })
                        }
                        StatusCode::CONFLICT => {
                            return Err(GpfError::Conflict {
                                message: response.text(),
                            })
                        }
                        StatusCode::BAD_REQUEST => {
                            return Err(GpfError::BadRequest {
                                message: bad_request_message(&response),
                            })
                        }
                        _ => {
                            warn!(status = %status, attempt, "réponse inattendue de l'API");
                            if attempt < nb_attempts {
                                tokio::time::sleep(Duration::from_secs(delay)).await;
                            }
                        }
                    }
                }
                Err(SendFailure::Fatal(e)) => return Err(e),
                Err(SendFailure::Connection(message)) => {
                    warn!(error = %message, attempt, "serveur injoignable");
                    connection_error = true;
                    if attempt < nb_attempts {
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                }
                Err(SendFailure::Retryable(message)) => {
                    warn!(error = %message, attempt, "erreur réseau");
                    if attempt < nb_attempts {
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                }
            }
        }

        if connection_error {
            let check_status_url = self.config.get_str("store_api", "check_status_url")?;
            return Err(GpfError::Sdk(format!(
                "Le serveur de l'API Entrepôt ({url}) n'est pas joignable. Cela peut être dû à un problème de configuration si elle a changé récemment. Sinon, c'est un problème sur l'API Entrepôt : consultez l'état du service pour en savoir plus : {check_status_url}."
            )));
        }
        Err(GpfError::Sdk(format!(
            "L'exécution d'une requête a échoué après {nb_attempts} tentatives."
        )))
    }

    /// `true` iff more results remain according to a `start-end/total`
    /// Content-Range header. Absent or unparseable headers stop pagination.
    pub fn range_next_page(content_range: Option<&str>, received: usize) -> bool {
        fn total(range: &str) -> Option<usize> {
            let (pages, total) = range.split_once('/')?;
            let (start, end) = pages.split_once('-')?;
            start.trim().parse::<usize>().ok()?;
            end.trim().parse::<usize>().ok()?;
            total.trim().parse().ok()
        }
        match content_range.and_then(total) {
            Some(total) => received < total,
            None => false,
        }
    }

    fn resolve_route_url(
        &self,
        route_name: &str,
        template: &str,
        route_params: &[(&str, &str)],
    ) -> Result<String> {
        let mut url = template.to_string();
        if url.contains("{datastore}") {
            let from_params = route_params
                .iter()
                .find(|(k, _)| *k == "datastore")
                .map(|(_, v)| v.to_string());
            let datastore = from_params
                .or_else(|| self.config.root_datastore())
                .ok_or_else(|| {
                    GpfError::Sdk(format!(
                        "Route '{route_name}' : aucun datastore indiqué (ni en paramètre, ni en configuration)"
                    ))
                })?;
            url = url.replace("{datastore}", &datastore);
        }
        for (key, value) in route_params {
            url = url.replace(&format!("{{{key}}}"), value);
        }
        if url.contains('{') {
            return Err(GpfError::Sdk(format!(
                "Route '{route_name}' : paramètre(s) manquant(s) pour compléter l'URL {url}"
            )));
        }
        Ok(url)
    }

    async fn send_once(
        &self,
        url: &url::Url,
        method: &Method,
        options: &RequestOptions,
        timeout: Timeout,
    ) -> std::result::Result<ApiResponse, SendFailure> {
        let json_body = options.data.is_some() && options.file.is_none();
        let mut headers = self
            .auth
            .get_http_header(json_body)
            .await
            .map_err(SendFailure::Fatal)?;
        for (name, value) in options.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        let mut builder = self.http.request(method.clone(), url.clone()).headers(headers);
        if let Some(duration) = timeout.as_duration() {
            builder = builder.timeout(duration);
        }

        if let Some(file) = &options.file {
            let handle = tokio::fs::File::open(&file.path).await.map_err(|e| {
                SendFailure::Fatal(GpfError::Sdk(format!(
                    "Fichier {} illisible : {e}",
                    file.path.display()
                )))
            })?;
            let filename = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let part = reqwest::multipart::Part::stream(reqwest::Body::wrap_stream(
                ReaderStream::new(handle),
            ))
            .file_name(filename);
            let mut form = reqwest::multipart::Form::new().part(file.key.clone(), part);
            if let Some(Value::Object(fields)) = &options.data {
                for (key, value) in fields {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    form = form.text(key.clone(), text);
                }
            }
            builder = builder.multipart(form);
        } else if let Some(data) = &options.data {
            builder = builder.json(data);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?;
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(error: reqwest::Error) -> SendFailure {
    if error.is_builder() {
        SendFailure::Fatal(GpfError::sdk(INVALID_URL_MESSAGE))
    } else if error.is_connect() {
        SendFailure::Connection(error.to_string())
    } else {
        SendFailure::Retryable(error.to_string())
    }
}

fn bad_request_message(response: &ApiResponse) -> String {
    if let Ok(value) = response.json::<Value>() {
        if let Some(description) = value.get("error_description") {
            match description {
                Value::String(s) => return s.clone(),
                Value::Array(items) => {
                    let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                    if !parts.is_empty() {
                        return parts.join(", ");
                    }
                }
                _ => {}
            }
        }
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return error.to_string();
        }
    }
    "Pas d'indication spécifique indiquée par l'API.".to_string()
}
