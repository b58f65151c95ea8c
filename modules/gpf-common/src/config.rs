//! Process-wide read-only configuration and route table.
//!
//! Three layers, last one wins: the embedded defaults, an optional user INI
//! file, then environment variables (`GPF_<SECTION>__<KEY>`). The `[routing]`
//! section maps route names to JSON entries `{url, method, timeout?}`;
//! relative urls are resolved under `{root_url}/api/v1/datastores/{datastore}`
//! at load time so the requester only ever sees full templates.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

use crate::error::{GpfError, Result};

/// Defaults shipped with the SDK.
const DEFAULT_INI: &str = include_str!("default.ini");

/// Timeout applied when neither the route nor the caller says otherwise.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Per-route timeout declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeoutSpec {
    /// No `timeout` key: the requester default applies.
    Default,
    /// Literal `null`: the request runs without a timeout.
    Disabled,
    /// Fixed number of seconds.
    Fixed(u64),
    /// `[[size_threshold_bytes, timeout_or_null], …]`, sorted ascending by
    /// threshold. The last pair whose threshold is ≤ the file size wins;
    /// below the smallest threshold the requester default applies.
    BySize(Vec<SizeTimeout>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizeTimeout {
    pub threshold: u64,
    pub timeout: Option<u64>,
}

/// One entry of the route table.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    /// Full URL template, placeholders in `{braces}` (always `{datastore}`
    /// for scoped routes, plus entity id slots).
    pub url: String,
    pub method: String,
    pub timeout: TimeoutSpec,
}

impl Route {
    /// Timeout for a plain (non-upload) request on this route.
    pub fn request_timeout(&self) -> Option<u64> {
        match &self.timeout {
            TimeoutSpec::Default | TimeoutSpec::BySize(_) => Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            TimeoutSpec::Disabled => None,
            TimeoutSpec::Fixed(secs) => Some(*secs),
        }
    }

    /// Timeout for uploading a file of `size` bytes on this route.
    pub fn upload_timeout(&self, size: u64) -> Option<u64> {
        match &self.timeout {
            TimeoutSpec::Default => Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            TimeoutSpec::Disabled => None,
            TimeoutSpec::Fixed(secs) => Some(*secs),
            TimeoutSpec::BySize(pairs) => {
                let mut selected = Some(DEFAULT_REQUEST_TIMEOUT_SECS);
                for pair in pairs {
                    if pair.threshold <= size {
                        selected = pair.timeout;
                    } else {
                        break;
                    }
                }
                selected
            }
        }
    }
}

/// Read-only configuration, loaded once at program start and shared via `Arc`.
#[derive(Debug)]
pub struct Config {
    settings: config::Config,
    routes: HashMap<String, Route>,
}

impl Config {
    /// Load the embedded defaults, an optional user file, then `GPF_` env vars.
    pub fn load(user_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_INI, config::FileFormat::Ini));
        if let Some(path) = user_file {
            builder = builder
                .add_source(config::File::from(path.to_path_buf()).format(config::FileFormat::Ini));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("GPF")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| GpfError::Sdk(format!("Chargement de la configuration impossible : {e}")))?;
        Self::from_settings(settings)
    }

    /// Load the embedded defaults overlaid with an in-memory INI fragment.
    /// Intended for tests; no environment layer.
    pub fn from_ini_str(overlay: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_INI, config::FileFormat::Ini))
            .add_source(config::File::from_str(overlay, config::FileFormat::Ini))
            .build()
            .map_err(|e| GpfError::Sdk(format!("Chargement de la configuration impossible : {e}")))?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self> {
        let root_url = settings
            .get_string("store_api.root_url")
            .map_err(|_| missing("store_api", "root_url"))?;
        let table = settings
            .get_table("routing")
            .map_err(|_| GpfError::sdk("La section [routing] est absente de la configuration"))?;

        let mut routes = HashMap::with_capacity(table.len());
        for (name, value) in table {
            let raw = value
                .into_string()
                .map_err(|e| GpfError::Sdk(format!("Route '{name}' illisible : {e}")))?;
            let route = parse_route(&name, &raw, &root_url)?;
            routes.insert(name, route);
        }
        Ok(Self { settings, routes })
    }

    pub fn get_str(&self, section: &str, key: &str) -> Result<String> {
        self.settings
            .get_string(&format!("{section}.{key}"))
            .map_err(|_| missing(section, key))
    }

    pub fn get_int(&self, section: &str, key: &str) -> Result<i64> {
        self.settings
            .get_int(&format!("{section}.{key}"))
            .map_err(|_| missing(section, key))
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool> {
        self.settings
            .get_bool(&format!("{section}.{key}"))
            .map_err(|_| missing(section, key))
    }

    /// Comma-separated list accessor (empty value → empty list).
    pub fn get_str_list(&self, section: &str, key: &str) -> Result<Vec<String>> {
        Ok(self
            .get_str(section, key)?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }

    pub fn route(&self, name: &str) -> Result<&Route> {
        self.routes.get(name).ok_or_else(|| GpfError::RouteNotFound {
            route_name: name.to_string(),
        })
    }

    /// Datastore used when a call does not name one. Empty means "not set".
    pub fn root_datastore(&self) -> Option<String> {
        match self.settings.get_string("store_api.root_datastore") {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }
}

fn missing(section: &str, key: &str) -> GpfError {
    GpfError::Sdk(format!(
        "Paramètre de configuration '{section}.{key}' manquant ou invalide"
    ))
}

fn parse_route(name: &str, raw: &str, root_url: &str) -> Result<Route> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| GpfError::Sdk(format!("Route '{name}' non parsable : {e}")))?;
    let url = value
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| GpfError::Sdk(format!("Route '{name}' sans clé 'url'")))?;
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("GET")
        .to_uppercase();
    let timeout = parse_timeout(name, value.get("timeout"))?;

    let full_url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/api/v1/datastores/{{datastore}}{}",
            root_url.trim_end_matches('/'),
            url
        )
    };

    Ok(Route {
        name: name.to_string(),
        url: full_url,
        method,
        timeout,
    })
}

fn parse_timeout(name: &str, value: Option<&Value>) -> Result<TimeoutSpec> {
    let invalid = || GpfError::Sdk(format!("Route '{name}' : clé 'timeout' invalide"));
    match value {
        None => Ok(TimeoutSpec::Default),
        Some(Value::Null) => Ok(TimeoutSpec::Disabled),
        Some(Value::Number(n)) => Ok(TimeoutSpec::Fixed(n.as_u64().ok_or_else(invalid)?)),
        Some(Value::Array(pairs)) => {
            let mut parsed = Vec::with_capacity(pairs.len());
            for pair in pairs {
                let items = pair.as_array().ok_or_else(invalid)?;
                if items.len() != 2 {
                    return Err(invalid());
                }
                let threshold = items[0].as_u64().ok_or_else(invalid)?;
                let timeout = match &items[1] {
                    Value::Null => None,
                    Value::Number(n) => Some(n.as_u64().ok_or_else(invalid)?),
                    _ => return Err(invalid()),
                };
                parsed.push(SizeTimeout { threshold, timeout });
            }
            parsed.sort_by_key(|p| p.threshold);
            Ok(TimeoutSpec::BySize(parsed))
        }
        Some(_) => Err(invalid()),
    }
}
