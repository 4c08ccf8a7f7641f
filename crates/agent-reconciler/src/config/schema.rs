use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub insecure_skip_verify: bool,
}

/// A remote-write or log-push target.
///
/// Only `url` and `tls_config` are interpreted; auth, headers and any other
/// fields supplied by the relation are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TlsConfig>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tls_config: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelabelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_labels: Option<Vec<String>>,
    pub target_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    pub replacement: String,
}

impl RelabelConfig {
    /// Overwrites an existing label regardless of its current value.
    pub fn rewrite(target_label: &str, replacement: &str) -> Self {
        Self {
            source_labels: None,
            target_label: target_label.to_string(),
            regex: Some("(.*)".to_string()),
            replacement: replacement.to_string(),
        }
    }

    /// Adds a new label by replacing off the always-present `__address__`.
    pub fn attach(target_label: &str, replacement: &str) -> Self {
        Self {
            source_labels: Some(vec!["__address__".to_string()]),
            target_label: target_label.to_string(),
            regex: None,
            replacement: replacement.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIntegration {
    pub enabled: bool,
    pub relabel_configs: Vec<RelabelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsInstance {
    pub name: String,
    pub scrape_configs: Vec<Value>,
    pub remote_write: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub wal_directory: String,
    pub configs: Vec<MetricsInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Positions {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushServer {
    pub http_listen_port: u16,
    pub grpc_listen_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushApi {
    pub server: PushServer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogScrapeConfig {
    pub job_name: String,
    pub loki_push_api: PushApi,
}

/// The embedded log receiver that forwards pushed logs to every client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsInstance {
    pub name: String,
    pub clients: Vec<Endpoint>,
    pub positions: Positions,
    pub scrape_configs: Vec<LogScrapeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsConfig {
    pub configs: Vec<Value>,
}

/// The agent configuration document, rebuilt from scratch on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredConfig {
    pub server: ServerConfig,
    pub integrations: BTreeMap<String, Value>,
    pub metrics: MetricsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogsConfig>,
}

impl DesiredConfig {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Structural comparison against a persisted document.
    ///
    /// Key order and formatting never matter. An absent, null or empty
    /// `logs` section are all the same state.
    pub fn matches(&self, persisted: &Value) -> bool {
        match serde_json::to_value(self) {
            Ok(desired) => normalize(desired) == normalize(persisted.clone()),
            Err(e) => {
                log::warn!("Failed to convert desired config for comparison: {}", e);
                false
            }
        }
    }
}

/// Parses a persisted config file. Unreadable content counts as "no config".
pub fn parse_persisted(bytes: &[u8]) -> Option<Value> {
    match serde_yaml::from_slice::<Value>(bytes) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Ignoring unparsable persisted config: {}", e);
            None
        }
    }
}

fn normalize(mut document: Value) -> Value {
    if let Value::Object(map) = &mut document {
        let empty_logs = match map.get("logs") {
            Some(Value::Null) => true,
            Some(Value::Object(logs)) => logs
                .iter()
                .all(|(key, value)| key == "configs" && is_empty_list(value)),
            _ => false,
        };
        if empty_logs {
            map.remove("logs");
        }
    }
    document
}

fn is_empty_list(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
