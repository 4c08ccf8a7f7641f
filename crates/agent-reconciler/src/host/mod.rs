//! The deployment-variant interface the reconciler is generic over.
//!
//! Everything that touches the outside world (files on the agent's host,
//! service control, relation data) sits behind [`AgentHost`]. Providers
//! return concrete values; any unwrapping of lazily-computed relation data
//! happens inside the implementation.

pub mod machine;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Endpoint;
use crate::error::HostError;
use crate::rules::{Dashboard, RuleGroup, RuleKind};
use crate::topology::{PrincipalUnit, Topology};

pub use machine::MachineHost;

/// How many units are on the other side of the relations status cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationCounts {
    pub scrape_targets: usize,
    pub remote_write: usize,
}

/// Relation data as gathered by the orchestration layer for one event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationSnapshot {
    #[serde(default)]
    pub remote_write_endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub loki_endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub metrics_jobs: Vec<Value>,
    #[serde(default)]
    pub metrics_rules: BTreeMap<String, Value>,
    #[serde(default)]
    pub logs_rules: BTreeMap<String, Value>,
    #[serde(default)]
    pub dashboards: Vec<Dashboard>,
    #[serde(default)]
    pub relation_counts: RelationCounts,
    #[serde(default)]
    pub principal: Option<PrincipalUnit>,
}

impl RelationSnapshot {
    pub fn metrics_rule_groups(&self) -> Vec<RuleGroup> {
        to_groups(&self.metrics_rules)
    }

    pub fn logs_rule_groups(&self) -> Vec<RuleGroup> {
        to_groups(&self.logs_rules)
    }

    pub fn dashboard_groups(&self) -> Vec<RuleGroup> {
        self.dashboards.iter().map(RuleGroup::from).collect()
    }
}

fn to_groups(rules: &BTreeMap<String, Value>) -> Vec<RuleGroup> {
    rules
        .iter()
        .map(|(id, content)| RuleGroup::new(id.clone(), content.clone()))
        .collect()
}

#[async_trait]
pub trait AgentHost: Send + Sync {
    /// Whether the agent can be configured at all right now.
    async fn is_ready(&self) -> bool;

    /// Reads a file on the agent's host. A missing file is `HostError::NotFound`.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, HostError>;

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), HostError>;

    /// Restarts the agent so it picks up a new configuration.
    async fn restart(&self) -> Result<(), HostError>;

    /// Raw output of `agent -version`.
    async fn agent_version_output(&self) -> Result<String, HostError>;

    /// Called after a rule or dashboard directory was rebuilt, so the new
    /// contents can be forwarded to whoever consumes them.
    async fn rules_updated(&self, kind: RuleKind) -> Result<(), HostError>;

    fn topology(&self) -> Topology;

    fn remote_write_endpoints(&self) -> Vec<Endpoint>;

    fn loki_endpoints(&self) -> Vec<Endpoint>;

    fn metrics_jobs(&self) -> Vec<Value>;

    fn metrics_rules(&self) -> Vec<RuleGroup>;

    fn logs_rules(&self) -> Vec<RuleGroup>;

    /// Whether dashboard forwarding is wired up for this variant.
    fn supports_dashboards(&self) -> bool {
        false
    }

    fn dashboards(&self) -> Vec<RuleGroup> {
        Vec::new()
    }

    fn additional_integrations(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    fn additional_log_configs(&self) -> Vec<Value> {
        Vec::new()
    }

    fn relation_counts(&self) -> RelationCounts {
        RelationCounts::default()
    }
}
