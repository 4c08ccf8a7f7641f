//! Host-installed variant: the agent runs as a snap next to a principal
//! workload and this process has direct filesystem access.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::sync::broadcast;

use super::{AgentHost, RelationCounts, RelationSnapshot};
use crate::config::schema::RelabelConfig;
use crate::config::Endpoint;
use crate::error::{HostError, TopologyError};
use crate::rules::{RuleGroup, RuleKind};
use crate::topology::Topology;

pub const SNAP_NAME: &str = "grafana-agent";
pub const SNAP_SERVICE: &str = "grafana-agent.grafana-agent";
pub const AGENT_BINARY: &str = "/bin/agent";

pub struct MachineHost {
    topology: Topology,
    snapshot: RelationSnapshot,
    snap_name: String,
    service: String,
    agent_binary: PathBuf,
    rule_updates: broadcast::Sender<RuleKind>,
}

impl MachineHost {
    /// `identity` is the agent's own topology; the principal, if any, comes
    /// from the snapshot.
    pub fn new(identity: Topology, snapshot: RelationSnapshot) -> Result<Self, TopologyError> {
        let topology = match &snapshot.principal {
            Some(principal) => identity.with_principal(principal.clone())?,
            None => identity,
        };
        let (rule_updates, _) = broadcast::channel(16);

        Ok(Self {
            topology,
            snapshot,
            snap_name: SNAP_NAME.to_string(),
            service: SNAP_SERVICE.to_string(),
            agent_binary: PathBuf::from(AGENT_BINARY),
            rule_updates,
        })
    }

    pub fn with_agent_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.agent_binary = path.into();
        self
    }

    fn restart_command(&self) -> (&'static str, [&str; 3]) {
        ("sudo", ["snap", "restart", self.service.as_str()])
    }

    /// Receives a [`RuleKind`] every time a rule directory is rebuilt.
    pub fn subscribe_rule_updates(&self) -> broadcast::Receiver<RuleKind> {
        self.rule_updates.subscribe()
    }

    async fn is_installed(&self) -> bool {
        match Command::new("snap")
            .args(["list", self.snap_name.as_str()])
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(e) => {
                log::debug!("Failed to query snap list: {}", e);
                false
            }
        }
    }

    /// Relabeling that stamps the principal's topology onto host metrics.
    fn principal_relabels(&self) -> Vec<RelabelConfig> {
        let mut relabels = vec![RelabelConfig::rewrite(
            "instance",
            &self.topology.instance_name(),
        )];
        relabels.extend(
            self.topology
                .labels()
                .into_iter()
                .map(|(label, value)| RelabelConfig::attach(label, value)),
        );
        relabels
    }
}

async fn run(program: &Path, args: &[&str]) -> Result<String, HostError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| HostError::Service(format!("failed to run {}: {}", program.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HostError::Service(format!(
            "{} {} exited with {}: {}",
            program.display(),
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl AgentHost for MachineHost {
    async fn is_ready(&self) -> bool {
        self.topology.is_subordinate() && self.is_installed().await
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, HostError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| HostError::from_io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), HostError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config");
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| HostError::from_io(&tmp_path, e))?;
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(HostError::from_io(path, e));
        }
        Ok(())
    }

    /// Runs `sudo snap restart <service>`; the calling user needs
    /// passwordless sudo for `snap`.
    async fn restart(&self) -> Result<(), HostError> {
        let (program, args) = self.restart_command();
        run(Path::new(program), &args).await?;
        log::info!("Restarted {}", self.service);
        Ok(())
    }

    async fn agent_version_output(&self) -> Result<String, HostError> {
        run(&self.agent_binary, &["-version"]).await
    }

    async fn rules_updated(&self, kind: RuleKind) -> Result<(), HostError> {
        if let Err(e) = self.rule_updates.send(kind) {
            log::debug!("No rule update listeners active: {}", e);
        }
        Ok(())
    }

    fn topology(&self) -> Topology {
        self.topology.clone()
    }

    fn remote_write_endpoints(&self) -> Vec<Endpoint> {
        self.snapshot.remote_write_endpoints.clone()
    }

    fn loki_endpoints(&self) -> Vec<Endpoint> {
        self.snapshot.loki_endpoints.clone()
    }

    fn metrics_jobs(&self) -> Vec<Value> {
        self.snapshot.metrics_jobs.clone()
    }

    fn metrics_rules(&self) -> Vec<RuleGroup> {
        self.snapshot.metrics_rule_groups()
    }

    fn logs_rules(&self) -> Vec<RuleGroup> {
        self.snapshot.logs_rule_groups()
    }

    fn supports_dashboards(&self) -> bool {
        true
    }

    fn dashboards(&self) -> Vec<RuleGroup> {
        self.snapshot.dashboard_groups()
    }

    fn additional_integrations(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([(
            "node_exporter".to_string(),
            json!({
                "enabled": true,
                "relabel_configs": self.principal_relabels(),
            }),
        )])
    }

    fn relation_counts(&self) -> RelationCounts {
        self.snapshot.relation_counts
    }
}
