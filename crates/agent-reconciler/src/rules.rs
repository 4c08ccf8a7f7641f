//! Alert rule and dashboard directory synchronization.
//!
//! A destination directory is always rebuilt from scratch: the template
//! shipped with the software is copied in, then one `juju_<identifier>.rules`
//! file is written per group. Nothing generated by a previous sync survives.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::storage;

pub const LOKI_RULES_SRC_PATH: &str = "src/loki_alert_rules";
pub const LOKI_RULES_DEST_PATH: &str = "loki_alert_rules";
pub const METRICS_RULES_SRC_PATH: &str = "src/prometheus_alert_rules";
pub const METRICS_RULES_DEST_PATH: &str = "prometheus_alert_rules";
pub const DASHBOARDS_SRC_PATH: &str = "src/grafana_dashboards";
pub const DASHBOARDS_DEST_PATH: &str = "grafana_dashboards";

/// A named bundle of alert rules (or a dashboard) from one upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub identifier: String,
    pub content: Value,
}

impl RuleGroup {
    pub fn new(identifier: impl Into<String>, content: Value) -> Self {
        Self {
            identifier: identifier.into(),
            content,
        }
    }

    /// File name this group is written to.
    pub fn file_name(&self) -> String {
        format!("juju_{}.rules", escape_identifier(&self.identifier))
    }
}

/// A dashboard as forwarded by a related consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub charm: Option<String>,
    #[serde(default)]
    pub relation_id: Option<String>,
    pub content: Value,
}

impl From<&Dashboard> for RuleGroup {
    fn from(dashboard: &Dashboard) -> Self {
        let identifier = format!(
            "{}-{}",
            dashboard.charm.as_deref().unwrap_or("charm-name"),
            dashboard.relation_id.as_deref().unwrap_or("rel_id"),
        );
        RuleGroup::new(identifier, dashboard.content.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    MetricsAlerts,
    LogAlerts,
    Dashboards,
}

impl RuleKind {
    pub const ALL: [RuleKind; 3] = [
        RuleKind::MetricsAlerts,
        RuleKind::LogAlerts,
        RuleKind::Dashboards,
    ];

    fn paths(self) -> (&'static str, &'static str) {
        match self {
            RuleKind::MetricsAlerts => (METRICS_RULES_SRC_PATH, METRICS_RULES_DEST_PATH),
            RuleKind::LogAlerts => (LOKI_RULES_SRC_PATH, LOKI_RULES_DEST_PATH),
            RuleKind::Dashboards => (DASHBOARDS_SRC_PATH, DASHBOARDS_DEST_PATH),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::MetricsAlerts => "metrics alert rules",
            RuleKind::LogAlerts => "log alert rules",
            RuleKind::Dashboards => "dashboards",
        };
        f.write_str(name)
    }
}

/// Template directory and the live directory the agent reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesMapping {
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl RulesMapping {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }

    /// The standard mapping for `kind` under the charm directory.
    pub fn for_kind(charm_dir: &Path, kind: RuleKind) -> Self {
        let (source, dest) = kind.paths();
        Self::new(charm_dir.join(source), charm_dir.join(dest))
    }

    /// Copies the template into place if the destination does not exist yet.
    ///
    /// Returns true when the destination was created.
    pub fn ensure_seeded(&self) -> Result<bool, SyncError> {
        if self.dest.is_dir() {
            return Ok(false);
        }
        storage::copy_tree(&self.source, &self.dest)?;
        log::debug!("seeded {} from template", self.dest.display());
        Ok(true)
    }
}

/// Replaces characters that are unsafe in a file name.
pub fn escape_identifier(identifier: &str) -> String {
    let escaped: String = identifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Leading dots would produce hidden files, or "." / "..".
    let trimmed = escaped.trim_start_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else if trimmed.len() == escaped.len() {
        escaped
    } else {
        format!("_{}", trimmed)
    }
}

/// Rebuilds `mapping.dest` from the template plus one file per group.
///
/// Groups whose identifiers escape to the same file name overwrite each
/// other; the last one wins. Triggering a reload is left to the caller.
pub fn sync(mapping: &RulesMapping, groups: &[RuleGroup]) -> Result<Vec<PathBuf>, SyncError> {
    let _span = tracing::info_span!(
        "rules.sync",
        dest = %crate::logging::redact_path(&mapping.dest),
        groups = groups.len()
    )
    .entered();

    storage::remove_dir(&mapping.dest)?;
    storage::copy_tree(&mapping.source, &mapping.dest)?;

    let mut written = Vec::with_capacity(groups.len());
    for group in groups {
        let rendered =
            serde_yaml::to_string(&group.content).map_err(|e| SyncError::Serialize {
                identifier: group.identifier.clone(),
                message: e.to_string(),
            })?;

        let path = mapping.dest.join(group.file_name());
        storage::write_atomic(&path, rendered.as_bytes()).map_err(|e| SyncError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        log::debug!("updated rules file {}", path.display());
        written.push(path);
    }

    Ok(written)
}
