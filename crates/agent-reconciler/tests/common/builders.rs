//! Builder for relation snapshots.

#![allow(dead_code)]

use serde_json::{json, Value};

use agent_reconciler::config::Endpoint;
use agent_reconciler::host::{RelationCounts, RelationSnapshot};
use agent_reconciler::rules::Dashboard;
use agent_reconciler::topology::PrincipalUnit;

pub struct SnapshotBuilder {
    snapshot: RelationSnapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            snapshot: RelationSnapshot::default(),
        }
    }

    pub fn remote_write(mut self, url: &str) -> Self {
        self.snapshot
            .remote_write_endpoints
            .push(Endpoint::new(url));
        self.snapshot.relation_counts.remote_write += 1;
        self
    }

    pub fn loki(mut self, url: &str) -> Self {
        self.snapshot.loki_endpoints.push(Endpoint::new(url));
        self
    }

    pub fn scrape_job(mut self, job_name: &str, target: &str) -> Self {
        self.snapshot.metrics_jobs.push(json!({
            "job_name": job_name,
            "static_configs": [{"targets": [target]}],
        }));
        self.snapshot.relation_counts.scrape_targets += 1;
        self
    }

    pub fn metrics_rule(mut self, identifier: &str, content: Value) -> Self {
        self.snapshot
            .metrics_rules
            .insert(identifier.to_string(), content);
        self
    }

    pub fn logs_rule(mut self, identifier: &str, content: Value) -> Self {
        self.snapshot
            .logs_rules
            .insert(identifier.to_string(), content);
        self
    }

    pub fn dashboard(mut self, charm: &str, relation_id: &str, content: Value) -> Self {
        self.snapshot.dashboards.push(Dashboard {
            charm: Some(charm.to_string()),
            relation_id: Some(relation_id.to_string()),
            content,
        });
        self
    }

    pub fn counts(mut self, scrape_targets: usize, remote_write: usize) -> Self {
        self.snapshot.relation_counts = RelationCounts {
            scrape_targets,
            remote_write,
        };
        self
    }

    pub fn principal(mut self, application: &str, unit: &str) -> Self {
        self.snapshot.principal = Some(PrincipalUnit {
            application: application.to_string(),
            unit: unit.to_string(),
        });
        self
    }

    pub fn build(self) -> RelationSnapshot {
        self.snapshot
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A minimal Prometheus rule group.
pub fn alert_group(name: &str) -> Value {
    json!({
        "groups": [{
            "name": name,
            "rules": [{"alert": "Down", "expr": "up == 0"}],
        }]
    })
}
