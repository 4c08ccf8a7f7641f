//! Builds the desired agent configuration from externally discovered inputs.
//!
//! Pure: no I/O, no state. Every call produces a complete document.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::schema::{
    AgentIntegration, DesiredConfig, Endpoint, LogScrapeConfig, LogsConfig, LogsInstance,
    MetricsConfig, MetricsInstance, Positions, PushApi, PushServer, RelabelConfig, ServerConfig,
    TlsConfig,
};
use crate::topology::Topology;

pub const WAL_DIRECTORY: &str = "/tmp/agent/data";
pub const POSITIONS_FILE: &str = "/run/promtail-positions.yaml";
pub const LOG_HTTP_LISTEN_PORT: u16 = 3500;
pub const LOG_GRPC_LISTEN_PORT: u16 = 3600;
pub const METRICS_INSTANCE_NAME: &str = "agent_scraper";
pub const LOGS_INSTANCE_NAME: &str = "push_api_server";
pub const LOG_PUSH_JOB_NAME: &str = "loki";

/// Everything the synthesizer needs for one pass.
#[derive(Debug, Clone)]
pub struct SynthesisInput<'a> {
    pub topology: &'a Topology,
    pub log_level: &'a str,
    pub remote_write_endpoints: &'a [Endpoint],
    pub log_endpoints: &'a [Endpoint],
    pub scrape_jobs: &'a [Value],
    pub extra_integrations: &'a BTreeMap<String, Value>,
    pub extra_log_configs: &'a [Value],
    pub tls_insecure_skip_verify: bool,
}

pub fn synthesize(input: &SynthesisInput<'_>) -> DesiredConfig {
    let remote_write = with_tls(input.remote_write_endpoints, input.tls_insecure_skip_verify);
    let log_clients = with_tls(input.log_endpoints, input.tls_insecure_skip_verify);

    DesiredConfig {
        server: ServerConfig {
            log_level: input.log_level.to_string(),
        },
        integrations: integrations(input.topology, &remote_write, input.extra_integrations),
        metrics: MetricsConfig {
            wal_directory: WAL_DIRECTORY.to_string(),
            configs: vec![MetricsInstance {
                name: METRICS_INSTANCE_NAME.to_string(),
                scrape_configs: input.scrape_jobs.to_vec(),
                remote_write,
            }],
        },
        logs: logs(log_clients, input.extra_log_configs),
    }
}

/// Stamps the TLS verification flag onto every endpoint, replacing whatever
/// the relation supplied.
pub fn with_tls(endpoints: &[Endpoint], insecure_skip_verify: bool) -> Vec<Endpoint> {
    endpoints
        .iter()
        .cloned()
        .map(|mut endpoint| {
            endpoint.tls_config = Some(TlsConfig {
                insecure_skip_verify,
            });
            endpoint
        })
        .collect()
}

/// Relabeling chain that makes the agent's own metrics look like any other
/// scraped workload.
pub fn self_monitoring_relabels(topology: &Topology) -> Vec<RelabelConfig> {
    let mut relabels = vec![
        RelabelConfig::rewrite("job", &topology.self_monitoring_job_name()),
        RelabelConfig::rewrite("instance", &topology.instance_name()),
    ];
    relabels.extend(
        topology
            .relabel_targets()
            .into_iter()
            .map(|(label, value)| RelabelConfig::attach(label, value)),
    );
    relabels
}

fn integrations(
    topology: &Topology,
    remote_write: &[Endpoint],
    extra: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let agent = AgentIntegration {
        enabled: true,
        relabel_configs: self_monitoring_relabels(topology),
    };

    let mut integrations = BTreeMap::new();
    integrations.insert("agent".to_string(), json!(agent));
    integrations.insert("prometheus_remote_write".to_string(), json!(remote_write));
    // Extensions win on key conflicts.
    integrations.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    integrations
}

fn logs(clients: Vec<Endpoint>, extra: &[Value]) -> Option<LogsConfig> {
    let mut configs = Vec::with_capacity(extra.len() + 1);

    if !clients.is_empty() {
        let receiver = LogsInstance {
            name: LOGS_INSTANCE_NAME.to_string(),
            clients,
            positions: Positions {
                filename: POSITIONS_FILE.to_string(),
            },
            scrape_configs: vec![LogScrapeConfig {
                job_name: LOG_PUSH_JOB_NAME.to_string(),
                loki_push_api: PushApi {
                    server: PushServer {
                        http_listen_port: LOG_HTTP_LISTEN_PORT,
                        grpc_listen_port: LOG_GRPC_LISTEN_PORT,
                    },
                },
            }],
        };
        configs.push(json!(receiver));
    }

    configs.extend(extra.iter().cloned());

    if configs.is_empty() {
        None
    } else {
        Some(LogsConfig { configs })
    }
}
