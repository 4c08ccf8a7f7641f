//! Reconciler: synthesize → compare → write → restart/reload → state.
//!
//! One pass runs to completion before the next starts. Every I/O failure is
//! caught here and turned into a [`UnitState`]; nothing propagates to the
//! event handler that triggered the pass.

use std::fmt;
use std::path::Path;

use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::schema::parse_persisted;
use crate::config::settings::{ApplyStrategy, Settings};
use crate::config::synthesizer::{synthesize, SynthesisInput};
use crate::config::DesiredConfig;
use crate::error::{HostError, ReconcileError, ReloadError, SyncError};
use crate::host::AgentHost;
use crate::reload::ReloadClient;
use crate::rules::{self, RuleKind, RulesMapping};
use crate::version::parse_agent_version;

pub const NOT_READY_MESSAGE: &str = "waiting for the agent to start";
pub const NO_REMOTE_WRITE_MESSAGE: &str = "no related Prometheus remote-write";

/// Outcome of one configuration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    /// The agent is not reachable yet; nothing was done.
    NotReady,
    /// Desired and persisted config are equal; nothing was written.
    UpToDate,
    /// A new config was written and picked up by the agent.
    Applied,
    /// Restart/reload failed in a way an operator has to look at.
    Blocked(String),
    /// A transient transport failure; the unit is still serviceable.
    Degraded(String),
}

impl UnitState {
    /// Both `UpToDate` and `Applied` mean the agent serves the desired config.
    pub fn is_serving(&self) -> bool {
        matches!(self, UnitState::UpToDate | UnitState::Applied)
    }

    pub fn status(&self) -> StatusLabel {
        match self {
            UnitState::NotReady => StatusLabel::Waiting(NOT_READY_MESSAGE.to_string()),
            UnitState::UpToDate | UnitState::Applied => StatusLabel::Active,
            UnitState::Blocked(message) => StatusLabel::Blocked(message.clone()),
            UnitState::Degraded(message) => StatusLabel::Waiting(message.clone()),
        }
    }
}

/// The externally visible status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLabel {
    Active,
    Waiting(String),
    Blocked(String),
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLabel::Active => f.write_str("active"),
            StatusLabel::Waiting(message) => write!(f, "waiting: {}", message),
            StatusLabel::Blocked(message) => write!(f, "blocked: {}", message),
        }
    }
}

/// External events that start a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    UpgradeCharm,
    ConfigChanged,
    LogEndpointJoined,
    LogEndpointDeparted,
    ScrapeTargetsChanged,
    RemoteWriteChanged,
    DashboardStatusChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSyncOutcome {
    Synced { files: usize },
    /// The host does not forward this kind yet.
    NotSupported,
}

/// Everything one trigger did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub trigger: Trigger,
    /// `None` when the trigger does not touch the agent config.
    pub config: Option<UnitState>,
    pub rule_errors: Vec<(RuleKind, String)>,
    pub status: StatusLabel,
}

enum ApplyFailure {
    Reload(ReloadError),
    Host(HostError),
}

pub struct Reconciler<H: AgentHost> {
    host: H,
    settings: Settings,
    reload_client: ReloadClient,
    /// Serializes passes for this agent.
    pass_lock: Mutex<()>,
}

impl<H: AgentHost> Reconciler<H> {
    /// Creates a reconciler and seeds any missing rule directories.
    pub fn new(host: H, settings: Settings) -> Result<Self, ReloadError> {
        let reload_client = ReloadClient::from_settings(&settings.reload)?;
        Ok(Self::with_reload_client(host, settings, reload_client))
    }

    pub fn with_reload_client(host: H, settings: Settings, reload_client: ReloadClient) -> Self {
        let reconciler = Self {
            host,
            settings,
            reload_client,
            pass_lock: Mutex::new(()),
        };
        reconciler.seed_rule_directories();
        reconciler
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mapping(&self, kind: RuleKind) -> RulesMapping {
        RulesMapping::for_kind(&self.settings.charm_dir, kind)
    }

    fn seed_rule_directories(&self) {
        for kind in RuleKind::ALL {
            if let Err(e) = self.mapping(kind).ensure_seeded() {
                // The next sync of this kind reports the same failure.
                log::warn!("Failed to seed {} directory: {}", kind, e);
            }
        }
    }

    /// Builds the desired config from the host's current inputs.
    pub fn desired_config(&self) -> DesiredConfig {
        let topology = self.host.topology();
        let remote_write = self.host.remote_write_endpoints();
        let loki = self.host.loki_endpoints();
        let jobs = self.host.metrics_jobs();
        let extra_integrations = self.host.additional_integrations();
        let extra_log_configs = self.host.additional_log_configs();

        synthesize(&SynthesisInput {
            topology: &topology,
            log_level: &self.settings.log_level,
            remote_write_endpoints: &remote_write,
            log_endpoints: &loki,
            scrape_jobs: &jobs,
            extra_integrations: &extra_integrations,
            extra_log_configs: &extra_log_configs,
            tls_insecure_skip_verify: self.settings.tls_insecure_skip_verify,
        })
    }

    /// Runs one configuration pass.
    pub async fn reconcile_config(&self) -> UnitState {
        let _guard = self.pass_lock.lock().await;
        self.config_pass().await
    }

    /// Rebuilds the rule or dashboard directory for `kind` and notifies the host.
    ///
    /// Runs regardless of whether the agent config changed.
    pub async fn update_rules(&self, kind: RuleKind) -> Result<RuleSyncOutcome, ReconcileError> {
        let _guard = self.pass_lock.lock().await;
        self.rules_pass(kind).await
    }

    /// Dispatches a trigger to the passes it requires.
    pub async fn handle(&self, trigger: Trigger) -> PassReport {
        let _guard = self.pass_lock.lock().await;
        log::debug!("Handling {:?}", trigger);

        let mut rule_errors = Vec::new();
        let mut config = None;

        match trigger {
            Trigger::UpgradeCharm => {
                self.collect_rules(RuleKind::MetricsAlerts, &mut rule_errors)
                    .await;
                self.collect_rules(RuleKind::LogAlerts, &mut rule_errors)
                    .await;
                config = Some(self.config_pass().await);
            }
            Trigger::ConfigChanged | Trigger::LogEndpointJoined | Trigger::LogEndpointDeparted => {
                config = Some(self.config_pass().await);
            }
            Trigger::ScrapeTargetsChanged | Trigger::RemoteWriteChanged => {
                config = Some(self.config_pass().await);
                self.collect_rules(RuleKind::MetricsAlerts, &mut rule_errors)
                    .await;
            }
            Trigger::DashboardStatusChanged => {
                self.collect_rules(RuleKind::Dashboards, &mut rule_errors)
                    .await;
            }
        }

        let status = match (&config, rule_errors.first()) {
            (Some(state), _) if !state.is_serving() => state.status(),
            (_, Some((kind, message))) => {
                StatusLabel::Blocked(format!("failed to update {}: {}", kind, message))
            }
            _ => self.status().await,
        };

        PassReport {
            trigger,
            config,
            rule_errors,
            status,
        }
    }

    /// Status derived from readiness and relation health.
    pub async fn status(&self) -> StatusLabel {
        if !self.host.is_ready().await {
            return StatusLabel::Waiting(NOT_READY_MESSAGE.to_string());
        }

        let counts = self.host.relation_counts();
        if counts.scrape_targets > 0 && counts.remote_write == 0 {
            return StatusLabel::Waiting(NO_REMOTE_WRITE_MESSAGE.to_string());
        }

        StatusLabel::Active
    }

    /// The running agent's version, if it can be determined.
    pub async fn agent_version(&self) -> Option<String> {
        if !self.host.is_ready().await {
            return None;
        }
        match self.host.agent_version_output().await {
            Ok(output) => parse_agent_version(&output),
            Err(e) => {
                log::warn!("Failed to query agent version: {}", e);
                None
            }
        }
    }

    async fn collect_rules(&self, kind: RuleKind, errors: &mut Vec<(RuleKind, String)>) {
        if let Err(e) = self.rules_pass(kind).await {
            log::error!("Failed to update {}: {}", kind, e);
            errors.push((kind, e.to_string()));
        }
    }

    async fn rules_pass(&self, kind: RuleKind) -> Result<RuleSyncOutcome, ReconcileError> {
        let span = tracing::info_span!("reconcile.rules", kind = %kind);
        self.sync_kind(kind).instrument(span).await
    }

    async fn sync_kind(&self, kind: RuleKind) -> Result<RuleSyncOutcome, ReconcileError> {
        let groups = match kind {
            RuleKind::MetricsAlerts => self.host.metrics_rules(),
            RuleKind::LogAlerts => self.host.logs_rules(),
            RuleKind::Dashboards => {
                if !self.host.supports_dashboards() {
                    log::debug!("Dashboard forwarding is not enabled for this deployment");
                    return Ok(RuleSyncOutcome::NotSupported);
                }
                self.host.dashboards()
            }
        };

        let mapping = self.mapping(kind);
        let span = tracing::Span::current();
        let written = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            rules::sync(&mapping, &groups)
        })
        .await
        .map_err(|e| SyncError::Task(e.to_string()))??;
        self.host.rules_updated(kind).await?;
        log::info!("Updated {} ({} generated files)", kind, written.len());

        Ok(RuleSyncOutcome::Synced {
            files: written.len(),
        })
    }

    async fn config_pass(&self) -> UnitState {
        let span = tracing::info_span!(
            "reconcile.config",
            path = %crate::logging::redact_path(&self.settings.config_path)
        );
        self.write_and_apply().instrument(span).await
    }

    async fn write_and_apply(&self) -> UnitState {
        if !self.host.is_ready().await {
            log::info!("Agent is not ready; skipping config update");
            return UnitState::NotReady;
        }

        let desired = self.desired_config();
        let config_path = self.settings.config_path.as_path();

        let persisted = match self.read_persisted(config_path).await {
            Ok(persisted) => persisted,
            Err(e) => {
                log::warn!("Failed to read persisted config: {}", e);
                return host_failure(e);
            }
        };

        if let Some(persisted) = persisted {
            if desired.matches(&persisted) {
                log::debug!("Agent config unchanged");
                return UnitState::UpToDate;
            }
        }

        let rendered = match desired.to_yaml() {
            Ok(rendered) => rendered,
            Err(e) => return UnitState::Blocked(format!("failed to render config: {}", e)),
        };

        if let Err(e) = self.host.write_file(config_path, rendered.as_bytes()).await {
            log::error!("Failed to write agent config: {}", e);
            return host_failure(e);
        }

        // No rollback past this point: if applying fails the new file
        // stays on disk and the next pass sees it as up to date.
        match self.apply().await {
            Ok(()) => {
                log::info!("Applied new agent config");
                UnitState::Applied
            }
            Err(ApplyFailure::Reload(e)) => {
                log::error!("{}", e);
                UnitState::Blocked(e.to_string())
            }
            Err(ApplyFailure::Host(e)) => {
                log::error!("Failed to restart agent: {}", e);
                host_failure(e)
            }
        }
    }

    /// A missing or unparsable file reads as "no persisted config".
    ///
    /// Transient transport failures are returned so the pass can stop
    /// without touching the running agent.
    async fn read_persisted(&self, path: &Path) -> Result<Option<serde_json::Value>, HostError> {
        match self.host.read_file(path).await {
            Ok(bytes) => Ok(parse_persisted(&bytes)),
            Err(HostError::NotFound(_)) => Ok(None),
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                log::warn!("Failed to read persisted config, treating as absent: {}", e);
                Ok(None)
            }
        }
    }

    async fn apply(&self) -> Result<(), ApplyFailure> {
        match self.settings.apply {
            ApplyStrategy::Restart => self.host.restart().await.map_err(ApplyFailure::Host),
            ApplyStrategy::Reload => self
                .reload_client
                .reload()
                .await
                .map_err(ApplyFailure::Reload),
        }
    }
}

fn host_failure(e: HostError) -> UnitState {
    if e.is_transient() {
        UnitState::Degraded(e.to_string())
    } else {
        UnitState::Blocked(e.to_string())
    }
}
