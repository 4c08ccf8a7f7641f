pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod reconciler;
pub mod reload;
pub mod rules;
pub mod storage;
pub mod topology;
pub mod version;

pub use config::{load_settings, synthesize, ApplyStrategy, DesiredConfig, Endpoint, Settings};
pub use error::{
    HostError, ReconcileError, ReloadError, Result, SettingsError, SyncError, TopologyError,
};
pub use host::{AgentHost, MachineHost, RelationCounts, RelationSnapshot};
pub use reconciler::{PassReport, Reconciler, RuleSyncOutcome, StatusLabel, Trigger, UnitState};
pub use reload::{ReloadClient, RetryPolicy};
pub use rules::{Dashboard, RuleGroup, RuleKind, RulesMapping};
pub use topology::{PrincipalUnit, Topology};
pub use version::parse_agent_version;
