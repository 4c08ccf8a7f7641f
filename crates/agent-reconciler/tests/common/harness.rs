//! Test harness for isolated reconciliation passes.
//!
//! `FakeHost` keeps files in memory and counts every collaborator call so
//! tests can assert on side effects. `TestHarness` owns a temporary charm
//! directory with one template file per rule kind.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use agent_reconciler::config::Endpoint;
use agent_reconciler::host::{AgentHost, RelationCounts, RelationSnapshot};
use agent_reconciler::reload::ReloadClient;
use agent_reconciler::rules::{RuleGroup, RuleKind, RulesMapping};
use agent_reconciler::{HostError, Reconciler, Settings, Topology};

/// Failure a `FakeHost` operation can be primed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unreachable,
    Timeout,
    Service,
    PermissionDenied,
}

impl Failure {
    fn to_error(self, path: &Path) -> HostError {
        match self {
            Failure::Unreachable => HostError::Unreachable("connection refused".to_string()),
            Failure::Timeout => HostError::Timeout("deadline exceeded".to_string()),
            Failure::Service => HostError::Service("exit status 1".to_string()),
            Failure::PermissionDenied => HostError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            },
        }
    }
}

/// In-memory host with call counters.
pub struct FakeHost {
    topology: Topology,
    snapshot: Mutex<RelationSnapshot>,
    ready: AtomicBool,
    dashboards_enabled: bool,
    version_output: Option<String>,

    pub files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    read_failure: Mutex<Option<Failure>>,
    write_failure: Mutex<Option<Failure>>,
    restart_failure: Mutex<Option<Failure>>,

    pub topology_calls: AtomicUsize,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub restarts: AtomicUsize,
    pub rule_updates: Mutex<Vec<RuleKind>>,
}

impl FakeHost {
    pub fn new(snapshot: RelationSnapshot) -> Self {
        Self {
            topology: Topology::new("lma", "abcd", "agent", "agent/0")
                .expect("valid topology")
                .with_charm_name("grafana-agent")
                .expect("valid charm name"),
            snapshot: Mutex::new(snapshot),
            ready: AtomicBool::new(true),
            dashboards_enabled: false,
            version_output: Some(
                "agent, version v0.26.1 (branch: HEAD, revision: 2b88be37)".to_string(),
            ),
            files: Mutex::new(HashMap::new()),
            read_failure: Mutex::new(None),
            write_failure: Mutex::new(None),
            restart_failure: Mutex::new(None),
            topology_calls: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
            rule_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn not_ready(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_dashboards(mut self) -> Self {
        self.dashboards_enabled = true;
        self
    }

    pub fn without_version(mut self) -> Self {
        self.version_output = None;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_snapshot(&self, snapshot: RelationSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn fail_reads(&self, failure: Failure) {
        *self.read_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_writes(&self, failure: Failure) {
        *self.write_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_restarts(&self, failure: Option<Failure>) {
        *self.restart_failure.lock().unwrap() = failure;
    }

    pub fn put_file(&self, path: &Path, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_vec());
    }

    pub fn file(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn file_yaml(&self, path: &Path) -> Value {
        let bytes = self.file(path).expect("file should exist");
        serde_yaml::from_slice(&bytes).expect("file should be valid YAML")
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn topology_calls(&self) -> usize {
        self.topology_calls.load(Ordering::SeqCst)
    }

    pub fn rule_updates(&self) -> Vec<RuleKind> {
        self.rule_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentHost for FakeHost {
    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>, HostError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.read_failure.lock().unwrap() {
            return Err(failure.to_error(path));
        }
        self.file(path)
            .ok_or_else(|| HostError::NotFound(path.to_path_buf()))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<(), HostError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = *self.write_failure.lock().unwrap() {
            return Err(failure.to_error(path));
        }
        self.put_file(path, content);
        Ok(())
    }

    async fn restart(&self) -> Result<(), HostError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        match *self.restart_failure.lock().unwrap() {
            Some(failure) => Err(failure.to_error(Path::new("grafana-agent"))),
            None => Ok(()),
        }
    }

    async fn agent_version_output(&self) -> Result<String, HostError> {
        self.version_output
            .clone()
            .ok_or_else(|| HostError::Service("agent binary missing".to_string()))
    }

    async fn rules_updated(&self, kind: RuleKind) -> Result<(), HostError> {
        self.rule_updates.lock().unwrap().push(kind);
        Ok(())
    }

    fn topology(&self) -> Topology {
        self.topology_calls.fetch_add(1, Ordering::SeqCst);
        let topology = self.topology.clone();
        match self.snapshot.lock().unwrap().principal.clone() {
            Some(principal) => topology.with_principal(principal).expect("valid principal"),
            None => topology,
        }
    }

    fn remote_write_endpoints(&self) -> Vec<Endpoint> {
        self.snapshot.lock().unwrap().remote_write_endpoints.clone()
    }

    fn loki_endpoints(&self) -> Vec<Endpoint> {
        self.snapshot.lock().unwrap().loki_endpoints.clone()
    }

    fn metrics_jobs(&self) -> Vec<Value> {
        self.snapshot.lock().unwrap().metrics_jobs.clone()
    }

    fn metrics_rules(&self) -> Vec<RuleGroup> {
        self.snapshot.lock().unwrap().metrics_rule_groups()
    }

    fn logs_rules(&self) -> Vec<RuleGroup> {
        self.snapshot.lock().unwrap().logs_rule_groups()
    }

    fn supports_dashboards(&self) -> bool {
        self.dashboards_enabled
    }

    fn dashboards(&self) -> Vec<RuleGroup> {
        self.snapshot.lock().unwrap().dashboard_groups()
    }

    fn additional_integrations(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    fn relation_counts(&self) -> RelationCounts {
        self.snapshot.lock().unwrap().relation_counts
    }
}

/// Test harness providing an isolated charm directory.
pub struct TestHarness {
    temp_dir: TempDir,
    pub charm_dir: PathBuf,
    pub config_path: PathBuf,
}

impl TestHarness {
    /// Creates a charm directory with a `builtin.rules` template per kind.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let charm_dir = temp_dir.path().join("charm");

        for kind in RuleKind::ALL {
            let mapping = RulesMapping::for_kind(&charm_dir, kind);
            std::fs::create_dir_all(&mapping.source).expect("Failed to create template dir");
            std::fs::write(mapping.source.join("builtin.rules"), "groups: []\n")
                .expect("Failed to write template");
        }

        let config_path = temp_dir.path().join("grafana-agent.yaml");

        Self {
            temp_dir,
            charm_dir,
            config_path,
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            charm_dir: self.charm_dir.clone(),
            config_path: self.config_path.clone(),
            ..Settings::default()
        }
    }

    pub fn reconciler(&self, host: FakeHost) -> Reconciler<FakeHost> {
        Reconciler::new(host, self.settings()).expect("Failed to build reconciler")
    }

    pub fn reconciler_with(
        &self,
        host: FakeHost,
        settings: Settings,
        reload_client: ReloadClient,
    ) -> Reconciler<FakeHost> {
        Reconciler::with_reload_client(host, settings, reload_client)
    }

    pub fn dest_dir(&self, kind: RuleKind) -> PathBuf {
        RulesMapping::for_kind(&self.charm_dir, kind).dest
    }

    /// Sorted file names in the live directory for `kind`.
    pub fn dest_files(&self, kind: RuleKind) -> Vec<String> {
        agent_reconciler::storage::list_files(&self.dest_dir(kind)).unwrap_or_default()
    }

    pub fn remove_template(&self, kind: RuleKind) {
        let mapping = RulesMapping::for_kind(&self.charm_dir, kind);
        std::fs::remove_dir_all(mapping.source).expect("Failed to remove template dir");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
