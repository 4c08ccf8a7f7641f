//! Deployment identity labels attached to every self-emitted metric and log.

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

/// Identity of the workload unit this agent is subordinated to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalUnit {
    pub application: String,
    pub unit: String,
}

/// The agent's deployment identity.
///
/// When a principal is set the agent runs as a subordinate and the
/// application/unit labels describe the principal, not the agent itself.
/// The self-monitoring job name always uses the agent's own identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topology {
    model: String,
    model_uuid: String,
    application: String,
    unit: String,
    charm_name: Option<String>,
    principal: Option<PrincipalUnit>,
}

impl Topology {
    pub fn new(
        model: impl Into<String>,
        model_uuid: impl Into<String>,
        application: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, TopologyError> {
        let topology = Self {
            model: model.into(),
            model_uuid: model_uuid.into(),
            application: application.into(),
            unit: unit.into(),
            charm_name: None,
            principal: None,
        };
        topology.validate()?;
        Ok(topology)
    }

    /// Attaches the charm name, emitted as `juju_charm` when not subordinate.
    pub fn with_charm_name(mut self, charm_name: impl Into<String>) -> Result<Self, TopologyError> {
        let charm_name = charm_name.into();
        if charm_name.is_empty() {
            return Err(TopologyError::EmptyLabel("juju_charm"));
        }
        self.charm_name = Some(charm_name);
        Ok(self)
    }

    pub fn with_principal(mut self, principal: PrincipalUnit) -> Result<Self, TopologyError> {
        if principal.application.is_empty() {
            return Err(TopologyError::EmptyLabel("juju_application"));
        }
        if principal.unit.is_empty() {
            return Err(TopologyError::EmptyLabel("juju_unit"));
        }
        self.principal = Some(principal);
        Ok(self)
    }

    fn validate(&self) -> Result<(), TopologyError> {
        let required = [
            ("juju_model", &self.model),
            ("juju_model_uuid", &self.model_uuid),
            ("juju_application", &self.application),
            ("juju_unit", &self.unit),
        ];
        match required.iter().find(|(_, value)| value.is_empty()) {
            Some((label, _)) => Err(TopologyError::EmptyLabel(*label)),
            None => Ok(()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    pub fn principal(&self) -> Option<&PrincipalUnit> {
        self.principal.as_ref()
    }

    pub fn is_subordinate(&self) -> bool {
        self.principal.is_some()
    }

    /// Name of the agent's own scrape job, aligned with scrape-relation job names.
    pub fn self_monitoring_job_name(&self) -> String {
        format!(
            "juju_{}_{}_{}_self-monitoring",
            self.model, self.model_uuid, self.application
        )
    }

    /// Instance labels in their fixed order.
    pub fn labels(&self) -> Vec<(&'static str, &str)> {
        let (application, unit) = match &self.principal {
            Some(p) => (p.application.as_str(), p.unit.as_str()),
            None => (self.application.as_str(), self.unit.as_str()),
        };
        vec![
            ("juju_model", self.model.as_str()),
            ("juju_model_uuid", self.model_uuid.as_str()),
            ("juju_application", application),
            ("juju_unit", unit),
        ]
    }

    /// The `instance` label value: topology values joined with `_`.
    pub fn instance_name(&self) -> String {
        self.labels()
            .into_iter()
            .map(|(_, value)| value)
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Labels the agent attaches to its own metrics: `juju_charm` first when
    /// known, then the agent's own model, application and unit.
    ///
    /// A principal never changes these; it only shows up in
    /// [`instance_name`](Self::instance_name) and [`labels`](Self::labels).
    pub fn relabel_targets(&self) -> Vec<(&'static str, &str)> {
        let mut targets = Vec::with_capacity(5);
        if let Some(charm) = &self.charm_name {
            targets.push(("juju_charm", charm.as_str()));
        }
        targets.extend([
            ("juju_model", self.model.as_str()),
            ("juju_model_uuid", self.model_uuid.as_str()),
            ("juju_application", self.application.as_str()),
            ("juju_unit", self.unit.as_str()),
        ]);
        targets
    }
}
