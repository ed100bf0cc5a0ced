//! Unit registry - creates execution units and tracks them by name

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tracing::{info, warn};

use crate::agent::{UnitContext, UnitIdentity, UnitKind};
use crate::coordinator::Coordinator;
use crate::error::SynergosError;
use crate::graph::{Metadata, DELEGATION_LABEL};
use crate::orchestrator::Orchestrator;
use crate::worker::Worker;

/// Role given to coordinators
pub const COORDINATOR_ROLE: &str = "Coordinator";

/// Request for a new worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Preferred name; generated when absent
    pub name: Option<String>,
    pub role: String,
    pub system_prompt: Option<String>,
    /// Name of the delegating unit
    pub parent: Option<String>,
    pub depth: u32,
}

impl WorkerSpec {
    pub fn new(role: impl Into<String>, depth: u32) -> Self {
        Self {
            name: None,
            role: role.into(),
            system_prompt: None,
            parent: None,
            depth,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// What the registry remembers about a unit it created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub identity: UnitIdentity,
    pub created_at: DateTime<Utc>,
}

/// Factory and name directory for one run
///
/// Units themselves are owned by whoever asked for them; the registry only
/// keeps their identities, so a finished worker can be dropped while its
/// record (and graph node) stays.
#[derive(Debug)]
pub struct UnitRegistry {
    max_depth: u32,
    context: UnitContext,
    counter: Mutex<u64>,
    units: RwLock<Vec<UnitRecord>>,
}

impl UnitRegistry {
    pub fn new(context: UnitContext, max_depth: u32) -> Self {
        Self {
            max_depth,
            context,
            counter: Mutex::new(0),
            units: RwLock::new(Vec::new()),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Create a worker, register it and link it to its parent
    ///
    /// Fails with `DepthExceeded` before any side effect when `spec.depth`
    /// is past the maximum.
    pub fn create_worker(&self, spec: WorkerSpec) -> Result<Worker, SynergosError> {
        if spec.depth > self.max_depth {
            warn!(
                role = %spec.role,
                depth = spec.depth,
                max_depth = self.max_depth,
                "Worker creation refused"
            );
            return Err(SynergosError::DepthExceeded {
                depth: spec.depth,
                max: self.max_depth,
            });
        }

        let mut units = self.units.write();

        if let Some(parent) = &spec.parent {
            if !self.context.graph.contains_node(parent) {
                return Err(SynergosError::DanglingEdge {
                    origin: parent.clone(),
                    target: spec.name.clone().unwrap_or_default(),
                    missing: parent.clone(),
                });
            }
        }

        let name = match &spec.name {
            Some(requested) => self.unique_name(&units, requested),
            None => self.generated_name(&units),
        };
        let identity = UnitIdentity::new(
            name,
            spec.role,
            UnitKind::Worker,
            spec.depth,
            spec.parent,
        );

        let worker = Worker::new(identity.clone(), spec.system_prompt, self.context.clone())?;

        if let Some(parent) = identity.parent() {
            let mut metadata = Metadata::new();
            metadata.insert("role".into(), json!(identity.role()));
            metadata.insert("depth".into(), json!(identity.depth()));
            self.context
                .graph
                .add_edge(parent, identity.name(), DELEGATION_LABEL, metadata)?;
        }

        info!(
            agent = %identity.name(),
            role = %identity.role(),
            depth = identity.depth(),
            parent = ?identity.parent(),
            "Worker created"
        );
        units.push(UnitRecord {
            identity,
            created_at: Utc::now(),
        });
        Ok(worker)
    }

    /// Create a root coordinator at depth 0
    pub fn create_coordinator(
        &self,
        name: &str,
        system_prompt: Option<String>,
        engine: Arc<Orchestrator>,
    ) -> Result<Coordinator, SynergosError> {
        let mut units = self.units.write();
        let name = self.unique_name(&units, name);
        let identity = UnitIdentity::new(name, COORDINATOR_ROLE, UnitKind::Coordinator, 0, None);

        let coordinator =
            Coordinator::new(identity.clone(), system_prompt, self.context.clone(), engine)?;

        info!(agent = %identity.name(), "Coordinator created");
        units.push(UnitRecord {
            identity,
            created_at: Utc::now(),
        });
        Ok(coordinator)
    }

    pub fn get(&self, name: &str) -> Option<UnitRecord> {
        self.units
            .read()
            .iter()
            .find(|r| r.identity.name() == name)
            .cloned()
    }

    /// Names of every registered unit, in creation order
    pub fn list(&self) -> Vec<String> {
        self.units
            .read()
            .iter()
            .map(|r| r.identity.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }

    fn is_taken(&self, units: &[UnitRecord], name: &str) -> bool {
        units.iter().any(|r| r.identity.name() == name) || self.context.graph.contains_node(name)
    }

    /// `name`, or `name_2`, `name_3`, ... when already taken
    fn unique_name(&self, units: &[UnitRecord], name: &str) -> String {
        if !self.is_taken(units, name) {
            return name.to_string();
        }
        (2u64..)
            .map(|k| format!("{name}_{k}"))
            .find(|candidate| !self.is_taken(units, candidate))
            .unwrap_or_else(|| name.to_string())
    }

    /// Next free `Worker_<n>` from the monotonic counter
    fn generated_name(&self, units: &[UnitRecord]) -> String {
        let mut counter = self.counter.lock();
        loop {
            *counter += 1;
            let candidate = format!("Worker_{}", *counter);
            if !self.is_taken(units, &candidate) {
                return candidate;
            }
        }
    }
}
