//! Execution unit contract shared by coordinators and workers

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::activity::ActivityLog;
use crate::error::SynergosError;
use crate::graph::{GraphHandle, Metadata, NodeKind};
use crate::storage::Workspace;

/// Default maximum delegation depth
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// Variant of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Coordinator,
    Worker,
}

/// Name, role and position of a unit in the delegation hierarchy
///
/// Constructed only by the registry, so a unit's depth is fixed from the
/// moment it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitIdentity {
    name: String,
    role: String,
    kind: UnitKind,
    depth: u32,
    parent: Option<String>,
}

impl UnitIdentity {
    pub(crate) fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        kind: UnitKind,
        depth: u32,
        parent: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            kind,
            depth,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Delegation hops from the root coordinator (root = 0)
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Human-readable graph label, e.g. `Worker_1 (Analyst)`
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.role)
    }
}

/// What a history entry records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum HistoryEvent {
    Objective(String),
    Response(String),
    Failure(String),
}

/// Timestamped history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    #[serde(flatten)]
    pub event: HistoryEvent,
}

/// Append-only per-unit history
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, agent: &str, event: HistoryEvent) {
        self.entries.push(HistoryEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            event,
        });
    }

    /// The last `n` entries, oldest first
    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handles a unit uses to report into the run's shared state
///
/// Every unit of a run holds clones of the same handles; none owns them.
#[derive(Clone, Debug)]
pub struct UnitContext {
    pub workspace: Arc<Workspace>,
    pub graph: GraphHandle,
    pub activity: Arc<ActivityLog>,
}

impl UnitContext {
    pub fn new(workspace: Arc<Workspace>, graph: GraphHandle, activity: Arc<ActivityLog>) -> Self {
        Self {
            workspace,
            graph,
            activity,
        }
    }

    /// Record the unit as a node of the session graph
    pub fn register(&self, identity: &UnitIdentity) -> Result<(), SynergosError> {
        let mut metadata = Metadata::new();
        metadata.insert("role".into(), json!(identity.role()));
        metadata.insert("depth".into(), json!(identity.depth()));
        metadata.insert("kind".into(), json!(identity.kind()));

        self.graph
            .add_node(identity.name(), identity.label(), NodeKind::Agent, metadata)
    }
}

/// State common to every execution unit
#[derive(Debug)]
pub(crate) struct UnitCore {
    pub identity: UnitIdentity,
    pub system_prompt: String,
    pub context: UnitContext,
    history: RwLock<History>,
}

impl UnitCore {
    pub fn new(identity: UnitIdentity, system_prompt: String, context: UnitContext) -> Self {
        Self {
            identity,
            system_prompt,
            context,
            history: RwLock::new(History::new()),
        }
    }

    /// Append an entry to the unit's own history
    pub fn remember(&self, event: HistoryEvent) {
        debug!(agent = %self.identity.name(), ?event, "History entry");
        self.history.write().push(self.identity.name(), event);
    }

    /// Copy of the last `n` history entries
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.history.read().recent(n).to_vec()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.read().entries().to_vec()
    }

    /// Record an action in the shared activity log
    pub fn log_action(&self, action: &str, details: Option<&str>) {
        self.context
            .activity
            .record(self.identity.name(), action, details);
    }
}

/// The addressable actor contract: `process` always yields text
///
/// Internal failures are reported in-band in the returned text and never
/// cross this boundary as errors.
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    fn identity(&self) -> &UnitIdentity;

    fn system_prompt(&self) -> &str;

    /// Copy of the unit's full history
    fn history(&self) -> Vec<HistoryEntry>;

    /// Handle an objective and return the textual result
    async fn process(&self, objective: &str) -> String;
}

/// First `max` characters of `text`, with an ellipsis when truncated
pub(crate) fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
