//! Session graph - append-only record of units and delegations for one run

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SynergosError;

/// Label of the edge recorded from a delegating unit to the worker it spawned
pub const DELEGATION_LABEL: &str = "Délégation";

/// Ordered metadata attached to nodes and edges
pub type Metadata = BTreeMap<String, Value>;

/// Kind of a graph participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Agent,
    #[serde(untagged)]
    Other(String),
}

/// A participant in the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A delegation or communication event between two participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub label: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Record of who delegated what to whom during one run
///
/// Nodes and edges are only ever appended. Every edge must connect two
/// nodes that already exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionGraph {
    pub session_id: String,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl SessionGraph {
    /// Create an empty graph with a timestamped session id
    pub fn new() -> Self {
        Self::with_session_id(format!("session_{}", Local::now().format("%Y%m%d_%H%M%S")))
    }

    /// Create an empty graph with the given session id
    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Record a participant; ids are unique per session
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        kind: NodeKind,
        metadata: Metadata,
    ) -> Result<(), SynergosError> {
        let id = id.into();
        if self.contains_node(&id) {
            return Err(SynergosError::DuplicateNode(id));
        }

        debug!(session = %self.session_id, node = %id, "Graph node added");
        self.nodes.push(GraphNode {
            id,
            label: label.into(),
            kind,
            metadata,
        });
        Ok(())
    }

    /// Record an event between two existing participants
    pub fn add_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
        metadata: Metadata,
    ) -> Result<(), SynergosError> {
        let source = source.into();
        let target = target.into();
        for endpoint in [&source, &target] {
            if !self.contains_node(endpoint) {
                return Err(SynergosError::DanglingEdge {
                    origin: source.clone(),
                    target: target.clone(),
                    missing: endpoint.clone(),
                });
            }
        }

        debug!(session = %self.session_id, %source, %target, "Graph edge added");
        self.edges.push(GraphEdge {
            source,
            target,
            label: label.into(),
            metadata,
        });
        Ok(())
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Units this node delegated to, in delegation order
    pub fn children(&self, id: &str) -> Vec<&str> {
        self.delegations()
            .filter(|e| e.source == id)
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Unit that delegated to this node, if any
    pub fn parent(&self, id: &str) -> Option<&str> {
        self.delegations()
            .find(|e| e.target == id)
            .map(|e| e.source.as_str())
    }

    /// Number of delegation hops between this node and its root
    pub fn depth_of(&self, id: &str) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
            if depth > self.nodes.len() {
                break;
            }
        }
        depth
    }

    /// Deepest delegation chain recorded in the session
    pub fn max_depth(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| self.depth_of(&n.id))
            .max()
            .unwrap_or(0)
    }

    fn delegations(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(|e| e.label == DELEGATION_LABEL)
    }

    /// Plain-text rendering for terminals
    pub fn summary(&self) -> String {
        let mut out = format!("Session ID: {}\n\nNodes:\n", self.session_id);
        for node in &self.nodes {
            let kind = match &node.kind {
                NodeKind::Agent => "agent",
                NodeKind::Other(kind) => kind.as_str(),
            };
            out.push_str(&format!("  - {}: {} [{}]\n", node.id, node.label, kind));
        }
        out.push_str("\nEdges:\n");
        for edge in &self.edges {
            out.push_str(&format!(
                "  {} --[{}]--> {}\n",
                edge.source, edge.label, edge.target
            ));
        }
        out.push_str(&format!(
            "\nStatistics:\n  - nodes: {}\n  - edges: {}\n  - max depth: {}\n",
            self.nodes.len(),
            self.edges.len(),
            self.max_depth()
        ));
        out
    }

    /// Serialize the whole graph as pretty JSON
    pub fn to_json(&self) -> Result<String, SynergosError> {
        serde_json::to_string_pretty(self).map_err(|e| SynergosError::Persistence {
            path: PathBuf::new(),
            reason: e.to_string(),
        })
    }

    /// Write the whole graph to `path`, overwriting any previous snapshot
    pub fn persist(&self, path: &Path) -> Result<PathBuf, SynergosError> {
        let persistence = |reason: String| SynergosError::Persistence {
            path: path.to_path_buf(),
            reason,
        };
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persistence(e.to_string()))?;
        }
        fs::write(path, json).map_err(|e| persistence(e.to_string()))?;

        info!(
            session = %self.session_id,
            path = %path.display(),
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "Session graph persisted"
        );
        Ok(path.to_path_buf())
    }
}

impl Default for SessionGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle through which units report into the run's single graph
#[derive(Clone, Debug)]
pub struct GraphHandle {
    inner: Arc<RwLock<SessionGraph>>,
}

impl GraphHandle {
    pub fn new(graph: SessionGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    pub fn add_node(
        &self,
        id: impl Into<String>,
        label: impl Into<String>,
        kind: NodeKind,
        metadata: Metadata,
    ) -> Result<(), SynergosError> {
        self.inner.write().add_node(id, label, kind, metadata)
    }

    pub fn add_edge(
        &self,
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
        metadata: Metadata,
    ) -> Result<(), SynergosError> {
        self.inner.write().add_edge(source, target, label, metadata)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.inner.read().contains_node(id)
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> SessionGraph {
        self.inner.read().clone()
    }

    pub fn session_id(&self) -> String {
        self.inner.read().session_id.clone()
    }

    pub fn persist(&self, path: &Path) -> Result<PathBuf, SynergosError> {
        self.inner.read().persist(path)
    }
}
