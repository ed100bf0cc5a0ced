//! # Synergos
//!
//! Recursive task delegation - a coordinator that plans through a language
//! model and spawns a bounded hierarchy of specialised workers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    ORCHESTRATOR (delegation engine)                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │ Model Client │  │ Unit Registry│  │ Consumption  │               │
//! │  │              │  │              │  │    Meter     │               │
//! │  └──────────────┘  └──────────────┘  └──────────────┘               │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │  Workspace   │  │ Session Graph│  │ Activity Log │               │
//! │  └──────────────┘  └──────────────┘  └──────────────┘               │
//! └────────────────────────────┬────────────────────────────────────────┘
//!                              │ execute_round / dispatch
//!                              ▼
//!                     ┌─────────────────┐
//!                     │   Coordinator   │  depth 0
//!                     └────────┬────────┘
//!                  delegate_task (Délégation edges)
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!   ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//!   │  Worker_1   │     │  Worker_2   │     │  Worker_3   │  depth 1..=max
//!   └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Execution unit**: a coordinator or a worker; both take an objective
//!   and return text
//! - **Round**: one request to the model client and the dispatch of the
//!   invocations it returns
//! - **Operation**: `delegate_task`, `read_file`, `write_file` or `list_files`
//! - **Session graph**: append-only record of units and delegations,
//!   persisted as JSON at the end of a run

pub mod activity;
pub mod agent;
pub mod budget;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod llm;
pub mod operation;
pub mod orchestrator;
pub mod registry;
pub mod specialty;
pub mod storage;
pub mod worker;

pub use activity::{ActivityEntry, ActivityLog};
pub use agent::{ExecutionUnit, HistoryEntry, HistoryEvent, UnitIdentity, UnitKind};
pub use budget::ConsumptionMeter;
pub use config::SynergosConfig;
pub use coordinator::Coordinator;
pub use error::{ErrorKind, SynergosError};
pub use graph::{GraphEdge, GraphNode, SessionGraph};
pub use llm::{Invocation, ModelClient, ModelReply, ModelRequest};
pub use operation::{Operation, OperationKind};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use registry::{UnitRegistry, WorkerSpec};
pub use specialty::Specialty;
pub use storage::{StorageError, Workspace};
pub use worker::Worker;
