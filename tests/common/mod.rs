//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use synergos::llm::LlmError;
use synergos::{Invocation, ModelClient, ModelReply, ModelRequest, Orchestrator};

/// Model client answering from a fixed script
///
/// Every request is recorded. Once the script is exhausted it answers with
/// an empty reply.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Client whose every reply is the given invocation batch
    pub fn delegating(batches: Vec<Vec<Invocation>>) -> Arc<Self> {
        Self::new(
            batches
                .into_iter()
                .map(|batch| Ok(ModelReply::invocations(batch).with_usage(10)))
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        self.requests.lock().push(request.clone());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ModelReply::default()))
    }
}

pub fn engine(root: &Path, client: Arc<ScriptedClient>) -> Arc<Orchestrator> {
    Orchestrator::builder(root)
        .client(client)
        .session_id("session_test")
        .build()
        .expect("engine should build")
}

pub fn delegate(agent_name: &str, role: &str, instructions: &str) -> Invocation {
    Invocation::new(
        "delegate_task",
        json!({
            "agent_name": agent_name,
            "role": role,
            "instructions": instructions,
        }),
    )
}

pub fn write_file(filename: &str, content: &str) -> Invocation {
    Invocation::new(
        "write_file",
        json!({"filename": filename, "content": content}),
    )
}

pub fn read_file(filename: &str) -> Invocation {
    Invocation::new("read_file", json!({"filename": filename}))
}

pub fn list_files(path: &str) -> Invocation {
    Invocation::new("list_files", json!({"path": path}))
}
