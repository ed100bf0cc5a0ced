//! Deterministic stand-in client for runs without an API credential

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{estimate_tokens, Invocation, LlmError, ModelClient, ModelReply, ModelRequest};
use crate::operation::OperationKind;
use crate::specialty::Specialty;

/// Answers every objective with a single delegation to a specialist
///
/// The specialist's role is guessed from the objective's keywords and its
/// instructions are the objective itself, so the worker pipeline sees the
/// same filenames the caller mentioned.
#[derive(Debug, Clone, Default)]
pub struct OfflineClient;

impl OfflineClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelClient for OfflineClient {
    fn name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        let usage: u64 = request
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();

        let Some(objective) = request.objective() else {
            return Ok(ModelReply::default().with_usage(usage));
        };

        let specialty = Specialty::classify(objective);
        let role = specialty.default_role();
        debug!(?specialty, role, "Offline delegation");

        let invocation = Invocation::new(
            OperationKind::DelegateTask.name(),
            json!({
                "agent_name": role.replace(' ', "_"),
                "role": role,
                "instructions": objective,
            }),
        );
        Ok(ModelReply::invocations(vec![invocation]).with_usage(usage))
    }
}
