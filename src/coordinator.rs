//! Coordinator - root unit that reasons through the delegation engine

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::agent::{
    preview, ExecutionUnit, HistoryEntry, HistoryEvent, UnitContext, UnitCore, UnitIdentity,
};
use crate::error::SynergosError;
use crate::orchestrator::Orchestrator;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a Coordinator agent responsible for planning and delegating tasks.

You can use the following operations:
- delegate_task: create a specialised agent and hand it a sub-task
- read_file: read a file from the workspace
- write_file: write a file to the workspace
- list_files: list the files of the workspace

Analyse each request, decompose it when useful, and delegate to the right
specialists. Give each agent a clear role and precise instructions, including
the names of the files it must read and write.";

/// Root execution unit of a run
pub struct Coordinator {
    core: UnitCore,
    engine: Arc<Orchestrator>,
}

impl Coordinator {
    pub(crate) fn new(
        identity: UnitIdentity,
        system_prompt: Option<String>,
        context: UnitContext,
        engine: Arc<Orchestrator>,
    ) -> Result<Self, SynergosError> {
        context.register(&identity)?;
        let prompt = system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Ok(Self {
            core: UnitCore::new(identity, prompt, context),
            engine,
        })
    }
}

#[async_trait]
impl ExecutionUnit for Coordinator {
    fn identity(&self) -> &UnitIdentity {
        &self.core.identity
    }

    fn system_prompt(&self) -> &str {
        &self.core.system_prompt
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.core.history()
    }

    async fn process(&self, objective: &str) -> String {
        // The window is taken before the new objective is recorded; the
        // engine appends the objective itself.
        let window = self.core.recent(self.engine.history_window());
        self.core.remember(HistoryEvent::Objective(objective.to_string()));
        self.core
            .log_action("objective received", Some(&preview(objective, 200)));

        let outcome = self
            .engine
            .execute_round(&self.core.identity, &self.core.system_prompt, &window, objective)
            .await;

        match outcome {
            Ok(text) => {
                info!(agent = %self.core.identity.name(), chars = text.len(), "Objective processed");
                self.core
                    .log_action("response produced", Some(&preview(&text, 200)));
                self.core.remember(HistoryEvent::Response(text.clone()));
                text
            }
            Err(e) => {
                error!(agent = %self.core.identity.name(), error = %e, "Objective failed");
                let text = format!("Error while processing the objective: {}", e.to_result_text());
                self.core.log_action("processing failed", Some(&e.to_string()));
                self.core.remember(HistoryEvent::Failure(text.clone()));
                text
            }
        }
    }
}
