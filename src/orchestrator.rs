//! Delegation engine - runs reasoning rounds and dispatches their invocations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::activity::ActivityLog;
use crate::agent::{ExecutionUnit, HistoryEntry, HistoryEvent, UnitContext, UnitIdentity, DEFAULT_MAX_DEPTH};
use crate::budget::{ConsumptionMeter, DEFAULT_TOKEN_BUDGET};
use crate::config::{SynergosConfig, DEFAULT_HISTORY_WINDOW};
use crate::coordinator::Coordinator;
use crate::error::SynergosError;
use crate::graph::{GraphHandle, SessionGraph};
use crate::llm::{
    ChatMessage, Invocation, ModelClient, ModelRequest, OfflineClient, OpenAiClient, OpenAiConfig,
    ToolDefinition,
};
use crate::operation::{self, DelegateArgs, Operation};
use crate::registry::{UnitRegistry, WorkerSpec};
use crate::storage::Workspace;

/// Returned when the client answers with neither text nor invocations
pub const NO_OUTPUT: &str = "(no output produced)";

/// The delegation engine of one run
///
/// Owns the session graph, the consumption meter and the unit registry.
/// Units only hold handles into them.
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    context: UnitContext,
    registry: UnitRegistry,
    meter: ConsumptionMeter,
    history_window: usize,
    graph_path: PathBuf,
}

impl Orchestrator {
    pub fn builder(workspace: impl Into<PathBuf>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(workspace)
    }

    /// Engine configured from a [`SynergosConfig`]
    pub fn from_config(config: &SynergosConfig) -> Result<Arc<Self>, SynergosError> {
        let client: Arc<dyn ModelClient> = match &config.api_key {
            Some(key) => Arc::new(OpenAiClient::new(OpenAiConfig {
                api_key: key.clone(),
                base_url: config.base_url.clone(),
                model: config.model.clone(),
            })),
            None => Arc::new(OfflineClient::new()),
        };

        OrchestratorBuilder::new(config.workspace.clone())
            .client(client)
            .token_budget(config.token_budget)
            .max_depth(config.max_depth)
            .history_window(config.history_window)
            .activity_log(config.activity_path())
            .graph_path(config.graph_path())
            .build()
    }

    /// Create the root coordinator of this run
    pub fn spawn_coordinator(
        self: &Arc<Self>,
        name: &str,
        system_prompt: Option<String>,
    ) -> Result<Coordinator, SynergosError> {
        self.registry
            .create_coordinator(name, system_prompt, Arc::clone(self))
    }

    /// The operation menu advertised to the client
    pub fn menu(&self) -> Vec<ToolDefinition> {
        operation::menu()
    }

    /// Run one reasoning round for `caller`
    ///
    /// Either returns the client's text, the newline-joined results of the
    /// invocations it requested, or [`NO_OUTPUT`]. Depth, budget and client
    /// failures abort the round.
    #[instrument(skip_all, fields(agent = %caller.name(), depth = caller.depth()))]
    pub async fn execute_round(
        &self,
        caller: &UnitIdentity,
        system_prompt: &str,
        history: &[HistoryEntry],
        objective: &str,
    ) -> Result<String, SynergosError> {
        self.check_ceilings(caller)?;

        let request = self.build_request(system_prompt, history, objective);
        debug!(
            client = self.client.name(),
            messages = request.messages.len(),
            "Reasoning round"
        );
        let reply = self.client.complete(&request).await?;
        let used = self.meter.charge(reply.usage);
        debug!(
            usage = reply.usage,
            used,
            invocations = reply.invocations.len(),
            "Client replied"
        );

        if !reply.invocations.is_empty() {
            return self.dispatch(caller, &reply.invocations).await;
        }
        Ok(reply
            .content
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| NO_OUTPUT.to_string()))
    }

    /// Execute invocations in order on behalf of `caller`
    ///
    /// A bad invocation only replaces its own result with an error text;
    /// ceiling violations abort the whole batch.
    pub async fn dispatch(
        &self,
        caller: &UnitIdentity,
        invocations: &[Invocation],
    ) -> Result<String, SynergosError> {
        let mut results = Vec::with_capacity(invocations.len());

        for invocation in invocations {
            self.check_ceilings(caller)?;

            let outcome = match Operation::parse(invocation) {
                Ok(op) => self.route(caller, op).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(text) => results.push(text),
                Err(e) if e.aborts_round() => return Err(e),
                Err(e) => {
                    warn!(
                        agent = %caller.name(),
                        operation = %invocation.name,
                        error = %e,
                        "Invocation failed"
                    );
                    let text = e.to_result_text();
                    self.context
                        .activity
                        .record(caller.name(), &invocation.name, Some(&text));
                    results.push(text);
                }
            }
        }
        Ok(results.join("\n"))
    }

    async fn route(&self, caller: &UnitIdentity, op: Operation) -> Result<String, SynergosError> {
        debug!(agent = %caller.name(), operation = op.kind().name(), "Routing invocation");
        let activity = &self.context.activity;
        let workspace = &self.context.workspace;

        match op {
            Operation::Delegate(args) => self.delegate(caller, args).await,
            Operation::ReadFile { filename } => {
                let content = workspace.read(&filename)?;
                activity.record(caller.name(), "read_file", Some(&filename));
                Ok(content)
            }
            Operation::WriteFile { filename, content } => {
                let receipt = workspace.write(&filename, &content)?.to_string();
                activity.record(caller.name(), "write_file", Some(&receipt));
                Ok(receipt)
            }
            Operation::ListFiles { path } => {
                let listing = workspace.list(&path)?;
                activity.record(caller.name(), "list_files", Some(&path));
                Ok(listing.to_string())
            }
        }
    }

    async fn delegate(
        &self,
        caller: &UnitIdentity,
        args: DelegateArgs,
    ) -> Result<String, SynergosError> {
        let mut spec = WorkerSpec::new(args.role, caller.depth() + 1)
            .with_system_prompt(args.system_prompt)
            .with_parent(caller.name());
        if !args.agent_name.trim().is_empty() {
            spec = spec.named(args.agent_name.trim());
        }

        let worker = self.registry.create_worker(spec)?;
        let identity = worker.identity();
        self.context
            .activity
            .record(caller.name(), "delegate_task", Some(&identity.label()));
        info!(
            from = %caller.name(),
            to = %identity.name(),
            depth = identity.depth(),
            "Delegating"
        );

        Ok(worker.process(&args.instructions).await)
    }

    /// Admission control applied before every round and invocation
    fn check_ceilings(&self, caller: &UnitIdentity) -> Result<(), SynergosError> {
        self.meter.ensure_available()?;
        let max = self.registry.max_depth();
        if caller.depth() > max {
            return Err(SynergosError::DepthExceeded {
                depth: caller.depth(),
                max,
            });
        }
        Ok(())
    }

    fn build_request(
        &self,
        system_prompt: &str,
        history: &[HistoryEntry],
        objective: &str,
    ) -> ModelRequest {
        let start = history.len().saturating_sub(self.history_window);
        let mut messages = Vec::with_capacity(history.len() - start + 2);
        messages.push(ChatMessage::system(system_prompt));
        for entry in &history[start..] {
            messages.push(match &entry.event {
                HistoryEvent::Objective(text) => ChatMessage::user(text.as_str()),
                HistoryEvent::Response(text) | HistoryEvent::Failure(text) => {
                    ChatMessage::assistant(text.as_str())
                }
            });
        }
        messages.push(ChatMessage::user(objective));

        ModelRequest {
            messages,
            tools: self.menu(),
        }
    }

    /// Write the session graph to the configured location
    pub fn persist_graph(&self) -> Result<PathBuf, SynergosError> {
        self.context.graph.persist(&self.graph_path)
    }

    pub fn persist_graph_to(&self, path: &Path) -> Result<PathBuf, SynergosError> {
        self.context.graph.persist(path)
    }

    /// Immutable copy of the session graph
    pub fn snapshot(&self) -> SessionGraph {
        self.context.graph.snapshot()
    }

    pub fn graph(&self) -> &GraphHandle {
        &self.context.graph
    }

    pub fn graph_path(&self) -> &Path {
        &self.graph_path
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn meter(&self) -> &ConsumptionMeter {
        &self.meter
    }

    pub fn workspace(&self) -> &Workspace {
        &self.context.workspace
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.context.activity
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    pub fn max_depth(&self) -> u32 {
        self.registry.max_depth()
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    workspace: PathBuf,
    client: Option<Arc<dyn ModelClient>>,
    token_budget: u64,
    max_depth: u32,
    history_window: usize,
    activity_path: Option<PathBuf>,
    session_id: Option<String>,
    graph_path: Option<PathBuf>,
}

impl OrchestratorBuilder {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            client: None,
            token_budget: DEFAULT_TOKEN_BUDGET,
            max_depth: DEFAULT_MAX_DEPTH,
            history_window: DEFAULT_HISTORY_WINDOW,
            activity_path: None,
            session_id: None,
            graph_path: None,
        }
    }

    /// Language-model client; the offline client when unset
    pub fn client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn token_budget(mut self, budget: u64) -> Self {
        self.token_budget = budget;
        self
    }

    pub fn max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Append activity entries to `path`; no file is written when unset
    pub fn activity_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.activity_path = Some(path.into());
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Snapshot location; `<workspace>/graph.json` when unset
    pub fn graph_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.graph_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Arc<Orchestrator>, SynergosError> {
        let workspace = Workspace::open(&self.workspace)?;
        let graph_path = self
            .graph_path
            .unwrap_or_else(|| workspace.root().join("graph.json"));
        let graph = match self.session_id {
            Some(id) => SessionGraph::with_session_id(id),
            None => SessionGraph::new(),
        };
        let activity = match self.activity_path {
            Some(path) => ActivityLog::new(path),
            None => ActivityLog::disabled(),
        };
        let client: Arc<dyn ModelClient> = match self.client {
            Some(client) => client,
            None => Arc::new(OfflineClient::new()),
        };

        let context = UnitContext::new(
            Arc::new(workspace),
            GraphHandle::new(graph),
            Arc::new(activity),
        );
        info!(
            workspace = %context.workspace.root().display(),
            session = %context.graph.session_id(),
            client = client.name(),
            budget = self.token_budget,
            max_depth = self.max_depth,
            "Delegation engine ready"
        );

        Ok(Arc::new(Orchestrator {
            client,
            registry: UnitRegistry::new(context.clone(), self.max_depth),
            context,
            meter: ConsumptionMeter::new(self.token_budget),
            history_window: self.history_window,
            graph_path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::llm::{LlmError, ModelReply};

    /// Client answering from a fixed script and recording what it was sent
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
        requests: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ModelReply, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
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

    fn engine(
        dir: &tempfile::TempDir,
        client: Arc<Scripted>,
        budget: u64,
    ) -> Arc<Orchestrator> {
        Orchestrator::builder(dir.path())
            .client(client)
            .token_budget(budget)
            .session_id("session_test")
            .build()
            .unwrap()
    }

    fn delegate(name: &str, role: &str, instructions: &str) -> Invocation {
        Invocation::new(
            "delegate_task",
            json!({"agent_name": name, "role": role, "instructions": instructions}),
        )
    }

    // === Reasoning Tests ===

    #[tokio::test]
    async fn test_text_reply_returned_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec![Ok(ModelReply::text("Nothing to delegate.").with_usage(7))]);
        let engine = engine(&dir, client.clone(), 100);
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let text = engine
            .execute_round(root.identity(), "sys", &[], "hello")
            .await
            .unwrap();
        assert_eq!(text, "Nothing to delegate.");
        assert_eq!(engine.meter().used(), 7);

        let request = &client.requests.lock()[0];
        assert_eq!(request.messages[0], ChatMessage::system("sys"));
        assert_eq!(request.objective(), Some("hello"));
        assert_eq!(request.tools.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_reply_yields_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec![Ok(ModelReply::text("   "))]);
        let engine = engine(&dir, client, 100);
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let text = engine.execute_round(root.identity(), "", &[], "x").await.unwrap();
        assert_eq!(text, NO_OUTPUT);
    }

    #[tokio::test]
    async fn test_history_window_bounds_request() {
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec![]);
        let engine = engine(&dir, client.clone(), 100);
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let mut history = crate::agent::History::new();
        for i in 0..4 {
            history.push("Boss", HistoryEvent::Objective(format!("q{i}")));
            history.push("Boss", HistoryEvent::Response(format!("a{i}")));
        }
        engine
            .execute_round(root.identity(), "sys", history.entries(), "now")
            .await
            .unwrap();

        let request = &client.requests.lock()[0];
        // system + 5 history entries + objective
        assert_eq!(request.messages.len(), 7);
        assert_eq!(request.messages[1], ChatMessage::assistant("a1"));
        assert_eq!(request.messages[2], ChatMessage::user("q2"));
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts_round() {
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec![Err(LlmError::RateLimited)]);
        let engine = engine(&dir, client, 100);
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let err = engine
            .execute_round(root.identity(), "", &[], "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamFailure);
    }

    // === Budget Tests ===

    #[tokio::test]
    async fn test_exhausted_budget_skips_client() {
        let dir = tempfile::tempdir().unwrap();
        let client = Scripted::new(vec![]);
        let engine = engine(&dir, client.clone(), 10);
        engine.meter().charge(10);
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let err = engine
            .execute_round(root.identity(), "", &[], "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BudgetExceeded);
        assert!(client.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_round_usage_exhausts_budget_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let reply = ModelReply::invocations(vec![delegate("W", "Analyst", "go")]).with_usage(50);
        let engine = engine(&dir, Scripted::new(vec![Ok(reply)]), 50);
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let err = engine
            .execute_round(root.identity(), "", &[], "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BudgetExceeded);
        assert_eq!(engine.registry().list(), vec!["Boss"]);
    }

    // === Dispatch Tests ===

    #[tokio::test]
    async fn test_bad_invocations_do_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Scripted::new(vec![]), 100);
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let invocations = vec![
            Invocation::raw("write_file", "{not json"),
            Invocation::new("delete_file", json!({"filename": "a"})),
            Invocation::new("read_file", json!({"filename": "missing.txt"})),
            Invocation::new("write_file", json!({"filename": "ok.txt", "content": "fine"})),
        ];
        let out = engine.dispatch(root.identity(), &invocations).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Error [MalformedInvocation]"));
        assert!(lines[1].starts_with("Error [UnknownOperation]"));
        assert!(lines[2].starts_with("Error [NotFound]"));
        assert_eq!(lines[3], "File 'ok.txt' written successfully (4 characters).");
    }

    #[tokio::test]
    async fn test_failed_invocations_are_logged_as_activity() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("session.log");
        let engine = Orchestrator::builder(dir.path())
            .client(Scripted::new(vec![]))
            .activity_log(&log_path)
            .build()
            .unwrap();
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        let invocations = vec![
            Invocation::new("read_file", json!({"filename": "missing.txt"})),
            Invocation::new("write_file", json!({"filename": "../out.txt", "content": "x"})),
        ];
        engine.dispatch(root.identity(), &invocations).await.unwrap();

        let entries = ActivityLog::read_entries(&log_path).unwrap();
        let failed: Vec<(&str, &str, &str)> = entries
            .iter()
            .map(|e| (e.agent.as_str(), e.action.as_str(), e.details.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(failed.len(), 2);
        assert_eq!((failed[0].0, failed[0].1), ("Boss", "read_file"));
        assert!(failed[0].2.starts_with("Error [NotFound]"));
        assert_eq!((failed[1].0, failed[1].1), ("Boss", "write_file"));
        assert!(failed[1].2.starts_with("Error [PathEscape]"));
    }

    #[tokio::test]
    async fn test_delegation_records_edge_and_returns_worker_result() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Scripted::new(vec![]), 100);
        let root = engine.spawn_coordinator("Coordinator", None).unwrap();

        let out = engine
            .dispatch(root.identity(), &[delegate("", "Generalist", "say hi")])
            .await
            .unwrap();
        assert!(out.starts_with("Result from Generalist (Worker_1):"));

        let graph = engine.snapshot();
        let ids: Vec<&str> = graph.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["Coordinator", "Worker_1"]);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(engine.registry().get("Worker_1").unwrap().identity.depth(), 1);
    }

    #[tokio::test]
    async fn test_depth_limit_aborts_batch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Orchestrator::builder(dir.path())
            .client(Scripted::new(vec![]))
            .max_depth(1)
            .build()
            .unwrap();
        let root = engine.spawn_coordinator("Boss", None).unwrap();

        engine
            .dispatch(root.identity(), &[delegate("W1", "r", "x")])
            .await
            .unwrap();
        let w1 = engine.registry().get("W1").unwrap().identity;

        let err = engine
            .dispatch(
                &w1,
                &[
                    delegate("W2", "r", "x"),
                    Invocation::new("write_file", json!({"filename": "after.txt", "content": "x"})),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DepthExceeded);
        assert!(engine.registry().get("W2").is_none());
        assert!(!dir.path().join("after.txt").exists());
    }

    // === Persistence Tests ===

    #[tokio::test]
    async fn test_persist_graph_default_location() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&dir, Scripted::new(vec![]), 100);
        engine.spawn_coordinator("Boss", None).unwrap();

        let path = engine.persist_graph().unwrap();
        assert_eq!(path, engine.workspace().root().join("graph.json"));
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["session_id"], "session_test");
        assert_eq!(value["nodes"][0]["id"], "Boss");
    }
}
