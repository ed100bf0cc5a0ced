//! Run configuration read from the environment

use std::path::PathBuf;
use std::str::FromStr;

use crate::agent::DEFAULT_MAX_DEPTH;
use crate::budget::DEFAULT_TOKEN_BUDGET;
use crate::llm::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const ENV_WORKSPACE: &str = "WORKSPACE_DIR";
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "SYNERGOS_MODEL";
pub const ENV_TOKEN_BUDGET: &str = "SYNERGOS_TOKEN_BUDGET";
pub const ENV_MAX_DEPTH: &str = "SYNERGOS_MAX_DEPTH";
pub const ENV_HISTORY_WINDOW: &str = "SYNERGOS_HISTORY_WINDOW";

pub const DEFAULT_WORKSPACE: &str = "./workspace";
/// Recent history entries handed to the model each round
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Everything needed to start a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynergosConfig {
    pub workspace: PathBuf,
    /// Absent means the offline client is used
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub token_budget: u64,
    pub max_depth: u32,
    pub history_window: usize,
    /// Defaults to `<workspace>/graph.json`
    pub graph_path: Option<PathBuf>,
    /// Defaults to `<workspace>/session.log`
    pub activity_path: Option<PathBuf>,
}

impl Default for SynergosConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from(DEFAULT_WORKSPACE),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            token_budget: DEFAULT_TOKEN_BUDGET,
            max_depth: DEFAULT_MAX_DEPTH,
            history_window: DEFAULT_HISTORY_WINDOW,
            graph_path: None,
            activity_path: None,
        }
    }
}

impl SynergosConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source; unset or unparsable values keep
    /// their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Self {
            workspace: text(ENV_WORKSPACE)
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace),
            api_key: text(ENV_API_KEY),
            base_url: text(ENV_BASE_URL).unwrap_or(defaults.base_url),
            model: text(ENV_MODEL).unwrap_or(defaults.model),
            token_budget: parsed::<u64>(text(ENV_TOKEN_BUDGET))
                .filter(|v| *v > 0)
                .unwrap_or(defaults.token_budget),
            max_depth: parsed::<u32>(text(ENV_MAX_DEPTH)).unwrap_or(defaults.max_depth),
            history_window: parsed::<usize>(text(ENV_HISTORY_WINDOW)).unwrap_or(defaults.history_window),
            graph_path: None,
            activity_path: None,
        }
    }

    pub fn graph_path(&self) -> PathBuf {
        self.graph_path
            .clone()
            .unwrap_or_else(|| self.workspace.join("graph.json"))
    }

    pub fn activity_path(&self) -> PathBuf {
        self.activity_path
            .clone()
            .unwrap_or_else(|| self.workspace.join("session.log"))
    }

    /// Whether runs use the deterministic offline client
    pub fn is_offline(&self) -> bool {
        self.api_key.is_none()
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse::<T>().ok())
}
