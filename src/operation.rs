//! Operation menu advertised to the language model
//!
//! The wire names and argument fields are fixed; existing prompts depend on
//! them. Requests are parsed into the closed [`Operation`] enum so the
//! engine's dispatch is an exhaustive match.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::SynergosError;
use crate::llm::{Invocation, ToolDefinition};

/// The four invocable operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    DelegateTask,
    ReadFile,
    WriteFile,
    ListFiles,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::DelegateTask,
        OperationKind::ReadFile,
        OperationKind::WriteFile,
        OperationKind::ListFiles,
    ];

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::DelegateTask => "delegate_task",
            OperationKind::ReadFile => "read_file",
            OperationKind::WriteFile => "write_file",
            OperationKind::ListFiles => "list_files",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            OperationKind::DelegateTask => {
                "Delegate a task to a specialized agent. Use it when the task needs \
                 specific expertise or can be decomposed."
            }
            OperationKind::ReadFile => {
                "Read a file from the workspace. Use it to analyse documents, logs or source files."
            }
            OperationKind::WriteFile => {
                "Write content to a file in the workspace. Use it to create reports, \
                 Markdown documents or output files."
            }
            OperationKind::ListFiles => {
                "List files and directories in the workspace. Use it to explore the project tree."
            }
        }
    }

    fn parameters(&self) -> Value {
        match self {
            OperationKind::DelegateTask => json!({
                "type": "object",
                "properties": {
                    "agent_name": {
                        "type": "string",
                        "description": "Unique name identifying the created agent"
                    },
                    "role": {
                        "type": "string",
                        "description": "Role or specialty of the agent (e.g. 'Log Analyst', 'Technical Writer')"
                    },
                    "instructions": {
                        "type": "string",
                        "description": "Detailed instructions for the delegated agent"
                    },
                    "system_prompt": {
                        "type": "string",
                        "description": "Optional system prompt defining the agent's context"
                    }
                },
                "required": ["agent_name", "role", "instructions"]
            }),
            OperationKind::ReadFile => json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "Name of the file to read (relative to the workspace)"
                    }
                },
                "required": ["filename"]
            }),
            OperationKind::WriteFile => json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "Name of the file to create or overwrite"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["filename", "content"]
            }),
            OperationKind::ListFiles => json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path to explore (empty for the root)",
                        "default": ""
                    }
                },
                "required": []
            }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Arguments of `delegate_task`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DelegateArgs {
    pub agent_name: String,
    pub role: String,
    pub instructions: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Deserialize)]
struct ReadArgs {
    filename: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    filename: String,
    content: String,
}

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default)]
    path: Option<String>,
}

/// A validated invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Delegate(DelegateArgs),
    ReadFile { filename: String },
    WriteFile { filename: String, content: String },
    ListFiles { path: String },
}

impl Operation {
    /// Validate a requested invocation against the menu
    pub fn parse(invocation: &Invocation) -> Result<Self, SynergosError> {
        let kind = OperationKind::from_name(&invocation.name)
            .ok_or_else(|| SynergosError::UnknownOperation(invocation.name.clone()))?;

        let raw = match invocation.arguments.trim() {
            "" => "{}",
            trimmed => trimmed,
        };
        let malformed = |e: serde_json::Error| SynergosError::MalformedInvocation {
            operation: invocation.name.clone(),
            reason: e.to_string(),
        };

        let operation = match kind {
            OperationKind::DelegateTask => {
                Operation::Delegate(serde_json::from_str(raw).map_err(malformed)?)
            }
            OperationKind::ReadFile => {
                let args: ReadArgs = serde_json::from_str(raw).map_err(malformed)?;
                Operation::ReadFile {
                    filename: args.filename,
                }
            }
            OperationKind::WriteFile => {
                let args: WriteArgs = serde_json::from_str(raw).map_err(malformed)?;
                Operation::WriteFile {
                    filename: args.filename,
                    content: args.content,
                }
            }
            OperationKind::ListFiles => {
                let args: ListArgs = serde_json::from_str(raw).map_err(malformed)?;
                Operation::ListFiles {
                    path: args.path.unwrap_or_default(),
                }
            }
        };
        Ok(operation)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Delegate(_) => OperationKind::DelegateTask,
            Operation::ReadFile { .. } => OperationKind::ReadFile,
            Operation::WriteFile { .. } => OperationKind::WriteFile,
            Operation::ListFiles { .. } => OperationKind::ListFiles,
        }
    }
}

/// Definitions of every operation, in menu order
pub fn menu() -> Vec<ToolDefinition> {
    OperationKind::ALL.iter().map(|k| k.definition()).collect()
}
