//! Worker - deterministic specialist created by delegation

use async_trait::async_trait;
use tracing::{debug, info};

use crate::agent::{
    preview, ExecutionUnit, HistoryEntry, HistoryEvent, UnitContext, UnitCore, UnitIdentity,
};
use crate::error::SynergosError;
use crate::specialty::{self, InputFile, Specialty};
use crate::storage::StorageError;

fn default_system_prompt(role: &str) -> String {
    format!(
        "You are a specialised Worker agent in the role: {role}.\n\n\
         You received a specific mission. Use your skills to:\n\
         - analyse the information provided\n\
         - process the required data\n\
         - produce a clear, structured result\n\n\
         If information is missing or the instructions are unclear, say so in your answer."
    )
}

/// A unit that carries out one delegated objective without calling the
/// language model
///
/// The pipeline is: pick file names out of the instructions, read the ones
/// that exist, treat missing report-like names as output targets, run the
/// role's transform, write what it produced, and summarise.
#[derive(Debug)]
pub struct Worker {
    core: UnitCore,
    specialty: Specialty,
}

/// Files touched while processing one objective
#[derive(Debug, Default)]
struct Outcome {
    inputs: Vec<InputFile>,
    targets: Vec<String>,
    outputs: Vec<String>,
    issues: Vec<String>,
}

impl Worker {
    /// Build the worker and record it in the session graph
    pub(crate) fn new(
        identity: UnitIdentity,
        system_prompt: Option<String>,
        context: UnitContext,
    ) -> Result<Self, SynergosError> {
        context.register(&identity)?;
        let specialty = Specialty::classify(identity.role());
        let prompt = system_prompt.unwrap_or_else(|| default_system_prompt(identity.role()));

        debug!(agent = %identity.name(), ?specialty, "Worker specialty");
        Ok(Self {
            core: UnitCore::new(identity, prompt, context),
            specialty,
        })
    }

    pub fn specialty(&self) -> Specialty {
        self.specialty
    }

    fn gather(&self, objective: &str) -> Outcome {
        let workspace = &self.core.context.workspace;
        let mut outcome = Outcome::default();

        for name in specialty::extract_filenames(objective) {
            match workspace.read(&name) {
                Ok(content) => {
                    self.core.log_action("read_file", Some(&name));
                    outcome.inputs.push(InputFile::new(name, content));
                }
                Err(StorageError::NotFound(_)) if specialty::is_report_target(&name) => {
                    outcome.targets.push(name);
                }
                Err(e) => {
                    let err = SynergosError::from(e);
                    outcome.issues.push(format!("{name}: {}", err.to_result_text()));
                }
            }
        }
        outcome
    }

    fn write(&self, name: &str, content: &str, outcome: &mut Outcome) {
        match self.core.context.workspace.write(name, content) {
            Ok(receipt) => {
                self.core.log_action("write_file", Some(&receipt.to_string()));
                outcome.outputs.push(receipt.path);
            }
            Err(e) => {
                let err = SynergosError::from(e);
                outcome.issues.push(format!("{name}: {}", err.to_result_text()));
            }
        }
    }

    fn summarise(&self, objective: &str, outcome: &Outcome, report: &specialty::Report) -> String {
        let identity = &self.core.identity;
        let list = |items: &[String]| {
            if items.is_empty() {
                "none".to_string()
            } else {
                items.join(", ")
            }
        };
        let inputs: Vec<String> = outcome
            .inputs
            .iter()
            .map(|i| format!("{} ({} bytes)", i.name, i.content.len()))
            .collect();

        let mut out = format!(
            "Result from {} ({}):\n\nMission: {}\n\nInputs read: {}\nOutputs written: {}\n",
            identity.role(),
            identity.name(),
            objective,
            list(&inputs),
            list(&outcome.outputs)
        );
        if !report.highlights.is_empty() {
            out.push_str("\nFindings:\n");
            for line in &report.highlights {
                out.push_str(&format!("- {line}\n"));
            }
        }
        if !outcome.issues.is_empty() {
            out.push_str("\nIssues:\n");
            for issue in &outcome.issues {
                out.push_str(&format!("- {issue}\n"));
            }
        }
        if outcome.targets.is_empty() {
            out.push('\n');
            out.push_str(&report.body);
        }
        out
    }
}

#[async_trait]
impl ExecutionUnit for Worker {
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
        self.core.remember(HistoryEvent::Objective(objective.to_string()));
        self.core
            .log_action("task received", Some(&preview(objective, 200)));

        let mut outcome = self.gather(objective);
        let report = specialty::analyse(self.specialty, &outcome.inputs);

        for derived in &report.derived {
            self.write(&derived.name, &derived.content, &mut outcome);
        }
        if let Some(target) = outcome.targets.first().cloned() {
            self.write(&target, &report.body, &mut outcome);
        }

        let summary = self.summarise(objective, &outcome, &report);
        info!(
            agent = %self.core.identity.name(),
            inputs = outcome.inputs.len(),
            outputs = outcome.outputs.len(),
            issues = outcome.issues.len(),
            "Task completed"
        );
        self.core.log_action(
            "task completed",
            Some(&format!(
                "{} inputs, {} outputs",
                outcome.inputs.len(),
                outcome.outputs.len()
            )),
        );
        self.core.remember(HistoryEvent::Response(summary.clone()));
        summary
    }
}
