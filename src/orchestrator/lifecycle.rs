//! Submission lifecycle state machine.
//!
//! A `Session` is either Ready or Busy with exactly one pending submission.
//! `begin` is a no-op while Busy; `finish` renders the outcome and returns to
//! Ready. Rendering is the only place the editor buffer is written.

use crate::engine::normalize_line_endings;
use crate::model::{
    Execution, Failure, Operation, Outcome, Submission, SubmissionStatus, Target,
};
use serde::Serialize;

pub const WASI_RUNTIME_MESSAGE: &str =
    "WASI target selected. A WASI runtime is required to execute this module (not included).";
pub const NO_ENTRY_POINT_MESSAGE: &str = "No entry point found in wasm exports.";

/// Text access to whatever holds the user's source.
pub trait Editor {
    fn text(&self) -> String;
    fn set_text(&mut self, text: &str);
}

impl Editor for String {
    fn text(&self) -> String {
        self.clone()
    }

    fn set_text(&mut self, text: &str) {
        text.clone_into(self);
    }
}

/// The visible text regions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Display {
    pub output: String,
    pub error: String,
    pub status: String,
}

pub struct Session {
    pending: Option<Submission>,
    next_id: u64,
    display: Display,
    max_source_bytes: usize,
}

impl Session {
    pub fn new(max_source_bytes: usize) -> Self {
        Self {
            pending: None,
            next_id: 0,
            display: Display {
                status: "Ready".into(),
                ..Default::default()
            },
            max_source_bytes,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending().is_some()
    }

    pub fn pending(&self) -> Option<&Submission> {
        self.pending.as_ref()
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    /// Update the status line with progress of the pending submission.
    pub fn set_stage(&mut self, id: u64, message: &str) {
        if self.pending.as_ref().is_some_and(|p| p.id == id) {
            self.display.status = message.to_string();
        }
    }

    /// Start a submission from the editor's current text.
    ///
    /// Returns `None` without touching anything while another submission is
    /// pending, and `None` with an error shown if the source is over the size
    /// limit.
    pub fn begin(&mut self, operation: Operation, editor: &dyn Editor) -> Option<Submission> {
        if let Some(p) = &self.pending {
            tracing::debug!(
                pending = p.id,
                rejected = operation.name(),
                "ignoring action while busy"
            );
            return None;
        }

        let source = normalize_line_endings(&editor.text());
        if source.len() > self.max_source_bytes {
            self.display.output.clear();
            self.display.error = format!(
                "Source is {} bytes; the limit is {} bytes.",
                source.len(),
                self.max_source_bytes
            );
            self.display.status = "Rejected.".into();
            return None;
        }

        self.next_id += 1;
        self.display.output.clear();
        self.display.error.clear();
        self.display.status = operation.pending_message().into();

        let submission = Submission {
            id: self.next_id,
            operation,
            source,
            status: SubmissionStatus::Pending,
        };
        tracing::info!(
            id = submission.id,
            operation = operation.name(),
            bytes = submission.source.len(),
            "submission started"
        );
        self.pending = Some(submission.clone());
        Some(submission)
    }

    /// Render `outcome` for the pending submission `id` and return to Ready.
    ///
    /// Completions for anything but the pending submission are dropped.
    pub fn finish(
        &mut self,
        id: u64,
        outcome: Outcome,
        editor: &mut dyn Editor,
    ) -> Option<Submission> {
        if !self.pending.as_ref().is_some_and(|p| p.id == id) {
            tracing::warn!(id, "completion for a submission that is not pending");
            return None;
        }
        let mut submission = self.pending.take()?;
        submission.status = outcome.status();
        tracing::info!(
            id,
            operation = submission.operation.name(),
            status = ?submission.status,
            "submission finished"
        );
        render(&mut self.display, outcome, editor);
        Some(submission)
    }
}

fn render(display: &mut Display, outcome: Outcome, editor: &mut dyn Editor) {
    match outcome {
        Outcome::Ran(resp) => {
            display.status = if resp.error.is_empty() {
                "Finished.".into()
            } else {
                "Finished with errors.".into()
            };
            display.output = resp.output;
            display.error = resp.error;
        }
        Outcome::Formatted(text) => {
            editor.set_text(&text);
            display.status = "Formatted.".into();
        }
        Outcome::Executed(Execution::Completed { entry, aborted }) => {
            display.output = format!(
                "Program executed via `{}` (no stdout capture configured).",
                entry.export_name()
            );
            if aborted {
                display.error = "abort called".into();
            }
            display.status = "Finished.".into();
        }
        Outcome::Executed(Execution::NoEntryPoint) => {
            display.error = NO_ENTRY_POINT_MESSAGE.into();
            display.status = "Finished.".into();
        }
        Outcome::NeedsRuntime(target) => {
            display.output = match target {
                Target::Wasi => WASI_RUNTIME_MESSAGE.into(),
                Target::Wasm => "This target cannot be executed here.".into(),
            };
            display.status = "Compiled.".into();
        }
        Outcome::Failed(failure) => render_failure(display, failure),
    }
}

fn render_failure(display: &mut Display, failure: Failure) {
    match failure {
        Failure::Transport(msg) => {
            display.error = format!("Fetch error: {msg}");
            display.status = "Request failed.".into();
        }
        Failure::Application { operation, message } => {
            display.error = message;
            display.status = match operation {
                Operation::Run => "Run failed.".into(),
                Operation::Format => "Format failed.".into(),
                Operation::Compile(_) => "Compile failed.".into(),
            };
        }
        Failure::Instantiation(msg) => {
            display.error = format!("Instantiation error: {msg}");
            display.status = "Execution failed.".into();
        }
        Failure::Runtime(msg) => {
            display.error = format!("Runtime error: {msg}");
            display.status = "Execution failed.".into();
        }
    }
}
