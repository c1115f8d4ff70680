use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source shown in a fresh editor when no file is given.
pub const DEFAULT_SOURCE: &str = r#"package main

import "fmt"

func main() {
    fmt.Println("Hello TinyGo WASM")
}
"#;

/// Matches the backend's request body read limit.
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 5 << 20;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout: Option<Duration>,
    pub max_source_bytes: usize,
    pub target: Target,
}

/// Binary flavor requested from the compile endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Wasm,
    Wasi,
}

impl Target {
    pub fn as_query_str(self) -> &'static str {
        match self {
            Target::Wasm => "wasm",
            Target::Wasi => "wasi",
        }
    }

    /// Whether a module of this flavor can be executed in-process.
    /// WASI modules need a system-interface runtime that is not bundled.
    pub fn is_executable(self) -> bool {
        matches!(self, Target::Wasm)
    }

    pub fn toggled(self) -> Self {
        match self {
            Target::Wasm => Target::Wasi,
            Target::Wasi => Target::Wasm,
        }
    }
}

/// Color scheme of the terminal UI. Toggling twice is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

/// User-facing action, before the compile target is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Format,
    Compile,
}

impl Command {
    pub fn into_operation(self, target: Target) -> Operation {
        match self {
            Command::Run => Operation::Run,
            Command::Format => Operation::Format,
            Command::Compile => Operation::Compile(target),
        }
    }
}

/// Backend action a submission invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Run,
    Format,
    Compile(Target),
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Run => "run",
            Operation::Format => "format",
            Operation::Compile(_) => "compile",
        }
    }

    /// Status line shown while the submission is pending.
    pub fn pending_message(self) -> &'static str {
        match self {
            Operation::Run => "Running...",
            Operation::Format => "Formatting...",
            Operation::Compile(_) => "Compiling...",
        }
    }

    pub fn target(self) -> Option<Target> {
        match self {
            Operation::Compile(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Succeeded,
    Failed,
}

/// One request/response cycle triggered by a user action.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: u64,
    pub operation: Operation,
    /// Editor text with line endings normalized to LF.
    pub source: String,
    pub status: SubmissionStatus,
}

/// Body of a `/run` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
}

/// How the produced module was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Start,
    Main,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 2] = [EntryPoint::Start, EntryPoint::Main];

    pub fn export_name(self) -> &'static str {
        match self {
            EntryPoint::Start => "_start",
            EntryPoint::Main => "main",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Completed { entry: EntryPoint, aborted: bool },
    NoEntryPoint,
}

/// Why a submission failed, classified for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The request itself failed or the response could not be read.
    Transport(String),
    /// The backend answered with a non-success status; `message` is the body.
    Application { operation: Operation, message: String },
    Instantiation(String),
    /// The entry point trapped.
    Runtime(String),
}

/// Terminal result of a submission, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ran(RunResponse),
    Formatted(String),
    Executed(Execution),
    /// The compiled flavor cannot be executed here. Not a backend failure.
    NeedsRuntime(Target),
    Failed(Failure),
}

impl Outcome {
    pub fn status(&self) -> SubmissionStatus {
        match self {
            Outcome::Failed(_) | Outcome::Executed(Execution::NoEntryPoint) => {
                SubmissionStatus::Failed
            }
            Outcome::Ran(r) if !r.error.is_empty() => SubmissionStatus::Failed,
            _ => SubmissionStatus::Succeeded,
        }
    }
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone)]
pub enum PlayEvent {
    /// Progress of the pending submission.
    Stage { id: u64, message: String },
    Info(InfoEvent),
    Completed { id: u64, outcome: Outcome },
}

/// Notices emitted outside a submission's own progress.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Busy { rejected: Operation },
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Busy { rejected } => {
                format!("Busy: ignored {} while a request is in flight", rejected.name())
            }
        }
    }
}

/// Machine-readable summary of one finished submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub timestamp_utc: String,
    pub base_url: String,
    pub operation: String,
    #[serde(default)]
    pub target: Option<Target>,
    pub status: SubmissionStatus,
    pub output: String,
    pub error: String,
    pub message: String,
    /// Present when a format result was written back to the input file.
    #[serde(default)]
    pub written: Option<String>,
}
