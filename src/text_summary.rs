//! Text and JSON summaries for batch mode.

use crate::model::{Operation, Report, Submission, SubmissionStatus};
use crate::orchestrator::Display;
use std::path::Path;

/// Pre-split output for batch mode.
pub(crate) struct TextSummary {
    /// Written to stdout verbatim.
    pub stdout: String,
    /// Written to stderr, one line each.
    pub stderr: Vec<String>,
}

/// Build the batch output for a finished submission.
///
/// `editor_text` is the buffer after rendering; for a successful format it is
/// the formatted source and goes to stdout unless it was written back to a file.
pub(crate) fn build_text_summary(
    submission: &Submission,
    display: &Display,
    editor_text: &str,
    written: Option<&Path>,
) -> TextSummary {
    let mut stdout = display.output.clone();
    let mut stderr = Vec::new();

    let formatted = submission.operation == Operation::Format
        && submission.status == SubmissionStatus::Succeeded;
    if formatted {
        match written {
            Some(path) => stderr.push(format!("Wrote {}", path.display())),
            None => stdout = editor_text.to_string(),
        }
    }

    if !display.error.is_empty() {
        stderr.extend(display.error.lines().map(str::to_string));
    }
    stderr.push(format!("[{}] {}", submission.operation.name(), display.status));

    TextSummary { stdout, stderr }
}

/// Build the JSON report for a finished submission.
pub(crate) fn build_report(
    base_url: &str,
    submission: &Submission,
    display: &Display,
    editor_text: &str,
    written: Option<&Path>,
) -> Report {
    let formatted = submission.operation == Operation::Format
        && submission.status == SubmissionStatus::Succeeded;
    Report {
        timestamp_utc: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into()),
        base_url: base_url.to_string(),
        operation: submission.operation.name().to_string(),
        target: submission.operation.target(),
        status: submission.status,
        output: if formatted {
            editor_text.to_string()
        } else {
            display.output.clone()
        },
        error: display.error.clone(),
        message: display.status.clone(),
        written: written.map(|p| p.display().to_string()),
    }
}
