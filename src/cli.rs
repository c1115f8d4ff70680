use crate::engine::{Backend, ModuleRunner, PlaygroundClient, WasmRunner};
use crate::model::{
    Command, PlayEvent, RunConfig, SubmissionStatus, Target, Theme, DEFAULT_MAX_SOURCE_BYTES,
};
use crate::orchestrator::{self, Editor, Session};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output routing for stdout/stderr writer.
enum OutputLine {
    /// Written as-is, no newline added.
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = stdout.lock();
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(text) => {
                    let _ = out.write_all(text.as_bytes());
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "goplay-cli",
    version,
    about = "Go playground client: run, format and compile to WASM, with optional TUI"
)]
pub struct Cli {
    /// Base URL of the playground backend
    #[arg(long, env = "GOPLAY_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Source file to load ("-" or absent reads stdin in batch mode)
    pub file: Option<PathBuf>,

    /// Run the source on the backend and exit (no TUI)
    #[arg(long, conflicts_with_all = ["format", "compile"])]
    pub run: bool,

    /// Format the source and exit (no TUI)
    #[arg(long, conflicts_with = "compile")]
    pub format: bool,

    /// Compile the source, execute it if the target allows, and exit (no TUI)
    #[arg(long)]
    pub compile: bool,

    /// Compile target
    #[arg(long, value_enum, default_value_t = Target::Wasm)]
    pub target: Target,

    /// With --format, write the formatted source back to FILE
    #[arg(long, requires = "format")]
    pub write: bool,

    /// Print a JSON report instead of plain text (batch mode only)
    #[arg(long)]
    pub json: bool,

    /// Initial TUI color scheme
    #[arg(long, value_enum, default_value_t = Theme::Dark)]
    pub theme: Theme,

    /// Connection timeout for backend requests
    #[arg(long, default_value = "10s")]
    pub connect_timeout: humantime::Duration,

    /// Refuse to submit sources larger than this many bytes
    #[arg(long, default_value_t = DEFAULT_MAX_SOURCE_BYTES)]
    pub max_source_bytes: usize,

    /// Write logs to this file (TUI mode defaults to the user cache directory)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Batch action requested on the command line, if any.
    pub fn command(&self) -> Option<Command> {
        if self.run {
            Some(Command::Run)
        } else if self.format {
            Some(Command::Format)
        } else if self.compile {
            Some(Command::Compile)
        } else {
            None
        }
    }

    pub fn is_batch(&self) -> bool {
        self.command().is_some()
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && !args.is_batch() {
        return Err(anyhow::anyhow!(
            "--json needs one of --run, --format or --compile."
        ));
    }
    if args.write && !is_real_file(args.file.as_deref()) {
        return Err(anyhow::anyhow!("--write needs a FILE to write back to."));
    }

    if let Some(command) = args.command() {
        return run_batch(args, command).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        Err(anyhow::anyhow!(
            "built without TUI support; pass --run, --format or --compile."
        ))
    }
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RunConfig {
    RunConfig {
        base_url: args.base_url.clone(),
        user_agent: format!("goplay-cli/{}", env!("CARGO_PKG_VERSION")),
        connect_timeout: Some(Duration::from(args.connect_timeout)).filter(|d| !d.is_zero()),
        max_source_bytes: args.max_source_bytes,
        target: args.target,
    }
}

fn is_real_file(path: Option<&Path>) -> bool {
    path.is_some_and(|p| p != Path::new("-"))
}

/// Read the initial source from FILE, or stdin when FILE is absent or `-`.
pub fn read_source(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read source from stdin")?;
            Ok(buf)
        }
    }
}

/// Run one submission without the TUI and print its outcome.
async fn run_batch(args: Cli, command: Command) -> Result<()> {
    let cfg = build_config(&args);
    let mut editor = read_source(args.file.as_deref())?;
    let original = editor.clone();

    let backend: Arc<dyn Backend> = Arc::new(PlaygroundClient::new(&cfg)?);
    let runner: Arc<dyn ModuleRunner> = Arc::new(WasmRunner::new()?);
    let mut session = Session::new(cfg.max_source_bytes);
    let operation = command.into_operation(cfg.target);

    let Some(submission) = session.begin(operation, &editor) else {
        return Err(anyhow::anyhow!("{}", session.display().error));
    };
    let id = submission.id;

    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<PlayEvent>();
    let handle = tokio::spawn(orchestrator::execute_submission(
        backend, runner, submission, evt_tx,
    ));

    // Progress goes to stderr; the channel closes once the submission is done.
    while let Some(ev) = evt_rx.recv().await {
        if args.json {
            continue;
        }
        match ev {
            PlayEvent::Stage { message, .. } => {
                let _ = out_tx.send(OutputLine::Stderr(message));
            }
            PlayEvent::Info(info) => {
                let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
            }
            PlayEvent::Completed { .. } => {}
        }
    }

    let outcome = handle.await.context("submission task failed")?;
    let finished = session
        .finish(id, outcome, &mut editor)
        .context("submission was no longer pending")?;

    let written = match args.file.as_deref() {
        Some(path) if args.write && editor.text() != original => {
            std::fs::write(path, editor.text())
                .with_context(|| format!("failed to write {}", path.display()))?;
            Some(path)
        }
        _ => None,
    };

    if args.json {
        let report = crate::text_summary::build_report(
            &cfg.base_url,
            &finished,
            session.display(),
            &editor,
            written,
        );
        let mut out = serde_json::to_string_pretty(&report)?;
        out.push('\n');
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary =
            crate::text_summary::build_text_summary(&finished, session.display(), &editor, written);
        if !summary.stdout.is_empty() {
            let _ = out_tx.send(OutputLine::Stdout(summary.stdout));
        }
        for line in summary.stderr {
            let _ = out_tx.send(OutputLine::Stderr(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;

    if finished.status == SubmissionStatus::Failed {
        return Err(anyhow::anyhow!(
            "{} failed: {}",
            finished.operation.name(),
            session.display().status
        ));
    }
    Ok(())
}
