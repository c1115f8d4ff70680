mod cli;
mod engine;
mod model;
mod orchestrator;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn log_filter(args: &cli::Cli) -> EnvFilter {
    if args.debug {
        EnvFilter::new("debug,hyper=warn,hyper_util=warn,h2=warn,reqwest=warn,rustls=warn,cranelift_codegen=warn,wasmtime=warn")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Default log location for TUI mode, where stderr belongs to the terminal UI.
fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("goplay-cli").join("goplay.log"))
}

fn init_tracing(args: &cli::Cli) -> Result<()> {
    let filter = log_filter(args);
    let log_path = match &args.log_file {
        Some(p) => Some(p.clone()),
        None if !args.is_batch() && cfg!(feature = "tui") => default_log_path(),
        None => None,
    };

    match log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(&args)?;
    cli::run(args).await
}
