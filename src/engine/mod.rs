mod client;
mod error;
mod source;
mod wasm;

pub use client::PlaygroundClient;
pub use error::{ExecError, PlayError};
pub use source::normalize_line_endings;
pub use wasm::{ModuleRunner, WasmRunner};

use crate::model::{RunResponse, Target};
use async_trait::async_trait;
use bytes::Bytes;

/// The three backend operations. `PlaygroundClient` is the HTTP implementation.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn run(&self, source: &str) -> Result<RunResponse, PlayError>;

    async fn format(&self, source: &str) -> Result<String, PlayError>;

    /// Returns the compiled module bytes.
    async fn compile(&self, source: &str, target: Target) -> Result<Bytes, PlayError>;
}
