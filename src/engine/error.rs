use thiserror::Error;

/// Failure of a backend call.
#[derive(Debug, Error)]
pub enum PlayError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// Non-success status. The body is the backend's own error text.
    #[error("{body}")]
    Application { status: u16, body: String },
}

/// Failure while executing a compiled module.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0:#}")]
    Instantiate(anyhow::Error),

    #[error("{0:#}")]
    Runtime(anyhow::Error),
}
