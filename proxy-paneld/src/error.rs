use thiserror::Error;

/// Failures surfaced by the control surface.
#[derive(Debug, Error)]
pub enum PanelError {
    /// A collaborator (supervisor, store, version feed, ...) failed. Passed through as-is.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    /// The database was replaced but the proxy could not be restarted against it.
    #[error("database imported but proxy restart failed: {restart:#}")]
    InconsistentState { restart: anyhow::Error },

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type PanelResult<T> = std::result::Result<T, PanelError>;
