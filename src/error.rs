use thiserror::Error;

/// Errors reported while mounting or driving a visualization.
#[derive(Debug, Error)]
pub enum VizError {
    /// The host cannot hand out a drawing surface (no terminal, no display).
    #[error("render context unavailable: {0}")]
    ContextUnavailable(String),
    /// The host cannot deliver frame callbacks.
    #[error("frame source unavailable: {0}")]
    FrameSourceUnavailable(String),
    /// I/O failure while presenting or reading host input.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = VizError> = std::result::Result<T, E>;
