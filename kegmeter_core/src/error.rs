use thiserror::Error;

/// Wiring mistakes caught when the control loop is assembled.
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing load cells")]
    MissingLoadCells,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
