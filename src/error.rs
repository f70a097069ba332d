use thiserror::Error;

/// Errors surfaced by the noise schedule.
#[derive(Debug, Error, PartialEq)]
pub enum DiffusionError {
    #[error("invalid schedule configuration: {0}")]
    InvalidConfiguration(String),

    #[error("time step {time_step} is outside the valid range [{min}, {max})")]
    InvalidTimeStep { time_step: i64, min: i64, max: i64 },

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<i64>, actual: Vec<i64> },
}

pub type Result<T> = std::result::Result<T, DiffusionError>;
