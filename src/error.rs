use thiserror::Error;

/// Errors raised while designing a band-pass filter. These indicate a bad
/// configuration, not a runtime condition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DesignError {
    #[error("center frequency {center} is outside (0, 0.5) cycles/sample")]
    CenterOutOfRange { center: f64 },
    #[error("bandwidth {bandwidth} must be positive and finite")]
    InvalidBandwidth { bandwidth: f64 },
    #[error("stage count {stages} must be even and at least 2")]
    InvalidOrder { stages: usize },
    #[error("stage {stage} roots are neither real nor a conjugate pair")]
    UnpairedRoots { stage: usize },
    #[error("band at {center} needs scale {scale:e}, which the sample type cannot hold")]
    ScaleUnderflow { scale: f64, center: f64 },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("filter design failed: {0}")]
    Design(#[from] DesignError),
    #[error("note {note} is outside the {notes}-note table")]
    NoteOutOfRange { note: usize, notes: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
