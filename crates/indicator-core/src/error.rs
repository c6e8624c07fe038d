use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient sources: {got} responded, {min} required")]
    InsufficientSources { got: usize, min: usize },

    #[error("Low confidence: {confidence:.2} below minimum {min:.2}")]
    LowConfidence { confidence: f64, min: f64 },

    #[error("Source error: {0}")]
    Source(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

pub type Result<T> = std::result::Result<T, UpdateError>;
