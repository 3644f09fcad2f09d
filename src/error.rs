//! Error taxonomy for a single job.

use thiserror::Error;

/// Everything that can stop a job. None of these is fatal to the app.
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad form input, nothing was invoked
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Another job still holds the session
    #[error("A job is already running")]
    Busy,

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Conversion failed: {0}")]
    Conversion(String),

    /// A required external binary could not be found or started
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
