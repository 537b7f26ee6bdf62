pub mod http;
pub mod types;

pub use http::*;
pub use types::*;

use thiserror::Error;

/// Failure taxonomy of the three external generation services. None of
/// these carry an internal retry; the orchestrator decides what happens
/// next per its policy (degrade, skip file, or surface to the user).
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Expected business outcome, not a system fault. The message is the
    /// service's verbatim explanation and is shown to the user as-is.
    #[error("{0}")]
    InsufficientClinicalData(String),

    #[error("Note generation failed: {0}")]
    GenerationFailed(String),

    #[error("Document analysis failed: {0}")]
    AnalysisFailed(String),
}
