pub mod capture;
pub mod enrichment;
pub mod generation;
pub mod insights;
pub mod orchestrator;
pub mod schema;

pub use orchestrator::{ConsultError, ConsultPipeline, GenerationOutcome};
