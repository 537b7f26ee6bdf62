use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::GenerationError;
use crate::models::enums::{DocumentKind, ReportVariant};
use crate::models::{DocumentAnalysis, PatientSnapshot};

/// Stateless seam over the three external services: transcribe,
/// generate-note, analyze-document, plus the case-analysis endpoint used
/// for derived artifacts. Implementations perform exactly one
/// request/response per call; retries belong to the caller.
pub trait GenerationClient {
    fn transcribe(&self, audio: &[u8], consult_id: &Uuid) -> Result<String, GenerationError>;

    /// A successful result always carries the full section set for the
    /// requested variant; applying it overwrites the variant's fields
    /// atomically.
    fn generate_note(
        &self,
        consult_id: &Uuid,
        raw_input: &str,
        variant: ReportVariant,
        patient: Option<&PatientContext>,
    ) -> Result<GeneratedNote, GenerationError>;

    fn analyze_document(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
    ) -> Result<DocumentAnalysis, GenerationError>;

    /// Free-text case analysis over the consult narrative (summaries,
    /// client education, discharge instructions).
    fn analyze_case(&self, request: &CaseAnalysisRequest) -> Result<String, GenerationError>;
}

/// Variant-shaped output of the note-generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedNote {
    pub variant: ReportVariant,
    pub sections: Vec<GeneratedSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub heading: String,
    pub content: String,
}

/// Patient identity sent along with generation requests so the note can be
/// conditioned on signalment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientContext {
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub date_of_birth: Option<String>,
}

impl PatientContext {
    pub fn from_snapshot(snapshot: &PatientSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            species: snapshot.species.clone(),
            breed: snapshot.breed.clone(),
            date_of_birth: snapshot.date_of_birth.map(|d| d.to_string()),
        }
    }
}

/// One prior exchange in a case-analysis conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseAnalysisRequest {
    pub consult_id: Uuid,
    pub transcription: String,
    pub patient: Option<PatientContext>,
    /// None requests the initial case summary; Some is a follow-up.
    pub follow_up_question: Option<String>,
    pub previous_messages: Vec<CaseMessage>,
}
