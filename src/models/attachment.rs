use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AttachmentStatus, DocumentKind};

/// One uploaded diagnostic document. Created on upload, mutated once by the
/// analysis step, never deleted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticAttachment {
    pub id: Uuid,
    pub consult_id: Uuid,
    /// Object-storage path of the original file bytes.
    pub storage_ref: String,
    pub kind: DocumentKind,
    pub status: AttachmentStatus,
    pub analysis: Option<DocumentAnalysis>,
    pub created_at: NaiveDateTime,
}

/// Structured result from the document-analysis service.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentAnalysis {
    pub lab_findings: Vec<LabFinding>,
    /// Ordered free-text findings for imaging-style documents.
    pub imaging_findings: Vec<String>,
}

impl DocumentAnalysis {
    pub fn is_empty(&self) -> bool {
        self.lab_findings.is_empty() && self.imaging_findings.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabFinding {
    pub analyte: String,
    pub value: String,
    pub unit: Option<String>,
    /// e.g. "high", "low"; None when within reference range.
    pub flag: Option<String>,
}

/// Post-finalization output generated from the locked note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedArtifact {
    pub id: Uuid,
    pub consult_id: Uuid,
    pub kind: super::enums::ArtifactKind,
    pub content: String,
    pub created_at: NaiveDateTime,
}
