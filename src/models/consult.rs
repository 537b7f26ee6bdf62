use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ConsultStatus, ReportVariant};

/// One clinical-encounter record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consult {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub status: ConsultStatus,
    /// None until the practitioner picks a report type; frozen once finalized.
    pub report_variant: Option<ReportVariant>,
    /// Append-only narrative: transcription or typed form, plus any
    /// diagnostic-finding appendices under their section marker.
    pub raw_input: String,
    /// Set only when the capture mode was an audio recording.
    pub audio_duration_seconds: Option<f64>,
    pub created_at: NaiveDateTime,
    /// Non-null iff status == finalized.
    pub finalized_at: Option<NaiveDateTime>,
}

impl Consult {
    pub fn is_finalized(&self) -> bool {
        self.status == ConsultStatus::Finalized
    }
}

/// A consult together with every variant's stored note sections, as
/// returned to the UI by `get_consult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultView {
    pub consult: Consult,
    pub notes: Vec<NoteGroup>,
}

impl ConsultView {
    /// Sections stored for the consult's live variant, if any.
    pub fn current_note(&self) -> Option<&NoteGroup> {
        let variant = self.consult.report_variant?;
        self.notes.iter().find(|g| g.variant == variant)
    }
}

/// All stored sections for one report variant, in schema order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteGroup {
    pub variant: ReportVariant,
    pub sections: Vec<NoteSection>,
}

impl NoteGroup {
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.content.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSection {
    pub name: String,
    pub content: String,
}
