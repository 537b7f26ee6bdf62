//! Derived-artifact requests: case summaries, client education and
//! discharge notes generated from the consult narrative.
//!
//! These run as a side pipeline next to the note itself; they are the
//! only generation allowed on a finalized consult and their output is
//! appended as separate artifact rows, never merged into the note.

use uuid::Uuid;

use crate::models::enums::ArtifactKind;
use crate::models::PatientSnapshot;
use crate::pipeline::generation::{CaseAnalysisRequest, CaseMessage, PatientContext};

/// Follow-up requests carry at most this much of the narrative as context.
pub const CONTEXT_SNIPPET_MAX: usize = 500;

/// Only the last N conversation messages are sent along.
pub const HISTORY_WINDOW: usize = 4;

/// Each history message is trimmed to this many characters.
pub const HISTORY_MESSAGE_MAX: usize = 200;

/// The canned follow-up question for each artifact kind. A case summary is
/// the initial analysis and carries no question.
pub fn question_for(kind: ArtifactKind) -> Option<&'static str> {
    match kind {
        ArtifactKind::CaseSummary => None,
        ArtifactKind::ClientEducation => Some(
            "Write plain-language client education about this case: what the condition is, \
             what was done today, and what the owner should watch for at home.",
        ),
        ArtifactKind::DischargeNote => Some(
            "Write discharge instructions for the owner: medications with doses, activity \
             restrictions, diet, and when to return or call.",
        ),
    }
}

/// Assemble the analyze-case request, applying the trimming rules before
/// anything leaves the device: follow-ups carry a bounded narrative
/// snippet, and only a short window of trimmed history.
pub fn build_case_request(
    consult_id: Uuid,
    raw_input: &str,
    patient: Option<&PatientSnapshot>,
    question: Option<&str>,
    history: &[CaseMessage],
) -> CaseAnalysisRequest {
    let transcription = match question {
        // Initial analysis gets the whole narrative.
        None => raw_input.to_string(),
        Some(_) => truncate_chars(raw_input, CONTEXT_SNIPPET_MAX),
    };

    CaseAnalysisRequest {
        consult_id,
        transcription,
        patient: patient.map(PatientContext::from_snapshot),
        follow_up_question: question.map(str::to_string),
        previous_messages: trim_history(history),
    }
}

fn trim_history(history: &[CaseMessage]) -> Vec<CaseMessage> {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    history[start..]
        .iter()
        .map(|m| CaseMessage {
            role: m.role.clone(),
            content: truncate_chars(&m.content, HISTORY_MESSAGE_MAX),
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}...")
}
