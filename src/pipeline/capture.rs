//! Capture coordinator: the two ways raw input enters a consult.
//!
//! A recording session accumulates audio chunks (each reported with its
//! duration by the audio layer) and enforces the minimum length at stop
//! time; a typed form composes its fields into one narrative string with
//! fixed section labels. Either path ends in a single raw-input string
//! handed to the consult pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::enums::ReportVariant;

/// Recordings shorter than this are rejected at stop time.
pub const MIN_RECORDING_SECONDS: f64 = 3.0;

#[derive(Error, Debug)]
pub enum CaptureError {
    /// User-correctable; the session stays open so recording can continue.
    #[error("Recording too short: {recorded:.1}s (minimum {MIN_RECORDING_SECONDS}s)")]
    TooShort { recorded: f64 },

    #[error("Presenting complaint is required")]
    MissingComplaint,

    #[error("Invalid capture state: {0}")]
    InvalidState(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    Recording,
    Typing,
}

/// Handed to `complete_capture` together with the raw input.
#[derive(Debug, Clone)]
pub struct CaptureMeta {
    pub mode: CaptureMode,
    pub variant: ReportVariant,
    pub audio_duration_seconds: Option<f64>,
}

// ---------------------------------------------------------------------------
// Recording session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordingState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Audio capture session. Chunk durations come from the audio layer
/// (sample count over sample rate), which keeps the session deterministic
/// and clock-free.
pub struct RecordingSession {
    state: RecordingState,
    audio: Vec<u8>,
    recorded_seconds: f64,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSession {
    pub fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            audio: Vec::new(),
            recorded_seconds: 0.0,
        }
    }

    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.state != RecordingState::Idle {
            return Err(CaptureError::InvalidState("start requires an idle session"));
        }
        self.state = RecordingState::Running;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), CaptureError> {
        if self.state != RecordingState::Running {
            return Err(CaptureError::InvalidState("pause requires a running session"));
        }
        self.state = RecordingState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), CaptureError> {
        if self.state != RecordingState::Paused {
            return Err(CaptureError::InvalidState("resume requires a paused session"));
        }
        self.state = RecordingState::Running;
        Ok(())
    }

    /// Append one audio chunk. Accepted only while running, so paused time
    /// never counts toward the minimum duration.
    pub fn push_chunk(&mut self, bytes: &[u8], seconds: f64) -> Result<(), CaptureError> {
        if self.state != RecordingState::Running {
            return Err(CaptureError::InvalidState("chunks are only accepted while running"));
        }
        self.audio.extend_from_slice(bytes);
        self.recorded_seconds += seconds;
        Ok(())
    }

    pub fn recorded_seconds(&self) -> f64 {
        self.recorded_seconds
    }

    /// Finish the recording. Under the minimum duration this fails with
    /// `TooShort` and leaves the session open (running or paused) so the
    /// user can keep recording and retry.
    pub fn stop(&mut self) -> Result<CapturedAudio, CaptureError> {
        match self.state {
            RecordingState::Running | RecordingState::Paused => {}
            _ => return Err(CaptureError::InvalidState("stop requires an active session")),
        }
        if self.recorded_seconds < MIN_RECORDING_SECONDS {
            return Err(CaptureError::TooShort {
                recorded: self.recorded_seconds,
            });
        }
        self.state = RecordingState::Stopped;
        Ok(CapturedAudio {
            audio: std::mem::take(&mut self.audio),
            duration_seconds: self.recorded_seconds,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CapturedAudio {
    pub audio: Vec<u8>,
    pub duration_seconds: f64,
}

// ---------------------------------------------------------------------------
// Typed form
// ---------------------------------------------------------------------------

/// Structured entry form for typed consults. Only the presenting
/// complaint is mandatory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypedEncounterForm {
    pub presenting_complaint: String,
    pub vitals: String,
    pub exam_findings: String,
    pub diagnostics: String,
    pub constraints: String,
}

impl TypedEncounterForm {
    /// Concatenate non-empty fields into one narrative using fixed section
    /// labels, in form order.
    pub fn compose(&self) -> Result<String, CaptureError> {
        if self.presenting_complaint.trim().is_empty() {
            return Err(CaptureError::MissingComplaint);
        }

        let labeled = [
            ("Presenting Complaint", &self.presenting_complaint),
            ("Vitals", &self.vitals),
            ("Exam Findings", &self.exam_findings),
            ("Diagnostics", &self.diagnostics),
            ("Constraints", &self.constraints),
        ];

        let narrative = labeled
            .iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(label, value)| format!("{label}: {}", value.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(narrative)
    }
}
