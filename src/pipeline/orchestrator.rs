//! Consult state machine and pipeline orchestrator.
//!
//! One `ConsultPipeline` instance serves every call site (record screen,
//! typed entry, review screen); the create/capture/generate sequence lives
//! here once instead of being repeated per screen. All status transitions
//! are validated centrally against the persisted status, never trusted
//! from the caller.
//!
//! Generation requests carry a token. A response is applied only when its
//! token is still the consult's current one and its variant matches the
//! live report variant, both checked at apply time. A reply that arrives
//! after a variant switch is discarded, not written into the new variant.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::db::repository::{artifact, attachment, consult as consult_repo, note, patient};
use crate::db::DatabaseError;
use crate::models::enums::{ArtifactKind, ConsultStatus, ReportVariant};
use crate::models::{Consult, ConsultView, DerivedArtifact, DiagnosticAttachment, NoteSection};
use crate::pipeline::capture::{
    CaptureError, CaptureMeta, CaptureMode, CapturedAudio, RecordingSession, TypedEncounterForm,
};
use crate::pipeline::enrichment::{self, DiagnosticUpload, EnrichmentOutcome};
use crate::pipeline::generation::{
    CaseMessage, GeneratedNote, GenerationClient, GenerationError, PatientContext,
};
use crate::pipeline::{insights, schema};
use crate::storage::{ObjectStore, StorageError};

#[derive(Error, Debug)]
pub enum ConsultError {
    #[error("Persistence error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Cannot {action} a consult in status {from:?}")]
    InvalidTransition {
        from: ConsultStatus,
        action: &'static str,
    },

    #[error("Consult is finalized and read-only")]
    AlreadyFinalized,

    #[error("A report variant must be selected before finalizing")]
    VariantNotSelected,
}

/// How one generation request ended. The consult is in a valid `drafted`
/// state in every case; nothing here is a silent failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The variant's full field group was overwritten.
    Applied { variant: ReportVariant },
    /// The service's explicit insufficient-data signal; message shown to
    /// the user verbatim, stored note untouched.
    InsufficientData { message: String },
    /// Transport or service fault; user may retry via regeneration.
    Failed { message: String },
    /// The response outlived its request (variant switch or newer
    /// request); it was discarded without touching the note.
    DiscardedStale,
}

/// Token for one in-flight generation request.
#[derive(Debug, Clone, Copy)]
pub struct GenerationTicket {
    pub token: Uuid,
    pub consult_id: Uuid,
    pub variant: ReportVariant,
}

/// An open capture session, handed to the UI by `begin_capture`.
pub enum CaptureSession {
    Recording(RecordingSession),
    Typing(TypedEncounterForm),
}

pub struct ConsultPipeline {
    conn: Connection,
    client: Box<dyn GenerationClient>,
    store: Box<dyn ObjectStore>,
    /// The caller's clinic; every read and write is scoped to it.
    clinic_id: Uuid,
    /// Current generation token per consult. A missing or mismatched
    /// entry at apply time marks a response as stale.
    in_flight: HashMap<Uuid, Uuid>,
}

impl ConsultPipeline {
    pub fn new(
        conn: Connection,
        client: Box<dyn GenerationClient>,
        store: Box<dyn ObjectStore>,
        clinic_id: Uuid,
    ) -> Self {
        Self {
            conn,
            client,
            store,
            clinic_id,
            in_flight: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------

    pub fn create_consult(&mut self, patient_id: Uuid) -> Result<Uuid, ConsultError> {
        let consult = Consult {
            id: Uuid::new_v4(),
            patient_id,
            clinic_id: self.clinic_id,
            status: ConsultStatus::Draft,
            report_variant: None,
            raw_input: String::new(),
            audio_duration_seconds: None,
            created_at: chrono::Utc::now().naive_utc(),
            finalized_at: None,
        };
        consult_repo::insert_consult(&self.conn, &consult)?;
        tracing::info!(consult_id = %consult.id, patient_id = %patient_id, "Consult created");
        Ok(consult.id)
    }

    pub fn begin_capture(
        &mut self,
        consult_id: &Uuid,
        mode: CaptureMode,
    ) -> Result<CaptureSession, ConsultError> {
        let consult = self.load_mutable(consult_id)?;
        if consult.status != ConsultStatus::Draft {
            return Err(ConsultError::InvalidTransition {
                from: consult.status,
                action: "begin capture on",
            });
        }
        consult_repo::update_status(&self.conn, &self.clinic_id, consult_id, ConsultStatus::Capturing)?;

        Ok(match mode {
            CaptureMode::Recording => CaptureSession::Recording(RecordingSession::new()),
            CaptureMode::Typing => CaptureSession::Typing(TypedEncounterForm::default()),
        })
    }

    /// Finish a recording capture: transcribe, then hand the text to
    /// `complete_capture`. A transcription failure degrades to an empty
    /// narrative instead of aborting; the user can still finish manually.
    pub fn complete_recording(
        &mut self,
        consult_id: &Uuid,
        captured: CapturedAudio,
        variant: ReportVariant,
    ) -> Result<GenerationOutcome, ConsultError> {
        let raw_input = match self.client.transcribe(&captured.audio, consult_id) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    consult_id = %consult_id,
                    error = %e,
                    "Transcription failed, continuing with empty narrative"
                );
                String::new()
            }
        };
        self.complete_capture(
            consult_id,
            &raw_input,
            CaptureMeta {
                mode: CaptureMode::Recording,
                variant,
                audio_duration_seconds: Some(captured.duration_seconds),
            },
        )
    }

    /// Finish a typed capture: compose the form into the narrative.
    pub fn complete_typed(
        &mut self,
        consult_id: &Uuid,
        form: &TypedEncounterForm,
        variant: ReportVariant,
    ) -> Result<GenerationOutcome, ConsultError> {
        let raw_input = form.compose()?;
        self.complete_capture(
            consult_id,
            &raw_input,
            CaptureMeta {
                mode: CaptureMode::Typing,
                variant,
                audio_duration_seconds: None,
            },
        )
    }

    /// Core capture hand-off. The raw input is persisted before any
    /// generation call so a crash mid-generation cannot lose it.
    pub fn complete_capture(
        &mut self,
        consult_id: &Uuid,
        raw_input: &str,
        meta: CaptureMeta,
    ) -> Result<GenerationOutcome, ConsultError> {
        let consult = self.load_mutable(consult_id)?;
        if consult.status != ConsultStatus::Capturing {
            return Err(ConsultError::InvalidTransition {
                from: consult.status,
                action: "complete capture on",
            });
        }

        consult_repo::set_raw_input(
            &self.conn,
            &self.clinic_id,
            consult_id,
            raw_input,
            meta.audio_duration_seconds,
        )?;
        consult_repo::set_report_variant(&self.conn, &self.clinic_id, consult_id, meta.variant)?;

        let ticket = self.begin_generation(consult_id, meta.variant)?;
        self.run_generation(ticket)
    }

    /// User-initiated retry from the drafted state.
    pub fn request_regeneration(
        &mut self,
        consult_id: &Uuid,
    ) -> Result<GenerationOutcome, ConsultError> {
        let consult = self.load_mutable(consult_id)?;
        if consult.status != ConsultStatus::Drafted {
            return Err(ConsultError::InvalidTransition {
                from: consult.status,
                action: "regenerate",
            });
        }
        let variant = consult.report_variant.ok_or(ConsultError::VariantNotSelected)?;

        let ticket = self.begin_generation(consult_id, variant)?;
        self.run_generation(ticket)
    }

    /// Switch the report variant. `pending_edits` are the current
    /// variant's on-screen fields; they are persisted before anything else
    /// so no content is lost across the switch. If the target variant has
    /// stored sections they stand as-is, otherwise generation re-enters.
    /// An in-flight generation for the old variant is not cancelled; its
    /// response fails the apply-time check and is discarded.
    pub fn switch_variant(
        &mut self,
        consult_id: &Uuid,
        variant: ReportVariant,
        pending_edits: Option<&[NoteSection]>,
    ) -> Result<Option<GenerationOutcome>, ConsultError> {
        let consult = self.load_mutable(consult_id)?;
        match consult.status {
            ConsultStatus::Draft | ConsultStatus::Drafted | ConsultStatus::Generating => {}
            _ => {
                return Err(ConsultError::InvalidTransition {
                    from: consult.status,
                    action: "switch variant on",
                })
            }
        }

        if let (Some(edits), Some(current)) = (pending_edits, consult.report_variant) {
            self.write_note_group(consult_id, current, edits)?;
        }

        if consult.report_variant == Some(variant) {
            return Ok(None);
        }

        // Any outstanding request now belongs to an abandoned variant.
        self.in_flight.remove(consult_id);
        consult_repo::set_report_variant(&self.conn, &self.clinic_id, consult_id, variant)?;
        tracing::info!(consult_id = %consult_id, variant = variant.as_str(), "Report variant switched");

        // Nothing to generate from before capture has run.
        if consult.status == ConsultStatus::Draft {
            return Ok(None);
        }

        let existing = note::get_note_sections(&self.conn, &self.clinic_id, consult_id, variant)?;
        if !existing.is_empty() {
            consult_repo::update_status(&self.conn, &self.clinic_id, consult_id, ConsultStatus::Drafted)?;
            return Ok(None);
        }

        let ticket = self.begin_generation(consult_id, variant)?;
        Ok(Some(self.run_generation(ticket)?))
    }

    /// Persist practitioner edits to the live variant's field group.
    pub fn save_note(
        &mut self,
        consult_id: &Uuid,
        sections: &[NoteSection],
    ) -> Result<(), ConsultError> {
        let consult = self.load_mutable(consult_id)?;
        if consult.status != ConsultStatus::Drafted {
            return Err(ConsultError::InvalidTransition {
                from: consult.status,
                action: "edit the note of",
            });
        }
        let variant = consult.report_variant.ok_or(ConsultError::VariantNotSelected)?;
        self.write_note_group(consult_id, variant, sections)
    }

    /// Diagnostic enrichment: sequential per-file upload + analysis, one
    /// merged append to raw input, then exactly one regeneration for the
    /// whole batch. A batch with no usable findings changes nothing.
    pub fn upload_diagnostics(
        &mut self,
        consult_id: &Uuid,
        files: &[DiagnosticUpload],
    ) -> Result<(EnrichmentOutcome, Option<GenerationOutcome>), ConsultError> {
        let consult = self.load_mutable(consult_id)?;
        if consult.status != ConsultStatus::Drafted {
            return Err(ConsultError::InvalidTransition {
                from: consult.status,
                action: "upload diagnostics to",
            });
        }

        let (outcome, findings) = enrichment::process_uploads(
            &self.conn,
            self.client.as_ref(),
            self.store.as_ref(),
            &self.clinic_id,
            consult_id,
            files,
        )?;

        if findings.is_empty() {
            tracing::info!(consult_id = %consult_id, "No usable findings in batch, skipping regeneration");
            return Ok((outcome, None));
        }

        let block = enrichment::format_findings_block(&findings);
        let merged = enrichment::append_findings(&consult.raw_input, &block);
        consult_repo::set_raw_input(&self.conn, &self.clinic_id, consult_id, &merged, None)?;

        let generation = self.request_regeneration(consult_id)?;
        Ok((outcome, Some(generation)))
    }

    /// One-way lock. Requires a selected report variant; empty note
    /// content is allowed (a placeholder visit finalizes cleanly).
    pub fn finalize(&mut self, consult_id: &Uuid) -> Result<NaiveDateTime, ConsultError> {
        let consult = self.load_mutable(consult_id)?;
        if consult.status != ConsultStatus::Drafted {
            return Err(ConsultError::InvalidTransition {
                from: consult.status,
                action: "finalize",
            });
        }
        if consult.report_variant.is_none() {
            return Err(ConsultError::VariantNotSelected);
        }

        let finalized_at = chrono::Utc::now().naive_utc();
        consult_repo::set_finalized(&self.conn, &self.clinic_id, consult_id, finalized_at)?;
        self.in_flight.remove(consult_id);
        tracing::info!(consult_id = %consult_id, "Consult finalized");
        Ok(finalized_at)
    }

    /// Pollable projection for UI binding: the consult plus every
    /// variant's stored note sections.
    pub fn get_consult(&self, consult_id: &Uuid) -> Result<ConsultView, ConsultError> {
        let consult = self.load(consult_id)?;
        let notes = note::get_all_notes(&self.conn, &self.clinic_id, consult_id)?;
        Ok(ConsultView { consult, notes })
    }

    /// Derived-artifact side pipeline. Unlike every other mutation this is
    /// allowed on finalized consults: it appends artifact rows and never
    /// touches the locked note.
    pub fn generate_insight(
        &mut self,
        consult_id: &Uuid,
        kind: ArtifactKind,
        question: Option<&str>,
        history: &[CaseMessage],
    ) -> Result<DerivedArtifact, ConsultError> {
        let consult = self.load(consult_id)?;
        let snapshot =
            patient::get_patient_snapshot(&self.conn, &self.clinic_id, &consult.patient_id)?;

        let question = question.or_else(|| insights::question_for(kind));
        let request = insights::build_case_request(
            consult.id,
            &consult.raw_input,
            snapshot.as_ref(),
            question,
            history,
        );
        let content = self.client.analyze_case(&request)?;

        let record = DerivedArtifact {
            id: Uuid::new_v4(),
            consult_id: *consult_id,
            kind,
            content,
            created_at: chrono::Utc::now().naive_utc(),
        };
        artifact::insert_artifact(&self.conn, &self.clinic_id, &record)?;
        Ok(record)
    }

    pub fn list_artifacts(&self, consult_id: &Uuid) -> Result<Vec<DerivedArtifact>, ConsultError> {
        self.load(consult_id)?;
        Ok(artifact::list_artifacts(&self.conn, &self.clinic_id, consult_id)?)
    }

    /// Stored diagnostic attachments for a consult, in upload order.
    pub fn list_diagnostics(
        &self,
        consult_id: &Uuid,
    ) -> Result<Vec<DiagnosticAttachment>, ConsultError> {
        self.load(consult_id)?;
        Ok(attachment::list_attachments(&self.conn, &self.clinic_id, consult_id)?)
    }

    /// Original bytes of one stored diagnostic, for reviewing what the
    /// analysis saw.
    pub fn open_diagnostic(
        &self,
        consult_id: &Uuid,
        attachment_id: &Uuid,
    ) -> Result<Vec<u8>, ConsultError> {
        let attachments = attachment::list_attachments(&self.conn, &self.clinic_id, consult_id)?;
        let record = attachments
            .into_iter()
            .find(|a| a.id == *attachment_id)
            .ok_or_else(|| {
                ConsultError::Database(DatabaseError::NotFound {
                    entity_type: "DiagnosticAttachment".into(),
                    id: attachment_id.to_string(),
                })
            })?;
        Ok(self.store.get(&record.storage_ref)?)
    }

    // -----------------------------------------------------------------
    // Generation request/apply split
    // -----------------------------------------------------------------

    /// Register a fresh token and enter `generating`. Replacing the entry
    /// invalidates any older outstanding request for this consult.
    fn begin_generation(
        &mut self,
        consult_id: &Uuid,
        variant: ReportVariant,
    ) -> Result<GenerationTicket, ConsultError> {
        let ticket = GenerationTicket {
            token: Uuid::new_v4(),
            consult_id: *consult_id,
            variant,
        };
        self.in_flight.insert(*consult_id, ticket.token);
        consult_repo::update_status(&self.conn, &self.clinic_id, consult_id, ConsultStatus::Generating)?;
        tracing::debug!(
            consult_id = %consult_id,
            token = %ticket.token,
            variant = variant.as_str(),
            "Generation requested"
        );
        Ok(ticket)
    }

    /// Issue the service call for a ticket and apply its response.
    fn run_generation(&mut self, ticket: GenerationTicket) -> Result<GenerationOutcome, ConsultError> {
        let loaded = self.load(&ticket.consult_id).and_then(|consult| {
            let snapshot =
                patient::get_patient_snapshot(&self.conn, &self.clinic_id, &consult.patient_id)?;
            Ok((consult, snapshot))
        });
        let (consult, snapshot) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                self.abandon_generation(&ticket);
                return Err(e);
            }
        };
        let context = snapshot.as_ref().map(PatientContext::from_snapshot);

        let result = self.client.generate_note(
            &ticket.consult_id,
            &consult.raw_input,
            ticket.variant,
            context.as_ref(),
        );
        self.apply_generation(ticket, result)
    }

    /// Apply a generation response. The stale check happens here, against
    /// the live consult, not against anything captured at request time.
    /// A persistence failure during the apply restores `drafted` so the
    /// consult never strands in `generating`.
    fn apply_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<GeneratedNote, GenerationError>,
    ) -> Result<GenerationOutcome, ConsultError> {
        match self.apply_generation_inner(&ticket, result) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.abandon_generation(&ticket);
                Err(e)
            }
        }
    }

    fn apply_generation_inner(
        &mut self,
        ticket: &GenerationTicket,
        result: Result<GeneratedNote, GenerationError>,
    ) -> Result<GenerationOutcome, ConsultError> {
        let consult = self.load(&ticket.consult_id)?;

        let token_current = self.in_flight.get(&ticket.consult_id) == Some(&ticket.token);
        let variant_live = consult.report_variant == Some(ticket.variant);
        if !token_current || !variant_live {
            tracing::warn!(
                consult_id = %ticket.consult_id,
                token = %ticket.token,
                variant = ticket.variant.as_str(),
                "Discarding stale generation response"
            );
            return Ok(GenerationOutcome::DiscardedStale);
        }
        self.in_flight.remove(&ticket.consult_id);

        let clinic_id = self.clinic_id;
        let outcome = match result {
            Ok(generated) => {
                let group = schema::conform(ticket.variant, &generated.sections);
                note::replace_note_sections(&mut self.conn, &clinic_id, &ticket.consult_id, ticket.variant, &group)?;
                GenerationOutcome::Applied {
                    variant: ticket.variant,
                }
            }
            Err(GenerationError::InsufficientClinicalData(message)) => {
                // Expected business outcome, not a system fault.
                tracing::info!(consult_id = %ticket.consult_id, "Service reported insufficient clinical data");
                GenerationOutcome::InsufficientData { message }
            }
            Err(e) => {
                tracing::error!(consult_id = %ticket.consult_id, error = %e, "Note generation failed");
                GenerationOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        // Every apply path lands in a valid, inspectable drafted state.
        consult_repo::update_status(
            &self.conn,
            &self.clinic_id,
            &ticket.consult_id,
            ConsultStatus::Drafted,
        )?;
        Ok(outcome)
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    /// Best-effort exit from `generating` after a persistence failure, so
    /// retry and finalize stay reachable. Skipped when a newer request
    /// owns the consult; that request's apply restores the status.
    fn abandon_generation(&mut self, ticket: &GenerationTicket) {
        if let Some(token) = self.in_flight.get(&ticket.consult_id) {
            if *token != ticket.token {
                return;
            }
        }
        self.in_flight.remove(&ticket.consult_id);
        if let Err(e) = consult_repo::update_status(
            &self.conn,
            &self.clinic_id,
            &ticket.consult_id,
            ConsultStatus::Drafted,
        ) {
            tracing::error!(
                consult_id = %ticket.consult_id,
                error = %e,
                "Could not restore drafted status after generation error"
            );
        }
    }

    fn load(&self, consult_id: &Uuid) -> Result<Consult, ConsultError> {
        Ok(consult_repo::get_consult(&self.conn, &self.clinic_id, consult_id)?)
    }

    /// Raw input and note are read-only after finalization; only the
    /// derived-artifact side pipeline may still run.
    fn load_mutable(&self, consult_id: &Uuid) -> Result<Consult, ConsultError> {
        let consult = self.load(consult_id)?;
        if consult.is_finalized() {
            return Err(ConsultError::AlreadyFinalized);
        }
        Ok(consult)
    }

    fn write_note_group(
        &mut self,
        consult_id: &Uuid,
        variant: ReportVariant,
        sections: &[NoteSection],
    ) -> Result<(), ConsultError> {
        let clinic_id = self.clinic_id;
        let group: Vec<(String, String)> = sections
            .iter()
            .map(|s| (s.name.clone(), s.content.clone()))
            .collect();
        note::replace_note_sections(&mut self.conn, &clinic_id, consult_id, variant, &group)?;
        Ok(())
    }
}
