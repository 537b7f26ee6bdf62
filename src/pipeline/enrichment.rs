//! Diagnostic enrichment loop: upload documents, analyze them one by one,
//! and fold the usable findings into the consult narrative.
//!
//! Files are processed strictly sequentially in submission order. A file
//! that fails storage or analysis is marked failed and skipped; it never
//! aborts its siblings. The caller appends the merged findings block to
//! raw input and triggers exactly one regeneration per batch.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::attachment;
use crate::db::DatabaseError;
use crate::models::enums::{AttachmentStatus, DocumentKind};
use crate::models::{DiagnosticAttachment, DocumentAnalysis};
use crate::pipeline::generation::GenerationClient;
use crate::storage::ObjectStore;

/// Section marker that precedes every appended findings block, so merges
/// stay traceable and never silently blend into prior narrative.
pub const FINDINGS_MARKER: &str = "--- Diagnostic Findings ---";

/// One file submitted for enrichment.
pub struct DiagnosticUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
}

/// Per-batch tally reported back to the UI.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutcome {
    pub analyzed: usize,
    pub failed: usize,
}

/// Run the sequential upload/analyze loop. Returns the outcome tally and
/// the usable analyses in submission order; persistence failures are the
/// only errors that propagate.
pub fn process_uploads(
    conn: &Connection,
    client: &dyn GenerationClient,
    store: &dyn ObjectStore,
    clinic_id: &Uuid,
    consult_id: &Uuid,
    files: &[DiagnosticUpload],
) -> Result<(EnrichmentOutcome, Vec<(DocumentKind, DocumentAnalysis)>), DatabaseError> {
    let mut outcome = EnrichmentOutcome::default();
    let mut findings = Vec::new();

    for file in files {
        let storage_ref = match store.put(consult_id, &file.filename, &file.bytes) {
            Ok(storage_ref) => storage_ref,
            Err(e) => {
                tracing::warn!(
                    consult_id = %consult_id,
                    filename = %file.filename,
                    error = %e,
                    "Diagnostic upload failed, skipping file"
                );
                outcome.failed += 1;
                continue;
            }
        };

        let record = DiagnosticAttachment {
            id: Uuid::new_v4(),
            consult_id: *consult_id,
            storage_ref,
            kind: file.kind,
            status: AttachmentStatus::Uploaded,
            analysis: None,
            created_at: chrono::Utc::now().naive_utc(),
        };
        attachment::insert_attachment(conn, clinic_id, &record)?;

        match client.analyze_document(&file.bytes, file.kind) {
            Ok(analysis) => {
                attachment::mark_analyzed(conn, clinic_id, &record.id, &analysis)?;
                if analysis.is_empty() {
                    tracing::debug!(
                        consult_id = %consult_id,
                        attachment_id = %record.id,
                        "Analysis returned no findings"
                    );
                } else {
                    findings.push((file.kind, analysis));
                }
                outcome.analyzed += 1;
            }
            Err(e) => {
                tracing::warn!(
                    consult_id = %consult_id,
                    attachment_id = %record.id,
                    error = %e,
                    "Document analysis failed, skipping file"
                );
                attachment::mark_failed(conn, clinic_id, &record.id)?;
                outcome.failed += 1;
            }
        }
    }

    Ok((outcome, findings))
}

/// Render the batch's findings into the single text block that gets
/// appended under the section marker.
pub fn format_findings_block(findings: &[(DocumentKind, DocumentAnalysis)]) -> String {
    let mut blocks = Vec::new();

    for (kind, analysis) in findings {
        let mut lines = vec![format!("{}:", kind.findings_label())];
        for lab in &analysis.lab_findings {
            let mut line = format!("- {}: {}", lab.analyte, lab.value);
            if let Some(unit) = &lab.unit {
                line.push_str(&format!(" {unit}"));
            }
            if let Some(flag) = &lab.flag {
                line.push_str(&format!(" ({flag})"));
            }
            lines.push(line);
        }
        for finding in &analysis.imaging_findings {
            lines.push(format!("- {finding}"));
        }
        blocks.push(lines.join("\n"));
    }

    blocks.join("\n\n")
}

/// Append a findings block to existing raw input under the marker.
pub fn append_findings(raw_input: &str, block: &str) -> String {
    if raw_input.trim().is_empty() {
        format!("{FINDINGS_MARKER}\n{block}")
    } else {
        format!("{raw_input}\n\n{FINDINGS_MARKER}\n{block}")
    }
}
