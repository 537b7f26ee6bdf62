use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::consult::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::{AttachmentStatus, DocumentKind};
use crate::models::{DiagnosticAttachment, DocumentAnalysis};

/// Attachment rows hang off a consult; every operation here verifies the
/// parent consult belongs to the clinic, so a foreign consult id behaves
/// like a missing row.
pub fn insert_attachment(
    conn: &Connection,
    clinic_id: &Uuid,
    attachment: &DiagnosticAttachment,
) -> Result<(), DatabaseError> {
    let owned: Option<String> = conn
        .query_row(
            "SELECT id FROM consults WHERE id = ?1 AND clinic_id = ?2",
            params![attachment.consult_id.to_string(), clinic_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if owned.is_none() {
        return Err(DatabaseError::NotFound {
            entity_type: "Consult".into(),
            id: attachment.consult_id.to_string(),
        });
    }

    let analysis_json = attachment
        .analysis
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO attachments (id, consult_id, storage_ref, kind, status, analysis, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            attachment.id.to_string(),
            attachment.consult_id.to_string(),
            attachment.storage_ref,
            attachment.kind.as_str(),
            attachment.status.as_str(),
            analysis_json,
            attachment.created_at.to_string(),
        ],
    )?;
    Ok(())
}

/// The one permitted mutation: record the analysis outcome. Status and
/// analysis payload are written together.
pub fn mark_analyzed(
    conn: &Connection,
    clinic_id: &Uuid,
    attachment_id: &Uuid,
    analysis: &DocumentAnalysis,
) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(analysis)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let changed = conn.execute(
        "UPDATE attachments SET status = ?1, analysis = ?2
         WHERE id = ?3 AND consult_id IN (SELECT id FROM consults WHERE clinic_id = ?4)",
        params![
            AttachmentStatus::Analyzed.as_str(),
            json,
            attachment_id.to_string(),
            clinic_id.to_string()
        ],
    )?;
    require_row(changed, attachment_id)
}

pub fn mark_failed(
    conn: &Connection,
    clinic_id: &Uuid,
    attachment_id: &Uuid,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE attachments SET status = ?1
         WHERE id = ?2 AND consult_id IN (SELECT id FROM consults WHERE clinic_id = ?3)",
        params![
            AttachmentStatus::Failed.as_str(),
            attachment_id.to_string(),
            clinic_id.to_string()
        ],
    )?;
    require_row(changed, attachment_id)
}

pub fn list_attachments(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
) -> Result<Vec<DiagnosticAttachment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.consult_id, a.storage_ref, a.kind, a.status, a.analysis, a.created_at
         FROM attachments a
         JOIN consults c ON c.id = a.consult_id
         WHERE a.consult_id = ?1 AND c.clinic_id = ?2
         ORDER BY a.created_at, a.id",
    )?;
    let rows = stmt.query_map(params![consult_id.to_string(), clinic_id.to_string()], |row| {
        Ok(AttachmentRow {
            id: row.get(0)?,
            consult_id: row.get(1)?,
            storage_ref: row.get(2)?,
            kind: row.get(3)?,
            status: row.get(4)?,
            analysis: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;

    let mut attachments = Vec::new();
    for row in rows {
        attachments.push(attachment_from_row(row?)?);
    }
    Ok(attachments)
}

fn require_row(changed: usize, attachment_id: &Uuid) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "DiagnosticAttachment".into(),
            id: attachment_id.to_string(),
        });
    }
    Ok(())
}

struct AttachmentRow {
    id: String,
    consult_id: String,
    storage_ref: String,
    kind: String,
    status: String,
    analysis: Option<String>,
    created_at: String,
}

fn attachment_from_row(row: AttachmentRow) -> Result<DiagnosticAttachment, DatabaseError> {
    let analysis = row
        .analysis
        .as_deref()
        .map(serde_json::from_str::<DocumentAnalysis>)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    Ok(DiagnosticAttachment {
        id: parse_uuid(&row.id)?,
        consult_id: parse_uuid(&row.consult_id)?,
        storage_ref: row.storage_ref,
        kind: DocumentKind::from_str(&row.kind)?,
        status: AttachmentStatus::from_str(&row.status)?,
        analysis,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::consult::insert_consult;
    use crate::db::repository::patient::upsert_patient_snapshot;
    use crate::models::enums::ConsultStatus;
    use crate::models::{Consult, LabFinding, PatientSnapshot};

    fn seed_consult(conn: &Connection) -> (Uuid, Uuid) {
        let clinic = Uuid::new_v4();
        let patient = PatientSnapshot {
            id: Uuid::new_v4(),
            clinic_id: clinic,
            name: "Tilly".into(),
            species: "feline".into(),
            breed: None,
            date_of_birth: None,
        };
        upsert_patient_snapshot(conn, &patient).unwrap();

        let consult = Consult {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            clinic_id: clinic,
            status: ConsultStatus::Drafted,
            report_variant: None,
            raw_input: String::new(),
            audio_duration_seconds: None,
            created_at: chrono::Utc::now().naive_utc(),
            finalized_at: None,
        };
        insert_consult(conn, &consult).unwrap();
        (clinic, consult.id)
    }

    fn new_attachment(consult_id: Uuid, kind: DocumentKind) -> DiagnosticAttachment {
        DiagnosticAttachment {
            id: Uuid::new_v4(),
            consult_id,
            storage_ref: format!("consults/{consult_id}/bloodwork.pdf"),
            kind,
            status: AttachmentStatus::Uploaded,
            analysis: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn analysis_json_round_trip() {
        let conn = open_memory_database().unwrap();
        let (clinic, consult_id) = seed_consult(&conn);
        let attachment = new_attachment(consult_id, DocumentKind::LabReport);
        insert_attachment(&conn, &clinic, &attachment).unwrap();

        let analysis = DocumentAnalysis {
            lab_findings: vec![LabFinding {
                analyte: "ALT".into(),
                value: "212".into(),
                unit: Some("U/L".into()),
                flag: Some("high".into()),
            }],
            imaging_findings: vec![],
        };
        mark_analyzed(&conn, &clinic, &attachment.id, &analysis).unwrap();

        let loaded = list_attachments(&conn, &clinic, &consult_id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, AttachmentStatus::Analyzed);
        let loaded_analysis = loaded[0].analysis.as_ref().unwrap();
        assert_eq!(loaded_analysis.lab_findings[0].analyte, "ALT");
        assert_eq!(loaded_analysis.lab_findings[0].flag.as_deref(), Some("high"));
    }

    #[test]
    fn failed_attachment_keeps_no_analysis() {
        let conn = open_memory_database().unwrap();
        let (clinic, consult_id) = seed_consult(&conn);
        let attachment = new_attachment(consult_id, DocumentKind::Radiograph);
        insert_attachment(&conn, &clinic, &attachment).unwrap();

        mark_failed(&conn, &clinic, &attachment.id).unwrap();

        let loaded = list_attachments(&conn, &clinic, &consult_id).unwrap();
        assert_eq!(loaded[0].status, AttachmentStatus::Failed);
        assert!(loaded[0].analysis.is_none());
    }

    #[test]
    fn mark_unknown_attachment_is_not_found() {
        let conn = open_memory_database().unwrap();
        let (clinic, _) = seed_consult(&conn);
        let result = mark_failed(&conn, &clinic, &Uuid::new_v4());
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn wrong_clinic_cannot_touch_attachments() {
        let conn = open_memory_database().unwrap();
        let (clinic, consult_id) = seed_consult(&conn);
        let other_clinic = Uuid::new_v4();
        let attachment = new_attachment(consult_id, DocumentKind::LabReport);

        let result = insert_attachment(&conn, &other_clinic, &attachment);
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));

        insert_attachment(&conn, &clinic, &attachment).unwrap();
        let result = mark_failed(&conn, &other_clinic, &attachment.id);
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));

        assert!(list_attachments(&conn, &other_clinic, &consult_id).unwrap().is_empty());
        // The own-clinic view is unchanged by the rejected mutation.
        let loaded = list_attachments(&conn, &clinic, &consult_id).unwrap();
        assert_eq!(loaded[0].status, AttachmentStatus::Uploaded);
    }
}
