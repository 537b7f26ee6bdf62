use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{ConsultStatus, ReportVariant};
use crate::models::Consult;

/// Every read and write in this module is filtered by clinic_id. A consult
/// belonging to another clinic behaves exactly like a missing row.
pub fn insert_consult(conn: &Connection, consult: &Consult) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO consults (id, patient_id, clinic_id, status, report_variant,
         raw_input, audio_duration_seconds, created_at, finalized_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            consult.id.to_string(),
            consult.patient_id.to_string(),
            consult.clinic_id.to_string(),
            consult.status.as_str(),
            consult.report_variant.map(|v| v.as_str()),
            consult.raw_input,
            consult.audio_duration_seconds,
            consult.created_at.to_string(),
            consult.finalized_at.map(|t| t.to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_consult(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
) -> Result<Consult, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, clinic_id, status, report_variant,
             raw_input, audio_duration_seconds, created_at, finalized_at
             FROM consults WHERE id = ?1 AND clinic_id = ?2",
            params![consult_id.to_string(), clinic_id.to_string()],
            |row| consult_row_from_rusqlite(row),
        )
        .optional()?;

    match row {
        Some(row) => consult_from_row(row),
        None => Err(DatabaseError::NotFound {
            entity_type: "Consult".into(),
            id: consult_id.to_string(),
        }),
    }
}

pub fn update_status(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
    status: ConsultStatus,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE consults SET status = ?1 WHERE id = ?2 AND clinic_id = ?3",
        params![status.as_str(), consult_id.to_string(), clinic_id.to_string()],
    )?;
    require_row(changed, consult_id)
}

/// Persist the full raw input together with the audio duration. The two are
/// one field group: a crash between them must not be observable.
pub fn set_raw_input(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
    raw_input: &str,
    audio_duration_seconds: Option<f64>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE consults SET raw_input = ?1, audio_duration_seconds = COALESCE(?2, audio_duration_seconds)
         WHERE id = ?3 AND clinic_id = ?4",
        params![
            raw_input,
            audio_duration_seconds,
            consult_id.to_string(),
            clinic_id.to_string()
        ],
    )?;
    require_row(changed, consult_id)
}

pub fn set_report_variant(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
    variant: ReportVariant,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE consults SET report_variant = ?1 WHERE id = ?2 AND clinic_id = ?3",
        params![variant.as_str(), consult_id.to_string(), clinic_id.to_string()],
    )?;
    require_row(changed, consult_id)
}

/// Terminal transition: status and timestamp are written together.
pub fn set_finalized(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
    finalized_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE consults SET status = ?1, finalized_at = ?2 WHERE id = ?3 AND clinic_id = ?4",
        params![
            ConsultStatus::Finalized.as_str(),
            finalized_at.to_string(),
            consult_id.to_string(),
            clinic_id.to_string()
        ],
    )?;
    require_row(changed, consult_id)
}

fn require_row(changed: usize, consult_id: &Uuid) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Consult".into(),
            id: consult_id.to_string(),
        });
    }
    Ok(())
}

// Internal row type for Consult mapping
struct ConsultRow {
    id: String,
    patient_id: String,
    clinic_id: String,
    status: String,
    report_variant: Option<String>,
    raw_input: String,
    audio_duration_seconds: Option<f64>,
    created_at: String,
    finalized_at: Option<String>,
}

fn consult_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ConsultRow, rusqlite::Error> {
    Ok(ConsultRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        clinic_id: row.get(2)?,
        status: row.get(3)?,
        report_variant: row.get(4)?,
        raw_input: row.get(5)?,
        audio_duration_seconds: row.get(6)?,
        created_at: row.get(7)?,
        finalized_at: row.get(8)?,
    })
}

fn consult_from_row(row: ConsultRow) -> Result<Consult, DatabaseError> {
    Ok(Consult {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        clinic_id: parse_uuid(&row.clinic_id)?,
        status: ConsultStatus::from_str(&row.status)?,
        report_variant: row
            .report_variant
            .as_deref()
            .map(ReportVariant::from_str)
            .transpose()?,
        raw_input: row.raw_input,
        audio_duration_seconds: row.audio_duration_seconds,
        created_at: parse_datetime(&row.created_at)?,
        finalized_at: row.finalized_at.as_deref().map(parse_datetime).transpose()?,
    })
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

/// Inverse of NaiveDateTime's Display output used on the write side.
pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::patient::upsert_patient_snapshot;
    use crate::models::PatientSnapshot;

    fn seed_consult(conn: &Connection, clinic_id: Uuid) -> Consult {
        let patient = PatientSnapshot {
            id: Uuid::new_v4(),
            clinic_id,
            name: "Biscuit".into(),
            species: "canine".into(),
            breed: Some("Beagle".into()),
            date_of_birth: None,
        };
        upsert_patient_snapshot(conn, &patient).unwrap();

        let consult = Consult {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            clinic_id,
            status: ConsultStatus::Draft,
            report_variant: None,
            raw_input: String::new(),
            audio_duration_seconds: None,
            created_at: chrono::Utc::now().naive_utc(),
            finalized_at: None,
        };
        insert_consult(conn, &consult).unwrap();
        consult
    }

    #[test]
    fn insert_and_load_round_trip() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let consult = seed_consult(&conn, clinic);

        let loaded = get_consult(&conn, &clinic, &consult.id).unwrap();
        assert_eq!(loaded.id, consult.id);
        assert_eq!(loaded.status, ConsultStatus::Draft);
        assert_eq!(loaded.report_variant, None);
        assert_eq!(loaded.created_at, consult.created_at);
    }

    #[test]
    fn other_clinic_sees_not_found() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let consult = seed_consult(&conn, clinic);

        let other_clinic = Uuid::new_v4();
        let result = get_consult(&conn, &other_clinic, &consult.id);
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));

        // Writes are scoped the same way
        let result = update_status(&conn, &other_clinic, &consult.id, ConsultStatus::Drafted);
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn finalize_round_trip_preserves_timestamp() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let consult = seed_consult(&conn, clinic);

        let ts = chrono::Utc::now().naive_utc();
        set_finalized(&conn, &clinic, &consult.id, ts).unwrap();

        let loaded = get_consult(&conn, &clinic, &consult.id).unwrap();
        assert_eq!(loaded.status, ConsultStatus::Finalized);
        assert_eq!(loaded.finalized_at, Some(ts));
    }

    #[test]
    fn raw_input_keeps_existing_duration() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let consult = seed_consult(&conn, clinic);

        set_raw_input(&conn, &clinic, &consult.id, "first pass", Some(12.5)).unwrap();
        set_raw_input(&conn, &clinic, &consult.id, "first pass + appendix", None).unwrap();

        let loaded = get_consult(&conn, &clinic, &consult.id).unwrap();
        assert_eq!(loaded.raw_input, "first pass + appendix");
        assert_eq!(loaded.audio_duration_seconds, Some(12.5));
    }
}
