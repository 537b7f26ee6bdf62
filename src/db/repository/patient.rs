use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use uuid::Uuid;

use super::consult::parse_uuid;
use crate::db::DatabaseError;
use crate::models::PatientSnapshot;

/// The patient record is owned by the roster subsystem; the pipeline reads a
/// snapshot to condition generation. Upsert exists for ingest and tests.
pub fn upsert_patient_snapshot(
    conn: &Connection,
    patient: &PatientSnapshot,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, clinic_id, name, species, breed, date_of_birth)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             species = excluded.species,
             breed = excluded.breed,
             date_of_birth = excluded.date_of_birth",
        params![
            patient.id.to_string(),
            patient.clinic_id.to_string(),
            patient.name,
            patient.species,
            patient.breed,
            patient.date_of_birth.map(|d| d.to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_patient_snapshot(
    conn: &Connection,
    clinic_id: &Uuid,
    patient_id: &Uuid,
) -> Result<Option<PatientSnapshot>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, clinic_id, name, species, breed, date_of_birth
             FROM patients WHERE id = ?1 AND clinic_id = ?2",
            params![patient_id.to_string(), clinic_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, clinic, name, species, breed, dob)) = row else {
        return Ok(None);
    };

    Ok(Some(PatientSnapshot {
        id: parse_uuid(&id)?,
        clinic_id: parse_uuid(&clinic)?,
        name,
        species,
        breed,
        date_of_birth: dob
            .as_deref()
            .map(NaiveDate::from_str)
            .transpose()
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    #[test]
    fn upsert_then_get() {
        let conn = open_memory_database().unwrap();
        let clinic = Uuid::new_v4();
        let patient = PatientSnapshot {
            id: Uuid::new_v4(),
            clinic_id: clinic,
            name: "Mochi".into(),
            species: "feline".into(),
            breed: None,
            date_of_birth: NaiveDate::from_ymd_opt(2019, 4, 2),
        };
        upsert_patient_snapshot(&conn, &patient).unwrap();

        let loaded = get_patient_snapshot(&conn, &clinic, &patient.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "Mochi");
        assert_eq!(loaded.date_of_birth, patient.date_of_birth);
    }

    #[test]
    fn clinic_scope_hides_foreign_patients() {
        let conn = open_memory_database().unwrap();
        let patient = PatientSnapshot {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            name: "Rex".into(),
            species: "canine".into(),
            breed: Some("GSD".into()),
            date_of_birth: None,
        };
        upsert_patient_snapshot(&conn, &patient).unwrap();

        let other = get_patient_snapshot(&conn, &Uuid::new_v4(), &patient.id).unwrap();
        assert!(other.is_none());
    }
}
