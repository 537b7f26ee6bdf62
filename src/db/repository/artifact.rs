use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::consult::{parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::ArtifactKind;
use crate::models::DerivedArtifact;

/// Append-only: artifacts are never updated or deleted, so a finalized
/// consult can keep accumulating them without touching the locked note.
/// The parent consult must belong to the clinic.
pub fn insert_artifact(
    conn: &Connection,
    clinic_id: &Uuid,
    artifact: &DerivedArtifact,
) -> Result<(), DatabaseError> {
    let owned: Option<String> = conn
        .query_row(
            "SELECT id FROM consults WHERE id = ?1 AND clinic_id = ?2",
            params![artifact.consult_id.to_string(), clinic_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if owned.is_none() {
        return Err(DatabaseError::NotFound {
            entity_type: "Consult".into(),
            id: artifact.consult_id.to_string(),
        });
    }

    conn.execute(
        "INSERT INTO derived_artifacts (id, consult_id, kind, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            artifact.id.to_string(),
            artifact.consult_id.to_string(),
            artifact.kind.as_str(),
            artifact.content,
            artifact.created_at.to_string(),
        ],
    )?;
    Ok(())
}

pub fn list_artifacts(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
) -> Result<Vec<DerivedArtifact>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.consult_id, a.kind, a.content, a.created_at
         FROM derived_artifacts a
         JOIN consults c ON c.id = a.consult_id
         WHERE a.consult_id = ?1 AND c.clinic_id = ?2
         ORDER BY a.created_at, a.id",
    )?;
    let rows = stmt.query_map(params![consult_id.to_string(), clinic_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut artifacts = Vec::new();
    for row in rows {
        let (id, consult, kind, content, created_at) = row?;
        artifacts.push(DerivedArtifact {
            id: parse_uuid(&id)?,
            consult_id: parse_uuid(&consult)?,
            kind: ArtifactKind::from_str(&kind)?,
            content,
            created_at: parse_datetime(&created_at)?,
        });
    }
    Ok(artifacts)
}
