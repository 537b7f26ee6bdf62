use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::ReportVariant;
use crate::models::{NoteGroup, NoteSection};

/// Replace every stored section of one variant in a single transaction.
/// The pipeline never writes a variant's sections individually, so a reader
/// can never observe a half-updated note. Scoped to the clinic: a consult
/// owned elsewhere behaves like a missing row.
pub fn replace_note_sections(
    conn: &mut Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
    variant: ReportVariant,
    sections: &[(String, String)],
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;

    let owned: Option<String> = tx
        .query_row(
            "SELECT id FROM consults WHERE id = ?1 AND clinic_id = ?2",
            params![consult_id.to_string(), clinic_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if owned.is_none() {
        return Err(DatabaseError::NotFound {
            entity_type: "Consult".into(),
            id: consult_id.to_string(),
        });
    }

    tx.execute(
        "DELETE FROM consult_notes WHERE consult_id = ?1 AND variant = ?2",
        params![consult_id.to_string(), variant.as_str()],
    )?;
    for (position, (section, content)) in sections.iter().enumerate() {
        tx.execute(
            "INSERT INTO consult_notes (consult_id, variant, section, position, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                consult_id.to_string(),
                variant.as_str(),
                section,
                position as i64,
                content
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Stored sections for one variant, in position order. Empty vec when the
/// variant has never been generated or the consult is not this clinic's.
pub fn get_note_sections(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
    variant: ReportVariant,
) -> Result<Vec<NoteSection>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT n.section, n.content FROM consult_notes n
         JOIN consults c ON c.id = n.consult_id
         WHERE n.consult_id = ?1 AND n.variant = ?2 AND c.clinic_id = ?3
         ORDER BY n.position",
    )?;
    let rows = stmt.query_map(
        params![consult_id.to_string(), variant.as_str(), clinic_id.to_string()],
        |row| {
            Ok(NoteSection {
                name: row.get(0)?,
                content: row.get(1)?,
            })
        },
    )?;

    let mut sections = Vec::new();
    for row in rows {
        sections.push(row?);
    }
    Ok(sections)
}

/// Every variant that has stored sections for this consult.
pub fn get_all_notes(
    conn: &Connection,
    clinic_id: &Uuid,
    consult_id: &Uuid,
) -> Result<Vec<NoteGroup>, DatabaseError> {
    let mut groups = Vec::new();
    for variant in [
        ReportVariant::Soap,
        ReportVariant::Wellness,
        ReportVariant::Procedure,
    ] {
        let sections = get_note_sections(conn, clinic_id, consult_id, variant)?;
        if !sections.is_empty() {
            groups.push(NoteGroup { variant, sections });
        }
    }
    Ok(groups)
}
