use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only projection of patient identity owned by the patient-record
/// subsystem. The pipeline only reads it to condition note generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSnapshot {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}
