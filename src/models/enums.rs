use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ConsultStatus {
    Draft => "draft",
    Capturing => "capturing",
    Generating => "generating",
    Drafted => "drafted",
    Finalized => "finalized",
});

str_enum!(ReportVariant {
    Soap => "soap",
    Wellness => "wellness",
    Procedure => "procedure",
});

str_enum!(AttachmentStatus {
    Uploaded => "uploaded",
    Analyzed => "analyzed",
    Failed => "failed",
});

str_enum!(DocumentKind {
    LabReport => "lab_report",
    Radiograph => "radiograph",
    Ultrasound => "ultrasound",
    Cytology => "cytology",
    Other => "other",
});

impl DocumentKind {
    /// Display heading used when findings are merged into raw input.
    pub fn findings_label(&self) -> &'static str {
        match self {
            Self::LabReport => "Lab Results",
            Self::Radiograph => "Radiograph Findings",
            Self::Ultrasound => "Ultrasound Findings",
            Self::Cytology => "Cytology Findings",
            Self::Other => "Document Findings",
        }
    }
}

str_enum!(ArtifactKind {
    CaseSummary => "case_summary",
    ClientEducation => "client_education",
    DischargeNote => "discharge_note",
});
