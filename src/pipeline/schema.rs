//! Note schema registry: the ordered field set of each report variant.
//!
//! The registry is the single source of truth for what a variant's note
//! looks like; generation responses are conformed to it before any write,
//! so a stored field group always covers the full section list.

use crate::models::enums::ReportVariant;
use crate::pipeline::generation::GeneratedSection;

/// Ordered section names for a report variant.
pub fn sections(variant: ReportVariant) -> &'static [&'static str] {
    match variant {
        ReportVariant::Soap => &["Subjective", "Objective", "Assessment", "Plan"],
        ReportVariant::Wellness => &[
            "History",
            "Physical Exam",
            "Preventive Care",
            "Recommendations",
            "Client Communication",
        ],
        ReportVariant::Procedure => &[
            "Procedure",
            "Anesthesia",
            "Findings",
            "Complications",
            "Recovery",
            "Aftercare",
        ],
    }
}

/// Map a service response onto the registry order. Unknown sections are
/// dropped, missing ones filled with empty text, so the result is always a
/// complete field group for the variant. Section matching is
/// case-insensitive; services are not trusted to echo exact headings.
pub fn conform(variant: ReportVariant, generated: &[GeneratedSection]) -> Vec<(String, String)> {
    sections(variant)
        .iter()
        .map(|&name| {
            let content = generated
                .iter()
                .find(|s| s.heading.eq_ignore_ascii_case(name))
                .map(|s| s.content.trim().to_string())
                .unwrap_or_default();
            (name.to_string(), content)
        })
        .collect()
}
