use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "VetScribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base URL of the clinic's note-generation service.
pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:8000";

/// Whole-request timeout for generation calls. Transcription and note
/// drafting run a local model on the service side, so this is generous.
pub const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 120;

/// Get the application data directory
/// ~/VetScribe/ on all platforms (user-visible by design)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("VetScribe")
}

/// Directory for stored diagnostic attachments (lab PDFs, radiographs).
pub fn attachments_dir() -> PathBuf {
    app_data_dir().join("attachments")
}

/// Path of the consult database.
pub fn database_path() -> PathBuf {
    app_data_dir().join("vetscribe.db")
}

pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("VetScribe"));
    }

    #[test]
    fn attachments_dir_under_app_data() {
        let attachments = attachments_dir();
        let app = app_data_dir();
        assert!(attachments.starts_with(app));
        assert!(attachments.ends_with("attachments"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }
}
