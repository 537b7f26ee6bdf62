use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{
    CaseAnalysisRequest, GenerationClient, GeneratedNote, GeneratedSection, PatientContext,
};
use super::GenerationError;
use crate::models::enums::{DocumentKind, ReportVariant};
use crate::models::DocumentAnalysis;

/// HTTP client for the generation backend. The base URL and timeout are
/// injected at construction; there is no process-wide endpoint state.
pub struct HttpGenerationClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpGenerationClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        }
    }

    fn transport_error(&self, e: &reqwest::Error) -> String {
        if e.is_connect() {
            format!("cannot reach generation service at {}", self.base_url)
        } else if e.is_timeout() {
            format!("request timed out after {}s", self.timeout_secs)
        } else {
            e.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    consult_id: &'a Uuid,
    audio_b64: String,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
}

#[derive(Serialize)]
struct GenerateNoteRequest<'a> {
    consult_id: &'a Uuid,
    raw_input: &'a str,
    variant: &'a str,
    patient: Option<&'a PatientContext>,
}

#[derive(Deserialize)]
struct GenerateNoteResponse {
    sections: Vec<GeneratedSection>,
}

#[derive(Serialize)]
struct AnalyzeDocumentRequest {
    document_b64: String,
    kind: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Deserialize)]
struct AnalyzeCaseResponse {
    analysis: String,
}

impl GenerationClient for HttpGenerationClient {
    fn transcribe(&self, audio: &[u8], consult_id: &Uuid) -> Result<String, GenerationError> {
        let url = format!("{}/api/transcribe", self.base_url);
        let body = TranscribeRequest {
            consult_id,
            audio_b64: BASE64.encode(audio),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| GenerationError::TranscriptionFailed(self.transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::TranscriptionFailed(format!(
                "status {status}: {body}"
            )));
        }

        let parsed: TranscribeResponse = response
            .json()
            .map_err(|e| GenerationError::TranscriptionFailed(e.to_string()))?;
        Ok(parsed.text)
    }

    fn generate_note(
        &self,
        consult_id: &Uuid,
        raw_input: &str,
        variant: ReportVariant,
        patient: Option<&PatientContext>,
    ) -> Result<GeneratedNote, GenerationError> {
        let url = format!("{}/api/generate-note", self.base_url);
        let body = GenerateNoteRequest {
            consult_id,
            raw_input,
            variant: variant.as_str(),
            patient,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| GenerationError::GenerationFailed(self.transport_error(&e)))?;

        let status = response.status();
        // 422 is the explicit insufficient-data signal; its detail string is
        // surfaced to the user verbatim.
        if status.as_u16() == 422 {
            let detail = response
                .json::<ErrorResponse>()
                .map(|e| e.detail)
                .unwrap_or_else(|_| "Not enough clinical information to generate a note".into());
            return Err(GenerationError::InsufficientClinicalData(detail));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "status {status}: {body}"
            )));
        }

        let parsed: GenerateNoteResponse = response
            .json()
            .map_err(|e| GenerationError::GenerationFailed(e.to_string()))?;
        Ok(GeneratedNote {
            variant,
            sections: parsed.sections,
        })
    }

    fn analyze_document(
        &self,
        bytes: &[u8],
        kind: DocumentKind,
    ) -> Result<DocumentAnalysis, GenerationError> {
        let url = format!("{}/api/analyze-document", self.base_url);
        let body = AnalyzeDocumentRequest {
            document_b64: BASE64.encode(bytes),
            kind: kind.as_str().to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| GenerationError::AnalysisFailed(self.transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::AnalysisFailed(format!(
                "status {status}: {body}"
            )));
        }

        response
            .json::<DocumentAnalysis>()
            .map_err(|e| GenerationError::AnalysisFailed(e.to_string()))
    }

    fn analyze_case(&self, request: &CaseAnalysisRequest) -> Result<String, GenerationError> {
        let url = format!("{}/api/analyze-recording", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| GenerationError::GenerationFailed(self.transport_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "status {status}: {body}"
            )));
        }

        let parsed: AnalyzeCaseResponse = response
            .json()
            .map_err(|e| GenerationError::GenerationFailed(e.to_string()))?;
        Ok(parsed.analysis)
    }
}

// ---------------------------------------------------------------------------
// Mock client
// ---------------------------------------------------------------------------

/// Scripted outcome for one `generate_note` call.
pub enum MockNoteOutcome {
    Success(Vec<GeneratedSection>),
    InsufficientData(String),
    Failure(String),
}

/// Mock generation client for testing: scripted outcomes plus call counting.
///
/// `generate_note` pops the next scripted outcome; when the script is
/// empty, every call succeeds with one generated section per heading the
/// registry asks for ("<Heading> note" content), tagged with the call
/// number so tests can tell generations apart.
pub struct MockGenerationClient {
    transcript: Result<String, String>,
    note_script: Mutex<VecDeque<MockNoteOutcome>>,
    analysis_script: Mutex<VecDeque<Result<DocumentAnalysis, String>>>,
    case_response: String,
    counters: MockCounters,
}

/// Shared call counters; clone a handle out before boxing the mock.
#[derive(Clone, Default)]
pub struct MockCounters {
    pub transcribe: Arc<AtomicUsize>,
    pub generate: Arc<AtomicUsize>,
    pub analyze: Arc<AtomicUsize>,
}

impl MockCounters {
    pub fn generate_calls(&self) -> usize {
        self.generate.load(Ordering::SeqCst)
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze.load(Ordering::SeqCst)
    }
}

impl Default for MockGenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerationClient {
    pub fn new() -> Self {
        Self {
            transcript: Ok("transcribed narrative".into()),
            note_script: Mutex::new(VecDeque::new()),
            analysis_script: Mutex::new(VecDeque::new()),
            case_response: "Case Summary:\nStable patient.".into(),
            counters: MockCounters::default(),
        }
    }

    pub fn counters(&self) -> MockCounters {
        self.counters.clone()
    }

    pub fn with_transcript(mut self, transcript: &str) -> Self {
        self.transcript = Ok(transcript.to_string());
        self
    }

    pub fn with_failing_transcription(mut self, reason: &str) -> Self {
        self.transcript = Err(reason.to_string());
        self
    }

    pub fn push_note_outcome(self, outcome: MockNoteOutcome) -> Self {
        self.note_script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn push_analysis(self, outcome: Result<DocumentAnalysis, String>) -> Self {
        self.analysis_script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_case_response(mut self, response: &str) -> Self {
        self.case_response = response.to_string();
        self
    }
}

impl GenerationClient for MockGenerationClient {
    fn transcribe(&self, _audio: &[u8], _consult_id: &Uuid) -> Result<String, GenerationError> {
        self.counters.transcribe.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .clone()
            .map_err(GenerationError::TranscriptionFailed)
    }

    fn generate_note(
        &self,
        _consult_id: &Uuid,
        _raw_input: &str,
        variant: ReportVariant,
        _patient: Option<&PatientContext>,
    ) -> Result<GeneratedNote, GenerationError> {
        let call = self.counters.generate.fetch_add(1, Ordering::SeqCst) + 1;

        let scripted = self.note_script.lock().unwrap().pop_front();
        match scripted {
            Some(MockNoteOutcome::Success(sections)) => Ok(GeneratedNote { variant, sections }),
            Some(MockNoteOutcome::InsufficientData(detail)) => {
                Err(GenerationError::InsufficientClinicalData(detail))
            }
            Some(MockNoteOutcome::Failure(reason)) => {
                Err(GenerationError::GenerationFailed(reason))
            }
            None => {
                let sections = crate::pipeline::schema::sections(variant)
                    .iter()
                    .map(|&heading| GeneratedSection {
                        heading: heading.to_string(),
                        content: format!("{heading} note (gen {call})"),
                    })
                    .collect();
                Ok(GeneratedNote { variant, sections })
            }
        }
    }

    fn analyze_document(
        &self,
        _bytes: &[u8],
        _kind: DocumentKind,
    ) -> Result<DocumentAnalysis, GenerationError> {
        self.counters.analyze.fetch_add(1, Ordering::SeqCst);
        match self.analysis_script.lock().unwrap().pop_front() {
            Some(Ok(analysis)) => Ok(analysis),
            Some(Err(reason)) => Err(GenerationError::AnalysisFailed(reason)),
            None => Ok(DocumentAnalysis::default()),
        }
    }

    fn analyze_case(&self, _request: &CaseAnalysisRequest) -> Result<String, GenerationError> {
        Ok(self.case_response.clone())
    }
}
