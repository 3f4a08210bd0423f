//! Resource types returned by the REST operations.

use serde::{Deserialize, Serialize};

use crate::poll::Readiness;

// ============================================================================
// Speech-to-Text: models and recognition
// ============================================================================

/// A base speech recognition model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechModel {
    pub name: String,
    pub language: String,
    /// Sampling rate in Hz.
    pub rate: u32,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub supported_features: Option<SupportedFeatures>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedFeatures {
    pub custom_language_model: bool,
    #[serde(default)]
    pub custom_acoustic_model: bool,
    pub speaker_labels: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechModels {
    pub models: Vec<SpeechModel>,
}

/// One alternative transcript for a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRecognitionAlternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// `[word, start, end]` triples.
    #[serde(default)]
    pub timestamps: Option<Vec<(String, f64, f64)>>,
    /// `[word, confidence]` pairs.
    #[serde(default)]
    pub word_confidence: Option<Vec<(String, f64)>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRecognitionResult {
    /// `true` once the result will no longer change.
    #[serde(rename = "final")]
    pub is_final: bool,
    pub alternatives: Vec<SpeechRecognitionAlternative>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechRecognitionResults {
    #[serde(default)]
    pub results: Vec<SpeechRecognitionResult>,
    #[serde(default)]
    pub result_index: Option<u32>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl SpeechRecognitionResults {
    /// Best transcript of every final result, joined.
    pub fn transcript(&self) -> String {
        self.results
            .iter()
            .filter(|r| r.is_final)
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// Speech-to-Text: asynchronous recognition jobs
// ============================================================================

/// Status of a recognition job. Values outside the known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "waiting" => JobStatus::Waiting,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Other(raw),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// An asynchronous recognition job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionJob {
    pub id: String,
    pub status: JobStatus,
    pub created: String,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user_token: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<SpeechRecognitionResults>>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl RecognitionJob {
    pub fn readiness(&self) -> Readiness {
        match &self.status {
            JobStatus::Waiting | JobStatus::Processing => Readiness::Pending,
            JobStatus::Completed => Readiness::Ready,
            JobStatus::Failed => Readiness::Failed(format!("recognition job {} failed", self.id)),
            JobStatus::Other(raw) => Readiness::Unexpected(raw.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionJobs {
    pub recognitions: Vec<RecognitionJob>,
}

// ============================================================================
// Speech-to-Text: custom language models
// ============================================================================

/// Status of a custom language model. Values outside the known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ModelStatus {
    Pending,
    Ready,
    Training,
    Failed,
    Available,
    Upgrading,
    Other(String),
}

impl ModelStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ModelStatus::Pending => "pending",
            ModelStatus::Ready => "ready",
            ModelStatus::Training => "training",
            ModelStatus::Failed => "failed",
            ModelStatus::Available => "available",
            ModelStatus::Upgrading => "upgrading",
            ModelStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for ModelStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "pending" => ModelStatus::Pending,
            "ready" => ModelStatus::Ready,
            "training" => ModelStatus::Training,
            "failed" => ModelStatus::Failed,
            "available" => ModelStatus::Available,
            "upgrading" => ModelStatus::Upgrading,
            _ => ModelStatus::Other(raw),
        }
    }
}

impl From<ModelStatus> for String {
    fn from(status: ModelStatus) -> Self {
        match status {
            ModelStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// A custom language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModel {
    pub customization_id: String,
    pub status: ModelStatus,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub base_model_name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub versions: Vec<String>,
    /// Training progress in percent.
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub warnings: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl LanguageModel {
    /// Classifies the training status.
    pub fn readiness(&self) -> Readiness {
        match &self.status {
            ModelStatus::Pending | ModelStatus::Training => Readiness::Pending,
            ModelStatus::Ready | ModelStatus::Available => Readiness::Ready,
            ModelStatus::Failed => Readiness::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| format!("training of {} failed", self.customization_id)),
            ),
            other => Readiness::Unexpected(other.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModels {
    pub customizations: Vec<LanguageModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CorpusStatus {
    Analyzed,
    BeingProcessed,
    Undetermined,
    Other(String),
}

impl CorpusStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CorpusStatus::Analyzed => "analyzed",
            CorpusStatus::BeingProcessed => "being_processed",
            CorpusStatus::Undetermined => "undetermined",
            CorpusStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for CorpusStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "analyzed" => CorpusStatus::Analyzed,
            "being_processed" => CorpusStatus::BeingProcessed,
            "undetermined" => CorpusStatus::Undetermined,
            _ => CorpusStatus::Other(raw),
        }
    }
}

impl From<CorpusStatus> for String {
    fn from(status: CorpusStatus) -> Self {
        match status {
            CorpusStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// A text corpus attached to a custom language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub name: String,
    pub status: CorpusStatus,
    #[serde(default)]
    pub total_words: u64,
    #[serde(default)]
    pub out_of_vocabulary_words: u64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpora {
    pub corpora: Vec<Corpus>,
}

impl Corpora {
    /// Any corpus still being processed keeps the whole set pending.
    pub fn readiness(&self) -> Readiness {
        if self
            .corpora
            .iter()
            .any(|c| c.status == CorpusStatus::BeingProcessed)
        {
            Readiness::Pending
        } else if self
            .corpora
            .iter()
            .any(|c| c.status == CorpusStatus::Analyzed)
        {
            Readiness::Ready
        } else {
            let statuses: Vec<String> = self
                .corpora
                .iter()
                .map(|c| format!("{}: {}", c.name, c.status.as_str()))
                .collect();
            Readiness::Unexpected(format!("[{}]", statuses.join(", ")))
        }
    }
}

/// A custom word, shared by both services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sounds_like: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_as: Option<String>,
    /// Text-to-Speech pronunciation (SPR or IPA).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Words {
    pub words: Vec<Word>,
}

// ============================================================================
// Text-to-Speech
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub customizable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voices {
    pub voices: Vec<Voice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pronunciation {
    pub pronunciation: String,
}

/// A custom Text-to-Speech model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomModel {
    pub customization_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomModels {
    pub customizations: Vec<CustomModel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model(status: &str) -> LanguageModel {
        serde_json::from_value(json!({"customization_id": "cid", "status": status})).unwrap()
    }

    #[test]
    fn test_language_model_readiness() {
        assert_eq!(model("pending").readiness(), Readiness::Pending);
        assert_eq!(model("training").readiness(), Readiness::Pending);
        assert_eq!(model("ready").readiness(), Readiness::Ready);
        assert_eq!(model("available").readiness(), Readiness::Ready);
        assert!(matches!(model("failed").readiness(), Readiness::Failed(_)));
        assert_eq!(
            model("upgrading").readiness(),
            Readiness::Unexpected("upgrading".to_string())
        );
    }

    #[test]
    fn test_unknown_status_keeps_server_value() {
        let m = model("melting");
        assert_eq!(m.status, ModelStatus::Other("melting".to_string()));
        assert_eq!(m.readiness(), Readiness::Unexpected("melting".to_string()));
        assert_eq!(serde_json::to_value(&m.status).unwrap(), json!("melting"));

        let job: RecognitionJob = serde_json::from_value(
            json!({"id": "j1", "status": "paused", "created": "now"}),
        )
        .unwrap();
        assert_eq!(job.readiness(), Readiness::Unexpected("paused".to_string()));

        assert_eq!(
            corpora(&["quarantined"]).readiness(),
            Readiness::Unexpected("[c0: quarantined]".to_string())
        );
        assert_eq!(serde_json::to_value(CorpusStatus::BeingProcessed).unwrap(), json!("being_processed"));
    }

    #[test]
    fn test_failed_model_reports_server_error() {
        let m: LanguageModel = serde_json::from_value(
            json!({"customization_id": "cid", "status": "failed", "error": "no corpora"}),
        )
        .unwrap();
        assert_eq!(m.readiness(), Readiness::Failed("no corpora".to_string()));
    }

    fn corpora(statuses: &[&str]) -> Corpora {
        let list: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| json!({"name": format!("c{i}"), "status": s}))
            .collect();
        serde_json::from_value(json!({ "corpora": list })).unwrap()
    }

    #[test]
    fn test_corpora_readiness() {
        assert_eq!(
            corpora(&["analyzed", "being_processed"]).readiness(),
            Readiness::Pending
        );
        assert_eq!(
            corpora(&["analyzed", "undetermined"]).readiness(),
            Readiness::Ready
        );
        assert!(matches!(
            corpora(&["undetermined"]).readiness(),
            Readiness::Unexpected(_)
        ));
        assert!(matches!(corpora(&[]).readiness(), Readiness::Unexpected(_)));
    }

    #[test]
    fn test_job_readiness() {
        let job = |status: &str| -> RecognitionJob {
            serde_json::from_value(json!({"id": "j1", "status": status, "created": "now"})).unwrap()
        };
        assert_eq!(job("waiting").readiness(), Readiness::Pending);
        assert_eq!(job("processing").readiness(), Readiness::Pending);
        assert_eq!(job("completed").readiness(), Readiness::Ready);
        assert!(matches!(job("failed").readiness(), Readiness::Failed(_)));
    }

    #[test]
    fn test_transcript_joins_final_results() {
        let results: SpeechRecognitionResults = serde_json::from_value(json!({
            "result_index": 0,
            "results": [
                {"final": true, "alternatives": [{"transcript": "hello "}]},
                {"final": false, "alternatives": [{"transcript": "wor"}]},
                {"final": true, "alternatives": [{"transcript": "world "}]}
            ]
        }))
        .unwrap();
        assert_eq!(results.transcript(), "hello world");
    }
}
