//! Speech-to-Text service client.
//!
//! Each operation validates its required parameters, builds one
//! [`Request`] and hands it to the shared [`BaseService`]. The `wait_for_*`
//! helpers poll asynchronous server-side work until it is done.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::auth::{authenticator_from_env, Authenticator};
use crate::config::ServiceConfig;
use crate::error::{require, Error};
use crate::models::*;
use crate::poll::{await_completion, await_completion_if, PollError, PollPolicy};
use crate::recognize::{RecognizeConfig, RecognizeStream};
use crate::service::{BaseService, DetailedResponse, FormPart, Request};

/// Name used for `{NAME}_*` environment variables.
pub const STT_SERVICE_NAME: &str = "speech_to_text";

// ============================================================================
// Parameters
// ============================================================================

/// Identifies the resource to wait for and how to poll it.
#[derive(Debug, Clone)]
pub struct WaitParams {
    /// Customization id or recognition job id.
    pub resource_id: String,
    /// Wait between status checks (default 5000 ms).
    pub interval: Duration,
    /// Maximum number of status checks, the first one included (default 30).
    pub times: u32,
}

impl WaitParams {
    pub fn new(resource_id: impl Into<String>) -> Self {
        let policy = PollPolicy::default();
        Self {
            resource_id: resource_id.into(),
            interval: policy.interval,
            times: policy.max_attempts,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = times;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(self.interval, self.times)
    }
}

/// Audio for one-shot or asynchronous recognition.
#[derive(Debug, Clone, Default)]
pub struct RecognizeParams {
    pub audio: Vec<u8>,
    /// e.g. `audio/flac`, `audio/wav`, `audio/l16; rate=16000`.
    pub content_type: String,
    pub model: Option<String>,
    pub language_customization_id: Option<String>,
    pub acoustic_customization_id: Option<String>,
    pub timestamps: Option<bool>,
    pub word_confidence: Option<bool>,
    pub smart_formatting: Option<bool>,
    pub speaker_labels: Option<bool>,
    pub max_alternatives: Option<u32>,
}

impl RecognizeParams {
    pub fn new(audio: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            audio,
            content_type: content_type.into(),
            ..Default::default()
        }
    }

    fn apply(&self, request: Request) -> Request {
        request
            .query_opt("model", self.model.as_ref())
            .query_opt(
                "language_customization_id",
                self.language_customization_id.as_ref(),
            )
            .query_opt(
                "acoustic_customization_id",
                self.acoustic_customization_id.as_ref(),
            )
            .query_opt("timestamps", self.timestamps)
            .query_opt("word_confidence", self.word_confidence)
            .query_opt("smart_formatting", self.smart_formatting)
            .query_opt("speaker_labels", self.speaker_labels)
            .query_opt("max_alternatives", self.max_alternatives)
            .bytes(self.content_type.clone(), self.audio.clone())
    }
}

/// Submits audio for asynchronous recognition.
#[derive(Debug, Clone, Default)]
pub struct CreateJobParams {
    pub recognize: RecognizeParams,
    /// URL to notify when the job changes state.
    pub callback_url: Option<String>,
    /// Comma-separated job events to notify about.
    pub events: Option<String>,
    pub user_token: Option<String>,
    /// Minutes the results are kept.
    pub results_ttl: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateLanguageModelParams {
    pub name: String,
    pub base_model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateLanguageModelParams {
    pub fn new(name: impl Into<String>, base_model_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_model_name: base_model_name.into(),
            dialect: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainLanguageModelParams {
    pub customization_id: String,
    /// `all` or `user`.
    pub word_type_to_add: Option<String>,
    pub customization_weight: Option<f64>,
}

/// Adds a plain-text corpus to a custom language model.
#[derive(Debug, Clone, Default)]
pub struct AddCorpusParams {
    pub customization_id: String,
    pub corpus_name: String,
    pub corpus_file: Vec<u8>,
    pub allow_overwrite: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ListWordsParams {
    pub customization_id: String,
    /// `all`, `user` or `corpora`.
    pub word_type: Option<String>,
    /// `alphabetical` or `count`, optionally prefixed with `-`.
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AddWordParams {
    pub customization_id: String,
    pub word: Word,
}

// ============================================================================
// Client
// ============================================================================

/// Speech-to-Text REST client.
#[derive(Debug, Clone)]
pub struct SpeechToText {
    service: BaseService,
}

impl SpeechToText {
    pub fn new(config: ServiceConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self, Error> {
        Ok(Self {
            service: BaseService::new(config, authenticator)?,
        })
    }

    /// Builds a client from `SPEECH_TO_TEXT_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(
            ServiceConfig::from_env(STT_SERVICE_NAME, crate::STT_URL),
            authenticator_from_env(STT_SERVICE_NAME),
        )
    }

    pub fn service(&self) -> &BaseService {
        &self.service
    }

    // ---- Models -------------------------------------------------------------

    pub async fn list_models(&self) -> Result<DetailedResponse<SpeechModels>, Error> {
        self.service.execute(Request::get("/v1/models")).await
    }

    pub async fn get_model(&self, model_id: &str) -> Result<DetailedResponse<SpeechModel>, Error> {
        require(&[("model_id", model_id.is_empty())])?;
        self.service
            .execute(Request::get("/v1/models/{model_id}").path_param("model_id", model_id))
            .await
    }

    // ---- Recognition --------------------------------------------------------

    /// Recognizes a complete audio file in one request.
    pub async fn recognize(
        &self,
        params: &RecognizeParams,
    ) -> Result<DetailedResponse<SpeechRecognitionResults>, Error> {
        require(&[
            ("audio", params.audio.is_empty()),
            ("content_type", params.content_type.is_empty()),
        ])?;
        self.service
            .execute(params.apply(Request::post("/v1/recognize")))
            .await
    }

    /// Opens a streaming recognition session. Call [`RecognizeStream::start`] to connect.
    pub fn recognize_using_websocket(&self, config: RecognizeConfig) -> Result<RecognizeStream, Error> {
        require(&[("content_type", config.content_type.is_empty())])?;
        RecognizeStream::new(&self.service, config)
    }

    // ---- Asynchronous jobs --------------------------------------------------

    pub async fn create_job(
        &self,
        params: &CreateJobParams,
    ) -> Result<DetailedResponse<RecognitionJob>, Error> {
        require(&[
            ("audio", params.recognize.audio.is_empty()),
            ("content_type", params.recognize.content_type.is_empty()),
        ])?;
        let request = Request::post("/v1/recognitions")
            .query_opt("callback_url", params.callback_url.as_ref())
            .query_opt("events", params.events.as_ref())
            .query_opt("user_token", params.user_token.as_ref())
            .query_opt("results_ttl", params.results_ttl);
        self.service.execute(params.recognize.apply(request)).await
    }

    pub async fn check_jobs(&self) -> Result<DetailedResponse<RecognitionJobs>, Error> {
        self.service.execute(Request::get("/v1/recognitions")).await
    }

    pub async fn check_job(&self, id: &str) -> Result<DetailedResponse<RecognitionJob>, Error> {
        require(&[("id", id.is_empty())])?;
        self.service
            .execute(Request::get("/v1/recognitions/{id}").path_param("id", id))
            .await
    }

    pub async fn delete_job(&self, id: &str) -> Result<DetailedResponse<()>, Error> {
        require(&[("id", id.is_empty())])?;
        self.service
            .execute(Request::delete("/v1/recognitions/{id}").path_param("id", id))
            .await
    }

    // ---- Custom language models ---------------------------------------------

    pub async fn create_language_model(
        &self,
        params: &CreateLanguageModelParams,
    ) -> Result<DetailedResponse<LanguageModel>, Error> {
        require(&[
            ("name", params.name.is_empty()),
            ("base_model_name", params.base_model_name.is_empty()),
        ])?;
        let request = Request::post("/v1/customizations").json(params)?;
        self.service.execute(request).await
    }

    /// Lists custom language models, optionally for one language only.
    pub async fn list_language_models(
        &self,
        language: Option<&str>,
    ) -> Result<DetailedResponse<LanguageModels>, Error> {
        self.service
            .execute(Request::get("/v1/customizations").query_opt("language", language))
            .await
    }

    pub async fn get_language_model(
        &self,
        customization_id: &str,
    ) -> Result<DetailedResponse<LanguageModel>, Error> {
        require(&[("customization_id", customization_id.is_empty())])?;
        self.service
            .execute(
                Request::get("/v1/customizations/{customization_id}")
                    .path_param("customization_id", customization_id),
            )
            .await
    }

    pub async fn delete_language_model(
        &self,
        customization_id: &str,
    ) -> Result<DetailedResponse<()>, Error> {
        require(&[("customization_id", customization_id.is_empty())])?;
        self.service
            .execute(
                Request::delete("/v1/customizations/{customization_id}")
                    .path_param("customization_id", customization_id),
            )
            .await
    }

    /// Starts training. Use [`wait_for_customization`](Self::wait_for_customization) to wait for it.
    pub async fn train_language_model(
        &self,
        params: &TrainLanguageModelParams,
    ) -> Result<DetailedResponse<Value>, Error> {
        require(&[("customization_id", params.customization_id.is_empty())])?;
        let request = Request::post("/v1/customizations/{customization_id}/train")
            .path_param("customization_id", params.customization_id.as_str())
            .query_opt("word_type_to_add", params.word_type_to_add.as_ref())
            .query_opt("customization_weight", params.customization_weight);
        self.service.execute(request).await
    }

    pub async fn reset_language_model(
        &self,
        customization_id: &str,
    ) -> Result<DetailedResponse<()>, Error> {
        require(&[("customization_id", customization_id.is_empty())])?;
        self.service
            .execute(
                Request::post("/v1/customizations/{customization_id}/reset")
                    .path_param("customization_id", customization_id),
            )
            .await
    }

    // ---- Corpora ------------------------------------------------------------

    pub async fn list_corpora(
        &self,
        customization_id: &str,
    ) -> Result<DetailedResponse<Corpora>, Error> {
        require(&[("customization_id", customization_id.is_empty())])?;
        self.service
            .execute(
                Request::get("/v1/customizations/{customization_id}/corpora")
                    .path_param("customization_id", customization_id),
            )
            .await
    }

    /// Uploads a corpus. Analysis runs in the background; see
    /// [`wait_for_corpora`](Self::wait_for_corpora).
    pub async fn add_corpus(&self, params: &AddCorpusParams) -> Result<DetailedResponse<()>, Error> {
        require(&[
            ("customization_id", params.customization_id.is_empty()),
            ("corpus_name", params.corpus_name.is_empty()),
            ("corpus_file", params.corpus_file.is_empty()),
        ])?;
        let request = Request::post("/v1/customizations/{customization_id}/corpora/{corpus_name}")
            .path_param("customization_id", params.customization_id.as_str())
            .path_param("corpus_name", params.corpus_name.as_str())
            .query_opt("allow_overwrite", params.allow_overwrite)
            .multipart(vec![FormPart {
                name: "corpus_file".to_string(),
                file_name: Some(params.corpus_name.clone()),
                content_type: "text/plain".to_string(),
                data: params.corpus_file.clone(),
            }]);
        self.service.execute(request).await
    }

    pub async fn get_corpus(
        &self,
        customization_id: &str,
        corpus_name: &str,
    ) -> Result<DetailedResponse<Corpus>, Error> {
        require(&[
            ("customization_id", customization_id.is_empty()),
            ("corpus_name", corpus_name.is_empty()),
        ])?;
        self.service
            .execute(
                Request::get("/v1/customizations/{customization_id}/corpora/{corpus_name}")
                    .path_param("customization_id", customization_id)
                    .path_param("corpus_name", corpus_name),
            )
            .await
    }

    pub async fn delete_corpus(
        &self,
        customization_id: &str,
        corpus_name: &str,
    ) -> Result<DetailedResponse<()>, Error> {
        require(&[
            ("customization_id", customization_id.is_empty()),
            ("corpus_name", corpus_name.is_empty()),
        ])?;
        self.service
            .execute(
                Request::delete("/v1/customizations/{customization_id}/corpora/{corpus_name}")
                    .path_param("customization_id", customization_id)
                    .path_param("corpus_name", corpus_name),
            )
            .await
    }

    // ---- Words --------------------------------------------------------------

    pub async fn list_words(&self, params: &ListWordsParams) -> Result<DetailedResponse<Words>, Error> {
        require(&[("customization_id", params.customization_id.is_empty())])?;
        self.service
            .execute(
                Request::get("/v1/customizations/{customization_id}/words")
                    .path_param("customization_id", params.customization_id.as_str())
                    .query_opt("word_type", params.word_type.as_ref())
                    .query_opt("sort", params.sort.as_ref()),
            )
            .await
    }

    pub async fn add_word(&self, params: &AddWordParams) -> Result<DetailedResponse<()>, Error> {
        require(&[
            ("customization_id", params.customization_id.is_empty()),
            ("word", params.word.word.is_empty()),
        ])?;
        let request = Request::put("/v1/customizations/{customization_id}/words/{word_name}")
            .path_param("customization_id", params.customization_id.as_str())
            .path_param("word_name", params.word.word.as_str())
            .json(&params.word)?;
        self.service.execute(request).await
    }

    pub async fn delete_word(
        &self,
        customization_id: &str,
        word_name: &str,
    ) -> Result<DetailedResponse<()>, Error> {
        require(&[
            ("customization_id", customization_id.is_empty()),
            ("word_name", word_name.is_empty()),
        ])?;
        self.service
            .execute(
                Request::delete("/v1/customizations/{customization_id}/words/{word_name}")
                    .path_param("customization_id", customization_id)
                    .path_param("word_name", word_name),
            )
            .await
    }

    // ---- Waiting for background work ----------------------------------------

    /// Waits until every corpus of a custom model has been analyzed.
    ///
    /// Fails with code `ERR_NO_CORPORA` without polling when the model has no
    /// corpora, and with `ERR_TIMEOUT` when analysis is still running after
    /// `params.times` checks.
    pub async fn wait_for_corpora(&self, params: &WaitParams) -> Result<Corpora, PollError<Corpora>> {
        require(&[("resource_id", params.resource_id.is_empty())])?;
        let id = params.resource_id.as_str();
        info!(customization_id = %id, "Waiting for corpus analysis");

        let has_corpora = async move {
            let corpora = self.fetch_corpora(id).await?;
            Ok::<_, Error>(!corpora.corpora.is_empty())
        };
        await_completion_if(
            has_corpora,
            id,
            move || self.fetch_corpora(id),
            Corpora::readiness,
            params.policy(),
        )
        .await
    }

    /// Waits until a custom language model has finished training.
    pub async fn wait_for_customization(
        &self,
        params: &WaitParams,
    ) -> Result<LanguageModel, PollError<LanguageModel>> {
        require(&[("resource_id", params.resource_id.is_empty())])?;
        let id = params.resource_id.as_str();
        info!(customization_id = %id, "Waiting for training");

        await_completion(
            id,
            move || self.fetch_language_model(id),
            LanguageModel::readiness,
            params.policy(),
        )
        .await
    }

    /// Waits until an asynchronous recognition job has completed.
    pub async fn wait_for_job(
        &self,
        params: &WaitParams,
    ) -> Result<RecognitionJob, PollError<RecognitionJob>> {
        require(&[("resource_id", params.resource_id.is_empty())])?;
        let id = params.resource_id.as_str();
        info!(job_id = %id, "Waiting for recognition job");

        await_completion(
            id,
            move || self.fetch_job(id),
            RecognitionJob::readiness,
            params.policy(),
        )
        .await
    }

    async fn fetch_corpora(&self, customization_id: &str) -> Result<Corpora, Error> {
        Ok(self.list_corpora(customization_id).await?.result)
    }

    async fn fetch_language_model(&self, customization_id: &str) -> Result<LanguageModel, Error> {
        Ok(self.get_language_model(customization_id).await?.result)
    }

    async fn fetch_job(&self, id: &str) -> Result<RecognitionJob, Error> {
        Ok(self.check_job(id).await?.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuthAuthenticator;
    use crate::poll::PollErrorKind;

    fn client() -> SpeechToText {
        // Nothing listens here; tests below must fail before any request.
        SpeechToText::new(
            ServiceConfig::new("http://127.0.0.1:9"),
            Arc::new(NoAuthAuthenticator),
        )
        .unwrap()
    }

    #[test]
    fn test_wait_params_defaults() {
        let params = WaitParams::new("cid");
        assert_eq!(params.interval, Duration::from_millis(5000));
        assert_eq!(params.times, 30);

        let params = params.interval(Duration::from_millis(10)).times(3);
        assert_eq!(params.policy(), PollPolicy::new(Duration::from_millis(10), 3));
    }

    #[tokio::test]
    async fn test_missing_parameters_fail_before_request() {
        let stt = client();

        let err = stt
            .add_corpus(&AddCorpusParams::default())
            .await
            .unwrap_err();
        match err {
            Error::MissingParameter(names) => {
                assert_eq!(names, vec!["customization_id", "corpus_name", "corpus_file"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(matches!(
            stt.recognize(&RecognizeParams::default()).await,
            Err(Error::MissingParameter(_))
        ));
        assert!(matches!(
            stt.get_language_model("").await,
            Err(Error::MissingParameter(_))
        ));
        assert!(matches!(
            stt.recognize_using_websocket(RecognizeConfig::new("")),
            Err(Error::MissingParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_without_id_is_missing_parameter() {
        let err = client()
            .wait_for_customization(&WaitParams::new(""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::MissingParameter);
        assert_eq!(err.code(), None);

        let err = client()
            .wait_for_corpora(&WaitParams::new(""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::MissingParameter);
    }
}
