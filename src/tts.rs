//! Text-to-Speech service client.

use std::sync::Arc;

use serde::Serialize;

use crate::auth::{authenticator_from_env, Authenticator};
use crate::config::ServiceConfig;
use crate::error::{require, Error};
use crate::models::*;
use crate::service::{BaseService, DetailedResponse, Request};
use crate::synthesize::{SynthesizeConfig, SynthesizeStream};

/// Name used for `{NAME}_*` environment variables.
pub const TTS_SERVICE_NAME: &str = "text_to_speech";

/// Default audio format for synthesis.
pub const DEFAULT_ACCEPT: &str = "audio/ogg;codecs=opus";

/// Text to synthesize in one request.
#[derive(Debug, Clone, Default)]
pub struct SynthesizeParams {
    pub text: String,
    /// Audio format; [`DEFAULT_ACCEPT`] when unset.
    pub accept: Option<String>,
    pub voice: Option<String>,
    pub customization_id: Option<String>,
}

impl SynthesizeParams {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PronunciationParams {
    pub text: String,
    pub voice: Option<String>,
    /// `ipa` or `ibm`.
    pub format: Option<String>,
    pub customization_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCustomModelParams {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateCustomModelParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: None,
            description: None,
        }
    }
}

#[derive(Serialize)]
struct TextBody<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct TranslationBody<'a> {
    translation: &'a str,
}

/// Text-to-Speech REST client.
#[derive(Debug, Clone)]
pub struct TextToSpeech {
    service: BaseService,
}

impl TextToSpeech {
    pub fn new(config: ServiceConfig, authenticator: Arc<dyn Authenticator>) -> Result<Self, Error> {
        Ok(Self {
            service: BaseService::new(config, authenticator)?,
        })
    }

    /// Builds a client from `TEXT_TO_SPEECH_*` environment variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(
            ServiceConfig::from_env(TTS_SERVICE_NAME, crate::TTS_URL),
            authenticator_from_env(TTS_SERVICE_NAME),
        )
    }

    pub fn service(&self) -> &BaseService {
        &self.service
    }

    pub async fn list_voices(&self) -> Result<DetailedResponse<Voices>, Error> {
        self.service.execute(Request::get("/v1/voices")).await
    }

    pub async fn get_voice(
        &self,
        voice: &str,
        customization_id: Option<&str>,
    ) -> Result<DetailedResponse<Voice>, Error> {
        require(&[("voice", voice.is_empty())])?;
        self.service
            .execute(
                Request::get("/v1/voices/{voice}")
                    .path_param("voice", voice)
                    .query_opt("customization_id", customization_id),
            )
            .await
    }

    /// Synthesizes audio in one request. The result is the raw audio.
    pub async fn synthesize(&self, params: &SynthesizeParams) -> Result<DetailedResponse<Vec<u8>>, Error> {
        require(&[("text", params.text.is_empty())])?;
        let accept = params.accept.as_deref().unwrap_or(DEFAULT_ACCEPT);
        let request = Request::post("/v1/synthesize")
            .accept(accept)
            .query_opt("voice", params.voice.as_ref())
            .query_opt("customization_id", params.customization_id.as_ref())
            .json(&TextBody { text: &params.text })?;
        self.service.execute_bytes(request).await
    }

    /// Opens a streaming synthesis session. Call [`SynthesizeStream::start`] to connect.
    pub fn synthesize_using_websocket(
        &self,
        config: SynthesizeConfig,
    ) -> Result<SynthesizeStream, Error> {
        require(&[
            ("text", config.text.is_empty()),
            ("accept", config.accept.is_empty()),
        ])?;
        SynthesizeStream::new(&self.service, config)
    }

    pub async fn get_pronunciation(
        &self,
        params: &PronunciationParams,
    ) -> Result<DetailedResponse<Pronunciation>, Error> {
        require(&[("text", params.text.is_empty())])?;
        self.service
            .execute(
                Request::get("/v1/pronunciation")
                    .query("text", &params.text)
                    .query_opt("voice", params.voice.as_ref())
                    .query_opt("format", params.format.as_ref())
                    .query_opt("customization_id", params.customization_id.as_ref()),
            )
            .await
    }

    // ---- Custom models ------------------------------------------------------

    pub async fn create_custom_model(
        &self,
        params: &CreateCustomModelParams,
    ) -> Result<DetailedResponse<CustomModel>, Error> {
        require(&[("name", params.name.is_empty())])?;
        let request = Request::post("/v1/customizations").json(params)?;
        self.service.execute(request).await
    }

    pub async fn list_custom_models(
        &self,
        language: Option<&str>,
    ) -> Result<DetailedResponse<CustomModels>, Error> {
        self.service
            .execute(Request::get("/v1/customizations").query_opt("language", language))
            .await
    }

    pub async fn get_custom_model(
        &self,
        customization_id: &str,
    ) -> Result<DetailedResponse<CustomModel>, Error> {
        require(&[("customization_id", customization_id.is_empty())])?;
        self.service
            .execute(
                Request::get("/v1/customizations/{customization_id}")
                    .path_param("customization_id", customization_id),
            )
            .await
    }

    pub async fn delete_custom_model(
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

    // ---- Words --------------------------------------------------------------

    pub async fn list_words(&self, customization_id: &str) -> Result<DetailedResponse<Words>, Error> {
        require(&[("customization_id", customization_id.is_empty())])?;
        self.service
            .execute(
                Request::get("/v1/customizations/{customization_id}/words")
                    .path_param("customization_id", customization_id),
            )
            .await
    }

    /// Adds or replaces the pronunciation of one word.
    pub async fn add_word(
        &self,
        customization_id: &str,
        word: &str,
        translation: &str,
    ) -> Result<DetailedResponse<()>, Error> {
        require(&[
            ("customization_id", customization_id.is_empty()),
            ("word", word.is_empty()),
            ("translation", translation.is_empty()),
        ])?;
        let request = Request::put("/v1/customizations/{customization_id}/words/{word}")
            .path_param("customization_id", customization_id)
            .path_param("word", word)
            .json(&TranslationBody { translation })?;
        self.service.execute(request).await
    }

    pub async fn delete_word(
        &self,
        customization_id: &str,
        word: &str,
    ) -> Result<DetailedResponse<()>, Error> {
        require(&[
            ("customization_id", customization_id.is_empty()),
            ("word", word.is_empty()),
        ])?;
        self.service
            .execute(
                Request::delete("/v1/customizations/{customization_id}/words/{word}")
                    .path_param("customization_id", customization_id)
                    .path_param("word", word),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoAuthAuthenticator;

    #[tokio::test]
    async fn test_missing_parameters() {
        let tts = TextToSpeech::new(
            ServiceConfig::new("http://127.0.0.1:9"),
            Arc::new(NoAuthAuthenticator),
        )
        .unwrap();

        match tts.add_word("", "tomato", "").await {
            Err(Error::MissingParameter(names)) => {
                assert_eq!(names, vec!["customization_id", "translation"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            tts.synthesize(&SynthesizeParams::default()).await,
            Err(Error::MissingParameter(_))
        ));
        assert!(matches!(
            tts.synthesize_using_websocket(SynthesizeConfig::new("hi", "")),
            Err(Error::MissingParameter(_))
        ));
    }
}
