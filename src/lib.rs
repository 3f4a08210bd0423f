//! Rust client library for cloud Speech-to-Text and Text-to-Speech services.
//!
//! REST operations are typed methods on [`SpeechToText`] and [`TextToSpeech`].
//! Long-running server-side work (corpus analysis, model training,
//! asynchronous recognition) can be awaited with the `wait_for_*` helpers,
//! which are built on the generic [`await_completion`] poller. Real-time
//! audio goes through [`RecognizeStream`] and [`SynthesizeStream`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rust_speech::{SpeechToText, TrainLanguageModelParams, WaitParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stt = SpeechToText::from_env()?;
//!     let customization_id = std::env::var("CUSTOMIZATION_ID")?;
//!
//!     let wait = WaitParams::new(customization_id.as_str())
//!         .interval(Duration::from_secs(10))
//!         .times(60);
//!
//!     // Corpora must be analyzed before training.
//!     stt.wait_for_corpora(&wait).await?;
//!
//!     stt.train_language_model(&TrainLanguageModelParams {
//!         customization_id: customization_id.clone(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//!     match stt.wait_for_customization(&wait).await {
//!         Ok(model) => println!("Model {} is {:?}", model.customization_id, model.status),
//!         Err(e) if e.code() == Some("ERR_TIMEOUT") => println!("Still training"),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
mod config;
mod error;
pub mod messages;
pub mod models;
pub mod poll;
mod queue;
mod recognize;
pub mod service;
mod stt;
mod synthesize;
mod tts;
mod ws;

pub use auth::{
    Authenticator, BasicAuthenticator, BearerTokenAuthenticator, NoAuthAuthenticator,
};
pub use config::ServiceConfig;
pub use error::Error;
pub use models::*;
pub use poll::{
    await_completion, await_completion_if, PollError, PollErrorKind, PollPolicy, Readiness,
};
pub use recognize::{RecognizeConfig, RecognizeEvent, RecognizeStream};
pub use service::{BaseService, DetailedResponse};
pub use stt::*;
pub use synthesize::{SynthesizeConfig, SynthesizeEvent, SynthesizeStream};
pub use tts::*;

/// Default Speech-to-Text service URL.
pub const STT_URL: &str = "https://api.us-south.speech-to-text.watson.cloud.ibm.com";

/// Default Text-to-Speech service URL.
pub const TTS_URL: &str = "https://api.us-south.text-to-speech.watson.cloud.ibm.com";
