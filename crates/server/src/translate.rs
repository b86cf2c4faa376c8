use std::time::Duration;

use async_trait::async_trait;
use hitter_core::config::TranslateConfig;
use hitter_core::translate::{TranslateError, Translator};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Client for a LibreTranslate-compatible API (`POST /detect`, `POST /translate`).
pub struct HttpTranslator {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for HttpTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTranslator")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl HttpTranslator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TranslateError::Service(error.to_string()))?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string(), api_key })
    }

    /// `None` when no translation backend is configured.
    pub fn from_config(config: &TranslateConfig) -> Result<Option<Self>, TranslateError> {
        let Some(base_url) = config.base_url.as_deref().filter(|url| !url.trim().is_empty())
        else {
            return Ok(None);
        };
        Self::new(base_url, config.api_key.clone(), Duration::from_secs(config.timeout_secs))
            .map(Some)
    }

    fn with_api_key(&self, mut body: Value) -> Value {
        if let (Some(key), Some(map)) = (&self.api_key, body.as_object_mut()) {
            map.insert("api_key".to_string(), Value::String(key.expose_secret().to_string()));
        }
        body
    }

    async fn call(&self, path: &str, body: Value) -> Result<Value, TranslateError> {
        let response = self
            .http
            .post(format!("{}/{path}", self.base_url))
            .json(&self.with_api_key(body))
            .send()
            .await
            .map_err(|error| TranslateError::Service(format!("{path}: {error}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|error| TranslateError::Service(format!("{path}: {error}")))?;
        if !status.is_success() {
            let detail = payload.get("error").and_then(Value::as_str).unwrap_or("no detail");
            return Err(TranslateError::Service(format!("{path}: HTTP {status}: {detail}")));
        }
        Ok(payload)
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn detect_language(&self, text: &str) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Err(TranslateError::EmptyText);
        }
        let payload = self.call("detect", json!({ "q": text })).await?;
        let detections: Vec<Detection> = serde_json::from_value(payload)
            .map_err(|error| TranslateError::Service(format!("detect: {error}")))?;
        best_detection(detections)
    }

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Err(TranslateError::EmptyText);
        }
        let payload = self
            .call(
                "translate",
                json!({ "q": text, "source": source, "target": target, "format": "text" }),
            )
            .await?;
        let translation: Translation = serde_json::from_value(payload)
            .map_err(|error| TranslateError::Service(format!("translate: {error}")))?;
        debug!(
            event_name = "translate.completed",
            source_language = %source,
            target_language = %target,
            "text translated"
        );
        Ok(translation.translated_text)
    }
}

fn best_detection(detections: Vec<Detection>) -> Result<String, TranslateError> {
    detections
        .into_iter()
        .filter(|detection| !detection.language.trim().is_empty())
        .max_by(|left, right| left.confidence.total_cmp(&right.confidence))
        .map(|detection| detection.language)
        .ok_or(TranslateError::UndetectedLanguage)
}
