use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("translation is not configured")]
    NotConfigured,
    #[error("nothing to translate")]
    EmptyText,
    #[error("could not detect the language of the text")]
    UndetectedLanguage,
    #[error("translation service failed: {0}")]
    Service(String),
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn detect_language(&self, text: &str) -> Result<String, TranslateError>;

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslateError>;
}

/// Stand-in used when no translation backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredTranslator;

#[async_trait]
impl Translator for UnconfiguredTranslator {
    async fn detect_language(&self, _text: &str) -> Result<String, TranslateError> {
        Err(TranslateError::NotConfigured)
    }

    async fn translate(
        &self,
        _text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String, TranslateError> {
        Err(TranslateError::NotConfigured)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LanguagePair {
    pub primary: String,
    pub secondary: String,
}

impl LanguagePair {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self { primary: primary.into(), secondary: secondary.into() }
    }

    /// Text already in the primary language goes to the secondary one, anything else to the primary.
    pub fn target_for(&self, source: &str) -> &str {
        if base_language(source).eq_ignore_ascii_case(&self.primary) {
            &self.secondary
        } else {
            &self.primary
        }
    }
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self::new("ja", "en")
    }
}

fn base_language(code: &str) -> &str {
    code.split(['-', '_']).next().unwrap_or(code).trim()
}

#[cfg(test)]
mod tests {
    use super::{LanguagePair, TranslateError, Translator, UnconfiguredTranslator};

    #[test]
    fn japanese_goes_to_english_and_everything_else_to_japanese() {
        let pair = LanguagePair::default();
        assert_eq!(pair.target_for("ja"), "en");
        assert_eq!(pair.target_for("JA"), "en");
        assert_eq!(pair.target_for("en"), "ja");
        assert_eq!(pair.target_for("zh-TW"), "ja");
    }

    #[test]
    fn regional_variants_of_primary_are_treated_as_primary() {
        let pair = LanguagePair::new("pt", "en");
        assert_eq!(pair.target_for("pt-BR"), "en");
    }

    #[tokio::test]
    async fn unconfigured_translator_reports_not_configured() {
        let error = UnconfiguredTranslator.detect_language("hello").await.expect_err("no backend");
        assert_eq!(error, TranslateError::NotConfigured);
    }
}
