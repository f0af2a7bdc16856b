//! Text to instruction translation.
//!
//! A [`Cascade`] tries its translators in order and returns the first
//! successful instruction list. The rule table runs first; the model
//! translator picks up whatever the rules cannot shape.

pub mod extract;
pub mod journal;
pub mod llm;
pub mod model;
pub mod prompt;
pub mod rules;
pub mod shaping;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;
use crate::instruction::Instruction;
use crate::settings::AppSettings;

use journal::Journal;
use llm::HttpCompletionClient;
use model::ModelTranslator;
use rules::RuleTranslator;

#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &'static str;
    async fn translate(&self, text: &str) -> Result<Vec<Instruction>, AppError>;
}

/// Ordered fallback chain of translators.
pub struct Cascade {
    translators: Vec<Arc<dyn Translator>>,
    journal: Option<Journal>,
}

impl Cascade {
    pub fn new(translators: Vec<Arc<dyn Translator>>) -> Self {
        Self {
            translators,
            journal: None,
        }
    }

    /// Rule table followed by the HTTP model translator.
    pub fn from_settings(
        config_dir: &std::path::Path,
        settings: &AppSettings,
    ) -> Result<Self, AppError> {
        let rules: Arc<dyn Translator> = Arc::new(RuleTranslator::new()?);
        let model: Arc<dyn Translator> = Arc::new(ModelTranslator::new(
            Arc::new(HttpCompletionClient::new(&settings.llm)),
            settings.llm.max_repair_attempts,
        ));
        let cascade = Self::new(vec![rules, model]);
        Ok(if settings.journal_translations {
            cascade.with_journal(Journal::new(config_dir.to_path_buf()))
        } else {
            cascade
        })
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.translators.iter().map(|t| t.name()).collect()
    }

    /// First success wins. When every translator fails the last error is
    /// returned.
    pub async fn translate(&self, text: &str) -> Result<Vec<Instruction>, AppError> {
        let result = self.run(text).await;
        if let Some(journal) = &self.journal {
            match &result {
                Ok(instructions) => journal.record(text, true, instructions),
                Err(_) => journal.record(text, false, &[]),
            }
        }
        result
    }

    async fn run(&self, text: &str) -> Result<Vec<Instruction>, AppError> {
        let mut last_error = AppError::Validation {
            message: "No translator is configured.".to_string(),
        };
        for translator in &self.translators {
            match translator.translate(text).await {
                Ok(instructions) => {
                    tracing::info!(
                        translator = translator.name(),
                        count = instructions.len(),
                        "translated request"
                    );
                    return Ok(instructions);
                }
                Err(e) => {
                    tracing::debug!(translator = translator.name(), error = %e, "translator declined");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Fixed {
        name: &'static str,
        result: Result<Vec<Instruction>, AppError>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(name: &'static str, action: &str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Ok(vec![Instruction::local(action)]),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Err(AppError::Validation {
                    message: format!("{name} failed"),
                }),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Translator for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn translate(&self, _text: &str) -> Result<Vec<Instruction>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let first = Fixed::failing("first");
        let second = Fixed::ok("second", "connect");
        let third = Fixed::ok("third", "disconnect");
        let cascade = Cascade::new(vec![first.clone(), second.clone(), third.clone()]);

        let out = cascade.translate("anything").await.unwrap();
        assert_eq!(out[0].action, "connect");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failing_returns_last_error() {
        let cascade = Cascade::new(vec![Fixed::failing("a"), Fixed::failing("b")]);
        let err = cascade.translate("anything").await.unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: b failed");
        assert!(Cascade::new(Vec::new()).translate("x").await.is_err());
    }

    #[tokio::test]
    async fn outcomes_are_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::new(dir.path().to_path_buf());
        let cascade = Cascade::new(vec![Fixed::ok("rules", "connect")]).with_journal(journal.clone());
        cascade.translate("connect").await.unwrap();

        let entries = journal.read_today().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prompt, "connect");
        assert!(entries[0].success);
    }
}
