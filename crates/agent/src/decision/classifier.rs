//! The reminder sub-question: which CRUD verb does the user mean?
//!
//! Keywords get this wrong often enough ("¿me cambias la cita que tengo?")
//! that a cheap LLM call may be consulted. The engine always bounds the
//! call with a timeout and falls back to
//! [`keyword_reminder_intent`](super::patterns::keyword_reminder_intent).

use async_trait::async_trait;
use orquesta_core::error::ProviderError;
use orquesta_core::message::Message;
use orquesta_core::provider::{Provider, ProviderRequest};
use orquesta_tools::names;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// A reminder operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderIntent {
    Create,
    List,
    Update,
    Cancel,
}

impl ReminderIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::Update => "update",
            Self::Cancel => "cancel",
        }
    }

    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Create => names::SCHEDULE_REMINDER,
            Self::List => names::LIST_REMINDERS,
            Self::Update => names::UPDATE_REMINDER,
            Self::Cancel => names::CANCEL_REMINDER,
        }
    }
}

impl FromStr for ReminderIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "schedule" | "crear" => Ok(Self::Create),
            "list" | "listar" => Ok(Self::List),
            "update" | "actualizar" => Ok(Self::Update),
            "cancel" | "delete" | "cancelar" => Ok(Self::Cancel),
            other => Err(format!("unknown reminder intent '{other}'")),
        }
    }
}

/// Answers the reminder sub-question for a message.
///
/// `Ok(None)` means the message is not about reminders at all.
#[async_trait]
pub trait ReminderClassifier: Send + Sync {
    async fn classify(&self, message: &str) -> Result<Option<ReminderIntent>, ProviderError>;
}

const CLASSIFIER_PROMPT: &str = "Clasifica el mensaje del usuario sobre recordatorios o citas. \
Responde con UNA sola palabra: create, list, update, cancel o none.";

/// Classifier backed by a (preferably small) chat model.
pub struct LlmReminderClassifier {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmReminderClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Read the first word of a classifier answer.
fn parse_answer(text: &str) -> Option<ReminderIntent> {
    let word: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    word.parse().ok()
}

#[async_trait]
impl ReminderClassifier for LlmReminderClassifier {
    async fn classify(&self, message: &str) -> Result<Option<ReminderIntent>, ProviderError> {
        let request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(CLASSIFIER_PROMPT), Message::user(message)],
        )
        .with_temperature(0.0)
        .with_max_tokens(5);

        let response = self.provider.complete(request).await?;
        Ok(parse_answer(&response.message.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;

    #[test]
    fn intents_map_to_tools() {
        assert_eq!(ReminderIntent::Create.tool_name(), names::SCHEDULE_REMINDER);
        assert_eq!(ReminderIntent::Cancel.tool_name(), names::CANCEL_REMINDER);
        assert_eq!("LIST".parse::<ReminderIntent>().unwrap(), ReminderIntent::List);
        assert!("maybe".parse::<ReminderIntent>().is_err());
    }

    #[test]
    fn answers_are_read_leniently() {
        assert_eq!(parse_answer(" cancel."), Some(ReminderIntent::Cancel));
        assert_eq!(parse_answer("Update\n"), Some(ReminderIntent::Update));
        assert_eq!(parse_answer("none"), None);
        assert_eq!(parse_answer(""), None);
    }

    #[tokio::test]
    async fn llm_classifier_reads_provider_answer() {
        let provider = Arc::new(SequentialMockProvider::texts(&["list"]));
        let classifier = LlmReminderClassifier::new(provider.clone(), "mock-model");
        let intent = classifier.classify("¿qué citas tengo?").await.unwrap();
        assert_eq!(intent, Some(ReminderIntent::List));
        assert_eq!(provider.call_count(), 1);
    }
}
