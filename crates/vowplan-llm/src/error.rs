use std::time::Duration;

use thiserror::Error;

/// The model output did not contain parseable JSON of the expected shape.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("No '{0}' found in AI response")]
    MissingOpen(char),

    #[error("No '{0}' found in AI response")]
    MissingClose(char),

    #[error("Last '{close}' comes before first '{open}' in AI response")]
    Inverted { open: char, close: char },

    #[error("AI response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Parsed JSON lacked fields the records require. The whole batch is dropped.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizationError {
    #[error("Expected a JSON {0}")]
    WrongShape(&'static str),

    #[error("Task #{index} is not an object")]
    TaskNotObject { index: usize },

    #[error("Task #{index} has no 'task' text")]
    MissingTask { index: usize },

    #[error("Task #{index} has an invalid dueDate: {value}")]
    InvalidDueDate { index: usize, value: String },

    #[error("Venue #{index} is malformed: {reason}")]
    InvalidVenue { index: usize, reason: String },
}

/// The generation call itself failed.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation request failed: {0}")]
    Failure(String),

    #[error("AI returned no text")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error("{0}")]
    InvalidRequest(String),
}

impl AiError {
    /// Whether retrying the same action could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AiError::InvalidRequest(_))
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            AiError::Generation(GenerationError::Timeout(_)) => {
                "The AI took too long to answer. Please try again.".to_string()
            }
            AiError::Generation(_) => "The AI service is unavailable. Please try again.".to_string(),
            AiError::Extraction(_) | AiError::Normalization(_) => {
                "The AI answer could not be understood. Please try again.".to_string()
            }
            AiError::InvalidRequest(msg) => msg.clone(),
        }
    }
}
