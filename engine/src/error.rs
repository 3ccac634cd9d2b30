//! Structured error types for the menupress export pipeline.
//!
//! Only failures that abort a job live here. Asset fetch and text
//! measurement problems degrade the page instead and never reach the caller.

use thiserror::Error;

/// The unified error type returned by all public menupress API functions.
#[derive(Debug, Error)]
pub enum MenuError {
    /// JSON input failed to parse as a valid menu record.
    #[error("Failed to parse menu: {source}{}", hint_suffix(.hint))]
    Parse {
        #[source]
        source: serde_json::Error,
        hint: String,
    },

    /// A menu item was rejected at the data-model boundary.
    #[error("Invalid menu item '{id}': {reason}")]
    InvalidItem { id: String, reason: String },

    /// A font could not be parsed or embedded.
    #[error("Font error: {0}")]
    Font(String),

    /// Writing or handing out the finished document failed.
    #[error("Delivery error: {context}")]
    Delivery {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn hint_suffix(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {}", hint)
    }
}

impl MenuError {
    pub(crate) fn delivery(context: impl Into<String>, source: std::io::Error) -> Self {
        MenuError::Delivery {
            context: context.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for MenuError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the menu schema. Expected { name, items: [{ id, name, description, imageUrl }] }.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input. Is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        MenuError::Parse { source: e, hint }
    }
}
