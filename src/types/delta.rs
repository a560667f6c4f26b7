use serde::{Deserialize, Serialize};

/// One incremental unit of assistant output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Text to append to the reply.
    Text(String),
    /// A terminal error reported by the backend in place of further text.
    Error(String),
}

impl Delta {
    /// Returns true for the terminal error variant.
    pub fn is_error(&self) -> bool {
        matches!(self, Delta::Error(_))
    }
}

/// The JSON object carried by each stream event.
///
/// `error` takes precedence over `text`; an object with neither appends
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaPayload {
    /// Appended text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Terminal error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<DeltaPayload> for Delta {
    fn from(payload: DeltaPayload) -> Self {
        match payload {
            DeltaPayload {
                error: Some(error), ..
            } => Delta::Error(error),
            DeltaPayload { text, .. } => Delta::Text(text.unwrap_or_default()),
        }
    }
}

impl From<Delta> for DeltaPayload {
    fn from(delta: Delta) -> Self {
        match delta {
            Delta::Text(text) => DeltaPayload {
                text: Some(text),
                error: None,
            },
            Delta::Error(error) => DeltaPayload {
                text: None,
                error: Some(error),
            },
        }
    }
}
