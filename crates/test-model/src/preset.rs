use serde::{Deserialize, Serialize};

/// The preset reply for one assistant turn.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetReply {
    /// The model answers with this text.
    #[serde(rename = "text")]
    Text(String),
    /// The request fails, optionally with an HTTP status.
    #[serde(rename = "failure")]
    Failure(Option<u16>),
}

impl PresetReply {
    /// A reply that wraps `code` in a fenced block, as a model would.
    #[inline]
    pub fn fenced(lang: &str, code: &str) -> Self {
        PresetReply::Text(format!("Here you go:\n```{lang}\n{code}\n```\n"))
    }

    /// A plain-text reply.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        PresetReply::Text(text.into())
    }
}
