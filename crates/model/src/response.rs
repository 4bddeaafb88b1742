use serde_json::Value;

/// A complete reply from the model provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    /// The assistant text of the reply.
    pub text: String,
    /// The unmodified response body, as the provider sent it.
    pub raw: Value,
}
