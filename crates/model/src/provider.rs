use std::error::Error;

use crate::error::ErrorKind;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;

    /// Returns the name of the provider that produced this error, for
    /// example `"openai"`.
    fn provider(&self) -> &str;

    /// Returns the HTTP status the provider answered with, if the error
    /// came from a non-success response.
    fn status(&self) -> Option<u16> {
        None
    }
}

/// A type that represents a model provider, which takes a conversation
/// and produces the next assistant reply.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the provider should be prepared for being dropped anytime.
///
/// Providers never retry. A failed request is reported once, and the
/// caller decides what to do next.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Returns the name of this provider, for example `"claude"`.
    fn name(&self) -> &str;

    /// Sends a request to the model.
    ///
    /// The returned future must not borrow the provider.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static;
}

/// A type that turns text into an embedding vector, used for similarity
/// search over stored documents.
pub trait EmbeddingProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Computes the embedding of `input`.
    ///
    /// The returned future must not borrow the provider.
    fn embed(
        &self,
        input: &str,
    ) -> impl Future<Output = Result<Vec<f32>, Self::Error>> + Send + 'static;
}
