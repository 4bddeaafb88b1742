use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use testsmith_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
};
use tracing::Instrument;

use crate::conversation::Conversation;

type SendRequestResult = Result<ModelResponse, GatewayError>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type HandlerFn = Arc<dyn Fn(ModelRequest) -> BoxedSendRequestFuture + Send + Sync>;

/// A provider call failed.
///
/// Every provider failure (bad status, malformed body, missing fields,
/// transport) collapses into this one error, tagged with the provider name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{provider} call failed: {detail}")]
pub struct GatewayError {
    provider: String,
    kind: ErrorKind,
    status: Option<u16>,
    detail: String,
}

impl GatewayError {
    pub(crate) fn from_provider_error<E: ModelProviderError>(err: &E) -> Self {
        Self {
            provider: err.provider().to_owned(),
            kind: err.kind(),
            status: err.status(),
            detail: err.to_string(),
        }
    }

    /// Returns the name of the failing provider.
    #[inline]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns the kind of the underlying provider error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the HTTP status the provider answered with, if any.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Returns the underlying error message.
    #[inline]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules.
///
/// This is the Model Gateway: whatever backend is configured, callers send
/// a conversation and get the reply text back.
#[derive(Clone)]
pub struct ModelClient {
    provider_name: Arc<str>,
    handler_fn: HandlerFn,
}

impl ModelClient {
    /// Wraps `provider`.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        let provider_name: Arc<str> = Arc::from(provider.name());
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    match fut.await {
                        Ok(resp) => Ok(resp),
                        Err(err) => {
                            error!("got an error: {err:?}");
                            Err(GatewayError::from_provider_error(&err))
                        }
                    }
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            provider_name,
            handler_fn,
        }
    }

    /// Returns the name of the wrapped provider.
    #[inline]
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Sends a request and returns the complete response, including the
    /// provider's raw body.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
    ) -> Result<ModelResponse, GatewayError> {
        (self.handler_fn)(req).await
    }

    /// Sends the whole conversation and returns the reply text.
    ///
    /// An empty reply is reported as a malformed body, since it could never
    /// be appended to the conversation.
    pub async fn send(
        &self,
        conversation: &Conversation,
    ) -> Result<String, GatewayError> {
        let resp = self.send_request(conversation.to_request()).await?;
        let text = resp.text.trim();
        if text.is_empty() {
            return Err(GatewayError {
                provider: self.provider_name.to_string(),
                kind: ErrorKind::MalformedBody,
                status: None,
                detail: "the reply is empty".to_owned(),
            });
        }
        debug!("{} replied with {} bytes", self.provider_name, text.len());
        Ok(text.to_owned())
    }
}

impl Debug for ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use testsmith_test_model::{PresetReply, TestModelProvider};

    use super::*;

    #[tokio::test]
    async fn test_send() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_reply(PresetReply::text("  How are you?\n"));
        let model_client = ModelClient::new(model_provider.clone());
        assert_eq!(model_client.provider_name(), "test");

        let mut conversation = Conversation::new("sys").unwrap();
        conversation.push_user("Hi").unwrap();
        for _ in 0..3 {
            let reply = model_client.send(&conversation).await.unwrap();
            assert_eq!(reply, "How are you?");
        }
        let requests = model_provider.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].messages, conversation.messages());
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider =
            TestModelProvider::repeating(PresetReply::Failure(Some(429)));
        let model_client = ModelClient::new(model_provider);
        let mut conversation = Conversation::new("sys").unwrap();
        conversation.push_user("Hi").unwrap();

        let err = model_client.send(&conversation).await.unwrap_err();
        assert_eq!(err.provider(), "test");
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().starts_with("test call failed"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_malformed() {
        let model_provider =
            TestModelProvider::repeating(PresetReply::text(" \n"));
        let model_client = ModelClient::new(model_provider);
        let mut conversation = Conversation::new("sys").unwrap();
        conversation.push_user("Hi").unwrap();

        let err = model_client.send(&conversation).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedBody);
        assert_eq!(err.status(), None);
    }
}
