//! A model provider for Anthropic's Messages API.

#[macro_use]
extern crate tracing;

mod config;
mod proto;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, Response, header};
use serde_json::Value;
use testsmith_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
};

pub use config::{ClaudeConfig, ClaudeConfigBuilder};
use proto::{ErrorBody, MessagesResponse};

/// The name this provider is selected by.
pub const PROVIDER_NAME: &str = "claude";

/// Error type for [`ClaudeProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            status: None,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn provider(&self) -> &str {
        PROVIDER_NAME
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Claude model provider.
#[derive(Clone, Debug)]
pub struct ClaudeProvider {
    client: Client,
    config: Arc<ClaudeConfig>,
}

impl ClaudeProvider {
    /// Creates a new `ClaudeProvider` with the given configuration.
    #[inline]
    pub fn new(config: ClaudeConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ModelProvider for ClaudeProvider {
    type Error = Error;

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static
    {
        let claude_req = proto::create_request(req, &self.config);
        let resp_fut = self
            .client
            .post(format!("{}{}", self.config.base_url, "/v1/messages"))
            .header("x-api-key", self.config.api_key.as_str())
            .header("anthropic-version", self.config.api_version)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&claude_req)
            .send();

        async move {
            let raw = read_json_body(resp_fut.await).await?;
            let resp: MessagesResponse = serde_json::from_value(raw.clone())
                .map_err(|err| {
                    Error::new(format!("{err}"), ErrorKind::MalformedBody)
                })?;
            let Some(text) = proto::reply_text(&resp) else {
                return Err(Error::new(
                    "reply has no text content block",
                    ErrorKind::MalformedBody,
                ));
            };
            let text = text.to_owned();
            trace!("got a reply of {} bytes", text.len());
            Ok(ModelResponse { text, raw })
        }
    }
}

async fn read_json_body(
    resp_or_err: Result<Response, reqwest::Error>,
) -> Result<Value, Error> {
    let resp = resp_or_err
        .map_err(|err| Error::new(format!("{err}"), ErrorKind::Transport))?;

    let status = resp.status();
    if !status.is_success() {
        let code = status.as_u16();
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|body| body.error.message)
            .unwrap_or_else(|_| status.to_string());
        warn!("claude answered with {code}: {message}");
        let mut err = Error::new(message, ErrorKind::from_status(code));
        err.status = Some(code);
        return Err(err);
    }

    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned);
    if let Some(content_type) = content_type {
        let is_json = content_type
            .parse::<Mime>()
            .map(|m| m.subtype() == mime::JSON)
            .unwrap_or(false);
        if !is_json {
            return Err(Error::new(
                format!("Unexpected content type: {content_type}"),
                ErrorKind::MalformedBody,
            ));
        }
    }

    let body = resp
        .text()
        .await
        .map_err(|err| Error::new(format!("{err}"), ErrorKind::Transport))?;
    serde_json::from_str(&body)
        .map_err(|err| Error::new(format!("{err}"), ErrorKind::MalformedBody))
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;
    use testsmith_model::ModelMessage;

    use super::*;

    fn provider_for(server: &Server) -> ClaudeProvider {
        let config = ClaudeConfigBuilder::with_api_key("claude-key")
            .with_base_url(server.url())
            .build();
        ClaudeProvider::new(config)
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut server = Server::new_async().await;
        let body = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "text", "text": "```js\nit()\n```" }]
        });
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "claude-key")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::PartialJson(json!({
                "system": "Only code.",
                "messages": [{ "role": "user", "content": "Test bar.js" }]
            })))
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let req = ModelRequest::with_messages([
            ModelMessage::System("Only code.".to_owned()),
            ModelMessage::User("Test bar.js".to_owned()),
        ]);
        let resp = provider_for(&server).send_request(&req).await.unwrap();
        assert_eq!(resp.text, "```js\nit()\n```");
        assert_eq!(resp.raw, body);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bad_status_keeps_provider_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
            )
            .create_async()
            .await;

        let req = ModelRequest::with_messages([ModelMessage::User(
            "Hi".to_owned(),
        )]);
        let err = provider_for(&server).send_request(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Status);
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.provider(), "claude");
        assert_eq!(err.message(), "invalid x-api-key");
    }

    #[tokio::test]
    async fn test_missing_text_block() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":[]}"#)
            .create_async()
            .await;

        let req = ModelRequest::with_messages([ModelMessage::User(
            "Hi".to_owned(),
        )]);
        let err = provider_for(&server).send_request(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedBody);
    }
}
