//! A model provider for OpenAI-compatible APIs.

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
    EmbeddingProvider, ErrorKind, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse,
};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use proto::{ChatCompletion, EmbeddingList, ErrorBody};

/// The name this provider is selected by.
pub const PROVIDER_NAME: &str = "openai";

/// Error type for [`OpenAIProvider`].
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

    fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
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

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.config.base_url, path))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static
    {
        let openai_req = proto::create_request(req, &self.config);
        let resp_fut = self.post("/chat/completions").json(&openai_req).send();

        async move {
            let raw = read_json_body(resp_fut.await).await?;
            let completion: ChatCompletion =
                serde_json::from_value(raw.clone()).map_err(|err| {
                    Error::new(format!("{err}"), ErrorKind::MalformedBody)
                })?;
            let Some(text) = proto::reply_text(&completion) else {
                return Err(Error::new(
                    "reply has no `choices[0].message.content`",
                    ErrorKind::MalformedBody,
                ));
            };
            let text = text.to_owned();
            trace!("got a reply of {} bytes", text.len());
            Ok(ModelResponse { text, raw })
        }
    }
}

impl EmbeddingProvider for OpenAIProvider {
    type Error = Error;

    fn embed(
        &self,
        input: &str,
    ) -> impl Future<Output = Result<Vec<f32>, Self::Error>> + Send + 'static
    {
        let embedding_req = proto::create_embedding_request(input, &self.config);
        let resp_fut = self.post("/embeddings").json(&embedding_req).send();

        async move {
            let raw = read_json_body(resp_fut.await).await?;
            let list: EmbeddingList =
                serde_json::from_value(raw).map_err(|err| {
                    Error::new(format!("{err}"), ErrorKind::MalformedBody)
                })?;
            list.data
                .into_iter()
                .next()
                .map(|item| item.embedding)
                .ok_or_else(|| {
                    Error::new(
                        "reply has no `data[0].embedding`",
                        ErrorKind::MalformedBody,
                    )
                })
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
        warn!("openai answered with {code}: {message}");
        return Err(
            Error::new(message, ErrorKind::from_status(code)).with_status(code)
        );
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
