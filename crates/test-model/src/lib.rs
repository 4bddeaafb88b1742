//! A local fake model for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use testsmith_model::{
    ErrorKind, ModelMessage, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse,
};
use tokio::time::sleep;

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
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
        "test"
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the reply script. The reply
/// for a request is selected by the number of assistant messages already in
/// the request, so the first request gets the first reply, the request that
/// carries one assistant message gets the second one, and so on. If there are
/// no enough replies in the script, the repeating reply is used when set,
/// otherwise an error is returned.
///
/// Every request is recorded and can be inspected with
/// [`TestModelProvider::requests`].
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Vec<PresetReply>,
    repeating: Option<PresetReply>,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl TestModelProvider {
    /// Creates a provider that answers every request with `reply`.
    #[inline]
    pub fn repeating(reply: PresetReply) -> Self {
        Self {
            repeating: Some(reply),
            ..Default::default()
        }
    }

    #[inline]
    pub fn add_reply(&mut self, reply: PresetReply) {
        self.script.push(reply);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns a snapshot of the requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn select_reply(&self, req: &ModelRequest) -> Option<PresetReply> {
        let step_idx = req
            .messages
            .iter()
            .filter(|msg| matches!(msg, ModelMessage::Assistant(_)))
            .count();
        self.script
            .get(step_idx)
            .or(self.repeating.as_ref())
            .cloned()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;

    fn name(&self) -> &str {
        "test"
    }

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<ModelResponse, Self::Error>> + Send + 'static
    {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(req.clone()),
            Err(poisoned) => poisoned.into_inner().push(req.clone()),
        }
        let reply = self.select_reply(req);
        let delay = self.delay.unwrap_or(Duration::from_millis(1));

        async move {
            sleep(delay).await;
            match reply {
                Some(PresetReply::Text(text)) => Ok(ModelResponse {
                    raw: json!({ "text": text }),
                    text,
                }),
                Some(PresetReply::Failure(status)) => Err(Error {
                    message: "preset failure",
                    kind: status
                        .map(ErrorKind::from_status)
                        .unwrap_or(ErrorKind::Other),
                    status,
                }),
                None => Err(Error {
                    message: "no enough replies",
                    kind: ErrorKind::Other,
                    status: None,
                }),
            }
        }
    }
}
