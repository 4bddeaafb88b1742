//! HTTP endpoints: run a test, or proxy a conversation to a provider.

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{HeaderValue, Method, StatusCode, header, request};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use testsmith_core::{
    Component, ComponentName, Extractor, Harness, ModelClient,
};
use testsmith_model::{ModelMessage, ModelRequest};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{Provider, Settings};

/// Default listening address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:3002";

const PASSED_CONTENT: &str = "We have a good test";
const INTERNAL_ERROR: &str = "Internal Server Error";
const INVALID_MESSAGES: &str = "Invalid or missing messages array";

/// Shared server state.
#[derive(Clone, Debug)]
pub struct AppState {
    harness: Harness,
    openai: Option<ModelClient>,
    claude: Option<ModelClient>,
}

impl AppState {
    /// Creates the state from its parts. A provider without a client
    /// answers its proxy endpoint with an internal error.
    #[inline]
    pub fn new(
        harness: Harness,
        openai: Option<ModelClient>,
        claude: Option<ModelClient>,
    ) -> Self {
        Self {
            harness,
            openai,
            claude,
        }
    }

    /// Creates the state from environment settings. Providers without an
    /// API key are left unconfigured.
    pub fn from_settings(settings: &Settings) -> Self {
        let client = |provider| match settings.model_client(provider) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!("{err}");
                None
            }
        };
        Self::new(
            settings.harness(),
            client(Provider::OpenAI),
            client(Provider::Claude),
        )
    }

    fn client(&self, provider: Provider) -> Option<&ModelClient> {
        match provider {
            Provider::OpenAI => self.openai.as_ref(),
            Provider::Claude => self.claude.as_ref(),
        }
    }
}

/// Creates the router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(is_local_origin))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);
    Router::new()
        .route("/run-tests", post(run_tests))
        .route("/api/openai", post(proxy_openai))
        .route("/api/claude", post(proxy_claude))
        .layer(cors)
        .with_state(state)
}

/// Listens on `addr` until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await
}

fn is_local_origin(origin: &HeaderValue, _parts: &request::Parts) -> bool {
    let origin = origin.as_bytes();
    origin.starts_with(b"http://localhost")
        || origin.starts_with(b"https://localhost")
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    (status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunTestsRequest {
    #[serde(default)]
    test_code: Option<String>,
    #[serde(default)]
    component: Option<String>,
    #[serde(default)]
    component_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunTestsResponse {
    passed: bool,
    role: &'static str,
    content: String,
}

async fn run_tests(
    State(state): State<AppState>,
    payload: Result<Json<RunTestsRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    let non_empty = |field: Option<String>| field.filter(|s| !s.trim().is_empty());
    let (Some(test_code), Some(source), Some(name)) = (
        non_empty(payload.test_code),
        non_empty(payload.component),
        non_empty(payload.component_name),
    ) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing test code, component, or component name",
        );
    };
    let name = match ComponentName::new(name) {
        Ok(name) => name,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    let extractor = Extractor::for_component(&name);
    let test_code = extractor.rewrite_imports(&test_code).unwrap_or_else(|err| {
        warn!("keeping the original imports: {err}");
        test_code
    });
    let component = Component::new(name, source);

    match state.harness.run(&component, &test_code).await {
        Ok(outcome) => {
            let content = if outcome.passed {
                PASSED_CONTENT.to_owned()
            } else {
                outcome.diagnostics
            };
            Json(RunTestsResponse {
                passed: outcome.passed,
                role: "assistant",
                content,
            })
            .into_response()
        }
        Err(err) => {
            error!("failed to run the tests of {}: {err}", component.name());
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyRequest {
    #[serde(default)]
    messages: Vec<ModelMessage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

async fn proxy_openai(
    state: State<AppState>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Response {
    proxy(Provider::OpenAI, state, payload).await
}

async fn proxy_claude(
    state: State<AppState>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Response {
    proxy(Provider::Claude, state, payload).await
}

async fn proxy(
    provider: Provider,
    State(state): State<AppState>,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) if !payload.messages.is_empty() => payload,
        Ok(_) => {
            return error_response(StatusCode::BAD_REQUEST, INVALID_MESSAGES);
        }
        Err(rejection) => {
            debug!("rejected {provider} proxy request: {rejection}");
            return error_response(StatusCode::BAD_REQUEST, INVALID_MESSAGES);
        }
    };
    let Some(client) = state.client(provider) else {
        error!("{provider} is not configured");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
    };

    let req = ModelRequest {
        messages: payload.messages,
        model: payload.model,
        max_tokens: payload.max_tokens,
    };
    match client.send_request(req).await {
        Ok(resp) => Json(resp.raw).into_response(),
        Err(err) => {
            let status = err
                .status()
                .and_then(|status| StatusCode::from_u16(status).ok());
            match status {
                Some(status) => error_response(status, err.detail()),
                None => error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR,
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use testsmith_core::{JestRunner, RunnerConfig, Sandbox};
    use testsmith_test_model::{PresetReply, TestModelProvider};

    use super::*;

    struct TestServer {
        base_url: String,
        _root: tempfile::TempDir,
        http: reqwest::Client,
    }

    impl TestServer {
        async fn start(script: &str, provider: TestModelProvider) -> Self {
            let root = tempfile::tempdir().unwrap();
            let config = RunnerConfig::default()
                .with_program("/bin/sh")
                .with_args(["-c", script, "jest"])
                .with_flags(Vec::<OsString>::new());
            let harness =
                Harness::new(Sandbox::new(root.path()), JestRunner::new(config));
            let state =
                AppState::new(harness, Some(ModelClient::new(provider)), None);

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, router(state)).await.unwrap();
            });
            Self {
                base_url: format!("http://{addr}"),
                _root: root,
                http: reqwest::Client::new(),
            }
        }

        async fn post(&self, path: &str, body: Value) -> (u16, Value) {
            let resp = self
                .http
                .post(format!("{}{path}", self.base_url))
                .json(&body)
                .send()
                .await
                .unwrap();
            let status = resp.status().as_u16();
            (status, resp.json().await.unwrap())
        }
    }

    const PASSING: &str = r#"printf '{"success":true,"testResults":[]}'"#;

    #[test]
    fn test_local_origins() {
        let parts = axum::http::Request::new(()).into_parts().0;
        let allowed = |origin: &'static str| {
            is_local_origin(&HeaderValue::from_static(origin), &parts)
        };
        assert!(allowed("http://localhost:5173"));
        assert!(allowed("https://localhost"));
        assert!(!allowed("http://example.com"));
        assert!(!allowed("http://127.0.0.1:5173"));
    }

    #[tokio::test]
    async fn test_run_tests_passed() {
        let server =
            TestServer::start(PASSING, TestModelProvider::default()).await;
        let (status, body) = server
            .post(
                "/run-tests",
                json!({
                    "testCode": "import Button from './Foo.vue'",
                    "component": "<template/>",
                    "componentName": "Foo.vue"
                }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(
            body,
            json!({
                "passed": true,
                "role": "assistant",
                "content": "We have a good test"
            })
        );
        let root = server._root.path();
        assert_eq!(
            std::fs::read_to_string(root.join("test/Foo.spec.js")).unwrap(),
            "import Button from '../component/Foo.vue'"
        );
        assert!(root.join("component/Foo.vue").is_file());
    }

    #[tokio::test]
    async fn test_run_tests_failed() {
        let script = r#"printf '{"success":false,"testResults":[{"message":"bad\\n    at x (y:1:1)\\nworse"}]}'"#;
        let server = TestServer::start(script, TestModelProvider::default()).await;
        let (status, body) = server
            .post(
                "/run-tests",
                json!({
                    "testCode": "it('x')",
                    "component": "module.exports = 1",
                    "componentName": "bar.js"
                }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["passed"], json!(false));
        assert_eq!(body["content"], json!("bad <<newline>> worse"));
    }

    #[tokio::test]
    async fn test_run_tests_validation() {
        let server =
            TestServer::start(PASSING, TestModelProvider::default()).await;
        for body in [
            json!({ "component": "x", "componentName": "Foo.vue" }),
            json!({ "testCode": "", "component": "x", "componentName": "Foo.vue" }),
            json!({ "testCode": "x", "component": "x", "componentName": "../Foo.vue" }),
        ] {
            let (status, body) = server.post("/run-tests", body).await;
            assert_eq!(status, 400);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_run_tests_infrastructure_error() {
        let server = TestServer::start(
            "echo 'jest: not found' >&2",
            TestModelProvider::default(),
        )
        .await;
        let (status, body) = server
            .post(
                "/run-tests",
                json!({
                    "testCode": "x",
                    "component": "x",
                    "componentName": "Foo.vue"
                }),
            )
            .await;
        assert_eq!(status, 500);
        assert_eq!(body, json!({ "error": "Internal Server Error" }));
    }

    #[tokio::test]
    async fn test_proxy() {
        let provider = TestModelProvider::repeating(PresetReply::text("hello"));
        let server = TestServer::start(PASSING, provider.clone()).await;
        let (status, body) = server
            .post(
                "/api/openai",
                json!({
                    "messages": [{ "role": "user", "content": "Hi" }],
                    "model": "gpt-4o-mini",
                    "max_tokens": 10
                }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({ "text": "hello" }));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(requests[0].max_tokens, Some(10));
    }

    #[tokio::test]
    async fn test_proxy_errors() {
        let provider =
            TestModelProvider::repeating(PresetReply::Failure(Some(429)));
        let server = TestServer::start(PASSING, provider).await;
        let messages = json!({ "messages": [{ "role": "user", "content": "Hi" }] });

        let (status, body) = server.post("/api/openai", json!({})).await;
        assert_eq!(status, 400);
        assert_eq!(body, json!({ "error": "Invalid or missing messages array" }));
        let (status, _) =
            server.post("/api/openai", json!({ "messages": [] })).await;
        assert_eq!(status, 400);

        let (status, body) = server.post("/api/openai", messages.clone()).await;
        assert_eq!(status, 429);
        assert!(body["error"].is_string());

        // Claude has no client in the test server.
        let (status, body) = server.post("/api/claude", messages).await;
        assert_eq!(status, 500);
        assert_eq!(body, json!({ "error": "Internal Server Error" }));
    }
}
