use serde::{Deserialize, Serialize};
use testsmith_model::{ModelMessage, ModelRequest};

use crate::ClaudeConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ContentBlock {
    pub r#type: String,
    pub text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    role: Role,
    content: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

// -----------
// Conversions
// -----------

/// Builds the request body. System messages don't exist in the Messages
/// API, they are lifted into the top-level `system` field.
pub fn create_request(
    req: &ModelRequest,
    config: &ClaudeConfig,
) -> MessagesRequest {
    let mut system: Option<String> = None;
    let mut messages = Vec::with_capacity(req.messages.len());
    for msg in &req.messages {
        match msg {
            ModelMessage::System(content) => match &mut system {
                Some(system) => {
                    system.push_str("\n\n");
                    system.push_str(content);
                }
                None => system = Some(content.clone()),
            },
            ModelMessage::User(content) => messages.push(Message {
                role: Role::User,
                content: content.clone(),
            }),
            ModelMessage::Assistant(content) => messages.push(Message {
                role: Role::Assistant,
                content: content.clone(),
            }),
        }
    }

    MessagesRequest {
        model: req.model.clone().unwrap_or_else(|| config.model.clone()),
        max_tokens: req.max_tokens.unwrap_or(config.max_tokens),
        temperature: 0.0,
        system,
        messages,
    }
}

/// Pulls the first text block out of a Messages API body.
pub fn reply_text(resp: &MessagesResponse) -> Option<&str> {
    resp.content
        .iter()
        .find(|block| block.r#type == "text")
        .and_then(|block| block.text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::ClaudeConfigBuilder;

    #[test]
    fn test_create_request_lifts_system() {
        let request = ModelRequest::with_messages([
            ModelMessage::System("You write unit tests.".to_owned()),
            ModelMessage::User("Test Foo.vue".to_owned()),
            ModelMessage::Assistant("```js\n```".to_owned()),
            ModelMessage::User("1 failed".to_owned()),
        ]);
        let config = ClaudeConfigBuilder::with_api_key("xxx").build();
        assert_eq!(
            serde_json::to_value(create_request(&request, &config)).unwrap(),
            json!({
                "model": "claude-3-sonnet-20240229",
                "max_tokens": 2000,
                "temperature": 0.0,
                "system": "You write unit tests.",
                "messages": [
                    { "role": "user", "content": "Test Foo.vue" },
                    { "role": "assistant", "content": "```js\n```" },
                    { "role": "user", "content": "1 failed" }
                ]
            })
        );
    }

    #[test]
    fn test_create_request_without_system() {
        let request = ModelRequest::with_messages([ModelMessage::User(
            "Hi".to_owned(),
        )]);
        let config = ClaudeConfigBuilder::with_api_key("xxx").build();
        let value =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert!(value.get("system").is_none());
    }

    #[test]
    fn test_reply_text_skips_non_text_blocks() {
        let resp: MessagesResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "describe()" }
            ]
        }))
        .unwrap();
        assert_eq!(reply_text(&resp), Some("describe()"));

        let resp: MessagesResponse =
            serde_json::from_value(json!({ "content": [] })).unwrap();
        assert_eq!(reply_text(&resp), None);
    }
}
