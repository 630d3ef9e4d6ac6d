use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;
use erased_serde;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
    #[serde(rename = "tool")]
    Tool,
}

// A tool call as it appears on an assistant message:
//
// {
//     "id": "call_Yx1kq0yH3bBdr0bYcGv1nM2P",
//     "type": "function",
//     "function": {
//         "name": "add_event",
//         "arguments": "{\"summary\":\"Dentist\",\"start_time\":\"2025-10-06 10:00\",...}"
//     }
// }
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FunctionCallFn {
    pub arguments: String,
    pub name: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct FunctionCall {
    pub function: FunctionCallFn,
    pub id: String,
    pub r#type: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Message {
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<FunctionCall>>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: Some(content.to_string()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
    pub fn new_tool_call_request(tool_calls: Vec<FunctionCall>) -> Self {
        Message {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }
    pub fn new_tool_call_response(content: &str, tool_call_id: &str) -> Self {
        Message {
            role: Role::Tool,
            content: Some(content.to_string()),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        }
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn is_tool_call_request(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

#[derive(Serialize)]
pub struct Property {
    pub r#type: String,
    pub description: String,
}

#[derive(Serialize)]
pub struct Parameters<Props: Serialize> {
    pub r#type: String,
    pub properties: Props,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

#[derive(Serialize)]
pub struct Function<Props: Serialize> {
    pub name: String,
    pub description: String,
    pub parameters: Parameters<Props>,
    pub strict: bool,
}

#[derive(Serialize)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

// `serde::Serialize` isn't object safe, so a list of tools with
// different parameter types can't be serialized through a plain trait
// object. `erased_serde` provides an object safe version that
// `serde_json` can still consume.
#[async_trait]
pub trait ToolCall: erased_serde::Serialize {
    async fn call(&self, args: &str) -> Result<String, Error>;
    fn function_name(&self) -> String;
}
erased_serde::serialize_trait_object!(ToolCall);

pub type BoxedToolCall = Box<dyn ToolCall + Send + Sync + 'static>;

/// Request the next chat completion from an OpenAI compatible API.
pub async fn completion(
    messages: &Vec<Message>,
    tools: &Option<Vec<BoxedToolCall>>,
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<Value, Error> {
    let mut payload = json!({
        "model": model,
        "messages": messages,
    });
    if let Some(tools) = tools
        && !tools.is_empty()
    {
        payload["tools"] = json!(tools);
    }
    let url = format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"));
    tracing::debug!("Requesting completion from {} with {} messages", url, messages.len());
    let response = reqwest::Client::new()
        .post(url)
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(Duration::from_secs(60 * 5))
        .json(&payload)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), r#""tool""#);
    }

    #[test]
    fn test_message_new() {
        let msg = Message::new(Role::User, "What's on my calendar?");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"user","content":"What's on my calendar?"}"#
        );
        assert_eq!(msg.role(), &Role::User);
        assert!(!msg.is_tool_call_request());
    }

    #[test]
    fn test_message_new_tool_call_request() {
        let tool_calls = vec![FunctionCall {
            function: FunctionCallFn {
                arguments: r#"{"max_results":3}"#.to_string(),
                name: "list_events".to_string(),
            },
            id: "call_test123".to_string(),
            r#type: "function".to_string(),
        }];

        let msg = Message::new_tool_call_request(tool_calls);
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"assistant","tool_calls":[{"function":{"arguments":"{\"max_results\":3}","name":"list_events"},"id":"call_test123","type":"function"}]}"#
        );
        assert!(msg.is_tool_call_request());
    }

    #[test]
    fn test_message_new_tool_call_response() {
        let msg = Message::new_tool_call_response("No upcoming events.", "call_test123");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"tool","content":"No upcoming events.","tool_call_id":"call_test123"}"#
        );
    }

    #[test]
    fn test_function_call_deserialization() {
        let json = r#"{
            "function": {"arguments":"{\"event_id\":\"evt_1\"}","name":"delete_event"},
            "id":"call_test123",
            "type":"function"
        }"#;
        let fc: FunctionCall = serde_json::from_str(json).unwrap();
        assert_eq!(fc.id, "call_test123");
        assert_eq!(fc.function.name, "delete_event");
        assert_eq!(fc.function.arguments, r#"{"event_id":"evt_1"}"#);
    }

    #[test]
    fn test_function_serialization() {
        let props = serde_json::json!({
            "duration_minutes": {"type": "integer", "description": "Length of the slot"}
        });
        let func = Function {
            name: "recommend_time".to_string(),
            description: "Recommend free time today".to_string(),
            parameters: Parameters {
                r#type: "object".to_string(),
                properties: props,
                required: vec![],
                additional_properties: false,
            },
            strict: false,
        };
        let json = serde_json::to_value(&func).unwrap();
        assert_eq!(json["name"], "recommend_time");
        assert_eq!(json["parameters"]["additionalProperties"], false);
        assert_eq!(
            json["parameters"]["properties"]["duration_minutes"]["type"],
            "integer"
        );
        assert_eq!(serde_json::to_string(&ToolType::Function).unwrap(), r#""function""#);
    }

    #[tokio::test]
    async fn test_completion_basic() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(json!({"model": "gpt-4.1-mini"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}}]}"#)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let json = completion(&messages, &None, &server.url(), "test-key", "gpt-4.1-mini")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(json["choices"][0]["message"]["content"], "Hello!");
    }

    #[tokio::test]
    async fn test_completion_sends_tools() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(mockito::Matcher::Regex(
                r#""tools":\[\{"name":"list_events"\}\]"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"content": "ok"}}]}"#)
            .create_async()
            .await;

        #[derive(serde::Serialize)]
        struct MockTool {
            name: String,
        }
        #[async_trait]
        impl ToolCall for MockTool {
            async fn call(&self, _args: &str) -> Result<String, Error> {
                Ok("mock result".to_string())
            }
            fn function_name(&self) -> String {
                self.name.clone()
            }
        }

        let tools = Some(vec![Box::new(MockTool {
            name: String::from("list_events"),
        }) as BoxedToolCall]);
        let messages = vec![Message::new(Role::User, "What's next?")];
        completion(&messages, &tools, &server.url(), "test-key", "gpt-4.1-mini")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_completion_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let err = completion(&messages, &None, &server.url(), "bad-key", "gpt-4.1-mini")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
