//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use calendar_assistant::calendar::{CalendarClient, CalendarError};
use calendar_assistant::google::credentials::TokenSource;

pub const TEST_TOKEN: &str = "test_token";

/// Hands out a fixed bearer token so tests never touch the OAuth flow.
pub struct FixedToken;

#[async_trait]
impl TokenSource for FixedToken {
    async fn access_token(&self) -> Result<String, CalendarError> {
        Ok(TEST_TOKEN.to_string())
    }
}

/// Fails like a user who never finished logging in.
pub struct LoginRequired;

#[async_trait]
impl TokenSource for LoginRequired {
    async fn access_token(&self) -> Result<String, CalendarError> {
        Err(CalendarError::authentication("interactive login required"))
    }
}

/// A calendar client pointed at a mock Google Calendar server.
pub fn test_client(base_url: &str) -> Arc<CalendarClient> {
    Arc::new(CalendarClient::new(
        base_url,
        "primary",
        chrono_tz::Asia::Jakarta,
        Arc::new(FixedToken),
    ))
}

pub fn unauthenticated_client(base_url: &str) -> Arc<CalendarClient> {
    Arc::new(CalendarClient::new(
        base_url,
        "primary",
        chrono_tz::Asia::Jakarta,
        Arc::new(LoginRequired),
    ))
}

/// Chat completion body with a plain assistant reply.
pub fn completion_body(content: Option<&str>) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
    .to_string()
}

/// Chat completion body asking for a single tool call.
pub fn tool_call_body(name: &str, arguments: Value) -> String {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
    .to_string()
}

pub fn event_json(id: &str, summary: &str, start: &str, end: &str) -> Value {
    json!({
        "id": id,
        "summary": summary,
        "htmlLink": format!("https://calendar.google.com/event?eid={}", id),
        "start": {"dateTime": start, "timeZone": "Asia/Jakarta"},
        "end": {"dateTime": end, "timeZone": "Asia/Jakarta"}
    })
}
