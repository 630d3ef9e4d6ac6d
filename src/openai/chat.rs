use anyhow::{Error, Result, anyhow};
use futures_util::future::try_join_all;
use serde_json::Value;

use crate::openai::{BoxedToolCall, FunctionCall, FunctionCallFn, Message, Role, completion};

async fn handle_tool_call(
    tools: &[BoxedToolCall],
    tool_call: &Value,
) -> Result<Vec<Message>, Error> {
    let tool_call_id = &tool_call["id"]
        .as_str()
        .ok_or(anyhow!("Tool call missing ID: {}", tool_call))?;
    let tool_call_function = &tool_call["function"];
    let tool_call_args = tool_call_function["arguments"]
        .as_str()
        .ok_or(anyhow!("Tool call missing arguments: {}", tool_call))?;
    let tool_call_name = tool_call_function["name"]
        .as_str()
        .ok_or(anyhow!("Tool call missing name: {}", tool_call))?;

    tracing::debug!(
        "\nTool call: {}\nargs: {}",
        &tool_call_name,
        &tool_call_args
    );

    let tool_call_result = tools
        .iter()
        .find(|i| *i.function_name() == *tool_call_name)
        .ok_or(anyhow!(
            "Received tool call that doesn't exist: {}",
            tool_call_name
        ))?
        .call(tool_call_args)
        .await?;

    let tool_call_request = vec![FunctionCall {
        function: FunctionCallFn {
            arguments: tool_call_args.to_string(),
            name: tool_call_name.to_string(),
        },
        id: tool_call_id.to_string(),
        r#type: String::from("function"),
    }];
    let results = vec![
        Message::new_tool_call_request(tool_call_request),
        Message::new_tool_call_response(&tool_call_result, tool_call_id),
    ];

    Ok(results)
}

async fn handle_tool_calls(
    tools: &[BoxedToolCall],
    tool_calls: &[Value],
) -> Result<Vec<Message>, Error> {
    // Tool calls run concurrently but results are kept in the order
    // the model asked for them
    let futures = tool_calls.iter().map(|call| handle_tool_call(tools, call));
    let results = try_join_all(futures).await?.into_iter().flatten().collect();
    Ok(results)
}

/// Runs the next turn in chat by passing a transcript to the LLM for
/// the next response. Can return multiple messages when there are
/// tool calls.
///
/// When the model finishes without any text the returned messages
/// won't end with an assistant reply. Callers decide what to show
/// instead.
pub async fn chat(
    tools: &Option<Vec<BoxedToolCall>>,
    history: &Vec<Message>,
    api_hostname: &str,
    api_key: &str,
    model: &str,
) -> Result<Vec<Message>, Error> {
    let mut updated_history = history.to_owned();
    let mut messages = Vec::new();

    let mut resp = completion(history, tools, api_hostname, api_key, model).await?;

    // Tool calls need to be handled for the chat to proceed
    while let Some(tool_calls) = resp["choices"][0]["message"]["tool_calls"].as_array() {
        if tool_calls.is_empty() {
            break;
        }
        let tools_ref = tools
            .as_deref()
            .ok_or(anyhow!("Received tool call but no tools were specified"))?;

        let tool_call_msgs = handle_tool_calls(tools_ref, tool_calls).await?;
        for m in tool_call_msgs.into_iter() {
            messages.push(m.clone());
            updated_history.push(m);
        }

        // Provide the results of the tool calls back to the chat
        resp = completion(&updated_history, tools, api_hostname, api_key, model).await?;
    }

    match resp["choices"][0]["message"]["content"].as_str() {
        Some(msg) if !msg.trim().is_empty() => {
            messages.push(Message::new(Role::Assistant, msg));
        }
        _ => {
            tracing::warn!("No message content received. Resp: {}", resp);
        }
    }

    Ok(messages)
}
