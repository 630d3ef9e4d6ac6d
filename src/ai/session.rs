//! A stateful conversation with the calendar agent.
//!
//! The session owns the turn history. Each call to `respond` renders
//! the system prompt afresh, forwards it plus every prior turn to the
//! model along with the calendar tools, then records the final answer.

use anyhow::{Error, Result};

use crate::calendar::CalendarError;
use crate::openai::{BoxedToolCall, Message, Role, chat};

pub const FALLBACK_REPLY: &str = "I could not produce a response.";

/// Renders the system message at the start of each turn.
pub type SystemPrompt = Box<dyn Fn() -> Result<String> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// One visible message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: &str) -> Self {
        Self {
            role: TurnRole::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.to_string(),
        }
    }

    fn to_message(&self) -> Message {
        let role = match self.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        };
        Message::new(role, &self.content)
    }
}

pub struct AgentSession {
    api_hostname: String,
    api_key: String,
    model: String,
    system_prompt: Option<SystemPrompt>,
    tools: Option<Vec<BoxedToolCall>>,
    history: Vec<Turn>,
}

fn is_authentication(err: &Error) -> bool {
    err.downcast_ref::<CalendarError>()
        .is_some_and(CalendarError::is_authentication)
}

impl AgentSession {
    pub fn builder(api_hostname: &str, api_key: &str, model: &str) -> SessionBuilder {
        SessionBuilder::new(api_hostname, api_key, model)
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn render_system(&self) -> Result<Option<String>> {
        self.system_prompt.as_ref().map(|render| render()).transpose()
    }

    fn transcript(&self, system: Option<String>) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if let Some(system) = system {
            messages.push(Message::new(Role::System, &system));
        }
        messages.extend(self.history.iter().map(Turn::to_message));
        messages
    }

    /// Send `text` as the next user turn and return the assistant's
    /// reply, which is also appended to the history.
    ///
    /// A failed model call is recorded as an assistant turn describing
    /// the error. An authentication failure from a calendar tool is
    /// returned as an error instead.
    pub async fn respond(&mut self, text: &str) -> Result<String> {
        let system = self.render_system()?;
        self.history.push(Turn::user(text));
        let transcript = self.transcript(system);

        let reply = match chat(
            &self.tools,
            &transcript,
            &self.api_hostname,
            &self.api_key,
            &self.model,
        )
        .await
        {
            Ok(messages) => {
                tracing::debug!("Turn produced {} messages", messages.len());
                messages
                    .last()
                    .filter(|m| *m.role() == Role::Assistant)
                    .and_then(|m| m.content.clone())
                    .filter(|content| !content.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_REPLY.to_string())
            }
            Err(e) if is_authentication(&e) => {
                tracing::error!("Calendar authentication failed: {}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Chat turn failed: {:#}", e);
                format!("Something went wrong: {}", e)
            }
        };

        self.history.push(Turn::assistant(&reply));
        Ok(reply)
    }
}

pub struct SessionBuilder {
    api_hostname: String,
    api_key: String,
    model: String,
    system_prompt: Option<SystemPrompt>,
    tools: Option<Vec<BoxedToolCall>>,
    history: Vec<Turn>,
}

impl SessionBuilder {
    pub fn new(api_hostname: &str, api_key: &str, model: &str) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_prompt: None,
            tools: None,
            history: Vec::new(),
        }
    }

    /// A system message that never changes.
    pub fn system_message(self, message: &str) -> Self {
        let message = message.to_string();
        self.system_prompt(move || Ok(message.clone()))
    }

    pub fn system_prompt<F>(mut self, render: F) -> Self
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        self.system_prompt = Some(Box::new(render));
        self
    }

    pub fn tools(mut self, tools: Vec<BoxedToolCall>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn history(mut self, turns: Vec<Turn>) -> Self {
        self.history = turns;
        self
    }

    pub fn build(self) -> AgentSession {
        AgentSession {
            api_hostname: self.api_hostname,
            api_key: self.api_key,
            model: self.model,
            system_prompt: self.system_prompt,
            tools: self.tools,
            history: self.history,
        }
    }
}
