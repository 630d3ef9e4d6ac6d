use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::ai::prompt::system_prompt;
use crate::ai::session::{AgentSession, TurnRole};
use crate::ai::tools::calendar_tools;
use crate::calendar::CalendarClient;
use crate::core::AppConfig;

const HELP: &str = "Commands: /reset clears the conversation, /key <api key> switches the model API key, /history shows past messages, /quit exits.";

#[derive(Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Say(String),
    Reset,
    SetKey(String),
    History,
    Help,
    Quit,
    Skip,
    Invalid(String),
}

impl ShellCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Skip;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Say(line.to_string());
        };
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match name {
            "reset" => Self::Reset,
            "history" => Self::History,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "key" if arg.is_empty() => Self::Invalid(String::from("Usage: /key <api key>")),
            "key" => Self::SetKey(arg.to_string()),
            other => Self::Invalid(format!("Unknown command /{}. {}", other, HELP)),
        }
    }
}

/// Build a fresh session with its own calendar client. Called at
/// start and whenever the API key changes, so history never carries
/// over between keys. The prompt's date and time are rendered at every
/// turn.
pub fn new_session(config: &AppConfig, api_key: &str) -> Result<AgentSession> {
    let client = Arc::new(CalendarClient::from_config(config)?);
    let tz = client.default_timezone();
    let instructions = config.system_message.clone();
    let session = AgentSession::builder(&config.openai_api_hostname, api_key, &config.openai_model)
        .system_prompt(move || system_prompt(&instructions, &Utc::now().with_timezone(&tz)))
        .tools(calendar_tools(client))
        .build();
    Ok(session)
}

fn prompt_for_key(rl: &mut DefaultEditor) -> Result<Option<String>> {
    loop {
        match rl.readline("Model API key: ") {
            Ok(line) if !line.trim().is_empty() => return Ok(Some(line.trim().to_string())),
            Ok(_) => println!("An API key is required to start chatting."),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => return Err(err.into()),
        }
    }
}

fn print_history(session: &AgentSession) {
    if session.history().is_empty() {
        println!("(no messages yet)");
        return;
    }
    for turn in session.history() {
        let speaker = match turn.role {
            TurnRole::User => "you",
            TurnRole::Assistant => "assistant",
        };
        println!("[{}] {}", speaker, turn.content);
    }
}

pub async fn run(config: &AppConfig) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let api_key = match &config.openai_api_key {
        Some(key) => key.clone(),
        None => match prompt_for_key(&mut rl)? {
            Some(key) => key,
            None => return Ok(()),
        },
    };
    let mut session = new_session(config, &api_key)?;

    println!("Calendar assistant ready. {}", HELP);

    loop {
        let line = match rl.readline(">>> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        match ShellCommand::parse(&line) {
            ShellCommand::Skip => {}
            ShellCommand::Quit => break,
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Invalid(msg) => println!("{}", msg),
            ShellCommand::History => print_history(&session),
            ShellCommand::Reset => {
                session.reset();
                println!("Conversation cleared.");
            }
            ShellCommand::SetKey(key) => {
                if key == session.api_key() {
                    println!("That key is already in use.");
                    continue;
                }
                session = new_session(config, &key)?;
                println!("API key updated. Conversation cleared.");
            }
            ShellCommand::Say(text) => {
                let _ = rl.add_history_entry(text.as_str());
                // An authentication failure ends the shell
                let reply = session.respond(&text).await?;
                println!("{}\n", reply);
            }
        }
    }

    Ok(())
}
