//! Reusable prompts using Handlebars for templating. Strict mode is on
//! so a missing variable fails loudly instead of rendering blank.

use std::fmt;

use anyhow::Result;
use chrono::DateTime;
use chrono_tz::Tz;
use handlebars::Handlebars;
use serde_json::json;

#[derive(Debug)]
pub enum Prompt {
    CalendarAssistant,
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

const CALENDAR_ASSISTANT_PROMPT: &str = r"{{instructions}}

Today is {{weekday}}, {{date}}. The current time is {{time}} in {{timezone}}.

When the user gives a time without a timezone, assume {{timezone}}. Pass dates and times to tools as `YYYY-MM-DD HH:MM`. Use the event ID from `list_events` when deleting an event and confirm with the user if more than one event could match.
";

pub fn templates<'a>() -> Result<Handlebars<'a>> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Prompts are plain text, not HTML
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_template_string(
        &Prompt::CalendarAssistant.to_string(),
        CALENDAR_ASSISTANT_PROMPT,
    )?;
    Ok(registry)
}

/// System prompt for the calendar agent anchored to `now`.
pub fn system_prompt(instructions: &str, now: &DateTime<Tz>) -> Result<String> {
    let registry = templates()?;
    let rendered = registry.render(
        &Prompt::CalendarAssistant.to_string(),
        &json!({
            "instructions": instructions,
            "weekday": now.format("%A").to_string(),
            "date": now.format("%Y-%m-%d").to_string(),
            "time": now.format("%H:%M").to_string(),
            "timezone": now.timezone().name(),
        }),
    )?;
    Ok(rendered)
}
