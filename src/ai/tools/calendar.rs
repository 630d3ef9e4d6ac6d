//! Calendar operations exposed to the model as function tools.
//!
//! The set of operations is closed. `OperationKind` carries the schema
//! the model sees, `CalendarOperation` is the parsed, typed call, and
//! `CalendarTool` is the adapter that plugs one kind into the chat
//! loop. Results and failures are turned into plain text here, except
//! authentication failures, which abort the turn.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::calendar::{CalendarClient, CalendarError, slots::FreeSlot};
use crate::google::gcal::Event;
use crate::openai::{BoxedToolCall, Function, Parameters, Property, ToolCall, ToolType};

const DEFAULT_MAX_RESULTS: u32 = 5;
const DEFAULT_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    ListEvents,
    AddEvent,
    DeleteEvent,
    RecommendTime,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ListEvents,
        OperationKind::AddEvent,
        OperationKind::DeleteEvent,
        OperationKind::RecommendTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListEvents => "list_events",
            Self::AddEvent => "add_event",
            Self::DeleteEvent => "delete_event",
            Self::RecommendTime => "recommend_time",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ListEvents => "List the user's upcoming calendar events, soonest first. Each line includes the event ID.",
            Self::AddEvent => "Create a new calendar event. Times are free-form, for example '2025-10-06 10:00'. Times without a UTC offset are read in the given timezone.",
            Self::DeleteEvent => "Delete a calendar event by its ID. Look up the ID with list_events first.",
            Self::RecommendTime => "Recommend free time slots between now and the end of today, for example to find room for a 60 minute meeting.",
        }
    }

    /// Verb phrase used when reporting a failure back to the model.
    fn action(&self) -> &'static str {
        match self {
            Self::ListEvents => "list events",
            Self::AddEvent => "add event",
            Self::DeleteEvent => "delete event",
            Self::RecommendTime => "recommend a time",
        }
    }

    pub fn parameters(&self) -> Parameters<BTreeMap<&'static str, Property>> {
        let (properties, required) = match self {
            Self::ListEvents => (
                vec![(
                    "max_results",
                    property("integer", "Maximum number of events to return (default 5)."),
                )],
                vec![],
            ),
            Self::AddEvent => (
                vec![
                    ("summary", property("string", "Title of the event.")),
                    ("start_time", property("string", "When the event starts, e.g. '2025-10-06 10:00'.")),
                    ("end_time", property("string", "When the event ends, e.g. '2025-10-06 11:00'.")),
                    ("timezone", property("string", "IANA timezone for times without an offset, e.g. 'Asia/Jakarta'.")),
                ],
                vec!["summary", "start_time", "end_time"],
            ),
            Self::DeleteEvent => (
                vec![("event_id", property("string", "ID of the event to delete."))],
                vec!["event_id"],
            ),
            Self::RecommendTime => (
                vec![
                    ("duration_minutes", property("integer", "Length of the free slot in minutes (default 60).")),
                    ("timezone", property("string", "IANA timezone used to define today, e.g. 'Asia/Jakarta'.")),
                ],
                vec![],
            ),
        };
        Parameters {
            r#type: String::from("object"),
            properties: properties.into_iter().collect(),
            required: required.into_iter().map(String::from).collect(),
            additional_properties: false,
        }
    }
}

fn property(r#type: &str, description: &str) -> Property {
    Property {
        r#type: r#type.to_string(),
        description: description.to_string(),
    }
}

#[derive(Deserialize)]
struct ListEventsArgs {
    max_results: Option<u32>,
}

#[derive(Deserialize)]
struct AddEventArgs {
    summary: String,
    start_time: String,
    end_time: String,
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct DeleteEventArgs {
    event_id: String,
}

#[derive(Deserialize)]
struct RecommendTimeArgs {
    duration_minutes: Option<i64>,
    timezone: Option<String>,
}

/// A fully parsed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarOperation {
    ListEvents {
        max_results: u32,
    },
    AddEvent {
        summary: String,
        start_time: String,
        end_time: String,
        timezone: Option<String>,
    },
    DeleteEvent {
        event_id: String,
    },
    RecommendTime {
        duration_minutes: i64,
        timezone: Option<String>,
    },
}

fn parse_args<T: DeserializeOwned>(args: &str) -> Result<T, CalendarError> {
    // Some models send an empty string instead of `{}` for no arguments
    let args = if args.trim().is_empty() { "{}" } else { args };
    serde_json::from_str(args)
        .map_err(|e| CalendarError::validation(format!("invalid arguments: {}", e)))
}

impl CalendarOperation {
    pub fn parse(kind: OperationKind, args: &str) -> Result<Self, CalendarError> {
        let op = match kind {
            OperationKind::ListEvents => {
                let a: ListEventsArgs = parse_args(args)?;
                Self::ListEvents {
                    max_results: a.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
                }
            }
            OperationKind::AddEvent => {
                let a: AddEventArgs = parse_args(args)?;
                Self::AddEvent {
                    summary: a.summary,
                    start_time: a.start_time,
                    end_time: a.end_time,
                    timezone: a.timezone,
                }
            }
            OperationKind::DeleteEvent => {
                let a: DeleteEventArgs = parse_args(args)?;
                Self::DeleteEvent {
                    event_id: a.event_id,
                }
            }
            OperationKind::RecommendTime => {
                let a: RecommendTimeArgs = parse_args(args)?;
                Self::RecommendTime {
                    duration_minutes: a.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
                    timezone: a.timezone,
                }
            }
        };
        Ok(op)
    }

    /// Run the operation and describe the outcome for the model.
    pub async fn execute(&self, client: &CalendarClient) -> Result<String, CalendarError> {
        match self {
            Self::ListEvents { max_results } => {
                let events = client.list_upcoming(*max_results).await?;
                Ok(render_events(&events))
            }
            Self::AddEvent {
                summary,
                start_time,
                end_time,
                timezone,
            } => {
                let event = client
                    .add_event(summary, start_time, end_time, timezone.as_deref())
                    .await?;
                Ok(format!(
                    "Event '{}' created for {} (ID: {}).",
                    summary, event.start, event.id
                ))
            }
            Self::DeleteEvent { event_id } => {
                client.delete_event(event_id).await?;
                Ok(format!("Event with ID {} deleted.", event_id.trim()))
            }
            Self::RecommendTime {
                duration_minutes,
                timezone,
            } => {
                let slots = client
                    .find_free_slots(*duration_minutes, timezone.as_deref())
                    .await?;
                Ok(render_slots(&slots))
            }
        }
    }
}

pub fn render_events(events: &[Event]) -> String {
    if events.is_empty() {
        return String::from("No upcoming events.");
    }
    let lines: Vec<String> = events
        .iter()
        .map(|event| {
            format!(
                "- {} | {} (ID: {})",
                event.start,
                event.summary.as_deref().unwrap_or("(no title)"),
                event.id
            )
        })
        .collect();
    format!("Upcoming events:\n{}", lines.join("\n"))
}

pub fn render_slots(slots: &[FreeSlot]) -> String {
    if slots.is_empty() {
        return String::from("No free slot available today.");
    }
    let lines: Vec<String> = slots
        .iter()
        .map(|slot| format!("- {} to {}", slot.start.format("%H:%M"), slot.end.format("%H:%M")))
        .collect();
    format!("Recommended free slots:\n{}", lines.join("\n"))
}

/// Render a failed operation as text. Authentication failures stay
/// errors.
pub fn render_failure(kind: OperationKind, err: CalendarError) -> Result<String, Error> {
    if err.is_authentication() {
        return Err(err.into());
    }
    tracing::warn!("{} failed: {}", kind.name(), err);
    Ok(format!("Failed to {}: {}", kind.action(), err))
}

#[derive(Serialize)]
pub struct CalendarTool {
    pub r#type: ToolType,
    pub function: Function<BTreeMap<&'static str, Property>>,
    #[serde(skip)]
    kind: OperationKind,
    #[serde(skip)]
    client: Arc<CalendarClient>,
}

impl CalendarTool {
    pub fn new(kind: OperationKind, client: Arc<CalendarClient>) -> Self {
        let function = Function {
            name: kind.name().to_string(),
            description: kind.description().to_string(),
            parameters: kind.parameters(),
            // Optional parameters aren't allowed in strict mode
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            kind,
            client,
        }
    }
}

#[async_trait]
impl ToolCall for CalendarTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let outcome = match CalendarOperation::parse(self.kind, args) {
            Ok(op) => op.execute(&self.client).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(text) => Ok(text),
            Err(e) => render_failure(self.kind, e),
        }
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

/// One tool per calendar operation, all sharing the session's client.
pub fn calendar_tools(client: Arc<CalendarClient>) -> Vec<BoxedToolCall> {
    OperationKind::ALL
        .into_iter()
        .map(|kind| Box::new(CalendarTool::new(kind, client.clone())) as BoxedToolCall)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::google::credentials::TokenSource;

    struct NoLogin;

    #[async_trait]
    impl TokenSource for NoLogin {
        async fn access_token(&self) -> Result<String, CalendarError> {
            Err(CalendarError::authentication("login required"))
        }
    }

    fn offline_client() -> Arc<CalendarClient> {
        Arc::new(CalendarClient::new(
            "http://127.0.0.1:1",
            "primary",
            chrono_tz::Asia::Jakarta,
            Arc::new(NoLogin),
        ))
    }

    impl OperationKind {
        fn from_name(name: &str) -> Option<Self> {
            Self::ALL.into_iter().find(|kind| kind.name() == name)
        }
    }

    impl CalendarOperation {
        fn kind(&self) -> OperationKind {
            match self {
                Self::ListEvents { .. } => OperationKind::ListEvents,
                Self::AddEvent { .. } => OperationKind::AddEvent,
                Self::DeleteEvent { .. } => OperationKind::DeleteEvent,
                Self::RecommendTime { .. } => OperationKind::RecommendTime,
            }
        }
    }

    #[test]
    fn it_round_trips_operation_names() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(OperationKind::from_name("send_email"), None);
    }

    #[test]
    fn it_applies_argument_defaults() {
        assert_eq!(
            CalendarOperation::parse(OperationKind::ListEvents, "{}").unwrap(),
            CalendarOperation::ListEvents { max_results: 5 }
        );
        assert_eq!(
            CalendarOperation::parse(OperationKind::RecommendTime, "").unwrap(),
            CalendarOperation::RecommendTime {
                duration_minutes: 60,
                timezone: None
            }
        );
    }

    #[test]
    fn it_keeps_the_kind_it_was_parsed_as() {
        for kind in OperationKind::ALL {
            let args = match kind {
                OperationKind::AddEvent => {
                    r#"{"summary": "a", "start_time": "2025-10-06 10:00", "end_time": "2025-10-06 11:00"}"#
                }
                OperationKind::DeleteEvent => r#"{"event_id": "evt_1"}"#,
                _ => "{}",
            };
            assert_eq!(CalendarOperation::parse(kind, args).unwrap().kind(), kind);
        }
    }

    #[test]
    fn it_rejects_missing_required_arguments() {
        let err = CalendarOperation::parse(OperationKind::AddEvent, r#"{"summary": "Lunch"}"#)
            .unwrap_err();
        assert!(matches!(err, CalendarError::Validation(_)));
    }

    #[test]
    fn it_serializes_the_tool_schema() {
        let tool = CalendarTool::new(OperationKind::AddEvent, offline_client());
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "add_event");
        assert_eq!(
            json["function"]["parameters"]["properties"]["start_time"]["type"],
            "string"
        );
        assert_eq!(
            json["function"]["parameters"]["required"],
            serde_json::json!(["summary", "start_time", "end_time"])
        );
        assert!(json.get("kind").is_none());
        assert!(json.get("client").is_none());
    }

    #[test]
    fn it_registers_every_operation() {
        let names: Vec<String> = calendar_tools(offline_client())
            .iter()
            .map(|tool| tool.function_name())
            .collect();
        assert_eq!(
            names,
            vec!["list_events", "add_event", "delete_event", "recommend_time"]
        );
    }

    #[test]
    fn it_renders_events_and_slots() {
        assert_eq!(render_events(&[]), "No upcoming events.");
        let event: Event = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "summary": "Standup",
            "start": {"dateTime": "2025-10-06T10:00:00+07:00"},
            "end": {"dateTime": "2025-10-06T10:15:00+07:00"}
        }))
        .unwrap();
        assert_eq!(
            render_events(&[event]),
            "Upcoming events:\n- 2025-10-06T10:00:00+07:00 | Standup (ID: evt_1)"
        );

        assert_eq!(render_slots(&[]), "No free slot available today.");
        let tz = chrono_tz::Asia::Jakarta;
        let slot = FreeSlot {
            start: tz.with_ymd_and_hms(2025, 10, 6, 9, 0, 0).unwrap(),
            end: tz.with_ymd_and_hms(2025, 10, 6, 10, 0, 0).unwrap(),
        };
        assert_eq!(render_slots(&[slot]), "Recommended free slots:\n- 09:00 to 10:00");
    }

    #[tokio::test]
    async fn it_reports_validation_failures_as_text() {
        let tool = CalendarTool::new(OperationKind::AddEvent, offline_client());
        let text = tool
            .call(r#"{"summary": "Lunch", "start_time": "someday", "end_time": "later"}"#)
            .await
            .unwrap();
        assert!(text.starts_with("Failed to add event: validation error"));
    }

    #[tokio::test]
    async fn it_propagates_authentication_failures() {
        let tool = CalendarTool::new(OperationKind::ListEvents, offline_client());
        let err = tool.call("{}").await.unwrap_err();
        let inner = err.downcast_ref::<CalendarError>().unwrap();
        assert!(inner.is_authentication());
    }
}
