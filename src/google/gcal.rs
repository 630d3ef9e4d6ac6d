//! Google Calendar v3 event resource: list, insert, delete.
//! https://developers.google.com/calendar/api/v3/reference/events

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    /// Set instead of `date_time` for all-day events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl fmt::Display for EventDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            (None, Some(date)) => write!(f, "{}", date),
            (None, None) => write!(f, "?"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub start: EventDateTime,
    #[serde(default)]
    pub end: EventDateTime,
    #[serde(rename = "htmlLink")]
    pub html_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewEvent {
    pub summary: String,
    pub start: EventDateTime,
    pub end: EventDateTime,
}

/// Parameters for listing events. Recurring events are always
/// expanded into single instances so they can be ordered by start.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub time_min: DateTime<FixedOffset>,
    pub time_max: Option<DateTime<FixedOffset>>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn events_url(base_url: &str, calendar_id: &str) -> Result<reqwest::Url, CalendarError> {
    let url = format!(
        "{}/calendars/{}/events",
        base_url.trim_end_matches('/'),
        urlencoding::encode(calendar_id)
    );
    reqwest::Url::parse(&url).map_err(|e| CalendarError::Provider {
        status: None,
        message: format!("invalid calendar url {}: {}", url, e),
    })
}

fn rfc3339(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Turn a non-success response into a provider error, preferring the
/// message Google puts in the error body.
async fn rejection(res: Response) -> CalendarError {
    let status = res.status();
    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error.message)
        .unwrap_or(text);
    CalendarError::Provider {
        status: Some(status.as_u16()),
        message,
    }
}

pub async fn list_events(
    client: &Client,
    base_url: &str,
    access_token: &str,
    calendar_id: &str,
    query: &ListQuery,
) -> Result<Vec<Event>, CalendarError> {
    let mut url = events_url(base_url, calendar_id)?;
    url.query_pairs_mut()
        .append_pair("timeMin", &rfc3339(&query.time_min))
        .append_pair("singleEvents", "true")
        .append_pair("orderBy", "startTime");
    if let Some(time_max) = &query.time_max {
        url.query_pairs_mut()
            .append_pair("timeMax", &rfc3339(time_max));
    }
    if let Some(max_results) = query.max_results {
        url.query_pairs_mut()
            .append_pair("maxResults", &max_results.to_string());
    }

    tracing::debug!("Listing events: {}", url);
    let res = client.get(url).bearer_auth(access_token).send().await?;
    if !res.status().is_success() {
        return Err(rejection(res).await);
    }
    let list: EventList = res.json().await?;
    Ok(list.items)
}

pub async fn insert_event(
    client: &Client,
    base_url: &str,
    access_token: &str,
    calendar_id: &str,
    event: &NewEvent,
) -> Result<Event, CalendarError> {
    let url = events_url(base_url, calendar_id)?;
    tracing::debug!("Inserting event '{}' into {}", event.summary, calendar_id);
    let res = client
        .post(url)
        .bearer_auth(access_token)
        .json(event)
        .send()
        .await?;
    if !res.status().is_success() {
        return Err(rejection(res).await);
    }
    Ok(res.json().await?)
}

pub async fn delete_event(
    client: &Client,
    base_url: &str,
    access_token: &str,
    calendar_id: &str,
    event_id: &str,
) -> Result<(), CalendarError> {
    let url = format!(
        "{}/{}",
        events_url(base_url, calendar_id)?,
        urlencoding::encode(event_id)
    );
    tracing::debug!("Deleting event {}", event_id);
    let res = client.delete(url).bearer_auth(access_token).send().await?;
    match res.status() {
        // Google answers 410 for events that were already deleted
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(CalendarError::NotFound(event_id.to_string())),
        status if status.is_success() => Ok(()),
        _ => Err(rejection(res).await),
    }
}

/// Current instant as the `timeMin` used for upcoming events.
pub fn now_fixed() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}
