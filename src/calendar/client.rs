use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use chrono_tz::Tz;
use reqwest::Client;

use super::{
    datetime::{end_of_day, localize, parse_datetime, parse_timezone},
    error::CalendarError,
    slots::{FreeSlot, busy_interval, find_free_slots},
};
use crate::core::AppConfig;
use crate::google::{
    credentials::{CachedCredential, CredentialStore, TokenRequest, TokenSource},
    gcal::{self, Event, EventDateTime, ListQuery, NewEvent},
};

/// Calendar operations for one session. Cheap to share behind an
/// `Arc`; the credential is fetched on first use.
pub struct CalendarClient {
    http: Client,
    base_url: String,
    calendar_id: String,
    default_timezone: Tz,
    tokens: Arc<dyn TokenSource>,
}

impl CalendarClient {
    pub fn new(
        base_url: &str,
        calendar_id: &str,
        default_timezone: Tz,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.to_string(),
            calendar_id: calendar_id.to_string(),
            default_timezone,
            tokens,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, CalendarError> {
        let default_timezone = parse_timezone(&config.default_timezone)?;
        let store = CredentialStore::new(config.token_dir(), &config.client_secret_path);
        let tokens = CachedCredential::new(store, TokenRequest::calendar(config.token_profile.clone()));
        Ok(Self::new(
            &config.calendar_api_url,
            &config.calendar_id,
            default_timezone,
            Arc::new(tokens),
        ))
    }

    pub fn default_timezone(&self) -> Tz {
        self.default_timezone
    }

    fn timezone_or_default(&self, timezone: Option<&str>) -> Result<Tz, CalendarError> {
        match timezone.map(str::trim).filter(|tz| !tz.is_empty()) {
            Some(name) => parse_timezone(name),
            None => Ok(self.default_timezone),
        }
    }

    /// Upcoming events from now, ordered by start time.
    pub async fn list_upcoming(&self, max_results: u32) -> Result<Vec<Event>, CalendarError> {
        if max_results == 0 {
            return Err(CalendarError::validation("max_results must be at least 1"));
        }
        let token = self.tokens.access_token().await?;
        let query = ListQuery {
            time_min: gcal::now_fixed(),
            time_max: None,
            max_results: Some(max_results),
        };
        gcal::list_events(&self.http, &self.base_url, &token, &self.calendar_id, &query).await
    }

    /// Create an event from free-form start and end strings. Values
    /// without an offset are read as local time in `timezone`.
    pub async fn add_event(
        &self,
        summary: &str,
        start_time: &str,
        end_time: &str,
        timezone: Option<&str>,
    ) -> Result<Event, CalendarError> {
        let tz = self.timezone_or_default(timezone)?;
        let start = localize(parse_datetime(start_time)?, tz)?;
        let end = localize(parse_datetime(end_time)?, tz)?;
        if end <= start {
            return Err(CalendarError::validation(format!(
                "end time {} is not after start time {}",
                end.to_rfc3339_opts(SecondsFormat::Secs, true),
                start.to_rfc3339_opts(SecondsFormat::Secs, true)
            )));
        }

        let event = NewEvent {
            summary: summary.to_string(),
            start: EventDateTime {
                date_time: Some(start.fixed_offset()),
                date: None,
                time_zone: Some(tz.name().to_string()),
            },
            end: EventDateTime {
                date_time: Some(end.fixed_offset()),
                date: None,
                time_zone: Some(tz.name().to_string()),
            },
        };

        let token = self.tokens.access_token().await?;
        let created =
            gcal::insert_event(&self.http, &self.base_url, &token, &self.calendar_id, &event)
                .await?;
        tracing::info!("Created event {} ({})", created.id, summary);
        Ok(created)
    }

    pub async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(CalendarError::validation("event_id is required"));
        }
        let token = self.tokens.access_token().await?;
        gcal::delete_event(&self.http, &self.base_url, &token, &self.calendar_id, event_id)
            .await?;
        tracing::info!("Deleted event {}", event_id);
        Ok(())
    }

    /// Free slots of at least `duration_minutes` between now and the
    /// end of today in `timezone`.
    pub async fn find_free_slots(
        &self,
        duration_minutes: i64,
        timezone: Option<&str>,
    ) -> Result<Vec<FreeSlot>, CalendarError> {
        let tz = self.timezone_or_default(timezone)?;
        let now = Utc::now().with_timezone(&tz);
        self.find_free_slots_at(duration_minutes, tz, now).await
    }

    pub async fn find_free_slots_at(
        &self,
        duration_minutes: i64,
        tz: Tz,
        now: DateTime<Tz>,
    ) -> Result<Vec<FreeSlot>, CalendarError> {
        if duration_minutes <= 0 {
            return Err(CalendarError::validation(
                "duration_minutes must be greater than zero",
            ));
        }
        let min_duration = TimeDelta::try_minutes(duration_minutes)
            .ok_or_else(|| CalendarError::validation("duration_minutes is too large"))?;
        let eod = end_of_day(&now)?;

        let token = self.tokens.access_token().await?;
        let query = ListQuery {
            time_min: now.fixed_offset(),
            time_max: Some(eod.fixed_offset()),
            max_results: None,
        };
        let events =
            gcal::list_events(&self.http, &self.base_url, &token, &self.calendar_id, &query)
                .await?;

        let busy: Vec<_> = events
            .iter()
            .filter_map(|event| busy_interval(event, tz))
            .collect();
        Ok(find_free_slots(&busy, now, eod, min_duration))
    }
}
