//! Error taxonomy for calendar operations.
//!
//! Operations keep these structured so callers can match on the
//! kind. Conversion to text happens only where results are handed
//! back to the model (see `ai::tools::calendar`).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    /// Interactive login is required or failed. Needs user action.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Input that could not be parsed or is out of range.
    #[error("validation error: {0}")]
    Validation(String),

    /// The calendar provider rejected the request.
    #[error("provider error{}: {message}", fmt_status(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("event not found: {0}")]
    NotFound(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl CalendarError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
