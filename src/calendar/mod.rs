pub mod client;
pub mod datetime;
pub mod error;
pub mod slots;

pub use client::CalendarClient;
pub use error::CalendarError;
