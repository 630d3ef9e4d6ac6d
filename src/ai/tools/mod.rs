pub mod calendar;
pub use calendar::{CalendarOperation, CalendarTool, OperationKind, calendar_tools};
