mod calendar;

pub use calendar::{CalendarError, CalendarService};
