pub mod calendar;
pub mod health;
