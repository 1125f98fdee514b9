//! Types shared between the calendar backend and anything else that speaks
//! to the Bangumi API.
//!
//! - `api`: wire records returned by the upstream API
//! - `models`: the slimmed-down records the calendar pipeline caches and renders

pub mod api;
pub mod models;
