use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::Episode;

/// Subject type for long-running shows (anime).
pub const SUBJECT_TYPE_ANIME: u8 = 2;
/// Subject type for single-episode units (live action, "real").
pub const SUBJECT_TYPE_REAL: u8 = 6;

/// Whether a collected subject can contribute episodes to the calendar.
pub fn is_calendar_subject_type(subject_type: u8) -> bool {
    subject_type == SUBJECT_TYPE_ANIME || subject_type == SUBJECT_TYPE_REAL
}

/// Collection statuses the calendar follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Wish,
    Watching,
}

impl CollectionType {
    pub const TRACKED: [CollectionType; 2] = [CollectionType::Wish, CollectionType::Watching];

    /// Numeric value used by the upstream `type` query parameter
    pub fn as_upstream(self) -> u8 {
        match self {
            CollectionType::Wish => 1,
            CollectionType::Watching => 3,
        }
    }
}

/// Episode with its air date split into numeric `[year, month, day]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEpisode {
    pub id: u64,
    pub sort: f64,
    pub name: String,
    pub air_date: [i32; 3],
    pub duration: String,
}

impl ParsedEpisode {
    /// Parse a raw upstream episode.
    ///
    /// Returns `None` when the air date is not exactly three numeric
    /// components forming a real calendar date.
    pub fn from_episode(episode: &Episode) -> Option<Self> {
        let date = parse_air_date(&episode.airdate)?;

        Some(Self {
            id: episode.id,
            sort: episode.sort,
            name: html_unescape(first_non_empty([
                episode.name_cn.as_str(),
                episode.name.as_str(),
            ])),
            air_date: date,
            duration: episode.duration.clone(),
        })
    }

    pub fn date(&self) -> Option<NaiveDate> {
        let [year, month, day] = self.air_date;
        NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
    }
}

/// A subject reduced to what the calendar renders. This is the unit stored in
/// the subject-level cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlimSubject {
    pub id: u64,
    pub name: String,
    pub future_episodes: Vec<ParsedEpisode>,
}

/// Localized name when it has visible content, otherwise the original name.
pub fn display_name(name_cn: &str, name: &str) -> String {
    [name_cn, name]
        .into_iter()
        .find(|v| !v.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}

fn parse_air_date(raw: &str) -> Option<[i32; 3]> {
    let mut parts = raw.split('-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<i32>().ok()?;
    let day = parts.next()?.parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }

    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)?;
    Some([year, month, day])
}

fn first_non_empty<'a>(values: impl IntoIterator<Item = &'a str>) -> &'a str {
    values.into_iter().find(|v| !v.is_empty()).unwrap_or_default()
}

fn html_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
