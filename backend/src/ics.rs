//! ICS feed rendering.
//!
//! Pure function of the resolved subjects and the render time: the same
//! input always produces the same bytes, and every event UID is derived from
//! the subject and episode ids so calendar clients never see duplicates.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use icalendar::{Calendar, Component, Property, ValueType};
use shared::models::{ParsedEpisode, SlimSubject};
use uuid::Uuid;

pub const CALENDAR_NAME: &str = "Bangumi Episode Air Calendar";
const PRODID: &str = "-//trim21//bangumi-icalendar//CN";
const REFRESH_INTERVAL: &str = "PT8H";

/// Events starting later than this after the render time are left out of the
/// feed. Independent of the pipeline's "future episode" cutoff.
pub const RENDER_HORIZON: Duration = Duration::days(30);

/// Namespace for episode UIDs (UUIDv5).
const UID_NAMESPACE: Uuid = Uuid::from_u128(0xef2256c4_162e_446b_9ccf_81050809d0c9);

/// Render the feed for `subjects` as of `now`.
pub fn render_ics(subjects: &[SlimSubject], now: DateTime<Utc>) -> String {
    let mut cal = Calendar::new();
    cal.append_property(Property::new("NAME", CALENDAR_NAME));
    cal.append_property(Property::new("X-WR-CALNAME", CALENDAR_NAME));
    cal.append_property(Property::new("X-PUBLISHED-TTL", REFRESH_INTERVAL));

    let mut refresh = Property::new("REFRESH-INTERVAL", REFRESH_INTERVAL);
    refresh.add_parameter("VALUE", "DURATION");
    cal.append_property(refresh);

    let dtstamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let latest_start = now + RENDER_HORIZON;

    for subject in subjects {
        for episode in &subject.future_episodes {
            let Some(start) = episode.date() else {
                continue;
            };
            if start.and_time(chrono::NaiveTime::MIN).and_utc() > latest_start {
                continue;
            }

            cal.push(episode_event(subject, episode, start, &dtstamp));
        }
    }

    strip_ics_bloat(&cal.done().to_string())
}

/// Deterministic UID for one episode of one subject.
pub fn episode_uid(subject_id: u64, episode_id: u64) -> String {
    let name = format!("subject-{}-episode-{}", subject_id, episode_id);
    Uuid::new_v5(&UID_NAMESPACE, name.as_bytes()).to_string()
}

fn episode_event(
    subject: &SlimSubject,
    episode: &ParsedEpisode,
    start: NaiveDate,
    dtstamp: &str,
) -> icalendar::Event {
    let end = start.succ_opt().unwrap_or(start);

    let mut event = icalendar::Event::new();
    event.uid(&episode_uid(subject.id, episode.id));
    event.add_property("DTSTAMP", dtstamp);
    add_date_property(&mut event, "DTSTART", start);
    add_date_property(&mut event, "DTEND", end);
    event.summary(&format!("{} {}", subject.name, episode.sort));
    event.description(&episode_description(episode));
    event.done()
}

/// Episode page link, then the episode name and length when known.
fn episode_description(episode: &ParsedEpisode) -> String {
    let mut lines = vec![format!("https://bgm.tv/ep/{}", episode.id)];
    if !episode.name.is_empty() {
        lines.push(episode.name.clone());
    }
    if !episode.duration.is_empty() {
        lines.push(format!("时长：{}", episode.duration));
    }
    lines.join("\n")
}

fn add_date_property(event: &mut icalendar::Event, name: &str, date: NaiveDate) {
    let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
    prop.append_parameter(ValueType::Date);
    event.append_property(prop);
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODID);
            result.push_str("\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap()
    }

    fn episode_on(id: u64, sort: f64, date: NaiveDate) -> ParsedEpisode {
        ParsedEpisode {
            id,
            sort,
            name: format!("E{}", id),
            air_date: [date.year(), date.month() as i32, date.day() as i32],
            duration: "24m".to_string(),
        }
    }

    fn days_from_now(days: i64) -> NaiveDate {
        (now() + Duration::days(days)).date_naive()
    }

    fn subject(id: u64, name: &str, episodes: Vec<ParsedEpisode>) -> SlimSubject {
        SlimSubject {
            id,
            name: name.to_string(),
            future_episodes: episodes,
        }
    }

    fn events(ics: &str) -> Vec<&str> {
        ics.split("BEGIN:VEVENT").skip(1).collect()
    }

    #[test]
    fn test_uid_is_fixed_for_subject_and_episode() {
        assert_eq!(episode_uid(1, 11), "08eadaa3-d053-5d95-a94d-65916360f883");
        assert_eq!(episode_uid(1, 11), episode_uid(1, 11));
        assert_ne!(episode_uid(1, 11), episode_uid(11, 1));
    }

    #[test]
    fn test_render_is_deterministic() {
        let subjects = vec![
            subject(2, "Second", vec![episode_on(21, 1.0, days_from_now(3))]),
            subject(1, "First", vec![episode_on(11, 2.0, days_from_now(1))]),
        ];

        assert_eq!(render_ics(&subjects, now()), render_ics(&subjects, now()));
    }

    #[test]
    fn test_single_event_contents() {
        let tomorrow = days_from_now(1);
        let subjects = vec![subject(1, "Show", vec![episode_on(11, 1.0, tomorrow)])];

        let ics = render_ics(&subjects, now());
        let events = events(&ics);
        assert_eq!(events.len(), 1, "ICS:\n{}", ics);

        let event = events[0];
        assert!(event.contains("UID:08eadaa3-d053-5d95-a94d-65916360f883"));
        assert!(event.contains("SUMMARY:Show 1\r\n"), "ICS:\n{}", ics);
        assert!(event.contains("DTSTART;VALUE=DATE:20241002"), "ICS:\n{}", ics);
        assert!(event.contains("DTEND;VALUE=DATE:20241003"), "ICS:\n{}", ics);
        assert!(event.contains("DTSTAMP:20241001T120000Z"));
        assert!(event.contains("https://bgm.tv/ep/11"));
        assert!(event.contains("24m"));
    }

    #[test]
    fn test_fractional_sort_order_in_summary() {
        let subjects = vec![subject(1, "Show", vec![episode_on(11, 7.5, days_from_now(1))])];
        let ics = render_ics(&subjects, now());
        assert!(ics.contains("SUMMARY:Show 7.5\r\n"), "ICS:\n{}", ics);
    }

    #[test]
    fn test_render_horizon() {
        let subjects = vec![subject(
            1,
            "Show",
            vec![
                episode_on(29, 1.0, days_from_now(29)),
                episode_on(31, 2.0, days_from_now(31)),
            ],
        )];

        let ics = render_ics(&subjects, now());
        assert_eq!(events(&ics).len(), 1);
        assert!(ics.contains(&episode_uid(1, 29)));
        assert!(!ics.contains(&episode_uid(1, 31)));
    }

    #[test]
    fn test_events_follow_input_order() {
        let subjects = vec![
            subject(2, "Later", vec![episode_on(21, 1.0, days_from_now(1))]),
            subject(1, "Earlier", vec![episode_on(11, 1.0, days_from_now(5))]),
        ];

        let ics = render_ics(&subjects, now());
        let first = ics.find(&episode_uid(2, 21)).expect("first event present");
        let second = ics.find(&episode_uid(1, 11)).expect("second event present");
        assert!(first < second);
    }

    #[test]
    fn test_empty_calendar_has_metadata() {
        let ics = render_ics(&[], now());
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.trim_end().ends_with("END:VCALENDAR"));
        assert!(ics.contains("X-WR-CALNAME:Bangumi Episode Air Calendar"));
        assert!(ics.contains("REFRESH-INTERVAL;VALUE=DURATION:PT8H"));
        assert!(ics.contains("PRODID:-//trim21//bangumi-icalendar//CN"));
        assert!(!ics.contains("CALSCALE"));
        assert!(events(&ics).is_empty());
    }

    #[test]
    fn test_description_without_name_or_duration() {
        let mut episode = episode_on(11, 1.0, days_from_now(1));
        episode.name.clear();
        episode.duration.clear();
        assert_eq!(episode_description(&episode), "https://bgm.tv/ep/11");
    }
}
