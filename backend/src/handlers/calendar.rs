use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

const HOME_PAGE: &str = include_str!("../../assets/home.html");
const INDEX_PAGE: &str = include_str!("../../assets/index.html");

const CALENDAR_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";
const PREVIEW_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub username: Option<String>,
}

pub async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

/// Form page, or the calendar itself when `?username=` is given.
pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Response> {
    let username = query.username.as_deref().map(str::trim).unwrap_or_default();
    if username.is_empty() {
        return Ok(Html(INDEX_PAGE).into_response());
    }

    let ics = state.calendar.build_ics(username).await?;
    Ok(calendar_response(&headers, ics))
}

/// `GET /episode-calendar/<username>.ics`
pub async fn user_calendar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let username = file
        .strip_suffix(".ics")
        .ok_or_else(|| ApiError::not_found(format!("calendar {}", file)))?;
    if username.is_empty() {
        return Err(ApiError::bad_request("missing username"));
    }

    let ics = state.calendar.build_ics(username).await?;
    Ok(calendar_response(&headers, ics))
}

fn calendar_response(headers: &HeaderMap, ics: String) -> Response {
    let content_type = if is_browser(headers) {
        PREVIEW_CONTENT_TYPE
    } else {
        CALENDAR_CONTENT_TYPE
    };

    ([(header::CONTENT_TYPE, HeaderValue::from_static(content_type))], ics).into_response()
}

/// Browsers get the feed as plain text so it renders instead of downloading.
fn is_browser(headers: &HeaderMap) -> bool {
    let header_contains = |name: header::HeaderName, needle: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    };

    header_contains(header::USER_AGENT, "mozilla") || header_contains(header::ACCEPT, "text/html")
}
