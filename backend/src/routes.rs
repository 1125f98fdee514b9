use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::handlers::{calendar, health};
use crate::services::CalendarService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub calendar: CalendarService,
}

pub fn calendar_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))

        // Calendar routes
        .route("/", get(calendar::home))
        .route("/episode-calendar", get(calendar::index))
        .route("/episode-calendar/:file", get(calendar::user_calendar))
}

pub fn create_app(state: AppState, config: &AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = calendar_routes()
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors);

    if config.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use reqwest::StatusCode as UpstreamStatus;
    use shared::api::{Episode, Paged, Subject, UserCollection};
    use shared::models::CollectionType;
    use tower::ServiceExt;

    use crate::bangumi::{self, BangumiApi};
    use crate::cache::{Cache, MemoryCache};

    /// Upstream where `ghost` does not exist, `broken` fails and everyone
    /// else has an empty collection.
    struct StubApi;

    #[async_trait]
    impl BangumiApi for StubApi {
        async fn user_collections(
            &self,
            username: &str,
            _collection_type: CollectionType,
            offset: u32,
            limit: u32,
        ) -> Result<Paged<UserCollection>, bangumi::Error> {
            match username {
                "ghost" => Err(bangumi::Error::NotFound),
                "broken" => Err(bangumi::Error::Status {
                    status: UpstreamStatus::INTERNAL_SERVER_ERROR,
                    body: String::new(),
                }),
                _ => Ok(Paged {
                    data: Vec::new(),
                    total: 0,
                    limit,
                    offset,
                }),
            }
        }

        async fn subject(&self, _subject_id: u64) -> Result<Subject, bangumi::Error> {
            Err(bangumi::Error::NotFound)
        }

        async fn episodes(
            &self,
            _subject_id: u64,
            offset: u32,
            limit: u32,
        ) -> Result<Paged<Episode>, bangumi::Error> {
            Ok(Paged {
                data: Vec::new(),
                total: 0,
                limit,
                offset,
            })
        }
    }

    fn app() -> Router {
        let calendar = CalendarService::new(
            Arc::new(StubApi),
            Cache::new(Arc::new(MemoryCache::new())),
            4,
        );
        let config = AppConfig::default();
        create_app(AppState { calendar }, &config)
    }

    async fn get(uri: &str, user_agent: Option<&str>) -> (StatusCode, String, String) {
        let mut request = Request::builder().uri(uri);
        if let Some(ua) = user_agent {
            request = request.header(header::USER_AGENT, ua);
        }
        let response = app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("ok"));
    }

    #[tokio::test]
    async fn test_ics_file_route() {
        let (status, content_type, body) = get("/episode-calendar/alice.ics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/calendar; charset=utf-8");
        assert!(body.starts_with("BEGIN:VCALENDAR"));
    }

    #[tokio::test]
    async fn test_browser_gets_plain_text() {
        let (status, content_type, _) =
            get("/episode-calendar?username=alice", Some("Mozilla/5.0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_form_page_without_username() {
        let (status, content_type, body) = get("/episode-calendar", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/html"));
        assert!(body.contains("<form"));
    }

    #[tokio::test]
    async fn test_unknown_user_is_404() {
        let (status, _, body) = get("/episode-calendar/ghost.ics", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("user ghost not found"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_500() {
        let (status, _, body) = get("/episode-calendar/broken.ics", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("internal_error"));
    }

    #[tokio::test]
    async fn test_file_route_requires_ics_suffix() {
        let (status, _, _) = get("/episode-calendar/alice.txt", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = get("/episode-calendar/.ics", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
