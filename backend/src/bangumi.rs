//! Bangumi API client.
//!
//! Typed accessors for the three paginated resources the calendar reads.
//! HTTP status is translated into [`Error`] so the pipeline can tell an unknown
//! user or subject apart from an upstream outage.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::api::{Episode, Paged, Subject, UserCollection};
use shared::models::CollectionType;
use thiserror::Error;

const USER_AGENT: &str = "trim21/bangumi-episode-calendar";

#[derive(Debug, Error)]
pub enum Error {
    /// The requested user or subject does not exist upstream
    #[error("resource not found")]
    NotFound,

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Read access to the upstream catalog.
///
/// Implementations must be safe to share between concurrently running
/// subject resolutions.
#[async_trait]
pub trait BangumiApi: Send + Sync {
    async fn user_collections(
        &self,
        username: &str,
        collection_type: CollectionType,
        offset: u32,
        limit: u32,
    ) -> Result<Paged<UserCollection>, Error>;

    async fn subject(&self, subject_id: u64) -> Result<Subject, Error>;

    async fn episodes(
        &self,
        subject_id: u64,
        offset: u32,
        limit: u32,
    ) -> Result<Paged<Episode>, Error>;
}

/// reqwest-backed client for `https://api.bgm.tv`
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Every call is bound by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        tracing::debug!(url = %url, ?query, "Requesting upstream");
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(Error::Transport)?;

        decode(response).await
    }
}

#[async_trait]
impl BangumiApi for Client {
    async fn user_collections(
        &self,
        username: &str,
        collection_type: CollectionType,
        offset: u32,
        limit: u32,
    ) -> Result<Paged<UserCollection>, Error> {
        let url = format!(
            "{}/v0/users/{}/collections",
            self.base_url,
            urlencoding::encode(username)
        );
        self.get_json(
            url,
            &[
                ("type", collection_type.as_upstream().to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn subject(&self, subject_id: u64) -> Result<Subject, Error> {
        let url = format!("{}/v0/subjects/{}", self.base_url, subject_id);
        self.get_json(url, &[]).await
    }

    async fn episodes(
        &self,
        subject_id: u64,
        offset: u32,
        limit: u32,
    ) -> Result<Paged<Episode>, Error> {
        let url = format!("{}/v0/episodes", self.base_url);
        self.get_json(
            url,
            &[
                ("subject_id", subject_id.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound);
    }
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Status { status, body });
    }

    response.json::<T>().await.map_err(Error::Decode)
}
