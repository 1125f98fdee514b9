//! Calendar build pipeline.
//!
//! One request walks `cache check -> collections -> subjects -> render ->
//! cache write`. Subject resolution runs in parallel under a semaphore and
//! fails fast: the first error aborts every sibling task and no partial
//! calendar is ever returned.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use shared::api::Episode;
use shared::models::{
    display_name, is_calendar_subject_type, CollectionType, ParsedEpisode, SlimSubject,
};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::bangumi::{self, BangumiApi};
use crate::cache::Cache;
use crate::ics;

const ICS_CACHE_PREFIX: &str = "episode-calendar-v5.0-";
const SUBJECT_CACHE_PREFIX: &str = "subject-v3-";

/// Cached in place of a subject the upstream no longer knows about.
const NOT_FOUND_SENTINEL: &str = "null";

const ICS_TTL: Duration = Duration::from_secs(23 * 60 * 60);
const SUBJECT_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);
const FINISHED_SUBJECT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const NOT_FOUND_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const COLLECTION_PAGE_SIZE: u32 = 50;
const EPISODE_PAGE_SIZE: u32 = 200;

/// Episodes that aired up to this long ago still count as upcoming, so they
/// stay on the calendar for a few days after airing.
const PIPELINE_LOOKBACK: chrono::Duration = chrono::Duration::days(3);

const DEFAULT_MAX_CONCURRENCY: usize = 20;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] bangumi::Error),

    #[error("subject resolution task failed: {0}")]
    Task(#[from] JoinError),
}

/// Builds ICS feeds for Bangumi users.
#[derive(Clone)]
pub struct CalendarService {
    api: Arc<dyn BangumiApi>,
    cache: Cache,
    max_concurrency: usize,
}

impl CalendarService {
    pub fn new(api: Arc<dyn BangumiApi>, cache: Cache, max_concurrency: usize) -> Self {
        let max_concurrency = if max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            max_concurrency
        };

        Self {
            api,
            cache,
            max_concurrency,
        }
    }

    /// Rendered calendar for `username`, served from cache when fresh.
    pub async fn build_ics(&self, username: &str) -> Result<String, CalendarError> {
        self.build_ics_at(username, Utc::now()).await
    }

    pub async fn build_ics_at(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<String, CalendarError> {
        let cache_key = format!("{}{}", ICS_CACHE_PREFIX, username);
        if let Some(cached) = self.cache.get_string(&cache_key).await {
            tracing::debug!(username, "Serving calendar from cache");
            return Ok(cached);
        }

        let collections = self.fetch_all_user_collection(username).await?;
        tracing::debug!(
            username,
            subjects = collections.len(),
            "Fetched user collections"
        );

        let mut subjects = self.resolve_subjects(collections, now).await?;
        subjects.retain(|s| !s.future_episodes.is_empty());

        let ics = ics::render_ics(&subjects, now);
        self.cache.set_string(&cache_key, &ics, ICS_TTL).await;

        tracing::info!(
            "Built calendar for {} ({} subjects with upcoming episodes)",
            username,
            subjects.len()
        );
        Ok(ics)
    }

    /// Ids of every tracked subject of a calendar type, across all tracked
    /// collection statuses, without duplicates.
    async fn fetch_all_user_collection(
        &self,
        username: &str,
    ) -> Result<BTreeSet<u64>, CalendarError> {
        let mut subject_ids = BTreeSet::new();

        for collection_type in CollectionType::TRACKED {
            let mut offset = 0;
            loop {
                let page = self
                    .api
                    .user_collections(username, collection_type, offset, COLLECTION_PAGE_SIZE)
                    .await
                    .map_err(|e| match e {
                        bangumi::Error::NotFound => {
                            CalendarError::UserNotFound(username.to_string())
                        }
                        other => CalendarError::Upstream(other),
                    })?;

                subject_ids.extend(
                    page.data
                        .iter()
                        .filter(|c| is_calendar_subject_type(c.subject_type))
                        .map(|c| c.subject_id),
                );

                offset += COLLECTION_PAGE_SIZE;
                if offset >= page.total {
                    break;
                }
            }
        }

        Ok(subject_ids)
    }

    async fn resolve_subjects(
        &self,
        subject_ids: BTreeSet<u64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SlimSubject>, CalendarError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let resolved = Arc::new(Mutex::new(Vec::with_capacity(subject_ids.len())));
        let mut tasks = JoinSet::new();

        for subject_id in subject_ids {
            let service = self.clone();
            let semaphore = semaphore.clone();
            let resolved = resolved.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("subject semaphore is never closed");

                if let Some(subject) = service.resolve_subject(subject_id, now).await? {
                    resolved.lock().await.push(subject);
                }
                Ok::<_, CalendarError>(())
            });
        }

        // Returning early drops the JoinSet, which aborts the remaining tasks
        // along with their in-flight upstream requests.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined? {
                tracing::warn!(error = %e, "Subject resolution failed, aborting build");
                return Err(e);
            }
        }

        let mut subjects = std::mem::take(&mut *resolved.lock().await);
        subjects.sort_by_key(|s| s.id);
        Ok(subjects)
    }

    /// `Ok(None)` when the subject is gone upstream.
    async fn resolve_subject(
        &self,
        subject_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<SlimSubject>, CalendarError> {
        let cache_key = format!("{}{}", SUBJECT_CACHE_PREFIX, subject_id);

        // The not-found sentinel decodes as `None`.
        if let Some(cached) = self
            .cache
            .get_json::<Option<SlimSubject>>(&cache_key)
            .await
        {
            return Ok(cached);
        }

        let subject = match self.api.subject(subject_id).await {
            Ok(subject) => subject,
            Err(bangumi::Error::NotFound) => {
                tracing::debug!(subject_id, "Subject not found upstream");
                self.cache
                    .set_string(&cache_key, NOT_FOUND_SENTINEL, NOT_FOUND_TTL)
                    .await;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let name = display_name(&subject.name_cn, &subject.name);

        if subject.total_episodes == 0 {
            let slim = SlimSubject {
                id: subject_id,
                name,
                future_episodes: Vec::new(),
            };
            self.cache.set_json(&cache_key, &slim, SUBJECT_TTL).await;
            return Ok(Some(slim));
        }

        let episodes = self.fetch_all_episodes(subject_id).await?;
        let parsed: Vec<ParsedEpisode> = episodes
            .iter()
            .filter_map(ParsedEpisode::from_episode)
            .collect();
        let future_episodes = filter_future_episodes(&parsed, now);
        let ttl = subject_ttl(parsed.len(), future_episodes.len());

        let slim = SlimSubject {
            id: subject_id,
            name,
            future_episodes,
        };
        self.cache.set_json(&cache_key, &slim, ttl).await;
        Ok(Some(slim))
    }

    async fn fetch_all_episodes(&self, subject_id: u64) -> Result<Vec<Episode>, CalendarError> {
        let mut episodes = Vec::new();
        let mut offset = 0;

        loop {
            let page = self
                .api
                .episodes(subject_id, offset, EPISODE_PAGE_SIZE)
                .await?;
            episodes.extend(page.data);

            offset += EPISODE_PAGE_SIZE;
            if offset >= page.total {
                break;
            }
        }

        Ok(episodes)
    }
}

/// A show enumerated in one page with nothing upcoming has most likely
/// finished airing. Paginated shows always get the short TTL.
fn subject_ttl(episode_count: usize, future_count: usize) -> Duration {
    if episode_count > 0 && future_count == 0 && episode_count <= EPISODE_PAGE_SIZE as usize {
        FINISHED_SUBJECT_TTL
    } else {
        SUBJECT_TTL
    }
}

/// Episodes whose air date (midnight UTC) is later than `now` minus the
/// lookback window.
pub fn filter_future_episodes(
    episodes: &[ParsedEpisode],
    now: DateTime<Utc>,
) -> Vec<ParsedEpisode> {
    let cutoff = now - PIPELINE_LOOKBACK;

    episodes
        .iter()
        .filter(|episode| {
            episode
                .date()
                .map(|date| date.and_time(NaiveTime::MIN).and_utc() > cutoff)
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
