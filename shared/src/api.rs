use serde::{Deserialize, Serialize};

// ============================================================================
// Upstream (Bangumi v0) API Types
// ============================================================================

/// One page of a paginated upstream resource.
///
/// Callers keep requesting with `offset += limit` until `offset >= total`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub total: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// A user's tracking record for one subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCollection {
    pub subject_id: u64,
    pub subject_type: u8,
    /// Collection status (wish, done, watching, ...)
    #[serde(rename = "type")]
    pub collection_type: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Subject metadata, trimmed to what the calendar needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_cn: String,
    #[serde(default)]
    pub total_episodes: u32,
}

/// Raw episode as returned by `/v0/episodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: u64,
    #[serde(default)]
    pub sort: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_cn: String,
    /// `YYYY-MM-DD`, may be empty for unscheduled episodes
    #[serde(default)]
    pub airdate: String,
    #[serde(default)]
    pub duration: String,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }
}
