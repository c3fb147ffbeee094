use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted scene image generation.
///
/// `(subject_id, fragment_hash)` is the dedup key. The subject id is
/// `book:<book id>` or `club:<club id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    pub subject_id: String,
    pub book_id: String,
    pub reading_club_id: Option<String>,
    pub fragment_hash: String,
    pub crafted_prompt: String,
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
    pub size: String,
    pub style: String,
    pub seed: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub response_time_ms: u64,
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
}
