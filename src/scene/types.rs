use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::GenerationRecord;
use crate::catalog::Book;

pub const DEFAULT_STYLE: &str = "photorealistic";

/// Body of a scene image request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub return_base64: Option<bool>,
    #[serde(default)]
    pub size: Option<String>,
}

impl GenerationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_inline_data(mut self, inline: bool) -> Self {
        self.return_base64 = Some(inline);
        self
    }

    /// Request style, or the default when missing or blank.
    pub fn effective_style(&self) -> &str {
        self.style
            .as_deref()
            .map(str::trim)
            .filter(|style| !style.is_empty())
            .unwrap_or(DEFAULT_STYLE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectRef {
    Book(String),
    ReadingClub(String),
}

impl SubjectRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Book(id) | Self::ReadingClub(id) => id,
        }
    }

    /// Dedup scope, tagged by kind so a book and a club sharing an id never collide.
    pub fn scope_key(&self) -> String {
        match self {
            Self::Book(_) => format!("book:{}", self.id()),
            Self::ReadingClub(_) => format!("club:{}", self.id()),
        }
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Book(id) => write!(f, "book {id}"),
            Self::ReadingClub(id) => write!(f, "reading club {id}"),
        }
    }
}

/// A subject resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    /// Dedup scope, see [`SubjectRef::scope_key`].
    pub id: String,
    pub book: Book,
    pub reading_club_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResponse {
    pub book_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_club_id: Option<String>,
    pub crafted_prompt: String,
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
    pub size: String,
    pub style: String,
    pub seed: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<GenerationRecord> for GenerationResponse {
    fn from(record: GenerationRecord) -> Self {
        Self {
            book_id: record.book_id,
            reading_club_id: record.reading_club_id,
            crafted_prompt: record.crafted_prompt,
            image_url: record.image_url,
            image_base64: record.image_base64,
            size: record.size,
            style: record.style,
            seed: record.seed,
            created_at: record.created_at,
        }
    }
}
