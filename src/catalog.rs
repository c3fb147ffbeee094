//! Read-only lookup of books and reading clubs.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingClub {
    pub id: String,
    pub name: String,
    pub book_id: String,
}

#[async_trait]
pub trait SubjectCatalog: Send + Sync {
    async fn find_book(&self, book_id: &str) -> Result<Option<Book>>;

    async fn find_reading_club(&self, club_id: &str) -> Result<Option<ReadingClub>>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default)]
    books: Vec<Book>,
    #[serde(default)]
    reading_clubs: Vec<ReadingClub>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    books: HashMap<String, Book>,
    reading_clubs: HashMap<String, ReadingClub>,
}

impl InMemoryCatalog {
    pub fn new(books: Vec<Book>, reading_clubs: Vec<ReadingClub>) -> Self {
        Self {
            books: books.into_iter().map(|book| (book.id.clone(), book)).collect(),
            reading_clubs: reading_clubs
                .into_iter()
                .map(|club| (club.id.clone(), club))
                .collect(),
        }
    }

    /// Seeds the catalog from `{"books": [...], "readingClubs": [...]}`.
    /// A missing file gives an empty catalog.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "catalog file not found, starting with an empty catalog"
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let file: CatalogFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse catalog {}", path.display()))?;
        tracing::info!(
            books = file.books.len(),
            reading_clubs = file.reading_clubs.len(),
            "catalog loaded"
        );
        Ok(Self::new(file.books, file.reading_clubs))
    }
}

#[async_trait]
impl SubjectCatalog for InMemoryCatalog {
    async fn find_book(&self, book_id: &str) -> Result<Option<Book>> {
        Ok(self.books.get(book_id).cloned())
    }

    async fn find_reading_club(&self, club_id: &str) -> Result<Option<ReadingClub>> {
        Ok(self.reading_clubs.get(club_id).cloned())
    }
}
