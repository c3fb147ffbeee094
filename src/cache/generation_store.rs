use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs;

use crate::cache::{GenerationRecord, LocalFileStorage, compute_hash};

const GENERATION_DIR: &str = "generations";
const SUBJECT_HASH_LEN: usize = 16;

/// Persistence for scene image generations.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn find_by_subject_and_fingerprint(
        &self,
        subject_id: &str,
        fingerprint: &str,
    ) -> Result<Option<GenerationRecord>>;

    async fn save(&self, record: GenerationRecord) -> Result<GenerationRecord>;

    /// Newest first.
    async fn list_by_book(&self, book_id: &str) -> Result<Vec<GenerationRecord>>;

    /// Newest first.
    async fn list_by_reading_club(&self, reading_club_id: &str) -> Result<Vec<GenerationRecord>>;

    async fn count_by_book(&self, book_id: &str) -> Result<u64> {
        Ok(self.list_by_book(book_id).await?.len() as u64)
    }

    async fn count_by_reading_club(&self, reading_club_id: &str) -> Result<u64> {
        Ok(self.list_by_reading_club(reading_club_id).await?.len() as u64)
    }
}

fn sort_newest_first(records: &mut [GenerationRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// One JSON document per generation under `<cache_dir>/generations/`.
pub struct FileGenerationStore {
    storage: LocalFileStorage,
}

impl FileGenerationStore {
    pub fn new(storage: LocalFileStorage) -> Self {
        Self { storage }
    }

    fn record_key(subject_id: &str, fingerprint: &str) -> String {
        let mut subject_hash = compute_hash(subject_id);
        subject_hash.truncate(SUBJECT_HASH_LEN);
        LocalFileStorage::get_generation_key(&subject_hash, fingerprint)
    }

    async fn load_all(&self) -> Result<Vec<GenerationRecord>> {
        let dir_path = self.storage.resolve_path(GENERATION_DIR);
        let mut entries: Vec<PathBuf> = Vec::new();
        let mut dir = match fs::read_dir(&dir_path).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                entries.push(path);
            }
        }

        let mut records = Vec::with_capacity(entries.len());
        for path in entries {
            let bytes = fs::read(&path).await?;
            match serde_json::from_slice::<GenerationRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        "skipping unreadable generation record: {err}"
                    );
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl GenerationStore for FileGenerationStore {
    async fn find_by_subject_and_fingerprint(
        &self,
        subject_id: &str,
        fingerprint: &str,
    ) -> Result<Option<GenerationRecord>> {
        let key = Self::record_key(subject_id, fingerprint);
        let Some(bytes) = self.storage.get(&key).await? else {
            return Ok(None);
        };
        let record: GenerationRecord = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt generation record at {key}"))?;
        Ok(Some(record))
    }

    async fn save(&self, record: GenerationRecord) -> Result<GenerationRecord> {
        let key = Self::record_key(&record.subject_id, &record.fragment_hash);
        let payload = serde_json::to_vec_pretty(&record)?;
        if self.storage.exists(&key).await? {
            tracing::debug!(key = %key, "replacing existing generation record");
        }
        self.storage
            .put(&key, &payload)
            .await
            .with_context(|| format!("failed to write generation record {key}"))?;
        Ok(record)
    }

    async fn list_by_book(&self, book_id: &str) -> Result<Vec<GenerationRecord>> {
        let mut records: Vec<_> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|record| record.book_id == book_id)
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn list_by_reading_club(&self, reading_club_id: &str) -> Result<Vec<GenerationRecord>> {
        let mut records: Vec<_> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|record| record.reading_club_id.as_deref() == Some(reading_club_id))
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }
}

/// Process-local store, keyed the same way as the file store.
#[derive(Default)]
pub struct InMemoryGenerationStore {
    records: RwLock<HashMap<(String, String), GenerationRecord>>,
}

impl InMemoryGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn collect_sorted(
        &self,
        predicate: impl Fn(&GenerationRecord) -> bool,
    ) -> Vec<GenerationRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        records
    }
}

#[async_trait]
impl GenerationStore for InMemoryGenerationStore {
    async fn find_by_subject_and_fingerprint(
        &self,
        subject_id: &str,
        fingerprint: &str,
    ) -> Result<Option<GenerationRecord>> {
        let key = (subject_id.to_string(), fingerprint.to_string());
        Ok(self.records.read().get(&key).cloned())
    }

    async fn save(&self, record: GenerationRecord) -> Result<GenerationRecord> {
        let key = (record.subject_id.clone(), record.fragment_hash.clone());
        self.records.write().insert(key, record.clone());
        Ok(record)
    }

    async fn list_by_book(&self, book_id: &str) -> Result<Vec<GenerationRecord>> {
        Ok(self.collect_sorted(|record| record.book_id == book_id))
    }

    async fn list_by_reading_club(&self, reading_club_id: &str) -> Result<Vec<GenerationRecord>> {
        Ok(self.collect_sorted(|record| {
            record.reading_club_id.as_deref() == Some(reading_club_id)
        }))
    }
}
