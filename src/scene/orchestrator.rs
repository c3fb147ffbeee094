use std::sync::Arc;

use chrono::Utc;

use crate::cache::{GenerationRecord, GenerationStore, fragment_fingerprint};
use crate::catalog::SubjectCatalog;
use crate::config::SceneImageConfig;
use crate::error::SceneImageError;
use crate::gateway::{ImageGenerationGateway, ImageGenerationRequest};
use crate::scene::prompt::PromptBuilder;
use crate::scene::types::{GenerationRequest, GenerationResponse, Subject, SubjectRef};
use crate::scene::validation::{is_large_size, validate_size, validate_text};

/// Validates, deduplicates, generates and persists scene images.
///
/// Retries belong to the gateway; this layer makes exactly one attempt.
pub struct SceneImageOrchestrator {
    catalog: Arc<dyn SubjectCatalog>,
    prompt_builder: Arc<dyn PromptBuilder>,
    gateway: Arc<dyn ImageGenerationGateway>,
    store: Arc<dyn GenerationStore>,
    config: SceneImageConfig,
}

impl SceneImageOrchestrator {
    pub fn new(
        catalog: Arc<dyn SubjectCatalog>,
        prompt_builder: Arc<dyn PromptBuilder>,
        gateway: Arc<dyn ImageGenerationGateway>,
        store: Arc<dyn GenerationStore>,
        config: SceneImageConfig,
    ) -> Self {
        Self {
            catalog,
            prompt_builder,
            gateway,
            store,
            config,
        }
    }

    pub async fn generate(
        &self,
        subject_ref: &SubjectRef,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, SceneImageError> {
        tracing::info!(
            subject = %subject_ref,
            text_chars = request.text.chars().count(),
            "scene image requested"
        );

        let text = validate_text(&request.text, &self.config)?;
        if let Some(size) = request.size.as_deref() {
            validate_size(size)?;
        }
        let subject = self.resolve_subject(subject_ref).await?;

        let fingerprint = fragment_fingerprint(text);
        let existing = self
            .store
            .find_by_subject_and_fingerprint(&subject.id, &fingerprint)
            .await
            .map_err(|err| {
                SceneImageError::generation_failed(format!("generation lookup failed: {err}"))
            })?;
        if let Some(record) = existing {
            tracing::info!(
                subject_id = %subject.id,
                fingerprint = %fingerprint,
                "returning existing generation"
            );
            return Ok(record.into());
        }

        let record = self.generate_new(&subject, text, &fingerprint, request).await?;
        Ok(record.into())
    }

    async fn generate_new(
        &self,
        subject: &Subject,
        text: &str,
        fingerprint: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationRecord, SceneImageError> {
        let style = request.effective_style();
        let size = request.size.as_deref().unwrap_or(&self.config.default_size);

        let mut want_inline = request.return_base64.unwrap_or(false);
        if want_inline && is_large_size(size) {
            tracing::info!(size, "inline data requested for a large size, switching to url mode");
            want_inline = false;
        }

        let crafted_prompt = self
            .prompt_builder
            .build(subject, text, style)
            .await
            .map_err(|err| SceneImageError::generation_failed(err.to_string()))?;

        let image = self
            .gateway
            .generate(ImageGenerationRequest {
                prompt: &crafted_prompt,
                size,
                seed: request.seed,
                want_inline,
            })
            .await
            .map_err(|err| {
                tracing::error!(subject_id = %subject.id, "image generation failed: {err}");
                SceneImageError::generation_failed(err.to_string())
            })?;

        let record = GenerationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            subject_id: subject.id.clone(),
            book_id: subject.book.id.clone(),
            reading_club_id: subject.reading_club_id.clone(),
            fragment_hash: fingerprint.to_string(),
            crafted_prompt,
            image_url: image.url,
            image_base64: if want_inline { image.base64 } else { None },
            revised_prompt: image.revised_prompt,
            size: size.to_string(),
            style: style.to_string(),
            seed: request.seed,
            created_at: Utc::now(),
            response_time_ms: image.response_time_ms,
            prompt_tokens: image.prompt_tokens,
            total_cost_usd: image.cost_usd,
        };

        let saved = self
            .store
            .save(record)
            .await
            .map_err(|err| {
                SceneImageError::generation_failed(format!("failed to persist generation: {err}"))
            })?;

        tracing::info!(
            subject_id = %saved.subject_id,
            book_id = %saved.book_id,
            response_time_ms = saved.response_time_ms,
            "scene image generated"
        );
        Ok(saved)
    }

    async fn resolve_subject(&self, subject_ref: &SubjectRef) -> Result<Subject, SceneImageError> {
        let lookup_failed = |err: anyhow::Error| {
            SceneImageError::generation_failed(format!("catalog lookup failed: {err}"))
        };
        match subject_ref {
            SubjectRef::Book(book_id) => {
                let book = self
                    .catalog
                    .find_book(book_id)
                    .await
                    .map_err(lookup_failed)?
                    .ok_or_else(|| SceneImageError::not_found(format!("book {book_id}")))?;
                Ok(Subject {
                    id: subject_ref.scope_key(),
                    book,
                    reading_club_id: None,
                })
            }
            SubjectRef::ReadingClub(club_id) => {
                let club = self
                    .catalog
                    .find_reading_club(club_id)
                    .await
                    .map_err(lookup_failed)?
                    .ok_or_else(|| {
                        SceneImageError::not_found(format!("reading club {club_id}"))
                    })?;
                let book = self
                    .catalog
                    .find_book(&club.book_id)
                    .await
                    .map_err(lookup_failed)?
                    .ok_or_else(|| {
                        SceneImageError::not_found(format!("book {}", club.book_id))
                    })?;
                Ok(Subject {
                    id: subject_ref.scope_key(),
                    book,
                    reading_club_id: Some(club.id),
                })
            }
        }
    }

    pub async fn generations_for_book(
        &self,
        book_id: &str,
    ) -> anyhow::Result<Vec<GenerationRecord>> {
        self.store.list_by_book(book_id).await
    }

    pub async fn generations_for_reading_club(
        &self,
        club_id: &str,
    ) -> anyhow::Result<Vec<GenerationRecord>> {
        self.store.list_by_reading_club(club_id).await
    }

    pub async fn generation_count_for_book(&self, book_id: &str) -> anyhow::Result<u64> {
        self.store.count_by_book(book_id).await
    }

    pub async fn generation_count_for_reading_club(&self, club_id: &str) -> anyhow::Result<u64> {
        self.store.count_by_reading_club(club_id).await
    }
}
