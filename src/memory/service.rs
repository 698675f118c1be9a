// src/memory/service.rs

//! Public API and orchestration for the local memory service.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::config::EngramConfig;
use crate::llm::client::{GeminiClient, SummarizationClient};
use crate::memory::search::{extract_words_lower, turn_matches};
use crate::memory::store::{DocumentStore, JsonFileStore};
use crate::memory::summarization::{build_transcript, summary_prompt, summary_turn};
use crate::memory::types::{MemoryDocument, MemoryEntry, Session, Turn, UserStats, user_key};

/// Unsummarized turns a user must accumulate before background
/// summarization kicks in.
pub const SUMMARIZATION_THRESHOLD: u64 = 25;

/// Per-user conversation memory with keyword search and threshold-triggered
/// background consolidation.
///
/// Cheap to clone; clones share the cached document and its locks.
#[derive(Clone)]
pub struct MemoryService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    store: Arc<dyn DocumentStore>,
    summarizer: Option<Summarizer>,
    cache: RwLock<DocumentCache>,
    // Serializes summarization runs across all users of this instance.
    summarize_lock: Mutex<()>,
}

struct Summarizer {
    client: Arc<dyn SummarizationClient>,
    model_id: String,
    threshold: u64,
}

#[derive(Default)]
struct DocumentCache {
    hydrated: bool,
    document: MemoryDocument,
}

impl MemoryService {
    /// Creates a service without summarization: history is ingested and
    /// searchable but never condensed.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        info!("Initializing memory service (summarization disabled)");
        Self {
            inner: Arc::new(ServiceInner {
                store,
                summarizer: None,
                cache: RwLock::new(DocumentCache::default()),
                summarize_lock: Mutex::new(()),
            }),
        }
    }

    /// Creates a service that condenses history through `client` once a
    /// user accumulates `threshold` unsummarized turns.
    pub fn with_summarization(
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn SummarizationClient>,
        model_id: impl Into<String>,
        threshold: u64,
    ) -> Self {
        let model_id = model_id.into();
        info!(
            "Initializing memory service with summarization (model: {}, threshold: {})",
            model_id, threshold
        );
        Self {
            inner: Arc::new(ServiceInner {
                store,
                summarizer: Some(Summarizer {
                    client,
                    model_id,
                    threshold,
                }),
                cache: RwLock::new(DocumentCache::default()),
                summarize_lock: Mutex::new(()),
            }),
        }
    }

    /// Wires a file-backed store (and, when configured, a Gemini
    /// summarization client) from configuration values.
    pub fn from_config(config: &EngramConfig) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(&config.storage_path));
        if config.summarization_configured() {
            let client = GeminiClient::new(&config.gemini_api_key)
                .with_base_url(&config.gemini_base_url)
                .with_timeout(config.request_timeout());
            Self::with_summarization(
                store,
                Arc::new(client),
                &config.summarization_model,
                config.summarization_threshold,
            )
        } else {
            Self::new(store)
        }
    }

    /// Ingests one conversation session. Events with no text are dropped;
    /// a session that yields no turns at all is a silent no-op. Re-ingesting
    /// a session id replaces that session's turns wholesale.
    ///
    /// Returns once the document is persisted; any summarization this
    /// ingestion triggers runs in the background.
    pub async fn add_session(&self, session: &Session) -> Result<()> {
        debug!("Adding session {} to memory", session.id);

        let turns: Vec<Turn> = session.events.iter().filter_map(Turn::from_event).collect();
        if turns.is_empty() {
            debug!("Session {} has no text content, skipping", session.id);
            return Ok(());
        }
        let new_turns = turns.len() as u64;

        self.inner.hydrate().await?;
        let key = user_key(&session.app_name, &session.user_id);

        let backlog_reached = {
            let mut cache = self.inner.cache.write().await;
            let record = cache.document.entry(key).or_insert_with(Default::default);
            record.sessions.insert(session.id.clone(), turns);
            record.metadata.total_turns += new_turns;
            let backlog_reached = self
                .inner
                .summarizer
                .as_ref()
                .is_some_and(|summarizer| record.unsummarized_turns() >= summarizer.threshold);

            // Saving under the write lock keeps concurrent saves ordered.
            self.inner
                .store
                .save(&cache.document)
                .await
                .context("failed to persist memory document")?;
            backlog_reached
        };

        if backlog_reached {
            let inner = self.inner.clone();
            let app_name = session.app_name.clone();
            let user_id = session.user_id.clone();
            tokio::spawn(async move {
                inner.background_summarize(&app_name, &user_id).await;
            });
        }

        Ok(())
    }

    /// Returns every stored turn that shares at least one word token with
    /// `query`: summaries first, then session turns in insertion order.
    /// An unknown user yields an empty result.
    pub async fn search_memory(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
    ) -> Result<Vec<MemoryEntry>> {
        debug!("Searching memory for: {}", query);
        self.inner.hydrate().await?;

        let cache = self.inner.cache.read().await;
        let Some(record) = cache.document.get(&user_key(app_name, user_id)) else {
            return Ok(Vec::new());
        };

        let query_words = extract_words_lower(query);
        let hits = record
            .summaries
            .iter()
            .chain(record.sessions.values().flatten())
            .filter(|turn| turn_matches(turn, &query_words))
            .map(MemoryEntry::from_turn)
            .collect();
        Ok(hits)
    }

    /// Read-only counters for one user; `None` when nothing was ingested.
    pub async fn user_stats(&self, app_name: &str, user_id: &str) -> Result<Option<UserStats>> {
        self.inner.hydrate().await?;

        let cache = self.inner.cache.read().await;
        Ok(cache
            .document
            .get(&user_key(app_name, user_id))
            .map(|record| UserStats {
                total_turns: record.metadata.total_turns,
                last_summarized_turn_count: record.metadata.last_summarized_turn_count,
                session_count: record.sessions.len(),
                summary_count: record.summaries.len(),
            }))
    }
}

impl ServiceInner {
    /// Loads the persisted document into the cache at most once. The
    /// re-check under the write lock keeps a concurrent first access from
    /// double-loading.
    async fn hydrate(&self) -> Result<()> {
        {
            let cache = self.cache.read().await;
            if cache.hydrated {
                return Ok(());
            }
        }

        let mut cache = self.cache.write().await;
        if cache.hydrated {
            return Ok(());
        }
        if let Some(document) = self
            .store
            .load()
            .await
            .context("failed to load memory document")?
        {
            cache.document = document;
        }
        cache.hydrated = true;
        Ok(())
    }

    /// Fire-and-forget entry point: failures are logged, never surfaced.
    async fn background_summarize(&self, app_name: &str, user_id: &str) {
        let Some(summarizer) = &self.summarizer else {
            return;
        };

        let _guard = self.summarize_lock.lock().await;
        if let Err(err) = self.summarize_user(summarizer, app_name, user_id).await {
            error!("Background summarization failed for {}: {}", user_id, err);
        }
    }

    async fn summarize_user(
        &self,
        summarizer: &Summarizer,
        app_name: &str,
        user_id: &str,
    ) -> Result<()> {
        self.hydrate().await?;
        let key = user_key(app_name, user_id);

        // Re-check the backlog: an earlier run may already have consumed it.
        let (transcript, observed_turns) = {
            let cache = self.cache.read().await;
            let Some(record) = cache.document.get(&key) else {
                return Ok(());
            };
            if record.unsummarized_turns() < summarizer.threshold {
                debug!("Summarization backlog already consumed for {}", user_id);
                return Ok(());
            }
            (build_transcript(record), record.metadata.total_turns)
        };
        if transcript.is_empty() {
            return Ok(());
        }

        debug!("Summarizing memory for {} in background", user_id);
        let summary_text = summarizer
            .client
            .generate(&summarizer.model_id, &summary_prompt(&transcript))
            .await
            .context("summarization request failed")?;

        let turn = summary_turn(&summary_text);
        {
            let mut cache = self.cache.write().await;
            let Some(record) = cache.document.get_mut(&key) else {
                return Ok(());
            };
            record.summaries = vec![turn];
            // Credit only the turns the transcript saw; turns ingested
            // while the generate call was in flight stay in the backlog.
            record.metadata.last_summarized_turn_count = observed_turns;
            self.store
                .save(&cache.document)
                .await
                .context("failed to persist summarized document")?;
        }
        debug!("Background summarization complete for {}", user_id);
        Ok(())
    }
}
