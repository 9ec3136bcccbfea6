//! Knowledge base management system.
//!
//! Provides local-first retrieval using SQLite and pluggable embeddings.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod fetch;
pub mod index;
pub mod parser;
pub mod types;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider};
pub use types::{
    BaseStats, KnowledgeBaseConfig, KnowledgeChunk, KnowledgeSource, LearnOptions, LearnStats,
    ScoredChunk, SearchOptions,
};

use chrono::Utc;
use ragloop_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Learn from sources and populate the knowledge base.
///
/// Files that cannot be parsed (binary, non UTF-8) and URLs that cannot be
/// fetched are skipped and counted. Re-learning a path or URL replaces its
/// previous chunks.
pub async fn learn(workspace: &Path, options: LearnOptions) -> AppResult<LearnStats> {
    let start = Instant::now();

    tracing::info!("Starting learn operation for base '{}'", options.base_name);

    let config = config::load_config(workspace, &options.base_name)?;
    let provider = create_provider(&config)?;

    let index_path = config::get_index_path(workspace, &options.base_name);
    let mut conn = index::init_index(&index_path)?;

    if options.reset {
        tracing::info!("Resetting knowledge base");
        index::reset_index(&conn)?;
    }

    let mut stats = LearnStats {
        sources_count: 0,
        skipped_count: 0,
        chunks_count: 0,
        bytes_processed: 0,
        duration_secs: 0.0,
    };

    for path in collect_files(&options) {
        let document = match parser::parse_file(&path) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                stats.skipped_count += 1;
                continue;
            }
        };

        let location = path.to_string_lossy().to_string();
        let (chunks, bytes) =
            process_document(&mut conn, provider.as_ref(), &config, &location, document).await?;
        stats.sources_count += 1;
        stats.chunks_count += chunks;
        stats.bytes_processed += bytes;
    }

    if !options.urls.is_empty() {
        let client = fetch::http_client()?;

        for url in &options.urls {
            let document = match fetch::fetch_page(&client, url).await {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", url, e);
                    stats.skipped_count += 1;
                    continue;
                }
            };

            let (chunks, bytes) =
                process_document(&mut conn, provider.as_ref(), &config, url, document).await?;
            stats.sources_count += 1;
            stats.chunks_count += chunks;
            stats.bytes_processed += bytes;
        }
    }

    config::save_config(workspace, &config)?;
    config::save_learn_record(
        workspace,
        &options.base_name,
        &config::LearnRecord {
            last_learn_at: Utc::now(),
        },
    )?;

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Learn operation completed: {} sources ({} skipped), {} chunks, {} bytes in {:.2}s",
        stats.sources_count,
        stats.skipped_count,
        stats.chunks_count,
        stats.bytes_processed,
        stats.duration_secs
    );

    Ok(stats)
}

/// Expand the requested paths into the files to learn, in walk order.
fn collect_files(options: &LearnOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in &options.paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let entries = WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok());

            for entry in entries {
                let entry_path = entry.path();
                if entry_path.is_file() && should_include(entry_path, options) {
                    files.push(entry_path.to_path_buf());
                }
            }
        } else {
            tracing::warn!("Path does not exist: {:?}", path);
        }
    }

    files
}

/// Chunk, embed and store one parsed source. Returns (chunks, bytes).
async fn process_document(
    conn: &mut rusqlite::Connection,
    provider: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
    location: &str,
    document: parser::ParsedDocument,
) -> AppResult<(u32, u64)> {
    tracing::debug!("Processing source: {}", location);

    let size_bytes = document.text.len() as u64;

    let source_id = uuid::Uuid::new_v4().to_string();
    let candidates = chunker::chunk_text(
        &source_id,
        &document.text,
        config.chunk_size as usize,
        config.chunk_overlap as usize,
    )?;

    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let embeddings = provider.embed_batch(&texts).await?;

    let chunks: Vec<KnowledgeChunk> = candidates
        .into_iter()
        .zip(embeddings)
        .map(|(candidate, embedding)| {
            let mut metadata = candidate.metadata;
            metadata["source"] = serde_json::Value::String(location.to_string());

            KnowledgeChunk {
                id: uuid::Uuid::new_v4().to_string(),
                source_id: candidate.source_id,
                position: candidate.position,
                text: candidate.text,
                embedding: Some(embedding),
                metadata,
            }
        })
        .collect();

    let source = KnowledgeSource {
        id: source_id,
        location: location.to_string(),
        content_type: document.content_type.as_str().to_string(),
        learned_at: Utc::now(),
        size_bytes,
    };

    let replaced = index::replace_source(conn, &source, &chunks)?;
    if replaced > 0 {
        tracing::debug!("Replaced previously learned source {}", location);
    }

    let chunks_count = chunks.len() as u32;
    tracing::debug!(
        "Processed {}: {} chunks, {} bytes",
        location,
        chunks_count,
        size_bytes
    );

    Ok((chunks_count, size_bytes))
}

/// Check if a file should be included based on patterns.
fn should_include(path: &Path, options: &LearnOptions) -> bool {
    let path_str = path.to_string_lossy();

    if options.exclude.iter().any(|p| path_str.contains(p.as_str())) {
        return false;
    }

    options.include.is_empty() || options.include.iter().any(|p| path_str.contains(p.as_str()))
}

/// Query the knowledge base and return the top-k chunks by similarity.
pub async fn search(workspace: &Path, options: SearchOptions) -> AppResult<Vec<ScoredChunk>> {
    let base = KnowledgeBase::open(workspace, &options.base_name)?;
    base.search(&options.query, options.top_k as usize).await
}

/// Clean (reset) a knowledge base.
pub fn clean(workspace: &Path, base_name: &str) -> AppResult<()> {
    tracing::info!("Cleaning knowledge base '{}'", base_name);

    let index_path = existing_index(workspace, base_name)?;
    let conn = index::init_index(&index_path)?;
    index::reset_index(&conn)?;

    tracing::info!("Knowledge base '{}' cleaned", base_name);
    Ok(())
}

/// Get statistics for a knowledge base.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    tracing::info!("Getting stats for knowledge base '{}'", base_name);

    let index_path = existing_index(workspace, base_name)?;
    let config = config::load_config(workspace, base_name)?;

    let conn = index::init_index(&index_path)?;
    let (sources_count, chunks_count) = index::get_stats(&conn)?;

    let db_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    Ok(BaseStats {
        base_name: base_name.to_string(),
        provider: config.provider,
        model: config.model,
        sources_count,
        chunks_count,
        db_size_bytes,
        last_learn_at: config::load_learn_record(workspace, base_name).map(|r| r.last_learn_at),
    })
}

fn existing_index(workspace: &Path, base_name: &str) -> AppResult<PathBuf> {
    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' has no index. Run 'ragloop knowledge learn {}' first.",
            base_name, base_name
        )));
    }
    Ok(index_path)
}

/// Handle to a learned knowledge base.
///
/// Holds the embedding provider for the base's lifetime; the SQLite
/// connection is opened per query so the handle stays `Send + Sync`.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    name: String,
    index_path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
}

impl KnowledgeBase {
    /// Open a base that has already been learned.
    pub fn open(workspace: &Path, base_name: &str) -> AppResult<Self> {
        let index_path = existing_index(workspace, base_name)?;
        let config = config::load_config(workspace, base_name)?;
        let provider = create_provider(&config)?;

        Ok(Self {
            name: base_name.to_string(),
            index_path,
            provider,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Top-k chunks for `query`, by descending cosine similarity.
    pub async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<ScoredChunk>> {
        tracing::debug!("Querying knowledge base '{}': {}", self.name, query);

        let query_embedding = self.provider.embed(query).await?;

        let index_path = self.index_path.clone();
        let results = tokio::task::spawn_blocking(move || {
            let conn = index::init_index(&index_path)?;
            index::query_chunks(&conn, &query_embedding, top_k)
        })
        .await
        .map_err(|e| AppError::Knowledge(format!("Index query task failed: {}", e)))??;

        if let (Some(first), Some(last)) = (results.first(), results.last()) {
            tracing::debug!(
                "Retrieved {} chunks (top score: {:.3}, lowest: {:.3})",
                results.len(),
                first.score,
                last.score
            );
        }

        Ok(results)
    }
}
