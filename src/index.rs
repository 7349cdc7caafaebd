//! The index store: embedding-index lifecycle over a SQLite snapshot.
//!
//! The index is either **built** — every configured manual is segmented,
//! chunked, and embedded, and the whole snapshot is replaced in one
//! transaction — or **loaded** whole from an existing snapshot. There is no
//! partial rebuild. The load-vs-build decision happens once per process:
//! a present, non-empty snapshot wins; deleting the snapshot file (or
//! `mqa ingest --force`) is the way to force a rebuild.
//!
//! Building runs under an exclusive lock and the finished [`Index`] is
//! shared read-only afterwards, so concurrent queries need no locking.
//!
//! The snapshot records the embedding model id and dimensionality; loading
//! under a different embedding configuration is refused rather than silently
//! mixing embedding spaces.

use std::path::Path;

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::chunk::chunk_chapters;
use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob, EmbeddingProvider};
use crate::migrate;
use crate::models::Chunk;
use crate::segment::{load_chapters, policy_for};

const META_MODEL: &str = "embedding_model";
const META_DIMS: &str = "embedding_dims";
const META_BUILT_AT: &str = "built_at";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index unavailable: {0}")]
    Unavailable(String),
    #[error(
        "index snapshot was built with embedding model '{snapshot}' but '{configured}' is \
         configured; delete the snapshot to rebuild"
    )]
    ModelMismatch {
        snapshot: String,
        configured: String,
    },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error("embedding failed during index build: {0}")]
    Embedding(String),
}

/// A chunk paired with its embedding vector. Created at build time,
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// The in-memory index: all embedding records in insertion order plus the
/// embedding-space identity they were built with.
#[derive(Debug, Clone)]
pub struct Index {
    pub records: Vec<EmbeddingRecord>,
    pub dims: usize,
    pub model: String,
}

impl Index {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Counts and metadata for `mqa status`.
#[derive(Debug)]
pub struct SnapshotStats {
    pub documents: i64,
    pub chunks: i64,
    pub embedded: i64,
    pub model: Option<String>,
    pub dims: Option<usize>,
    pub built_at: Option<i64>,
}

pub struct IndexStore {
    pool: SqlitePool,
    build_lock: Mutex<()>,
}

impl IndexStore {
    /// Open (creating if needed) the snapshot database and run migrations.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        let pool = db::connect(path)
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        migrate::run_migrations(&pool)
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(Self {
            pool,
            build_lock: Mutex::new(()),
        })
    }

    /// The one-time load-vs-build decision: load a present, non-empty
    /// snapshot, otherwise build from the configured documents and persist.
    pub async fn open_or_build(
        &self,
        config: &Config,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Index, IndexError> {
        if let Some(index) = self.load(provider.model_name(), provider.dims()).await? {
            info!(
                chunks = index.len(),
                model = %index.model,
                "loaded index snapshot, skipping rebuild"
            );
            return Ok(index);
        }
        info!("no usable index snapshot, building from configured documents");
        self.build(config, provider).await
    }

    /// Load the full index from the snapshot, or `None` when the snapshot is
    /// missing or empty. A snapshot built under a different embedding
    /// model or dimensionality is an error, not a silent rebuild.
    pub async fn load(
        &self,
        expected_model: &str,
        expected_dims: usize,
    ) -> Result<Option<Index>, IndexError> {
        let chunk_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        if chunk_count == 0 {
            return Ok(None);
        }

        let model = match self.meta(META_MODEL).await? {
            Some(m) => m,
            None => return Ok(None),
        };
        let dims: usize = self
            .meta(META_DIMS)
            .await?
            .and_then(|d| d.parse().ok())
            .unwrap_or(0);

        if model != expected_model {
            return Err(IndexError::ModelMismatch {
                snapshot: model,
                configured: expected_model.to_string(),
            });
        }
        if dims != expected_dims {
            return Err(IndexError::DimensionMismatch {
                expected: expected_dims,
                actual: dims,
            });
        }

        // rowid order is the build's insertion order; retrieval relies on it
        // for stable tie-breaks.
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chapter_index, c.chunk_index, c.text, c.hash, e.vector
            FROM chunks c
            JOIN embeddings e ON e.chunk_id = c.id
            ORDER BY c.rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("vector");
            let vector = blob_to_vec(&blob);
            if vector.len() != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    actual: vector.len(),
                });
            }
            records.push(EmbeddingRecord {
                chunk: Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    chapter_index: row.get::<i64, _>("chapter_index") as usize,
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    text: row.get("text"),
                    hash: row.get("hash"),
                },
                vector,
            });
        }

        Ok(Some(Index {
            records,
            dims,
            model,
        }))
    }

    /// Build the index from scratch: segment and chunk every configured
    /// document, embed every chunk, and replace the snapshot in one
    /// transaction.
    ///
    /// Segmentation failures on individual documents are logged and skipped;
    /// an embedding failure aborts the whole build.
    pub async fn build(
        &self,
        config: &Config,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Index, IndexError> {
        // Exclusive: a build-in-progress index must not be observed.
        let _guard = self.build_lock.lock().await;

        struct BuiltDocument {
            id: String,
            title: String,
            path: String,
            pages: usize,
            chapters: usize,
        }

        let mut documents: Vec<BuiltDocument> = Vec::new();
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut failed = 0usize;

        for doc in &config.documents {
            let policy = policy_for(&config.segmenter, doc);
            match load_chapters(doc, &policy) {
                Ok((text, chapters)) => {
                    let doc_chunks =
                        chunk_chapters(&chapters, config.chunking.max_chars, config.chunking.overlap);
                    documents.push(BuiltDocument {
                        id: doc.id.clone(),
                        title: text.title.clone(),
                        path: doc.path.display().to_string(),
                        pages: text.page_count(),
                        chapters: chapters.len(),
                    });
                    chunks.extend(doc_chunks);
                }
                Err(e) => {
                    warn!(document = %doc.id, error = %e, "skipping document");
                    failed += 1;
                }
            }
        }

        if !config.documents.is_empty() && documents.is_empty() {
            return Err(IndexError::Unavailable(format!(
                "all {failed} configured documents failed segmentation"
            )));
        }
        if chunks.is_empty() {
            warn!("index built with zero chunks; retrieval will return nothing");
        }

        // Embed in batches. Any failure here is fatal to the build: a
        // half-embedded index must never be persisted.
        let mut records: Vec<EmbeddingRecord> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = provider
                .embed(&texts)
                .await
                .map_err(|e| IndexError::Embedding(e.to_string()))?;
            if vectors.len() != batch.len() {
                return Err(IndexError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != provider.dims() {
                    return Err(IndexError::DimensionMismatch {
                        expected: provider.dims(),
                        actual: vector.len(),
                    });
                }
                records.push(EmbeddingRecord {
                    chunk: chunk.clone(),
                    vector,
                });
            }
        }

        // Replace the snapshot wholesale: build is all-or-nothing.
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM embeddings").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;

        for doc in &documents {
            sqlx::query(
                "INSERT INTO documents (id, title, path, pages, chapters, ingested_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&doc.id)
            .bind(&doc.title)
            .bind(&doc.path)
            .bind(doc.pages as i64)
            .bind(doc.chapters as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        for record in &records {
            let chunk = &record.chunk;
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chapter_index, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chapter_index as i64)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO embeddings (chunk_id, vector) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(vec_to_blob(&record.vector))
                .execute(&mut *tx)
                .await?;
        }

        for (key, value) in [
            (META_MODEL, provider.model_name().to_string()),
            (META_DIMS, provider.dims().to_string()),
            (META_BUILT_AT, now.to_string()),
        ] {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            documents = documents.len(),
            skipped = failed,
            chunks = records.len(),
            model = provider.model_name(),
            "index built and persisted"
        );

        Ok(Index {
            records,
            dims: provider.dims(),
            model: provider.model_name().to_string(),
        })
    }

    /// Drop the whole snapshot (used by `mqa ingest --force`).
    pub async fn clear(&self) -> Result<(), IndexError> {
        let _guard = self.build_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM embeddings").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<SnapshotStats, IndexError> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(SnapshotStats {
            documents,
            chunks,
            embedded,
            model: self.meta(META_MODEL).await?,
            dims: self.meta(META_DIMS).await?.and_then(|d| d.parse().ok()),
            built_at: self.meta(META_BUILT_AT).await?.and_then(|t| t.parse().ok()),
        })
    }

    /// Release the snapshot pool. Explicit so shutdown is deterministic.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn meta(&self, key: &str) -> Result<Option<String>, IndexError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}
