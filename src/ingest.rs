//! Index build orchestration for `mqa ingest`.
//!
//! Walks the configured manuals through extraction → segmentation →
//! chunking → embedding and replaces the snapshot. Respects the load-vs-build
//! rule: an existing non-empty snapshot is left alone unless `--force` is
//! given.

use anyhow::Result;

use crate::chunk::chunk_chapters;
use crate::config::Config;
use crate::embedding;
use crate::index::IndexStore;
use crate::segment::{load_chapters, policy_for};

pub async fn run_ingest(config: &Config, force: bool, dry_run: bool) -> Result<()> {
    if config.documents.is_empty() {
        println!("ingest");
        println!("  no documents configured — nothing to do");
        return Ok(());
    }

    if dry_run {
        println!("ingest (dry-run)");
        let mut total_chapters = 0usize;
        let mut total_chunks = 0usize;
        for doc in &config.documents {
            let policy = policy_for(&config.segmenter, doc);
            match load_chapters(doc, &policy) {
                Ok((text, chapters)) => {
                    let chunks =
                        chunk_chapters(&chapters, config.chunking.max_chars, config.chunking.overlap);
                    println!(
                        "  {}: {} pages, {} chapters, {} chunks",
                        doc.id,
                        text.page_count(),
                        chapters.len(),
                        chunks.len()
                    );
                    total_chapters += chapters.len();
                    total_chunks += chunks.len();
                }
                Err(e) => {
                    println!("  {}: SKIPPED ({})", doc.id, e);
                }
            }
        }
        println!("  total chapters: {}", total_chapters);
        println!("  total chunks: {}", total_chunks);
        return Ok(());
    }

    let store = IndexStore::open(&config.index.path).await?;

    if force {
        store.clear().await?;
        println!("cleared existing index snapshot");
    } else {
        let stats = store.stats().await?;
        if stats.embedded > 0 {
            println!("ingest");
            println!(
                "  snapshot already holds {} embedded chunks — use --force to rebuild",
                stats.embedded
            );
            store.close().await;
            return Ok(());
        }
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let index = store.build(config, provider.as_ref()).await?;
    let stats = store.stats().await?;

    println!("ingest");
    println!("  documents indexed: {}", stats.documents);
    println!("  chunks embedded: {}", index.len());
    println!("  embedding model: {}", index.model);
    println!("  snapshot: {}", config.index.path.display());
    println!("ok");

    store.close().await;
    Ok(())
}
