//! Snapshot overview for `mqa status`: what is indexed, under which
//! embedding model, and when it was built.

use anyhow::Result;

use crate::config::Config;
use crate::index::IndexStore;

pub async fn run_status(config: &Config) -> Result<()> {
    let store = IndexStore::open(&config.index.path).await?;
    let stats = store.stats().await?;

    println!("index snapshot: {}", config.index.path.display());
    println!("  documents: {}", stats.documents);
    println!("  chunks: {}", stats.chunks);
    println!("  embedded: {}", stats.embedded);
    match (&stats.model, stats.dims) {
        (Some(model), Some(dims)) => println!("  embedding model: {} ({} dims)", model, dims),
        _ => println!("  embedding model: (not built)"),
    }
    if let Some(ts) = stats.built_at {
        let built = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| ts.to_string());
        println!("  built at: {}", built);
    }
    if stats.embedded == 0 {
        println!("  (empty — run `mqa ingest` to build)");
    }

    store.close().await;
    Ok(())
}
