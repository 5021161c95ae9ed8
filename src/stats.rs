//! Per-index statistics, assembled from store reads only; the aggregator
//! never mutates anything.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::store::{ParseHealthSummary, Store};

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub name: String,
    pub source_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_files: i64,
    pub total_chunks: i64,
    /// (language_id, chunk count), most common first. The empty id is the
    /// plain-text fallback.
    pub languages: Vec<(String, i64)>,
    /// (symbol_type, chunk count) for chunks that define a symbol.
    pub symbols: Vec<(String, i64)>,
    pub parse_health: ParseHealthSummary,
    /// True when the index hasn't been refreshed within the staleness
    /// window (default 7 days).
    pub stale: bool,
}

pub async fn index_stats(store: &Store, cfg: &EngineConfig, name: &str) -> Result<IndexStats> {
    let record = store.get_index(name).await?;
    let (total_files, total_chunks) = store.row_counts(name).await?;
    let languages = store.language_breakdown(name).await?;
    let symbols = store.symbol_breakdown(name).await?;
    let parse_health = store.parse_health_summary(name).await?;

    let stale = Utc::now() - record.updated_at > Duration::days(cfg.staleness_days);

    Ok(IndexStats {
        name: record.name,
        source_path: record.source_path,
        created_at: record.created_at,
        updated_at: record.updated_at,
        total_files,
        total_chunks,
        languages,
        symbols,
        parse_health,
        stale,
    })
}

pub async fn all_stats(store: &Store, cfg: &EngineConfig) -> Result<Vec<IndexStats>> {
    let mut out = Vec::new();
    for record in store.list_indexes().await? {
        out.push(index_stats(store, cfg, &record.name).await?);
    }
    Ok(out)
}
