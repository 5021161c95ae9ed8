//! The engine facade: the six public operations bound to one shared store,
//! one shared embedder and one in-process query cache. Transports (CLI,
//! RPC servers) sit outside and call these.

use std::path::Path;
use std::sync::Arc;

use crate::cache::QueryCache;
use crate::config::{EmbedderConfig, EngineConfig, StoreConfig};
use crate::embedder::{Embedder, HttpEmbedder};
use crate::error::Result;
use crate::index::{self, IndexOptions, IndexReport};
use crate::languages::Registry;
use crate::search::{self, AnalysisReport, SearchOptions, SearchResult};
use crate::stats::{self, IndexStats};
use crate::store::{IndexRecord, Store};

pub struct Engine {
    store: Store,
    embedder: Arc<dyn Embedder>,
    cache: QueryCache<Vec<SearchResult>>,
    registry: Registry,
    cfg: EngineConfig,
}

impl Engine {
    /// Connect to the store and the embedding service with the given
    /// configuration. The embedder's declared dimension becomes the store's.
    pub async fn connect(cfg: EngineConfig, store_cfg: &StoreConfig, embedder_cfg: EmbedderConfig) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(embedder_cfg)?);
        let store = Store::connect(store_cfg, embedder.dimension()).await?;
        Self::assemble(cfg, store, embedder)
    }

    /// Assemble from pre-built parts; the seam tests use to substitute a
    /// deterministic embedder.
    pub fn assemble(cfg: EngineConfig, store: Store, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let registry = Registry::new()?;
        let cache = QueryCache::new(cfg.cache_ttl(), cfg.semantic_cache_threshold);
        Ok(Self {
            store,
            embedder,
            cache,
            registry,
            cfg,
        })
    }

    /// Index (or re-index) a source tree. Creation is implicit on the first
    /// run. `on_file(rel_path, done, total)` reports per-file progress.
    pub async fn create_or_update_index(
        &self,
        index_name: &str,
        source_path: &Path,
        opts: &IndexOptions,
        on_file: impl FnMut(&str, usize, usize),
    ) -> Result<(IndexReport, IndexStats)> {
        let report = index::run(
            &self.store,
            self.embedder.as_ref(),
            &self.cache,
            &self.registry,
            &self.cfg,
            index_name,
            source_path,
            opts,
            on_file,
        )
        .await?;
        let stats = stats::index_stats(&self.store, &self.cfg, index_name).await?;
        Ok((report, stats))
    }

    /// Destroy an index: both tables dropped together, cache entries gone.
    pub async fn drop_index(&self, index_name: &str) -> Result<()> {
        self.cache.invalidate(index_name);
        self.store.drop_index(index_name).await
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexRecord>> {
        self.store.list_indexes().await
    }

    pub async fn search(&self, index_name: &str, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        search::search(
            &self.store,
            self.embedder.as_ref(),
            &self.cache,
            &self.registry,
            &self.cfg,
            index_name,
            query,
            opts,
        )
        .await
    }

    /// Search with per-stage timings and intermediate counts; never touches
    /// the cache.
    pub async fn analyze(&self, index_name: &str, query: &str, opts: &SearchOptions) -> Result<AnalysisReport> {
        search::analyze(
            &self.store,
            self.embedder.as_ref(),
            &self.cache,
            &self.registry,
            &self.cfg,
            index_name,
            query,
            opts,
        )
        .await
    }

    pub async fn stats(&self, index_name: Option<&str>) -> Result<Vec<IndexStats>> {
        match index_name {
            Some(name) => Ok(vec![stats::index_stats(&self.store, &self.cfg, name).await?]),
            None => stats::all_stats(&self.store, &self.cfg).await,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }
}
