//! The search pipeline: cache probe → mode decision → embed → filter
//! resolution → parallel arms → RRF fusion → definition boost → filter →
//! context expansion → cache store.
//!
//! Both arms over-fetch (`min(2·limit, 100)`) so fusion has coverage, and
//! the definition boost runs *after* fusion so the rank-based merge is
//! never perturbed by score scaling. Every stage records wall-clock time;
//! the `analyze` variant returns those timings and intermediate counts and
//! touches no cache.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::cache::{Fingerprint, QueryCache};
use crate::config::EngineConfig;
use crate::context::ContextExpander;
use crate::embedder::Embedder;
use crate::error::{Error, Result};
use crate::languages::{starts_with_definition, Registry};
use crate::store::{SearchFilters, SearchRow, Store};
use crate::symbols::SymbolType;
use crate::tokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Semantic,
    Keyword,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HybridMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    /// Post-boost score floor.
    pub min_score: f64,
    pub language_filter: Vec<String>,
    pub symbol_type_filter: Vec<String>,
    /// Case-insensitive glob over symbol names.
    pub symbol_name_filter: Option<String>,
    pub use_hybrid: HybridMode,
    pub smart_context: bool,
    pub context_before: Option<usize>,
    pub context_after: Option<usize>,
    pub bypass_cache: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.0,
            language_filter: Vec::new(),
            symbol_type_filter: Vec::new(),
            symbol_name_filter: None,
            use_hybrid: HybridMode::Auto,
            smart_context: true,
            context_before: None,
            context_after: None,
            bypass_cache: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub file_path: String,
    pub start_byte: i64,
    pub end_byte: i64,
    pub line_start: u32,
    pub line_end: u32,
    pub score: f64,
    pub block_type: String,
    pub hierarchy: String,
    pub language_id: String,
    pub symbol_type: String,
    pub symbol_name: String,
    pub symbol_signature: String,
    pub match_type: MatchType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f64>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_after: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub millis: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub hybrid: bool,
    pub vector_candidates: usize,
    pub keyword_candidates: usize,
    pub fused: usize,
    pub boosted: usize,
    pub stages: Vec<StageTiming>,
    pub results: Vec<SearchResult>,
}

struct Timings {
    stages: Vec<StageTiming>,
}

impl Timings {
    fn new() -> Self {
        Self { stages: Vec::new() }
    }

    fn record(&mut self, stage: &'static str, started: Instant, count: Option<usize>) {
        self.stages.push(StageTiming {
            stage,
            millis: started.elapsed().as_secs_f64() * 1_000.0,
            count,
        });
    }
}

/// Run a search and return the ranked results.
#[allow(clippy::too_many_arguments)]
pub async fn search(
    store: &Store,
    embedder: &dyn Embedder,
    cache: &QueryCache<Vec<SearchResult>>,
    registry: &Registry,
    cfg: &EngineConfig,
    index_name: &str,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<SearchResult>> {
    let report = execute(store, embedder, cache, registry, cfg, index_name, query, opts, false).await?;
    Ok(report.results)
}

/// The analyze variant: same pipeline, with per-stage timings and
/// intermediate counts, bypassing the cache in both directions.
#[allow(clippy::too_many_arguments)]
pub async fn analyze(
    store: &Store,
    embedder: &dyn Embedder,
    cache: &QueryCache<Vec<SearchResult>>,
    registry: &Registry,
    cfg: &EngineConfig,
    index_name: &str,
    query: &str,
    opts: &SearchOptions,
) -> Result<AnalysisReport> {
    execute(store, embedder, cache, registry, cfg, index_name, query, opts, true).await
}

#[allow(clippy::too_many_arguments)]
async fn execute(
    store: &Store,
    embedder: &dyn Embedder,
    cache: &QueryCache<Vec<SearchResult>>,
    registry: &Registry,
    cfg: &EngineConfig,
    index_name: &str,
    query: &str,
    opts: &SearchOptions,
    analyze_mode: bool,
) -> Result<AnalysisReport> {
    tracing::debug!(index = index_name, analyze = analyze_mode, "search starting");
    let mut timings = Timings::new();
    let skip_cache = opts.bypass_cache || analyze_mode;

    let record = store.get_index(index_name).await?;
    let source_root = Path::new(&record.source_path).to_path_buf();
    let caps = store.capabilities(index_name).await?;

    // ── Stage: cache probe (L1) ──────────────────────────────────────────
    let fingerprint = Fingerprint {
        index_name: index_name.to_string(),
        query: query.to_string(),
        rest: fingerprint_rest(opts),
    };

    let started = Instant::now();
    if !skip_cache {
        if let Some(results) = cache.probe_exact(&fingerprint) {
            timings.record("cache_probe_l1", started, Some(results.len()));
            tracing::debug!("L1 cache hit");
            return Ok(hit_report(results, timings));
        }
    }
    timings.record("cache_probe_l1", started, None);

    // ── Stage: mode decision ─────────────────────────────────────────────
    let hybrid = match opts.use_hybrid {
        HybridMode::On => true,
        HybridMode::Off => false,
        HybridMode::Auto => caps.has_content_tsv && query_wants_hybrid(query),
    };

    // ── Stage: embed (once; reused by the L2 probe) ──────────────────────
    let started = Instant::now();
    let query_vec = embedder.embed_one(query).await?;
    timings.record("embed_query", started, None);

    let started = Instant::now();
    if !skip_cache {
        if let Some(results) = cache.probe_semantic(&fingerprint, &query_vec) {
            timings.record("cache_probe_l2", started, Some(results.len()));
            tracing::debug!("L2 semantic cache hit");
            return Ok(hit_report(results, timings));
        }
    }
    timings.record("cache_probe_l2", started, None);

    // ── Stage: filter resolution ─────────────────────────────────────────
    let started = Instant::now();
    let filters = resolve_filters(registry, opts, caps.has_symbol_columns, index_name)?;
    timings.record("resolve_filters", started, None);

    // ── Stages: both arms, in parallel ───────────────────────────────────
    let arm_limit = cfg.arm_limit(opts.limit.max(1));
    let started = Instant::now();

    let vector_fut = store.vector_search(index_name, &query_vec, arm_limit, &filters);
    let keyword_fut = async {
        if hybrid {
            let normalized = tokenizer::normalize_query(query);
            store.keyword_search(index_name, &normalized, arm_limit, &filters).await
        } else {
            Ok(Vec::new())
        }
    };
    let (vector_rows, keyword_rows) = futures::try_join!(vector_fut, keyword_fut)?;
    let (vector_count, keyword_count) = (vector_rows.len(), keyword_rows.len());
    timings.record("search_arms", started, Some(vector_count + keyword_count));

    // ── Stage: RRF fusion ────────────────────────────────────────────────
    let started = Instant::now();
    let mut fused = rrf_fuse(vector_rows, keyword_rows, cfg.rrf_k);
    let fused_count = fused.len();
    timings.record("rrf_fusion", started, Some(fused_count));

    // ── Stage: definition boost (post-fusion, then re-sort) ──────────────
    let started = Instant::now();
    let mut expander = ContextExpander::new(cfg.context_line_cap, cfg.context_col_cap);
    let mut boosted = 0usize;
    for f in fused.iter_mut() {
        if SymbolType::parse(&f.row.symbol_type).is_none() {
            continue;
        }
        let path = source_root.join(&f.row.filename);
        let head = expander.head_text(&path, f.row.start_byte as usize, f.row.end_byte as usize);
        if let Some(head) = head {
            if starts_with_definition(&f.row.language_id, &head) {
                f.score *= f64::from(cfg.definition_boost);
                boosted += 1;
            }
        }
    }
    sort_fused(&mut fused);
    timings.record("definition_boost", started, Some(boosted));

    // ── Stage: score floor + limit ───────────────────────────────────────
    let started = Instant::now();
    fused.retain(|f| f.score >= opts.min_score);
    fused.truncate(opts.limit.max(1));
    timings.record("filter_limit", started, Some(fused.len()));

    // ── Stage: context expansion + content read ──────────────────────────
    let started = Instant::now();
    let mut results: Vec<SearchResult> = Vec::with_capacity(fused.len());
    for f in fused {
        if let Some(result) = render_result(&mut expander, &source_root, f, opts) {
            results.push(result);
        }
        // Unreadable source: the result is omitted, never fatal.
    }
    timings.record("context_expansion", started, Some(results.len()));

    // ── Stage: cache store ───────────────────────────────────────────────
    if !skip_cache {
        let started = Instant::now();
        cache.store(&fingerprint, query_vec, results.clone());
        timings.record("cache_store", started, None);
    }

    Ok(AnalysisReport {
        hybrid,
        vector_candidates: vector_count,
        keyword_candidates: keyword_count,
        fused: fused_count,
        boosted,
        stages: timings.stages,
        results,
    })
}

fn hit_report(results: Vec<SearchResult>, timings: Timings) -> AnalysisReport {
    AnalysisReport {
        hybrid: false,
        vector_candidates: 0,
        keyword_candidates: 0,
        fused: 0,
        boosted: 0,
        stages: timings.stages,
        results,
    }
}

// ---------------------------------------------------------------------------
// Mode decision
// ---------------------------------------------------------------------------

/// `auto` hybrid fires when the query carries at least one camelCase,
/// PascalCase, snake_case or kebab-case token.
pub fn query_wants_hybrid(query: &str) -> bool {
    query
        .split(|c: char| c.is_whitespace())
        .filter(|t| !t.is_empty())
        .any(tokenizer::is_identifier_like)
}

// ---------------------------------------------------------------------------
// Filter resolution
// ---------------------------------------------------------------------------

fn resolve_filters(
    registry: &Registry,
    opts: &SearchOptions,
    has_symbol_columns: bool,
    index_name: &str,
) -> Result<SearchFilters> {
    let languages: Vec<String> = opts
        .language_filter
        .iter()
        .map(|l| registry.resolve_alias(l).to_string())
        .collect();

    let wants_symbols = !opts.symbol_type_filter.is_empty() || opts.symbol_name_filter.is_some();
    if wants_symbols && !has_symbol_columns {
        return Err(Error::MissingSymbolColumns(index_name.to_string()));
    }

    let mut symbol_types = Vec::with_capacity(opts.symbol_type_filter.len());
    for t in &opts.symbol_type_filter {
        match SymbolType::parse(t) {
            Some(st) => symbol_types.push(st.as_str().to_string()),
            None => {
                return Err(Error::MalformedQuery(format!(
                    "unknown symbol type '{t}' (expected function, class, method or interface)"
                )))
            }
        }
    }

    let symbol_name_like = match &opts.symbol_name_filter {
        Some(glob) if glob.is_empty() => {
            return Err(Error::MalformedQuery("empty symbol name pattern".to_string()))
        }
        Some(glob) => Some(glob_to_like(glob)),
        None => None,
    };

    Ok(SearchFilters {
        languages,
        symbol_types,
        symbol_name_like,
    })
}

/// Convert a user glob to a LIKE pattern. LIKE's own wildcards in the
/// literal are escaped *before* `*`/`?` are translated, so `get_*` means
/// "literal get_ then anything", not "get, any char, anything".
pub fn glob_to_like(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 4);
    for c in glob.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '*' => out.push('%'),
            '?' => out.push('_'),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// RRF fusion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Fused {
    row: SearchRow,
    score: f64,
    match_type: MatchType,
    vector_score: Option<f64>,
    keyword_score: Option<f64>,
    /// 1-based rank in the keyword list; drives the tie-break.
    keyword_rank: Option<usize>,
}

type ChunkKey = (String, i64, i64);

fn key_of(row: &SearchRow) -> ChunkKey {
    (row.filename.clone(), row.start_byte, row.end_byte)
}

/// Reciprocal Rank Fusion over the two arms. Ranks are 1-based; each list
/// a chunk appears in contributes `1/(k + rank)`. Ties prefer the chunk
/// present in the keyword list.
fn rrf_fuse(vector_rows: Vec<SearchRow>, keyword_rows: Vec<SearchRow>, k: u32) -> Vec<Fused> {
    let k = f64::from(k);
    let mut by_key: HashMap<ChunkKey, Fused> = HashMap::new();

    for (rank, row) in vector_rows.into_iter().enumerate() {
        let contribution = 1.0 / (k + (rank + 1) as f64);
        let vector_score = row.score;
        by_key
            .entry(key_of(&row))
            .and_modify(|f| {
                f.score += contribution;
                f.vector_score = Some(vector_score);
            })
            .or_insert(Fused {
                row,
                score: contribution,
                match_type: MatchType::Semantic,
                vector_score: Some(vector_score),
                keyword_score: None,
                keyword_rank: None,
            });
    }

    for (rank, row) in keyword_rows.into_iter().enumerate() {
        let contribution = 1.0 / (k + (rank + 1) as f64);
        let keyword_score = row.score;
        by_key
            .entry(key_of(&row))
            .and_modify(|f| {
                f.score += contribution;
                f.keyword_score = Some(keyword_score);
                f.keyword_rank = Some(rank + 1);
                f.match_type = MatchType::Both;
            })
            .or_insert(Fused {
                row,
                score: contribution,
                match_type: MatchType::Keyword,
                vector_score: None,
                keyword_score: Some(keyword_score),
                keyword_rank: Some(rank + 1),
            });
    }

    let mut fused: Vec<Fused> = by_key.into_values().collect();
    sort_fused(&mut fused);
    fused
}

fn sort_fused(fused: &mut [Fused]) {
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            // Tie-break: results the keyword arm saw come first, best
            // keyword rank leading.
            .then_with(|| {
                let a_kw = a.keyword_rank.unwrap_or(usize::MAX);
                let b_kw = b.keyword_rank.unwrap_or(usize::MAX);
                a_kw.cmp(&b_kw)
            })
            .then_with(|| a.row.filename.cmp(&b.row.filename))
            .then_with(|| a.row.start_byte.cmp(&b.row.start_byte))
    });
}

// ---------------------------------------------------------------------------
// Result rendering
// ---------------------------------------------------------------------------

fn render_result(
    expander: &mut ContextExpander,
    source_root: &Path,
    f: Fused,
    opts: &SearchOptions,
) -> Option<SearchResult> {
    let path = source_root.join(&f.row.filename);
    let (start, end) = (f.row.start_byte as usize, f.row.end_byte as usize);
    let explicit_context = opts.context_before.is_some() || opts.context_after.is_some();

    let rendered = if opts.smart_context && !explicit_context {
        expander.expand(&path, start, end, &f.row.language_id)?
    } else {
        expander.read_range(&path, start, end)?
    };

    let (context_before, context_after) = if explicit_context {
        expander.context_lines(
            &path,
            start,
            end,
            opts.context_before.unwrap_or(0),
            opts.context_after.unwrap_or(0),
        )
    } else {
        (None, None)
    };

    Some(SearchResult {
        file_path: path.to_string_lossy().replace('\\', "/"),
        start_byte: rendered.start_byte as i64,
        end_byte: rendered.end_byte as i64,
        line_start: rendered.line_start,
        line_end: rendered.line_end,
        score: f.score,
        block_type: f.row.block_type,
        hierarchy: f.row.hierarchy,
        language_id: f.row.language_id,
        symbol_type: f.row.symbol_type,
        symbol_name: f.row.symbol_name,
        symbol_signature: f.row.symbol_signature,
        match_type: f.match_type,
        vector_score: f.vector_score,
        keyword_score: f.keyword_score,
        content: rendered.content,
        context_before,
        context_after,
    })
}

// ---------------------------------------------------------------------------
// Fingerprint canonicalization
// ---------------------------------------------------------------------------

/// Everything except the query text, rendered canonically (sorted sets) so
/// logically equal calls share a fingerprint.
fn fingerprint_rest(opts: &SearchOptions) -> String {
    let mut langs = opts.language_filter.clone();
    langs.sort();
    let mut symtypes = opts.symbol_type_filter.clone();
    symtypes.sort();

    format!(
        "limit={};min={};mode={:?};langs={};symtypes={};symglob={};smart={};before={:?};after={:?}",
        opts.limit,
        opts.min_score,
        opts.use_hybrid,
        langs.join(","),
        symtypes.join(","),
        opts.symbol_name_filter.as_deref().unwrap_or(""),
        opts.smart_context,
        opts.context_before,
        opts.context_after,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(filename: &str, start: i64, score: f64) -> SearchRow {
        SearchRow {
            filename: filename.to_string(),
            start_byte: start,
            end_byte: start + 100,
            score,
            block_type: String::new(),
            hierarchy: String::new(),
            language_id: "python".to_string(),
            symbol_type: String::new(),
            symbol_name: String::new(),
            symbol_signature: String::new(),
        }
    }

    #[test]
    fn rrf_arithmetic_matches_the_law() {
        // A = [a, b, c], B = [b, a] with k = 60.
        let vector = vec![row("a", 0, 0.9), row("b", 0, 0.8), row("c", 0, 0.7)];
        let keyword = vec![row("b", 0, 2.0), row("a", 0, 1.5)];
        let fused = rrf_fuse(vector, keyword, 60);

        let score_of = |name: &str| {
            fused
                .iter()
                .find(|f| f.row.filename == name)
                .map(|f| f.score)
                .unwrap()
        };

        let expected_a = 1.0 / 61.0 + 1.0 / 62.0;
        let expected_b = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((score_of("a") - expected_a).abs() < 1e-12);
        assert!((score_of("b") - expected_b).abs() < 1e-12);
        assert!((score_of("c") - 1.0 / 63.0).abs() < 1e-12);

        // a and b tie exactly; b leads on keyword rank (1 vs 2).
        assert_eq!(fused[0].row.filename, "b");
        assert_eq!(fused[1].row.filename, "a");
        assert_eq!(fused[0].match_type, MatchType::Both);
    }

    #[test]
    fn rrf_tie_break_prefers_keyword_presence() {
        // a and b tie exactly; both are in both lists here, so construct a
        // pure tie instead: a only semantic rank 1, b only keyword rank 1.
        let vector = vec![row("a", 0, 0.9)];
        let keyword = vec![row("b", 0, 1.0)];
        let fused = rrf_fuse(vector, keyword, 60);
        assert_eq!(fused[0].row.filename, "b");
        assert_eq!(fused[0].match_type, MatchType::Keyword);
        assert_eq!(fused[1].row.filename, "a");
    }

    #[test]
    fn rrf_match_type_both_for_shared_chunks() {
        let vector = vec![row("x", 0, 0.9)];
        let keyword = vec![row("x", 0, 1.2)];
        let fused = rrf_fuse(vector, keyword, 60);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].match_type, MatchType::Both);
        assert_eq!(fused[0].vector_score, Some(0.9));
        assert_eq!(fused[0].keyword_score, Some(1.2));
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn glob_to_like_escapes_before_translating() {
        assert_eq!(glob_to_like("get_*"), "get\\_%");
        assert_eq!(glob_to_like("get%foo"), "get\\%foo");
        assert_eq!(glob_to_like("*_handler"), "%\\_handler");
        assert_eq!(glob_to_like("exact"), "exact");
        assert_eq!(glob_to_like("a?c"), "a_c");
    }

    #[test]
    fn auto_hybrid_detection() {
        assert!(query_wants_hybrid("how does getUserById work"));
        assert!(query_wants_hybrid("find parse_config usages"));
        assert!(!query_wants_hybrid("authentication handler logic"));
        assert!(!query_wants_hybrid(""));
    }

    #[test]
    fn boost_reorders_definition_above_usage() {
        // Simulate post-fusion state: usage slightly ahead of definition.
        let mut fused = vec![
            Fused {
                row: row("usage.py", 0, 0.9),
                score: 0.032,
                match_type: MatchType::Semantic,
                vector_score: Some(0.9),
                keyword_score: None,
                keyword_rank: None,
            },
            Fused {
                row: {
                    let mut r = row("service.py", 0, 0.8);
                    r.symbol_type = "class".to_string();
                    r.symbol_name = "UserService".to_string();
                    r
                },
                score: 0.030,
                match_type: MatchType::Semantic,
                vector_score: Some(0.8),
                keyword_score: None,
                keyword_rank: None,
            },
        ];

        // The definition chunk gets the 2.0 multiplier.
        fused[1].score *= 2.0;
        sort_fused(&mut fused);
        assert_eq!(fused[0].row.filename, "service.py");
    }

    #[test]
    fn symbol_filters_require_symbol_columns() {
        let registry = Registry::new().unwrap();
        let opts = SearchOptions {
            symbol_type_filter: vec!["function".to_string()],
            ..Default::default()
        };
        let err = resolve_filters(&registry, &opts, false, "legacy").unwrap_err();
        assert!(matches!(err, Error::MissingSymbolColumns(_)), "{err}");
    }

    #[test]
    fn unknown_symbol_type_is_malformed() {
        let registry = Registry::new().unwrap();
        let opts = SearchOptions {
            symbol_type_filter: vec!["banana".to_string()],
            ..Default::default()
        };
        let err = resolve_filters(&registry, &opts, true, "idx").unwrap_err();
        assert!(matches!(err, Error::MalformedQuery(_)), "{err}");
    }

    #[test]
    fn filter_resolution_maps_aliases() {
        let registry = Registry::new().unwrap();
        let opts = SearchOptions {
            language_filter: vec!["terraform".to_string(), "sh".to_string()],
            symbol_name_filter: Some("get_*".to_string()),
            ..Default::default()
        };
        let filters = resolve_filters(&registry, &opts, true, "idx").unwrap();
        assert_eq!(filters.languages, vec!["hcl".to_string(), "bash".to_string()]);
        assert_eq!(filters.symbol_name_like.as_deref(), Some("get\\_%"));
    }

    #[test]
    fn fingerprint_is_order_insensitive_for_sets() {
        let mut a = SearchOptions::default();
        a.language_filter = vec!["rust".to_string(), "python".to_string()];
        let mut b = SearchOptions::default();
        b.language_filter = vec!["python".to_string(), "rust".to_string()];
        assert_eq!(fingerprint_rest(&a), fingerprint_rest(&b));

        let mut c = SearchOptions::default();
        c.limit = 20;
        assert_ne!(fingerprint_rest(&a), fingerprint_rest(&c));
    }
}
