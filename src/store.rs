//! Postgres store adapter: schema migration, per-index tables, and the SQL
//! behind both search arms.
//!
//! Each index owns two tables, `cs_{name}_chunks` and
//! `cs_{name}_parse_results`; a global `cocosearch_indexes` registry maps
//! index names to source paths. Chunk text is never stored: rows carry the
//! byte range and the file is re-read at presentation time.
//!
//! The lexical column is a generated tsvector over the preprocessed token
//! string using the stemming-free 'simple' configuration; the semantic
//! column is a pgvector `vector(D)` under an HNSW cosine index.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use crate::config::StoreConfig;
use crate::error::{Error, Result};

// Keeps derived identifiers (table + index names) under Postgres's 63-byte
// identifier limit.
pub const MAX_INDEX_NAME_LEN: usize = 32;

/// What a (possibly legacy) index's tables actually support. Computed from
/// the live schema on first use, cached, and invalidated whenever
/// `ensure_schema` runs. Call sites branch on this instead of catching
/// missing-column errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub has_content_tsv: bool,
    pub has_symbol_columns: bool,
    pub has_parse_results: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexRecord {
    pub name: String,
    pub source_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One chunk row ready for insertion.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub filename: String,
    pub start_byte: i64,
    pub end_byte: i64,
    pub embedding: Vec<f32>,
    pub content_tsv_input: String,
    pub block_type: String,
    pub hierarchy: String,
    pub language_id: String,
    pub symbol_type: String,
    pub symbol_name: String,
    pub symbol_signature: String,
}

/// One row coming back from either search arm.
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub filename: String,
    pub start_byte: i64,
    pub end_byte: i64,
    pub score: f64,
    pub block_type: String,
    pub hierarchy: String,
    pub language_id: String,
    pub symbol_type: String,
    pub symbol_name: String,
    pub symbol_signature: String,
}

/// Conjunctive filters applied inside the WHERE clause of both arms.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Canonical language ids (aliases already resolved).
    pub languages: Vec<String>,
    pub symbol_types: Vec<String>,
    /// Pre-compiled LIKE pattern (glob already converted and escaped).
    pub symbol_name_like: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty() && self.symbol_types.is_empty() && self.symbol_name_like.is_none()
    }
}

/// Per-file parse outcome written by the tracker at the end of a run. The
/// row doubles as the incremental-indexing ledger via `content_hash`.
#[derive(Debug, Clone)]
pub struct ParseResultRow {
    pub file_path: String,
    pub language_id: String,
    pub status: String,
    pub error_count: i32,
    pub error_message: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ParseHealthSummary {
    pub ok: i64,
    pub partial: i64,
    pub error: i64,
    pub no_grammar: i64,
}

pub struct Store {
    pool: PgPool,
    dimension: usize,
    caps: Mutex<HashMap<String, Capabilities>>,
}

/// Index names become SQL identifiers, so they are validated instead of
/// quoted: lowercase alphanumerics and underscores, starting with a letter.
pub fn validate_index_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= MAX_INDEX_NAME_LEN
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidIndexName(name.to_string()))
    }
}

fn chunk_table(index: &str) -> String {
    format!("cs_{index}_chunks")
}

fn parse_table(index: &str) -> String {
    format!("cs_{index}_parse_results")
}

impl Store {
    pub async fn connect(cfg: &StoreConfig, dimension: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(cfg.connect_timeout_secs))
            .connect(&cfg.url)
            .await?;

        // Best-effort: the extension is usually installed by the DBA; only
        // try to create it so fresh local databases work out of the box.
        if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector").execute(&pool).await {
            tracing::debug!(error = %e, "could not create pgvector extension (may already exist)");
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cocosearch_indexes (
                name TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            dimension,
            caps: Mutex::new(HashMap::new()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    // ── Index registry ───────────────────────────────────────────────────

    pub async fn get_index(&self, name: &str) -> Result<IndexRecord> {
        validate_index_name(name)?;
        let row = sqlx::query(
            "SELECT name, source_path, created_at, updated_at FROM cocosearch_indexes WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::UnknownIndex(name.to_string()))?;

        Ok(index_record(&row))
    }

    /// Register an index (creation is implicit on first indexing run).
    pub async fn upsert_index(&self, name: &str, source_path: &str) -> Result<()> {
        validate_index_name(name)?;
        sqlx::query(
            "INSERT INTO cocosearch_indexes (name, source_path) VALUES ($1, $2)
             ON CONFLICT (name) DO UPDATE SET source_path = EXCLUDED.source_path",
        )
        .bind(name)
        .bind(source_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump `updated_at`, the final stage of an indexing run.
    pub async fn touch_index(&self, name: &str) -> Result<()> {
        sqlx::query("UPDATE cocosearch_indexes SET updated_at = now() WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query(
            "SELECT name, source_path, created_at, updated_at FROM cocosearch_indexes ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(index_record).collect())
    }

    // ── Schema ───────────────────────────────────────────────────────────

    /// Idempotent per-index schema setup. Creates both tables and their
    /// indexes; on legacy tables it only ever *adds* columns. Invalidates
    /// the cached capabilities for the index.
    pub async fn ensure_schema(&self, index: &str) -> Result<()> {
        validate_index_name(index)?;
        let chunks = chunk_table(index);
        let parses = parse_table(index);
        let dim = self.dimension;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {chunks} (
                filename TEXT NOT NULL,
                start_byte BIGINT NOT NULL,
                end_byte BIGINT NOT NULL,
                embedding vector({dim}) NOT NULL,
                content_tsv_input TEXT NOT NULL DEFAULT '',
                content_tsv tsvector GENERATED ALWAYS AS (to_tsvector('simple', content_tsv_input)) STORED,
                block_type TEXT NOT NULL DEFAULT '',
                hierarchy TEXT NOT NULL DEFAULT '',
                language_id TEXT NOT NULL DEFAULT '',
                symbol_type TEXT NOT NULL DEFAULT '',
                symbol_name TEXT NOT NULL DEFAULT '',
                symbol_signature TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (filename, start_byte, end_byte)
            )"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| schema_error(index, e))?;

        // Additive migration for tables created before these columns
        // existed. Dropping or retyping is never attempted.
        for ddl in [
            format!("ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS content_tsv_input TEXT NOT NULL DEFAULT ''"),
            format!(
                "ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS content_tsv tsvector GENERATED ALWAYS AS (to_tsvector('simple', content_tsv_input)) STORED"
            ),
            format!("ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS block_type TEXT NOT NULL DEFAULT ''"),
            format!("ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS hierarchy TEXT NOT NULL DEFAULT ''"),
            format!("ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS language_id TEXT NOT NULL DEFAULT ''"),
            format!("ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS symbol_type TEXT NOT NULL DEFAULT ''"),
            format!("ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS symbol_name TEXT NOT NULL DEFAULT ''"),
            format!("ALTER TABLE {chunks} ADD COLUMN IF NOT EXISTS symbol_signature TEXT NOT NULL DEFAULT ''"),
        ] {
            sqlx::query(&ddl).execute(&self.pool).await.map_err(|e| schema_error(index, e))?;
        }

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {chunks}_embedding_idx ON {chunks} USING hnsw (embedding vector_cosine_ops)"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| schema_error(index, e))?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {chunks}_tsv_idx ON {chunks} USING gin (content_tsv)"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| schema_error(index, e))?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {parses} (
                file_path TEXT PRIMARY KEY,
                language_id TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                error_count INT NOT NULL DEFAULT 0,
                error_message TEXT NOT NULL DEFAULT '',
                content_hash TEXT NOT NULL DEFAULT '',
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| schema_error(index, e))?;

        self.caps.lock().unwrap_or_else(|e| e.into_inner()).remove(index);
        Ok(())
    }

    /// Live-schema capabilities for an index, computed once and cached.
    pub async fn capabilities(&self, index: &str) -> Result<Capabilities> {
        validate_index_name(index)?;
        if let Some(caps) = self.caps.lock().unwrap_or_else(|e| e.into_inner()).get(index) {
            return Ok(*caps);
        }

        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name FROM information_schema.columns WHERE table_name = $1",
        )
        .bind(chunk_table(index))
        .fetch_all(&self.pool)
        .await?;

        if columns.is_empty() {
            return Err(Error::UnknownIndex(index.to_string()));
        }

        let parse_exists: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(parse_table(index))
            .fetch_one(&self.pool)
            .await?;

        let caps = Capabilities {
            has_content_tsv: columns.iter().any(|c| c == "content_tsv"),
            has_symbol_columns: columns.iter().any(|c| c == "symbol_type"),
            has_parse_results: parse_exists.is_some(),
        };

        self.caps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(index.to_string(), caps);
        Ok(caps)
    }

    // ── Writes ───────────────────────────────────────────────────────────

    /// Replace every chunk of one file in a single transaction. Old ranges
    /// from a previous chunking of the file are cleared first so the table
    /// never mixes two generations of the same file.
    pub async fn replace_file_chunks(&self, index: &str, filename: &str, records: &[ChunkRecord]) -> Result<()> {
        for r in records {
            if r.embedding.len() != self.dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.dimension,
                    got: r.embedding.len(),
                });
            }
        }

        let table = chunk_table(index);
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DELETE FROM {table} WHERE filename = $1"))
            .bind(filename)
            .execute(&mut *tx)
            .await?;

        let insert = format!(
            "INSERT INTO {table}
                (filename, start_byte, end_byte, embedding, content_tsv_input,
                 block_type, hierarchy, language_id, symbol_type, symbol_name, symbol_signature)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (filename, start_byte, end_byte) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                content_tsv_input = EXCLUDED.content_tsv_input,
                block_type = EXCLUDED.block_type,
                hierarchy = EXCLUDED.hierarchy,
                language_id = EXCLUDED.language_id,
                symbol_type = EXCLUDED.symbol_type,
                symbol_name = EXCLUDED.symbol_name,
                symbol_signature = EXCLUDED.symbol_signature"
        );

        for r in records {
            sqlx::query(&insert)
                .bind(&r.filename)
                .bind(r.start_byte)
                .bind(r.end_byte)
                .bind(Vector::from(r.embedding.clone()))
                .bind(&r.content_tsv_input)
                .bind(&r.block_type)
                .bind(&r.hierarchy)
                .bind(&r.language_id)
                .bind(&r.symbol_type)
                .bind(&r.symbol_name)
                .bind(&r.symbol_signature)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove files that vanished from the source tree, chunks and parse
    /// rows both.
    pub async fn delete_files(&self, index: &str, filenames: &[String]) -> Result<()> {
        if filenames.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DELETE FROM {} WHERE filename = ANY($1)", chunk_table(index)))
            .bind(filenames)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM {} WHERE file_path = ANY($1)", parse_table(index)))
            .bind(filenames)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn write_parse_results(&self, index: &str, rows: &[ParseResultRow]) -> Result<()> {
        let table = parse_table(index);
        let sql = format!(
            "INSERT INTO {table} (file_path, language_id, status, error_count, error_message, content_hash, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())
             ON CONFLICT (file_path) DO UPDATE SET
                language_id = EXCLUDED.language_id,
                status = EXCLUDED.status,
                error_count = EXCLUDED.error_count,
                error_message = EXCLUDED.error_message,
                content_hash = EXCLUDED.content_hash,
                recorded_at = now()"
        );

        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(&sql)
                .bind(&r.file_path)
                .bind(&r.language_id)
                .bind(&r.status)
                .bind(r.error_count)
                .bind(&r.error_message)
                .bind(&r.content_hash)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Content hashes from the last run, keyed by file path: the
    /// incremental-indexing ledger.
    pub async fn stored_hashes(&self, index: &str) -> Result<HashMap<String, String>> {
        let caps = match self.capabilities(index).await {
            Ok(c) => c,
            Err(Error::UnknownIndex(_)) => return Ok(HashMap::new()),
            Err(e) => return Err(e),
        };
        if !caps.has_parse_results {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(&format!("SELECT file_path, content_hash FROM {}", parse_table(index)))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }

    // ── Search arms ──────────────────────────────────────────────────────

    /// Semantic arm: cosine ANN over the embedding column. Score is
    /// `1 − cosine_distance`, filters apply before the limit.
    pub async fn vector_search(
        &self,
        index: &str,
        query_vec: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchRow>> {
        validate_index_name(index)?;
        let table = chunk_table(index);

        let (where_clause, binds) = filter_clause(filters, 2);
        let sql = format!(
            "SELECT filename, start_byte, end_byte,
                    (1 - (embedding <=> $1))::float8 AS score,
                    block_type, hierarchy, language_id, symbol_type, symbol_name, symbol_signature
             FROM {table}
             {where_clause}
             ORDER BY embedding <=> $1
             LIMIT {limit}"
        );

        let mut q = sqlx::query(&sql).bind(Vector::from(query_vec.to_vec()));
        q = bind_filters(q, binds);
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(search_row).collect())
    }

    /// Lexical arm: tsquery over the GIN-indexed tsvector. Returns empty
    /// (silent degrade) when the index predates the lexical column.
    pub async fn keyword_search(
        &self,
        index: &str,
        normalized_query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchRow>> {
        validate_index_name(index)?;
        if !self.capabilities(index).await?.has_content_tsv {
            return Ok(Vec::new());
        }
        if normalized_query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let table = chunk_table(index);
        let (where_clause, binds) = filter_clause(filters, 2);
        let and_filters = if where_clause.is_empty() {
            String::new()
        } else {
            // filter_clause renders "WHERE …"; splice it as additional ANDs.
            format!("AND {}", &where_clause["WHERE ".len()..])
        };

        let sql = format!(
            "SELECT filename, start_byte, end_byte,
                    ts_rank(content_tsv, q)::float8 AS score,
                    block_type, hierarchy, language_id, symbol_type, symbol_name, symbol_signature
             FROM {table}, plainto_tsquery('simple', $1) AS q
             WHERE content_tsv @@ q {and_filters}
             ORDER BY score DESC
             LIMIT {limit}"
        );

        let mut q = sqlx::query(&sql).bind(normalized_query);
        q = bind_filters(q, binds);
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(search_row).collect())
    }

    // ── Stats ────────────────────────────────────────────────────────────

    pub async fn row_counts(&self, index: &str) -> Result<(i64, i64)> {
        validate_index_name(index)?;
        let row = sqlx::query(&format!(
            "SELECT COUNT(DISTINCT filename), COUNT(*) FROM {}",
            chunk_table(index)
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok((row.get::<i64, _>(0), row.get::<i64, _>(1)))
    }

    pub async fn language_breakdown(&self, index: &str) -> Result<Vec<(String, i64)>> {
        validate_index_name(index)?;
        let rows = sqlx::query(&format!(
            "SELECT language_id, COUNT(*) FROM {} GROUP BY language_id ORDER BY COUNT(*) DESC",
            chunk_table(index)
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.get(0), r.get(1))).collect())
    }

    pub async fn symbol_breakdown(&self, index: &str) -> Result<Vec<(String, i64)>> {
        validate_index_name(index)?;
        if !self.capabilities(index).await?.has_symbol_columns {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT symbol_type, COUNT(*) FROM {} WHERE symbol_type <> '' GROUP BY symbol_type",
            chunk_table(index)
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.get(0), r.get(1))).collect())
    }

    pub async fn parse_health_summary(&self, index: &str) -> Result<ParseHealthSummary> {
        if !self.capabilities(index).await?.has_parse_results {
            return Ok(ParseHealthSummary::default());
        }
        let rows = sqlx::query(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            parse_table(index)
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut summary = ParseHealthSummary::default();
        for r in rows {
            let status: String = r.get(0);
            let count: i64 = r.get(1);
            match status.as_str() {
                "ok" => summary.ok = count,
                "partial" => summary.partial = count,
                "error" => summary.error = count,
                "no_grammar" => summary.no_grammar = count,
                _ => {}
            }
        }
        Ok(summary)
    }

    pub async fn list_files(&self, index: &str) -> Result<Vec<String>> {
        validate_index_name(index)?;
        let files = sqlx::query_scalar(&format!(
            "SELECT DISTINCT filename FROM {} ORDER BY filename",
            chunk_table(index)
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(files)
    }

    // ── Teardown ─────────────────────────────────────────────────────────

    /// Drop both tables and the registry row. Atomic: one transaction.
    pub async fn drop_index(&self, index: &str) -> Result<()> {
        validate_index_name(index)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", chunk_table(index)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", parse_table(index)))
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM cocosearch_indexes WHERE name = $1")
            .bind(index)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.caps.lock().unwrap_or_else(|e| e.into_inner()).remove(index);

        if deleted.rows_affected() == 0 {
            return Err(Error::UnknownIndex(index.to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SQL assembly helpers
// ---------------------------------------------------------------------------

enum FilterBind {
    TextList(Vec<String>),
    Text(String),
}

/// Build the WHERE clause for the conjunctive filters, numbering
/// placeholders from `first_placeholder`.
fn filter_clause(filters: &SearchFilters, first_placeholder: usize) -> (String, Vec<FilterBind>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut binds: Vec<FilterBind> = Vec::new();
    let mut n = first_placeholder;

    if !filters.languages.is_empty() {
        conditions.push(format!("language_id = ANY(${n})"));
        binds.push(FilterBind::TextList(filters.languages.clone()));
        n += 1;
    }
    if !filters.symbol_types.is_empty() {
        conditions.push(format!("symbol_type = ANY(${n})"));
        binds.push(FilterBind::TextList(filters.symbol_types.clone()));
        n += 1;
    }
    if let Some(pattern) = &filters.symbol_name_like {
        conditions.push(format!("symbol_name ILIKE ${n} ESCAPE '\\'"));
        binds.push(FilterBind::Text(pattern.clone()));
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!("WHERE {}", conditions.join(" AND ")), binds)
    }
}

fn bind_filters<'q>(
    mut q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    binds: Vec<FilterBind>,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for b in binds {
        q = match b {
            FilterBind::TextList(list) => q.bind(list),
            FilterBind::Text(s) => q.bind(s),
        };
    }
    q
}

fn index_record(row: &sqlx::postgres::PgRow) -> IndexRecord {
    IndexRecord {
        name: row.get("name"),
        source_path: row.get("source_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn search_row(row: &sqlx::postgres::PgRow) -> SearchRow {
    SearchRow {
        filename: row.get(0),
        start_byte: row.get(1),
        end_byte: row.get(2),
        score: row.get(3),
        block_type: row.get(4),
        hierarchy: row.get(5),
        language_id: row.get(6),
        symbol_type: row.get(7),
        symbol_name: row.get(8),
        symbol_signature: row.get(9),
    }
}

fn schema_error(index: &str, e: sqlx::Error) -> Error {
    Error::SchemaMismatch {
        index: index.to_string(),
        detail: e.to_string(),
    }
}
