//! The indexing pipeline: enumerate → invalidate → classify → chunk →
//! extract → preprocess → embed → upsert → track → timestamp.
//!
//! Change detection is by xxh3 content hash recorded on each file's
//! parse-results row: immune to git-checkout timestamp churn and
//! save-without-change, at the cost of re-reading candidate files. CPU-side
//! preparation (chunking, extraction, tokenization, parse health) runs on
//! rayon across files; embedding and storage proceed file-by-file so each
//! file's chunks land in one transaction and a cancelled run leaves only
//! whole files behind.

use std::collections::HashSet;
use std::path::Path;

use rayon::prelude::*;

use crate::cache::QueryCache;
use crate::chunker::{Chunker, SeparatorSet};
use crate::config::EngineConfig;
use crate::embedder::Embedder;
use crate::error::Result;
use crate::languages::{ChunkMetadata, Registry};
use crate::scanner::{scan, FileEntry, ScanOptions};
use crate::store::{ChunkRecord, ParseResultRow, Store};
use crate::symbols::{self, ParseStatus};
use crate::tokenizer;

/// How many leading bytes feed grammar-handler content probes.
const PROBE_BYTES: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Respect `.gitignore` during enumeration (default true).
    pub no_gitignore: bool,
    /// Re-index files even when their content hash is unchanged.
    pub force: bool,
}

#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub chunks_written: usize,
}

/// One file fully prepared for embedding and storage.
struct PreparedFile {
    rel_path: String,
    language_id: String,
    content_hash: String,
    parse_status: ParseStatus,
    parse_errors: u32,
    chunks: Vec<PreparedChunk>,
}

struct PreparedChunk {
    start_byte: usize,
    end_byte: usize,
    text: String,
    tsv_input: String,
    metadata: ChunkMetadata,
    symbol: Option<symbols::Symbol>,
}

#[inline]
fn xxh3_hex(bytes: &[u8]) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(bytes))
}

/// Run a full indexing pass. `on_file(rel_path, done, total)` fires after
/// each file is committed.
#[allow(clippy::too_many_arguments)]
pub async fn run<P: Clone + Send>(
    store: &Store,
    embedder: &dyn Embedder,
    cache: &QueryCache<P>,
    registry: &Registry,
    cfg: &EngineConfig,
    index_name: &str,
    source_path: &Path,
    opts: &IndexOptions,
    mut on_file: impl FnMut(&str, usize, usize),
) -> Result<IndexReport> {
    tracing::debug!(index = index_name, "indexing run starting");

    // ── Enumerate ────────────────────────────────────────────────────────
    let scan_opts = ScanOptions {
        root: source_path.to_path_buf(),
        include: opts.include.clone(),
        exclude: opts.exclude.clone(),
        respect_gitignore: !opts.no_gitignore,
        max_file_bytes: cfg.max_file_bytes,
    };
    let entries = scan(&scan_opts)?;

    // ── Invalidate before any write ──────────────────────────────────────
    // A reader observing new chunks must never see a stale cached answer
    // for the same index.
    cache.invalidate(index_name);

    store.upsert_index(index_name, &source_path.to_string_lossy()).await?;
    store.ensure_schema(index_name).await?;

    let stored = store.stored_hashes(index_name).await?;

    // ── Classify / chunk / extract / preprocess (CPU, parallel) ─────────
    let chunker = Chunker::new(cfg.chunk_size, cfg.chunk_overlap);
    let force = opts.force;
    let prepared: Vec<PreparedFile> = entries
        .par_iter()
        .filter_map(|entry| prepare_file(registry, &chunker, entry, &stored, force))
        .collect();

    let mut report = IndexReport {
        files_seen: entries.len(),
        ..Default::default()
    };
    report.files_unchanged = stored_unchanged(&entries, &prepared, &stored);
    report.files_skipped = entries.len() - prepared.len() - report.files_unchanged;

    // ── Embed + upsert, one file per transaction ─────────────────────────
    let total = prepared.len();
    let mut parse_rows: Vec<ParseResultRow> = Vec::with_capacity(total);

    for (done, file) in prepared.into_iter().enumerate() {
        let mut records: Vec<ChunkRecord> = Vec::with_capacity(file.chunks.len());

        for batch in file.chunks.chunks(cfg.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            for (chunk, embedding) in batch.iter().zip(vectors) {
                let symbol = chunk.symbol.as_ref();
                records.push(ChunkRecord {
                    filename: file.rel_path.clone(),
                    start_byte: chunk.start_byte as i64,
                    end_byte: chunk.end_byte as i64,
                    embedding,
                    content_tsv_input: chunk.tsv_input.clone(),
                    block_type: chunk.metadata.block_type.clone(),
                    hierarchy: chunk.metadata.hierarchy.clone(),
                    language_id: chunk.metadata.language_id.clone(),
                    symbol_type: symbol.map(|s| s.symbol_type.as_str().to_string()).unwrap_or_default(),
                    symbol_name: symbol.map(|s| s.symbol_name.clone()).unwrap_or_default(),
                    symbol_signature: symbol.map(|s| s.symbol_signature.clone()).unwrap_or_default(),
                });
            }
        }

        report.chunks_written += records.len();
        store.replace_file_chunks(index_name, &file.rel_path, &records).await?;
        report.files_indexed += 1;

        parse_rows.push(ParseResultRow {
            file_path: file.rel_path.clone(),
            language_id: file.language_id.clone(),
            status: file.parse_status.as_str().to_string(),
            error_count: file.parse_errors as i32,
            error_message: match file.parse_status {
                ParseStatus::Partial | ParseStatus::Error => {
                    format!("{} syntax error(s) while parsing", file.parse_errors.max(1))
                }
                _ => String::new(),
            },
            content_hash: file.content_hash.clone(),
        });

        on_file(&file.rel_path, done + 1, total);
    }

    // ── Delete files that vanished from the source tree ──────────────────
    // Union of chunk-table filenames and parse-row paths, so chunkless
    // files (empty ones) are cleaned up too.
    let on_disk: HashSet<&str> = entries.iter().map(|e| e.rel_path.as_str()).collect();
    let mut known: HashSet<String> = store.list_files(index_name).await?.into_iter().collect();
    known.extend(stored.keys().cloned());
    let vanished: Vec<String> = known.into_iter().filter(|f| !on_disk.contains(f.as_str())).collect();
    report.files_deleted = vanished.len();
    store.delete_files(index_name, &vanished).await?;

    // ── Track + timestamp ────────────────────────────────────────────────
    store.write_parse_results(index_name, &parse_rows).await?;
    store.touch_index(index_name).await?;

    tracing::info!(
        indexed = report.files_indexed,
        unchanged = report.files_unchanged,
        deleted = report.files_deleted,
        chunks = report.chunks_written,
        "indexing run complete"
    );
    Ok(report)
}

fn stored_unchanged(entries: &[FileEntry], prepared: &[PreparedFile], stored: &std::collections::HashMap<String, String>) -> usize {
    let processed: HashSet<&str> = prepared.iter().map(|p| p.rel_path.as_str()).collect();
    entries
        .iter()
        .filter(|e| !processed.contains(e.rel_path.as_str()) && stored.contains_key(&e.rel_path))
        .count()
}

/// Read, hash, classify, chunk and extract one file. Returns `None` for
/// unchanged, binary or unreadable files; per-file errors never abort the
/// run.
fn prepare_file(
    registry: &Registry,
    chunker: &Chunker,
    entry: &FileEntry,
    stored: &std::collections::HashMap<String, String>,
    force: bool,
) -> Option<PreparedFile> {
    let bytes = match std::fs::read(&entry.abs_path) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %entry.abs_path.display(), error = %e, "skipping unreadable file");
            return None;
        }
    };
    if bytes.contains(&0u8) {
        return None; // binary
    }

    let content_hash = xxh3_hex(&bytes);
    if !force && stored.get(&entry.rel_path).is_some_and(|h| *h == content_hash) {
        return None; // unchanged since last run
    }

    let probe = &bytes[..bytes.len().min(PROBE_BYTES)];
    let language_id = registry
        .language_for(Path::new(&entry.rel_path), probe)
        .unwrap_or("")
        .to_string();

    let plain = SeparatorSet::plain_text();
    let handler = registry.handler_for(&language_id);
    let separators = handler.map(|h| &h.separators).unwrap_or(&plain);

    let chunks = chunker
        .chunk(&bytes, separators)
        .into_iter()
        .map(|c| {
            let chunk_bytes = &bytes[c.start_byte..c.end_byte];
            let text = c.text_view(&bytes).into_owned();

            let metadata = handler.map(|h| h.extract_metadata(chunk_bytes)).unwrap_or_default();
            let symbol = if handler.is_some_and(|h| h.has_grammar) {
                symbols::extract(chunk_bytes, &language_id)
            } else {
                None
            };
            let tsv_input = tokenizer::tokenize(&text, &entry.rel_path);

            PreparedChunk {
                start_byte: c.start_byte,
                end_byte: c.end_byte,
                text,
                tsv_input,
                metadata,
                symbol,
            }
        })
        .collect();

    let (parse_status, parse_errors) = symbols::parse_health(&language_id, &bytes);

    Some(PreparedFile {
        rel_path: entry.rel_path.clone(),
        language_id,
        content_hash,
        parse_status,
        parse_errors,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn entry_for(dir: &tempfile::TempDir, rel: &str, content: &[u8]) -> FileEntry {
        let abs = dir.path().join(rel);
        std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
        let mut f = std::fs::File::create(&abs).unwrap();
        f.write_all(content).unwrap();
        FileEntry {
            abs_path: abs,
            rel_path: rel.to_string(),
            bytes: content.len() as u64,
        }
    }

    fn registry() -> Registry {
        Registry::new().unwrap()
    }

    #[test]
    fn prepares_python_file_with_symbols_and_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry_for(&dir, "svc/users.py", b"def getUserById(id):\n    return db.get(id)\n");

        let prepared = prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &HashMap::new(), false).unwrap();
        assert_eq!(prepared.language_id, "python");
        assert_eq!(prepared.parse_status, ParseStatus::Ok);
        assert_eq!(prepared.chunks.len(), 1);

        let chunk = &prepared.chunks[0];
        let sym = chunk.symbol.as_ref().unwrap();
        assert_eq!(sym.symbol_name, "getUserById");
        assert!(chunk.tsv_input.split(' ').any(|t| t == "getUserById"));
        assert!(chunk.tsv_input.split(' ').any(|t| t == "User"));
        // Path tokens ride along.
        assert!(chunk.tsv_input.split(' ').any(|t| t == "users"));
    }

    #[test]
    fn unchanged_hash_skips_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = b"def f():\n    pass\n";
        let entry = entry_for(&dir, "a.py", content);

        let mut stored = HashMap::new();
        stored.insert("a.py".to_string(), xxh3_hex(content));

        assert!(prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &stored, false).is_none());
        // force overrides the skip.
        assert!(prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &stored, true).is_some());
    }

    #[test]
    fn changed_hash_reprocesses_file() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry_for(&dir, "a.py", b"def g():\n    pass\n");

        let mut stored = HashMap::new();
        stored.insert("a.py".to_string(), "0123456789abcdef".to_string());
        assert!(prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &stored, false).is_some());
    }

    #[test]
    fn binary_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry_for(&dir, "blob.bin", &[1, 2, 0, 4]);
        assert!(prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &HashMap::new(), false).is_none());
    }

    #[test]
    fn empty_file_yields_zero_chunks_with_parse_row_data() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry_for(&dir, "empty.py", b"");
        let prepared = prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &HashMap::new(), false).unwrap();
        assert!(prepared.chunks.is_empty());
        assert_eq!(prepared.parse_status, ParseStatus::Ok);
    }

    #[test]
    fn plain_text_fallback_for_unknown_language() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry_for(&dir, "notes.txt", b"just some prose\n\nwith paragraphs\n");
        let prepared = prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &HashMap::new(), false).unwrap();
        assert_eq!(prepared.language_id, "");
        assert_eq!(prepared.parse_status, ParseStatus::NoGrammar);
        assert_eq!(prepared.chunks.len(), 1);
        assert!(prepared.chunks[0].symbol.is_none());
    }

    #[test]
    fn hcl_chunks_carry_hierarchy_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let entry = entry_for(
            &dir,
            "main.tf",
            b"resource \"aws_s3_bucket\" \"data\" {\n  bucket = \"x\"\n}\n",
        );
        let prepared = prepare_file(&registry(), &Chunker::new(1000, 300), &entry, &HashMap::new(), false).unwrap();
        assert_eq!(prepared.language_id, "hcl");
        assert_eq!(prepared.chunks[0].metadata.hierarchy, "resource.aws_s3_bucket.data");
    }
}
