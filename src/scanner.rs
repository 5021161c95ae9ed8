//! Source-tree enumeration for the indexing pipeline.
//!
//! Walks a source root with `.gitignore` semantics (optional), skips the
//! usual high-noise artifacts (lockfiles, build dirs, images), applies the
//! caller's include/exclude globs, and enforces a size ceiling so a stray
//! minified bundle never reaches the chunker.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub abs_path: PathBuf,
    /// Relative to the scan root, '/'-separated.
    pub rel_path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    /// Include globs; empty means everything.
    pub include: Vec<String>,
    /// Exclude globs, applied after includes.
    pub exclude: Vec<String>,
    pub respect_gitignore: bool,
    pub max_file_bytes: u64,
}

impl ScanOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            respect_gitignore: true,
            max_file_bytes: 512 * 1024,
        }
    }
}

/// Junk the walker always skips, gitignore or not: lockfiles, sourcemaps,
/// images, build output. Kept as ignore-overrides so the walker prunes
/// whole directories instead of stat-ing their contents.
fn default_overrides(root: &Path) -> Result<Override> {
    let mut ob = OverrideBuilder::new(root);

    let add = |ob: &mut OverrideBuilder, pattern: &str| -> Result<()> {
        ob.add(pattern).map_err(|e| Error::MalformedQuery(format!("bad glob '{pattern}': {e}")))?;
        Ok(())
    };

    for p in [
        "!**/*.lock",
        "!**/package-lock.json",
        "!**/pnpm-lock.yaml",
        "!**/yarn.lock",
        "!**/Cargo.lock",
        "!**/*.map",
        "!**/*.min.js",
        "!**/*.svg",
        "!**/*.png",
        "!**/*.ico",
        "!**/*.jpg",
        "!**/*.jpeg",
        "!**/*.gif",
        "!**/*.pdf",
        "!**/*.woff",
        "!**/*.woff2",
    ] {
        add(&mut ob, p)?;
    }

    for d in [
        ".git",
        "node_modules",
        "target",
        "dist",
        "build",
        "coverage",
        ".next",
        ".nuxt",
        ".venv",
        "venv",
        "__pycache__",
        "out",
    ] {
        add(&mut ob, &format!("!**/{d}"))?;
        add(&mut ob, &format!("!**/{d}/**"))?;
    }

    ob.build().map_err(|e| Error::MalformedQuery(format!("override build failed: {e}")))
}

fn compile_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        let glob = Glob::new(p).map_err(|e| Error::MalformedQuery(format!("bad glob '{p}': {e}")))?;
        builder.add(glob);
    }
    Ok(Some(builder.build().map_err(|e| Error::MalformedQuery(e.to_string()))?))
}

/// Enumerate indexable files under `opts.root`, sorted by relative path.
pub fn scan(opts: &ScanOptions) -> Result<Vec<FileEntry>> {
    let root = &opts.root;
    let meta = std::fs::metadata(root).map_err(|e| Error::UnreadableSource {
        path: root.clone(),
        source: e,
    })?;
    if !meta.is_dir() {
        return Err(Error::MalformedQuery(format!(
            "source path is not a directory: {}",
            root.display()
        )));
    }

    let include = compile_globs(&opts.include)?;
    let exclude = compile_globs(&opts.exclude)?;
    let overrides = default_overrides(root)?;

    let walker = WalkBuilder::new(root)
        .standard_filters(opts.respect_gitignore)
        .hidden(false)
        .overrides(overrides)
        .build();

    let mut entries = Vec::new();
    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(_) => continue,
        };
        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let abs_path = dent.into_path();
        let rel_path = match abs_path.strip_prefix(root) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };

        if let Some(inc) = &include {
            if !inc.is_match(&rel_path) {
                continue;
            }
        }
        if let Some(exc) = &exclude {
            if exc.is_match(&rel_path) {
                continue;
            }
        }

        let bytes = match std::fs::metadata(&abs_path).map(|m| m.len()) {
            Ok(b) => b,
            Err(_) => continue,
        };
        if bytes > opts.max_file_bytes {
            continue;
        }

        entries.push(FileEntry {
            abs_path,
            rel_path,
            bytes,
        });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}
