//! Smart-context expansion: grow a matched byte range to the smallest
//! enclosing definition (function, class, impl block) found by the syntax
//! tree, capped to a line budget centered on the original match.
//!
//! The expander owns a small LRU of read-and-parsed files scoped to one
//! search call (results clustering in one file cost a single read) and is
//! dropped when the call completes so edits never leak across searches.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tree_sitter::{Node, Parser, Tree};

use crate::symbols::{definition_node_kinds, grammar_language};

const FILE_CACHE_CAP: usize = 128;

/// A rendered, line-capped view of a byte range within one file.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-indexed, inclusive.
    pub line_start: u32,
    pub line_end: u32,
    pub content: String,
}

struct CachedFile {
    bytes: Vec<u8>,
    /// Byte offset of each line start; `line_offsets[0] == 0`.
    line_offsets: Vec<usize>,
    tree: Option<Tree>,
}

pub struct ContextExpander {
    files: LruCache<PathBuf, Arc<CachedFile>>,
    line_cap: usize,
    col_cap: usize,
}

impl ContextExpander {
    pub fn new(line_cap: usize, col_cap: usize) -> Self {
        Self {
            files: LruCache::new(NonZeroUsize::new(FILE_CACHE_CAP).expect("cap is nonzero")),
            line_cap,
            col_cap,
        }
    }

    /// Expand `[start, end)` to its smallest enclosing definition node and
    /// render it. Falls back to the input range when no grammar is
    /// registered or no such node exists. Returns `None` only when the file
    /// cannot be read; the caller omits that result and moves on.
    pub fn expand(
        &mut self,
        path: &Path,
        start_byte: usize,
        end_byte: usize,
        language_id: &str,
    ) -> Option<Rendered> {
        let file = self.load(path, language_id)?;

        let (mut s, mut e) = (start_byte.min(file.bytes.len()), end_byte.min(file.bytes.len()));
        if let Some(tree) = &file.tree {
            if let Some(node) = smallest_enclosing_definition(tree.root_node(), s, e, language_id) {
                s = node.start_byte();
                e = node.end_byte();
            }
        }

        Some(self.render_capped(&file, s, e, start_byte, end_byte))
    }

    /// Render the input range as-is (smart context off), still line-capped.
    pub fn read_range(&mut self, path: &Path, start_byte: usize, end_byte: usize) -> Option<Rendered> {
        let file = self.load_plain(path)?;
        let s = start_byte.min(file.bytes.len());
        let e = end_byte.min(file.bytes.len());
        Some(self.render_capped(&file, s, e, start_byte, end_byte))
    }

    /// Raw head of a byte range (up to 256 bytes), lossily decoded. Used by
    /// the definition-boost check, which only needs the first token.
    pub fn head_text(&mut self, path: &Path, start_byte: usize, end_byte: usize) -> Option<String> {
        let file = self.load_plain(path)?;
        let s = start_byte.min(file.bytes.len());
        let e = end_byte.min(file.bytes.len()).min(s + 256);
        Some(String::from_utf8_lossy(&file.bytes[s..e.max(s)]).into_owned())
    }

    /// Explicit context: `before`/`after` whole lines around the range.
    pub fn context_lines(
        &mut self,
        path: &Path,
        start_byte: usize,
        end_byte: usize,
        before: usize,
        after: usize,
    ) -> (Option<String>, Option<String>) {
        let Some(file) = self.load_plain(path) else {
            return (None, None);
        };

        let first = line_of_byte(&file.line_offsets, start_byte.min(file.bytes.len()));
        let last = line_of_byte(&file.line_offsets, end_byte.min(file.bytes.len()).saturating_sub(1));

        let before_text = if before > 0 && first > 0 {
            let from = first.saturating_sub(before);
            Some(self.render_lines(&file, from, first - 1))
        } else {
            None
        };

        let line_count = file.line_offsets.len();
        let after_text = if after > 0 && last + 1 < line_count {
            let to = (last + after).min(line_count - 1);
            Some(self.render_lines(&file, last + 1, to))
        } else {
            None
        };

        (before_text, after_text)
    }

    // ── File cache ────────────────────────────────────────────────────────

    fn load(&mut self, path: &Path, language_id: &str) -> Option<Arc<CachedFile>> {
        let language = grammar_language(language_id);

        if let Some(f) = self.files.get(path).map(Arc::clone) {
            if language.is_none() || f.tree.is_some() {
                return Some(f);
            }
            // Cached without a parse (a head_text read got here first);
            // upgrade in place, reusing the bytes already in memory.
            let upgraded = Arc::new(CachedFile {
                tree: parse_bytes(language.as_ref(), &f.bytes),
                line_offsets: f.line_offsets.clone(),
                bytes: f.bytes.clone(),
            });
            self.files.put(path.to_path_buf(), Arc::clone(&upgraded));
            return Some(upgraded);
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "result source unreadable; omitting");
                return None;
            }
        };

        let file = Arc::new(CachedFile {
            tree: parse_bytes(language.as_ref(), &bytes),
            line_offsets: line_offsets(&bytes),
            bytes,
        });
        self.files.put(path.to_path_buf(), Arc::clone(&file));
        Some(file)
    }

    fn load_plain(&mut self, path: &Path) -> Option<Arc<CachedFile>> {
        self.load(path, "")
    }

    // ── Rendering ─────────────────────────────────────────────────────────

    /// Render `[s, e)`, capping to `line_cap` lines centered on the original
    /// match `[match_s, match_e)`.
    fn render_capped(&self, file: &CachedFile, s: usize, e: usize, match_s: usize, match_e: usize) -> Rendered {
        let mut first = line_of_byte(&file.line_offsets, s);
        let mut last = line_of_byte(&file.line_offsets, e.saturating_sub(1).max(s));

        if last - first + 1 > self.line_cap {
            // Center the window on the original match.
            let m_first = line_of_byte(&file.line_offsets, match_s.min(file.bytes.len()));
            let m_last = line_of_byte(&file.line_offsets, match_e.min(file.bytes.len()).saturating_sub(1).max(match_s));
            let mid = (m_first + m_last) / 2;

            let half = self.line_cap / 2;
            let mut w_first = mid.saturating_sub(half).max(first);
            let w_last = (w_first + self.line_cap - 1).min(last);
            w_first = w_last.saturating_sub(self.line_cap - 1).max(first);
            first = w_first;
            last = w_last;
        }

        let content = self.render_lines(file, first, last);
        let start_byte = file.line_offsets[first];
        let end_byte = if last + 1 < file.line_offsets.len() {
            file.line_offsets[last + 1]
        } else {
            file.bytes.len()
        };

        Rendered {
            start_byte,
            end_byte,
            line_start: (first + 1) as u32,
            line_end: (last + 1) as u32,
            content,
        }
    }

    fn render_lines(&self, file: &CachedFile, first: usize, last: usize) -> String {
        let mut out = String::new();
        for line in first..=last {
            let s = file.line_offsets[line];
            let e = if line + 1 < file.line_offsets.len() {
                file.line_offsets[line + 1] - 1
            } else {
                let mut e = file.bytes.len();
                if e > s && file.bytes[e - 1] == b'\n' {
                    e -= 1;
                }
                e
            };
            let text = String::from_utf8_lossy(&file.bytes[s..e.max(s)]);
            let trimmed = text.trim_end_matches('\r');

            if trimmed.chars().count() > self.col_cap {
                let cut: String = trimmed.chars().take(self.col_cap).collect();
                out.push_str(&cut);
                out.push('…');
            } else {
                out.push_str(trimmed);
            }
            if line < last {
                out.push('\n');
            }
        }
        out
    }
}

fn parse_bytes(language: Option<&tree_sitter::Language>, bytes: &[u8]) -> Option<Tree> {
    let language = language?;
    let mut parser = Parser::new();
    parser.set_language(language).ok()?;
    parser.parse(bytes, None)
}

/// Index of the line containing byte `offset` (0-based line index).
fn line_of_byte(line_offsets: &[usize], offset: usize) -> usize {
    match line_offsets.binary_search(&offset) {
        Ok(i) => i,
        Err(i) => i.saturating_sub(1),
    }
}

fn line_offsets(bytes: &[u8]) -> Vec<usize> {
    let mut offsets = vec![0];
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' && i + 1 < bytes.len() {
            offsets.push(i + 1);
        }
    }
    offsets
}

/// The smallest definition-kind node whose range strictly contains
/// `[start, end)`.
fn smallest_enclosing_definition<'t>(
    root: Node<'t>,
    start: usize,
    end: usize,
    language_id: &str,
) -> Option<Node<'t>> {
    let kinds = definition_node_kinds(language_id);
    if kinds.is_empty() {
        return None;
    }

    let mut best: Option<Node> = None;
    let mut node = root;
    loop {
        if kinds.contains(&node.kind())
            && node.start_byte() <= start
            && end <= node.end_byte()
            && (node.start_byte(), node.end_byte()) != (start, end)
        {
            best = Some(node);
        }

        // Descend into the child that still contains the range.
        let mut cursor = node.walk();
        let next = node
            .children(&mut cursor)
            .find(|c| c.start_byte() <= start && end <= c.end_byte());
        drop(cursor);
        match next {
            Some(child) => node = child,
            None => break,
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.py");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn expands_to_enclosing_function() {
        let src = "def handler(request):\n    a = 1\n    b = 2\n    return a + b\n\nprint(handler(None))\n";
        let (_dir, path) = write_temp(src);

        // Range covering just "b = 2".
        let start = src.find("b = 2").unwrap();
        let end = start + 5;
        let r = ContextExpander::new(50, 200).expand(&path, start, end, "python").unwrap();

        assert_eq!(r.line_start, 1);
        assert!(r.content.starts_with("def handler"));
        assert!(r.content.contains("return a + b"));
        assert!(!r.content.contains("print"));
    }

    #[test]
    fn no_grammar_returns_input_range() {
        let src = "resource \"aws_s3_bucket\" \"data\" {\n  bucket = \"x\"\n}\n";
        let (_dir, path) = write_temp(src);
        let r = ContextExpander::new(50, 200).expand(&path, 0, 33, "hcl").unwrap();
        assert_eq!(r.line_start, 1);
        assert_eq!(r.line_end, 1);
    }

    #[test]
    fn line_cap_centers_on_match() {
        let mut src = String::from("def big():\n");
        for i in 0..120 {
            src.push_str(&format!("    x{i} = {i}\n"));
        }
        let (_dir, path) = write_temp(&src);

        let match_start = src.find("x60 = 60").unwrap();
        let r = ContextExpander::new(50, 200)
            .expand(&path, match_start, match_start + 8, "python")
            .unwrap();

        let lines = r.line_end - r.line_start + 1;
        assert!(lines <= 50, "{lines} lines");
        assert!(r.content.contains("x60 = 60"));
    }

    #[test]
    fn long_lines_truncated_with_ellipsis() {
        let src = format!("short\n{}\n", "y".repeat(400));
        let (_dir, path) = write_temp(&src);
        let r = ContextExpander::new(50, 200).read_range(&path, 0, src.len()).unwrap();
        let long_line = r.content.lines().nth(1).unwrap();
        assert!(long_line.ends_with('…'));
        assert_eq!(long_line.chars().count(), 201);
    }

    #[test]
    fn explicit_context_lines() {
        let src = "one\ntwo\nthree\nfour\nfive\n";
        let (_dir, path) = write_temp(src);
        let start = src.find("three").unwrap();
        let (before, after) =
            ContextExpander::new(50, 200).context_lines(&path, start, start + 5, 1, 2);
        assert_eq!(before.as_deref(), Some("two"));
        assert_eq!(after.as_deref(), Some("four\nfive"));
    }

    #[test]
    fn head_text_read_does_not_poison_later_expansion() {
        let src = "def handler():\n    a = 1\n    return a\n";
        let (_dir, path) = write_temp(src);
        let mut exp = ContextExpander::new(50, 200);

        // A plain read caches the file without a parse tree...
        assert!(exp.head_text(&path, 0, 10).is_some());

        // ...but expansion afterwards still finds the enclosing function.
        let start = src.find("return a").unwrap();
        let r = exp.expand(&path, start, start + 8, "python").unwrap();
        assert!(r.content.starts_with("def handler"));
    }

    #[test]
    fn unreadable_file_yields_none() {
        let mut exp = ContextExpander::new(50, 200);
        assert!(exp.expand(Path::new("/nonexistent/definitely.py"), 0, 10, "python").is_none());
    }
}
