//! Byte-oriented chunking with a per-language separator hierarchy.
//!
//! The chunker greedily packs content into chunks of at most `target`
//! bytes, preferring to cut at the coarsest separator that fits; each level
//! is only consulted when every coarser one has no acceptable match, and a
//! hard byte split is the last resort. Successive chunks overlap by
//! `overlap` bytes so definitions straddling a boundary stay searchable.
//!
//! Everything here works on raw bytes: non-UTF-8 files chunk fine and are
//! only decoded (lossily) at presentation time.

use std::borrow::Cow;

use regex::bytes::Regex;

/// A half-open byte range of a source file. The chunk's text is never
/// stored; it is re-read from the file at presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end_byte - self.start_byte
    }

    pub fn is_empty(&self) -> bool {
        self.start_byte == self.end_byte
    }

    /// Lossily decoded view of the chunk within `bytes`.
    pub fn text_view<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        String::from_utf8_lossy(&bytes[self.start_byte..self.end_byte.min(bytes.len())])
    }
}

/// An ordered list of compiled separator patterns, coarsest first.
///
/// Patterns use the plain regex dialect (no lookaround, no backreferences);
/// a separator match marks where the *following* chunk begins, so block
/// keywords stay attached to their body.
#[derive(Debug, Clone)]
pub struct SeparatorSet {
    levels: Vec<Regex>,
}

impl SeparatorSet {
    /// Compile a separator hierarchy. A malformed pattern rejects the whole
    /// set, so handlers carrying one never make it past registration.
    pub fn compile(patterns: &[&str]) -> Result<Self, regex::Error> {
        let levels = patterns.iter().map(|p| Regex::new(p)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { levels })
    }

    /// Fallback hierarchy for files with no registered language:
    /// paragraph break, line break, word break.
    pub fn plain_text() -> Self {
        Self::compile(&["\\n\\n", "\\n", " "]).expect("static patterns compile")
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    target: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(target: usize, overlap: usize) -> Self {
        Self {
            target: target.max(2),
            overlap,
        }
    }

    /// Split `bytes` into chunks of at most `target` bytes.
    ///
    /// Cuts happen at the start of the last acceptable separator match so
    /// each chunk is at least `target / 2` bytes (the final chunk excepted).
    pub fn chunk(&self, bytes: &[u8], separators: &SeparatorSet) -> Vec<Chunk> {
        if bytes.is_empty() {
            return Vec::new();
        }
        if bytes.len() <= self.target {
            return vec![Chunk {
                start_byte: 0,
                end_byte: bytes.len(),
            }];
        }

        let min = self.target / 2;
        let mut chunks = Vec::new();
        let mut pos = 0usize;

        loop {
            let rest = bytes.len() - pos;
            if rest <= self.target {
                chunks.push(Chunk {
                    start_byte: pos,
                    end_byte: bytes.len(),
                });
                break;
            }

            let cut = find_cut(&bytes[pos..pos + self.target], separators, min)
                .map(|offset| pos + offset)
                .unwrap_or(pos + self.target);

            chunks.push(Chunk {
                start_byte: pos,
                end_byte: cut,
            });

            // Overlap the boundary; when the chunk is smaller than the
            // overlap (tiny targets in tests), fall forward to keep progress.
            pos = if cut - pos > self.overlap {
                cut - self.overlap
            } else {
                cut
            };
        }

        chunks
    }
}

/// Offset of the best cut inside `window`, or `None` for a hard split.
///
/// Levels are consulted coarsest-first; within a level the *last* match
/// wins so chunks fill toward the target size. Matches before `min` are
/// ignored to keep chunks at least half the target.
fn find_cut(window: &[u8], separators: &SeparatorSet, min: usize) -> Option<usize> {
    for level in &separators.levels {
        let mut best: Option<usize> = None;
        for m in level.find_iter(window) {
            if m.start() >= min && m.start() > 0 {
                best = Some(m.start());
            }
        }
        if best.is_some() {
            return best;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker() -> Chunker {
        Chunker::new(1000, 300)
    }

    #[test]
    fn empty_file_yields_zero_chunks() {
        assert!(chunker().chunk(b"", &SeparatorSet::plain_text()).is_empty());
    }

    #[test]
    fn small_file_is_one_whole_chunk() {
        let bytes = b"fn main() {}\n";
        let chunks = chunker().chunk(bytes, &SeparatorSet::plain_text());
        assert_eq!(chunks, vec![Chunk { start_byte: 0, end_byte: bytes.len() }]);
    }

    #[test]
    fn prefers_coarse_separator_over_fine() {
        // Two paragraphs; the paragraph break sits past the minimum, so the
        // cut lands there rather than at a later newline or space.
        let mut text = String::new();
        text.push_str(&"a".repeat(600));
        text.push_str("\n\n");
        let para_break = text.len() - 2;
        text.push_str(&"b ".repeat(300));
        text.push_str(&"c".repeat(600));

        let chunks = chunker().chunk(text.as_bytes(), &SeparatorSet::plain_text());
        assert_eq!(chunks[0].end_byte, para_break);
    }

    #[test]
    fn separator_text_stays_with_following_chunk() {
        let mut text = String::new();
        text.push_str(&"x".repeat(700));
        text.push_str("\ndef handler():\n    pass\n");
        text.push_str(&"y".repeat(600));

        let seps = SeparatorSet::compile(&["\\ndef ", "\\n", " "]).unwrap();
        let chunks = Chunker::new(1000, 0).chunk(text.as_bytes(), &seps);
        // The "\ndef " boundary opens chunk 1.
        let second = chunks[1].text_view(text.as_bytes());
        assert!(second.starts_with("\ndef handler"), "got: {second:.20}");
    }

    #[test]
    fn chunks_overlap_by_configured_bytes() {
        let text = format!("{}\n\n{}", "a".repeat(800), "b".repeat(800));
        let chunks = chunker().chunk(text.as_bytes(), &SeparatorSet::plain_text());
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].end_byte - chunks[1].start_byte, 300);
    }

    #[test]
    fn hard_split_when_no_separator_fits() {
        let bytes = vec![b'q'; 2500];
        let chunks = chunker().chunk(&bytes, &SeparatorSet::plain_text());
        assert_eq!(chunks[0], Chunk { start_byte: 0, end_byte: 1000 });
        // Overlap applies to hard splits too.
        assert_eq!(chunks[1].start_byte, 700);
        // Full coverage, no gaps.
        assert_eq!(chunks.last().unwrap().end_byte, 2500);
    }

    #[test]
    fn minimum_chunk_size_is_half_target() {
        // A separator very early in the window must not produce a sliver.
        let text = format!("ab\n\n{}", "c".repeat(3000));
        let chunks = chunker().chunk(text.as_bytes(), &SeparatorSet::plain_text());
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.len() >= 500, "chunk of {} bytes", c.len());
        }
    }

    #[test]
    fn non_utf8_bytes_do_not_panic() {
        let mut bytes = vec![0xFF, 0xFE, 0x80];
        bytes.extend_from_slice(&[b'z'; 2000]);
        let chunks = chunker().chunk(&bytes, &SeparatorSet::plain_text());
        assert!(!chunks.is_empty());
        // Lossy decoding still renders a view.
        let _ = chunks[0].text_view(&bytes);
    }

    #[test]
    fn malformed_pattern_is_rejected_at_compile() {
        assert!(SeparatorSet::compile(&["[unclosed"]).is_err());
    }
}
