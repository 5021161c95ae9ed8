//! Language registry: explicit, compile-time list of handlers.
//!
//! Each handler names its file matchers, an ordered separator hierarchy for
//! the chunker, and an optional regex-only metadata extractor. "Grammar"
//! handlers ride on top of a base syntax (the GitHub-Actions workflow
//! schema on YAML) and are matched by path glob plus a content probe,
//! ahead of ordinary handlers.
//!
//! All patterns are compiled once at registry construction; a malformed
//! pattern rejects the handler and fails startup rather than surfacing
//! mid-index.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use globset::{Glob, GlobMatcher};
use regex::bytes::Regex;

use crate::chunker::SeparatorSet;
use crate::error::{Error, Result};

/// Per-chunk metadata produced by a handler's extractor. Fields are empty
/// strings (never null) when a handler has nothing to say.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub block_type: String,
    pub hierarchy: String,
    pub language_id: String,
}

type MetadataFn = fn(&[u8], &str) -> ChunkMetadata;

/// Static description of one language handler; the registry compiles these
/// into [`Handler`]s at startup.
pub struct LanguageSpec {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub extensions: &'static [&'static str],
    pub filenames: &'static [&'static str],
    /// Separator patterns, coarsest first, in plain regex dialect.
    pub separators: &'static [&'static str],
    pub metadata: Option<MetadataFn>,
    /// Whether a tree-sitter grammar backs symbol extraction and context
    /// expansion for this language.
    pub has_grammar: bool,
}

/// A schema handler selected by path glob + content marker, layered over a
/// base language's chunking rules.
pub struct GrammarSpec {
    pub id: &'static str,
    pub path_glob: &'static str,
    /// Content probe; the handler only claims a file whose head matches.
    pub content_marker: &'static str,
    pub separators: &'static [&'static str],
    pub metadata: Option<MetadataFn>,
}

/// A compiled, ready-to-use handler.
pub struct Handler {
    pub id: String,
    pub separators: SeparatorSet,
    pub has_grammar: bool,
    metadata: Option<MetadataFn>,
}

impl Handler {
    /// Run the metadata extractor for one chunk. Always yields a fully
    /// populated struct; handlers without an extractor still stamp the
    /// language id.
    pub fn extract_metadata(&self, chunk_bytes: &[u8]) -> ChunkMetadata {
        match self.metadata {
            Some(f) => f(chunk_bytes, &self.id),
            None => ChunkMetadata {
                language_id: self.id.clone(),
                ..Default::default()
            },
        }
    }
}

struct CompiledGrammar {
    glob: GlobMatcher,
    marker: Regex,
    handler: usize,
}

pub struct Registry {
    handlers: Vec<Handler>,
    by_id: HashMap<String, usize>,
    aliases: HashMap<String, String>,
    by_ext: HashMap<String, usize>,
    by_filename: HashMap<String, usize>,
    grammars: Vec<CompiledGrammar>,
}

impl Registry {
    /// Build the registry from the built-in handler list.
    pub fn new() -> Result<Self> {
        Self::with_specs(builtin_languages(), builtin_grammars())
    }

    fn with_specs(languages: Vec<LanguageSpec>, grammars: Vec<GrammarSpec>) -> Result<Self> {
        let mut reg = Self {
            handlers: Vec::new(),
            by_id: HashMap::new(),
            aliases: HashMap::new(),
            by_ext: HashMap::new(),
            by_filename: HashMap::new(),
            grammars: Vec::new(),
        };

        for spec in languages {
            let separators = SeparatorSet::compile(spec.separators).map_err(|e| Error::InvalidHandler {
                id: spec.id.to_string(),
                detail: format!("bad separator pattern: {e}"),
            })?;
            let idx = reg.handlers.len();
            reg.handlers.push(Handler {
                id: spec.id.to_string(),
                separators,
                has_grammar: spec.has_grammar,
                metadata: spec.metadata,
            });
            reg.by_id.insert(spec.id.to_string(), idx);
            for alias in spec.aliases {
                reg.aliases.insert((*alias).to_string(), spec.id.to_string());
            }
            for ext in spec.extensions {
                reg.by_ext.insert((*ext).to_string(), idx);
            }
            for name in spec.filenames {
                reg.by_filename.insert(name.to_lowercase(), idx);
            }
        }

        for spec in grammars {
            let separators = SeparatorSet::compile(spec.separators).map_err(|e| Error::InvalidHandler {
                id: spec.id.to_string(),
                detail: format!("bad separator pattern: {e}"),
            })?;
            let glob = Glob::new(spec.path_glob)
                .map_err(|e| Error::InvalidHandler {
                    id: spec.id.to_string(),
                    detail: format!("bad path glob: {e}"),
                })?
                .compile_matcher();
            let marker = Regex::new(spec.content_marker).map_err(|e| Error::InvalidHandler {
                id: spec.id.to_string(),
                detail: format!("bad content marker: {e}"),
            })?;
            let idx = reg.handlers.len();
            reg.handlers.push(Handler {
                id: spec.id.to_string(),
                separators,
                has_grammar: false,
                metadata: spec.metadata,
            });
            reg.by_id.insert(spec.id.to_string(), idx);
            reg.grammars.push(CompiledGrammar {
                glob,
                marker,
                handler: idx,
            });
        }

        Ok(reg)
    }

    /// Resolve the language for a file. Priority: grammar handlers (glob
    /// AND content marker), filename match, extension lookup, none.
    pub fn language_for(&self, path: &Path, content_probe: &[u8]) -> Option<&str> {
        let normalized = path.to_string_lossy().replace('\\', "/");
        for g in &self.grammars {
            if g.glob.is_match(&normalized) && g.marker.is_match(content_probe) {
                return Some(&self.handlers[g.handler].id);
            }
        }

        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("").to_lowercase();
        if let Some(&idx) = self.by_filename.get(&filename) {
            return Some(&self.handlers[idx].id);
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        self.by_ext.get(&ext).map(|&idx| self.handlers[idx].id.as_str())
    }

    /// Look up a handler by id, resolving aliases first.
    pub fn handler_for(&self, language_id: &str) -> Option<&Handler> {
        let id = self.resolve_alias(language_id);
        self.by_id.get(id).map(|&idx| &self.handlers[idx])
    }

    /// Canonical id for a possibly-aliased language name
    /// (`terraform` → `hcl`, `sh` → `bash`).
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// All registered handlers, for the chunker and for stats.
    pub fn handlers(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.iter()
    }
}

/// Does `text`'s first non-whitespace run open a definition in
/// `language_id`? Drives the post-fusion definition boost.
pub fn starts_with_definition(language_id: &str, text: &str) -> bool {
    let head = text.trim_start();
    let keywords: &[&str] = match language_id {
        "python" => &["def ", "async def ", "class "],
        "rust" => &["fn ", "pub ", "struct ", "enum ", "trait ", "impl ", "async fn ", "unsafe fn "],
        "javascript" | "typescript" => &[
            "function ",
            "function*",
            "async function ",
            "class ",
            "export ",
            "interface ",
            "const ",
            "type ",
        ],
        "go" => &["func ", "type "],
        "java" => &["public ", "private ", "protected ", "class ", "interface ", "enum ", "static ", "abstract "],
        _ => return false,
    };
    keywords.iter().any(|k| head.starts_with(k))
}

// ---------------------------------------------------------------------------
// Built-in handler list
// ---------------------------------------------------------------------------

fn builtin_languages() -> Vec<LanguageSpec> {
    vec![
        LanguageSpec {
            id: "python",
            aliases: &["py", "python3"],
            extensions: &["py", "pyi"],
            filenames: &[],
            separators: &["\\nclass ", "\\n[ \\t]*(async )?def ", "\\n\\n", "\\n", " "],
            metadata: None,
            has_grammar: true,
        },
        LanguageSpec {
            id: "rust",
            aliases: &["rs"],
            extensions: &["rs"],
            filenames: &[],
            separators: &[
                "\\n(pub(\\([a-z]+\\))? )?(async )?fn ",
                "\\n(pub(\\([a-z]+\\))? )?(struct|enum|trait|mod) ",
                "\\nimpl ",
                "\\n\\n",
                "\\n",
                " ",
            ],
            metadata: None,
            has_grammar: true,
        },
        LanguageSpec {
            id: "javascript",
            aliases: &["js", "jsx", "node"],
            extensions: &["js", "jsx", "mjs", "cjs"],
            filenames: &[],
            separators: &[
                "\\n(export )?(default )?(async )?function ",
                "\\n(export )?(default )?class ",
                "\\n(export )?(const|let|var) ",
                "\\n\\n",
                "\\n",
                " ",
            ],
            metadata: None,
            has_grammar: true,
        },
        LanguageSpec {
            id: "typescript",
            aliases: &["ts", "tsx"],
            extensions: &["ts", "tsx", "mts", "cts"],
            filenames: &[],
            separators: &[
                "\\n(export )?(default )?(async )?function ",
                "\\n(export )?(default )?(abstract )?class ",
                "\\n(export )?(interface|type|enum) ",
                "\\n(export )?(const|let|var) ",
                "\\n\\n",
                "\\n",
                " ",
            ],
            metadata: None,
            has_grammar: true,
        },
        LanguageSpec {
            id: "go",
            aliases: &["golang"],
            extensions: &["go"],
            filenames: &[],
            separators: &["\\nfunc ", "\\ntype ", "\\n(var|const) ", "\\n\\n", "\\n", " "],
            metadata: None,
            has_grammar: true,
        },
        LanguageSpec {
            id: "java",
            aliases: &[],
            extensions: &["java"],
            filenames: &[],
            separators: &[
                "\\n[ \\t]*(public |private |protected )?(static )?(final )?(class|interface|enum) ",
                "\\n[ \\t]*(public|private|protected) ",
                "\\n\\n",
                "\\n",
                " ",
            ],
            metadata: None,
            has_grammar: true,
        },
        LanguageSpec {
            id: "hcl",
            aliases: &["terraform", "tf"],
            extensions: &["tf", "hcl", "tfvars"],
            filenames: &[],
            separators: &[
                "\\n(resource|data|module|variable|output|provider|locals|terraform) ",
                "\\n\\n",
                "\\n",
                " ",
            ],
            metadata: Some(hcl_metadata),
            has_grammar: false,
        },
        LanguageSpec {
            id: "bash",
            aliases: &["sh", "shell", "zsh"],
            extensions: &["sh", "bash", "zsh"],
            filenames: &[],
            separators: &["\\n(function )?[A-Za-z_][A-Za-z0-9_]*\\(\\)", "\\n\\n", "\\n", " "],
            metadata: None,
            has_grammar: false,
        },
        LanguageSpec {
            id: "yaml",
            aliases: &["yml"],
            extensions: &["yaml", "yml"],
            filenames: &[],
            separators: &["\\n[A-Za-z0-9_-]+:", "\\n- ", "\\n\\n", "\\n", " "],
            metadata: Some(yaml_metadata),
            has_grammar: false,
        },
        LanguageSpec {
            id: "dockerfile",
            aliases: &["docker"],
            extensions: &[],
            filenames: &["dockerfile", "containerfile"],
            separators: &[
                "\\nFROM ",
                "\\n(RUN|COPY|ADD|ENV|ARG|EXPOSE|ENTRYPOINT|CMD|WORKDIR|USER|VOLUME|LABEL) ",
                "\\n\\n",
                "\\n",
                " ",
            ],
            metadata: Some(dockerfile_metadata),
            has_grammar: false,
        },
        LanguageSpec {
            id: "markdown",
            aliases: &["md"],
            extensions: &["md", "markdown"],
            filenames: &[],
            separators: &["\\n#{1,6} ", "\\n\\n", "\\n", " "],
            metadata: Some(markdown_metadata),
            has_grammar: false,
        },
        LanguageSpec {
            id: "json",
            aliases: &[],
            extensions: &["json", "jsonc"],
            filenames: &[],
            separators: &["\\n[ \\t]*\"", "\\n", " "],
            metadata: None,
            has_grammar: false,
        },
        LanguageSpec {
            id: "toml",
            aliases: &[],
            extensions: &["toml"],
            filenames: &[],
            separators: &["\\n\\[", "\\n\\n", "\\n", " "],
            metadata: None,
            has_grammar: false,
        },
    ]
}

fn builtin_grammars() -> Vec<GrammarSpec> {
    vec![GrammarSpec {
        id: "github-actions",
        path_glob: "**/.github/workflows/*.y*ml",
        content_marker: "(?m)^(on|jobs):",
        separators: &["\\n  [A-Za-z0-9_-]+:", "\\n[A-Za-z0-9_-]+:", "\\n\\n", "\\n", " "],
        metadata: Some(workflow_metadata),
    }]
}

// ---------------------------------------------------------------------------
// Metadata extractors (regex-only; no parsers at the handler layer)
// ---------------------------------------------------------------------------

fn hcl_metadata(chunk: &[u8], language_id: &str) -> ChunkMetadata {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            "(?m)^(resource|data|module|variable|output|provider)\\s+\"([^\"]+)\"(?:\\s+\"([^\"]+)\")?",
        )
        .expect("static pattern compiles")
    });

    let mut meta = ChunkMetadata {
        language_id: language_id.to_string(),
        ..Default::default()
    };
    if let Some(caps) = re.captures(chunk) {
        let text = |i: usize| {
            caps.get(i)
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                .unwrap_or_default()
        };
        meta.block_type = text(1);
        let mut parts = vec![text(1), text(2)];
        let third = text(3);
        if !third.is_empty() {
            parts.push(third);
        }
        meta.hierarchy = parts.join(".");
    }
    meta
}

fn dockerfile_metadata(chunk: &[u8], language_id: &str) -> ChunkMetadata {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new("(?mi)^FROM\\s+(\\S+)(?:\\s+AS\\s+(\\S+))?").expect("static pattern compiles")
    });

    let mut meta = ChunkMetadata {
        language_id: language_id.to_string(),
        ..Default::default()
    };
    if let Some(caps) = re.captures(chunk) {
        meta.block_type = "stage".to_string();
        let name = caps
            .get(2)
            .or_else(|| caps.get(1))
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .unwrap_or_default();
        meta.hierarchy = name;
    }
    meta
}

fn yaml_metadata(chunk: &[u8], language_id: &str) -> ChunkMetadata {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new("(?m)^([A-Za-z0-9_-]+):").expect("static pattern compiles"));

    let mut meta = ChunkMetadata {
        language_id: language_id.to_string(),
        ..Default::default()
    };
    if let Some(caps) = re.captures(chunk) {
        meta.block_type = "mapping".to_string();
        meta.hierarchy = caps
            .get(1)
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .unwrap_or_default();
    }
    meta
}

fn workflow_metadata(chunk: &[u8], language_id: &str) -> ChunkMetadata {
    static JOB: OnceLock<Regex> = OnceLock::new();
    let job = JOB.get_or_init(|| Regex::new("(?m)^  ([A-Za-z0-9_-]+):").expect("static pattern compiles"));

    let mut meta = ChunkMetadata {
        language_id: language_id.to_string(),
        ..Default::default()
    };
    if let Some(caps) = job.captures(chunk) {
        meta.block_type = "job".to_string();
        let id = caps
            .get(1)
            .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
            .unwrap_or_default();
        meta.hierarchy = format!("jobs.{id}");
    } else {
        // Fall back to the plain-YAML view for non-job chunks (on:, env:).
        return yaml_metadata(chunk, language_id);
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn registry() -> Registry {
        Registry::new().expect("builtin registry compiles")
    }

    #[test]
    fn extension_lookup() {
        let reg = registry();
        assert_eq!(reg.language_for(&PathBuf::from("src/main.rs"), b""), Some("rust"));
        assert_eq!(reg.language_for(&PathBuf::from("infra/s3.tf"), b""), Some("hcl"));
        assert_eq!(reg.language_for(&PathBuf::from("notes.txt"), b""), None);
    }

    #[test]
    fn filename_match_beats_extension() {
        let reg = registry();
        assert_eq!(reg.language_for(&PathBuf::from("deploy/Dockerfile"), b""), Some("dockerfile"));
    }

    #[test]
    fn grammar_handler_needs_glob_and_marker() {
        let reg = registry();
        let wf = PathBuf::from("repo/.github/workflows/release.yaml");
        // Glob + marker: claimed by the workflow schema.
        assert_eq!(reg.language_for(&wf, b"name: release\non: push\njobs:\n  build:\n"), Some("github-actions"));
        // Right path, wrong content: falls through to plain YAML.
        assert_eq!(reg.language_for(&wf, b"just: data\n"), Some("yaml"));
        // Right content, wrong path: plain YAML.
        assert_eq!(
            reg.language_for(&PathBuf::from("config/pipeline.yaml"), b"jobs:\n  x:\n"),
            Some("yaml")
        );
    }

    #[test]
    fn aliases_resolve_to_canonical_ids() {
        let reg = registry();
        assert_eq!(reg.resolve_alias("terraform"), "hcl");
        assert_eq!(reg.resolve_alias("sh"), "bash");
        assert_eq!(reg.resolve_alias("rust"), "rust");
        assert!(reg.handler_for("terraform").is_some());
        assert_eq!(reg.handler_for("terraform").unwrap().id, "hcl");
    }

    #[test]
    fn hcl_extractor_builds_dotted_hierarchy() {
        let chunk = b"resource \"aws_s3_bucket\" \"data\" {\n  bucket = \"x\"\n}\n";
        let meta = hcl_metadata(chunk, "hcl");
        assert_eq!(meta.block_type, "resource");
        assert_eq!(meta.hierarchy, "resource.aws_s3_bucket.data");
        assert_eq!(meta.language_id, "hcl");
    }

    #[test]
    fn workflow_extractor_names_jobs() {
        let chunk = b"  build:\n    runs-on: ubuntu-latest\n";
        let meta = workflow_metadata(chunk, "github-actions");
        assert_eq!(meta.block_type, "job");
        assert_eq!(meta.hierarchy, "jobs.build");
    }

    #[test]
    fn extractors_never_return_null_fields() {
        let meta = hcl_metadata(b"# just a comment\n", "hcl");
        assert_eq!(meta.block_type, "");
        assert_eq!(meta.hierarchy, "");
        assert_eq!(meta.language_id, "hcl");
    }

    #[test]
    fn definition_keyword_detection() {
        assert!(starts_with_definition("python", "def getUserById(id):"));
        assert!(starts_with_definition("python", "  class UserService:"));
        assert!(starts_with_definition("rust", "pub fn search()"));
        assert!(!starts_with_definition("python", "result = getUserById(7)"));
        assert!(!starts_with_definition("hcl", "resource \"x\" \"y\" {}"));
    }

    #[test]
    fn malformed_handler_is_rejected_at_startup() {
        let bad = vec![LanguageSpec {
            id: "broken",
            aliases: &[],
            extensions: &["brk"],
            filenames: &[],
            separators: &["[unclosed"],
            metadata: None,
            has_grammar: false,
        }];
        assert!(Registry::with_specs(bad, vec![]).is_err());
    }
}
