//! CPU-side pipeline flows: registry → chunker → symbols → tokenizer,
//! exercised together over real files. No store or embedder involved.

use std::path::Path;

use cocosearch::chunker::{Chunker, SeparatorSet};
use cocosearch::languages::Registry;
use cocosearch::symbols::{self, SymbolType};
use cocosearch::tokenizer;

#[test]
fn python_file_end_to_end_prep() {
    let source = b"def getUserById(id):\n    \"\"\"Fetch one user.\"\"\"\n    return db.get(id)\n";
    let registry = Registry::new().unwrap();

    let language = registry.language_for(Path::new("svc/users.py"), source).unwrap();
    assert_eq!(language, "python");

    let handler = registry.handler_for(language).unwrap();
    let chunks = Chunker::new(1000, 300).chunk(source, &handler.separators);
    assert_eq!(chunks.len(), 1);

    let chunk_bytes = &source[chunks[0].start_byte..chunks[0].end_byte];
    let symbol = symbols::extract(chunk_bytes, language).unwrap();
    assert_eq!(symbol.symbol_type, SymbolType::Function);
    assert_eq!(symbol.symbol_name, "getUserById");

    let tokens = tokenizer::tokenize(&String::from_utf8_lossy(chunk_bytes), "svc/users.py");
    for expected in ["getUserById", "get", "User", "By", "Id", "svc", "users", "py"] {
        assert!(tokens.split(' ').any(|t| t == expected), "missing token {expected}");
    }
}

#[test]
fn large_rust_file_chunks_at_function_boundaries() {
    let mut source = String::new();
    for i in 0..30 {
        source.push_str(&format!(
            "fn handler_{i}(input: &str) -> String {{\n    let out = input.trim().to_string();\n    out\n}}\n\n"
        ));
    }

    let registry = Registry::new().unwrap();
    let handler = registry.handler_for("rust").unwrap();
    // Zero overlap so chunk starts line up exactly with the cut points.
    let chunks = Chunker::new(1000, 0).chunk(source.as_bytes(), &handler.separators);

    assert!(chunks.len() > 1);
    // Every non-initial chunk should open at a function boundary, because
    // the rust separator hierarchy puts "\nfn " above blank lines.
    for chunk in &chunks[1..] {
        let text = chunk.text_view(source.as_bytes());
        assert!(
            text.starts_with("\nfn ") || text.starts_with("\n\nfn "),
            "chunk starts mid-function: {:?}",
            &text[..text.len().min(30)]
        );
    }
    // Each chunk still yields a symbol.
    for chunk in &chunks {
        let bytes = &source.as_bytes()[chunk.start_byte..chunk.end_byte];
        assert!(symbols::extract(bytes, "rust").is_some());
    }
}

#[test]
fn workflow_schema_rides_on_yaml() {
    let source = b"name: release\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout@v4\n";
    let registry = Registry::new().unwrap();

    let language = registry
        .language_for(Path::new(".github/workflows/release.yaml"), source)
        .unwrap();
    assert_eq!(language, "github-actions");

    let handler = registry.handler_for(language).unwrap();
    let meta = handler.extract_metadata(b"  build:\n    runs-on: ubuntu-latest\n");
    assert_eq!(meta.block_type, "job");
    assert_eq!(meta.hierarchy, "jobs.build");
    assert_eq!(meta.language_id, "github-actions");
}

#[test]
fn plain_text_fallback_has_no_symbols() {
    let source = b"CocoSearch indexes code.\n\nIt also indexes prose like this file.\n";
    let registry = Registry::new().unwrap();
    assert!(registry.language_for(Path::new("README.txt"), source).is_none());

    let chunks = Chunker::new(1000, 300).chunk(source, &SeparatorSet::plain_text());
    assert_eq!(chunks.len(), 1);
    assert!(symbols::extract(source, "").is_none());
}
