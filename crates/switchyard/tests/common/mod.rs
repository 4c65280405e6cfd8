//! Shared helpers for switchyard integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use switchyard::security::native_library_extension;
use switchyard::{
    BackendKind, Grammar, GrammarError, GrammarTree, GrammarTreeBuilder, LanguageName,
    LanguageRegistry, Registration,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .with_target(false)
            .init();
    });
}

pub fn lang(name: &str) -> LanguageName {
    LanguageName::new(name).expect("valid language name")
}

/// Sums like `1 + 22 + 3`, one per line.
///
/// Produces `(sums (sum (number) (number) ...) ...)` with `+` as anonymous
/// children. A `+` without a right operand gets a missing `number`; anything
/// that is neither a digit nor `+` becomes an `ERROR` leaf.
#[derive(Debug, Clone, Copy)]
pub struct SumGrammar;

impl Grammar for SumGrammar {
    fn name(&self) -> &str {
        "sum"
    }

    fn parse(&self, source: &str) -> Result<GrammarTree, GrammarError> {
        let mut builder = GrammarTreeBuilder::new("sum");
        builder.open("sums", 0);
        let mut offset = 0;
        for line in source.split_inclusive('\n') {
            sum_line(&mut builder, offset, line.trim_end_matches('\n'));
            offset += line.len();
        }
        builder.close(source.len());
        builder.build()
    }
}

fn sum_line(builder: &mut GrammarTreeBuilder, offset: usize, line: &str) {
    let bytes = line.as_bytes();
    let mut pos = 0;
    let mut opened = false;
    let mut expect_operand = true;
    let mut last_end = 0;
    while pos < bytes.len() {
        let byte = bytes[pos];
        if byte == b' ' {
            pos += 1;
            continue;
        }
        if !opened {
            builder.open("sum", offset + pos);
            opened = true;
        }
        if byte.is_ascii_digit() {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            builder.leaf("number", offset + start, offset + pos);
            expect_operand = false;
        } else if byte == b'+' {
            pos += 1;
            builder.anonymous("+", offset + pos - 1, offset + pos);
            expect_operand = true;
        } else {
            pos += 1;
            builder.error(offset + pos - 1, offset + pos);
        }
        last_end = pos;
    }
    if opened {
        if expect_operand {
            builder.missing("number", offset + last_end);
        }
        builder.close(offset + last_end);
    }
}

/// Registry with the built-in backends and `sum` registered for `grammar`.
pub fn sum_registry() -> Arc<LanguageRegistry> {
    init_tracing();
    let registry = Arc::new(LanguageRegistry::default());
    registry
        .register(
            lang("sum"),
            BackendKind::GRAMMAR,
            Registration::grammar(Arc::new(SumGrammar), "tests::sum").expect("valid"),
        )
        .expect("register sum");
    registry
}

/// Create an empty file named like a grammar library.
///
/// The tree-sitter backend resolves grammars linked into the binary, so only
/// the file's presence matters.
pub fn fake_library(dir: &TempDir, language: &str) -> PathBuf {
    let path = dir.path().join(format!(
        "libtree-sitter-{}.{}",
        language.replace('_', "-"),
        native_library_extension()
    ));
    std::fs::write(&path, b"").expect("write fake library");
    path
}

/// Register `language` for the tree-sitter backend through a fake library.
pub fn register_native(registry: &LanguageRegistry, dir: &TempDir, language: &str) -> PathBuf {
    let path = fake_library(dir, language);
    registry
        .register(
            lang(language),
            BackendKind::TREE_SITTER,
            Registration::library(&path, None).expect("valid registration"),
        )
        .expect("register native");
    path
}
