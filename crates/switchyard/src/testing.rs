//! Test utilities: a tiny in-process grammar and a configurable backend.
//!
//! Available to this crate's tests and, with the `test-util` feature, to
//! downstream crates.

use std::sync::Arc;

use crate::backend::{Backend, BackendManifest, BackendParser, Grammar, GrammarTree, GrammarTreeBuilder};
use crate::error::{Error, GrammarError, Result};
use crate::language::{LanguageHandle, Registration};
use crate::types::{BackendCategory, BackendKind, LanguageForm, LanguageName};

/// Grammar for lines of the form `name = 123`.
///
/// Produces `(program (assignment name: (identifier) value: (number)) ...)`.
/// Malformed lines become `ERROR` nodes or assignments with a missing token;
/// only a NUL byte makes the parse fail outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentGrammar;

/// Name reported by [`AssignmentGrammar`].
pub const ASSIGNMENT_GRAMMAR: &str = "assign";

impl Grammar for AssignmentGrammar {
    fn name(&self) -> &str {
        ASSIGNMENT_GRAMMAR
    }

    fn parse(&self, source: &str) -> std::result::Result<GrammarTree, GrammarError> {
        if let Some(offset) = source.find('\0') {
            return Err(GrammarError::new(
                ASSIGNMENT_GRAMMAR,
                "unexpected NUL byte",
                offset,
            ));
        }

        let mut builder = GrammarTreeBuilder::new(ASSIGNMENT_GRAMMAR);
        builder.open("program", 0);
        let mut offset = 0;
        for line in source.split_inclusive('\n') {
            parse_line(&mut builder, offset, line.trim_end());
            offset += line.len();
        }
        builder.close(source.len());
        builder.build()
    }
}

fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while bytes.get(pos).is_some_and(|b| *b == b' ' || *b == b'\t') {
        pos += 1;
    }
    pos
}

fn scan(bytes: &[u8], mut pos: usize, accept: impl Fn(u8) -> bool) -> usize {
    while bytes.get(pos).is_some_and(|b| accept(*b)) {
        pos += 1;
    }
    pos
}

fn parse_line(builder: &mut GrammarTreeBuilder, offset: usize, line: &str) {
    let bytes = line.as_bytes();
    let end = bytes.len();
    let at = |pos: usize| offset + pos;

    let start = skip_spaces(bytes, 0);
    if start == end {
        return;
    }

    let ident_end = scan(bytes, start, |b| b.is_ascii_alphanumeric() || b == b'_');
    if ident_end == start || bytes[start].is_ascii_digit() {
        builder.error(at(start), at(end));
        return;
    }
    builder.open("assignment", at(start));
    builder.leaf_field("name", "identifier", at(start), at(ident_end));

    let eq = skip_spaces(bytes, ident_end);
    if eq == end {
        builder.missing("=", at(ident_end));
        builder.missing("number", at(ident_end));
        builder.close(at(ident_end));
        return;
    }
    if bytes[eq] != b'=' {
        builder.error(at(eq), at(end));
        builder.close(at(end));
        return;
    }
    builder.anonymous("=", at(eq), at(eq + 1));

    let value = skip_spaces(bytes, eq + 1);
    let value_end = scan(bytes, value, |b| b.is_ascii_digit());
    if value_end == value {
        if value == end {
            builder.missing("number", at(eq + 1));
            builder.close(at(eq + 1));
        } else {
            builder.error(at(value), at(end));
            builder.close(at(end));
        }
        return;
    }
    builder.leaf_field("value", "number", at(value), at(value_end));

    let rest = skip_spaces(bytes, value_end);
    if rest < end {
        builder.error(at(rest), at(end));
        builder.close(at(end));
    } else {
        builder.close(at(value_end));
    }
}

/// Grammar registration for [`AssignmentGrammar`].
#[must_use]
pub fn assignment_registration() -> Registration {
    Registration::Grammar {
        grammar: Arc::new(AssignmentGrammar),
        source_identifier: ASSIGNMENT_GRAMMAR.to_string(),
    }
}

/// Manifest with only the required methods, named the way a minimal engine
/// might name them.
#[must_use]
pub fn minimal_manifest() -> BackendManifest {
    BackendManifest::new()
        .with_language(["load"])
        .with_parser(["create", "set_grammar", "parse"])
        .with_tree(["root"])
        .with_node(["type", "start_byte", "end_byte", "child_count", "child_at"])
}

/// A backend that delegates to another one under a different identity.
///
/// Handles are re-tagged with the stub's kind. Manifest, availability and
/// parser construction can be overridden to exercise fallback and
/// capability paths.
#[derive(Clone)]
pub struct StubBackend {
    kind: BackendKind,
    inner: Arc<dyn Backend>,
    category: BackendCategory,
    manifest: BackendManifest,
    available: bool,
    parser_error: Option<String>,
}

impl StubBackend {
    /// Delegate to `inner`, reporting `kind`.
    #[must_use]
    pub fn wrapping(kind: BackendKind, inner: Arc<dyn Backend>) -> Self {
        Self {
            kind,
            category: inner.category(),
            manifest: inner.manifest(),
            inner,
            available: true,
            parser_error: None,
        }
    }

    /// Report a different manifest.
    #[must_use]
    pub fn with_manifest(mut self, manifest: BackendManifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Report a different category.
    #[must_use]
    pub fn with_category(mut self, category: BackendCategory) -> Self {
        self.category = category;
        self
    }

    /// Report the runtime as missing.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Make [`Backend::new_parser`] fail with `message`.
    #[must_use]
    pub fn failing_parser(mut self, message: impl Into<String>) -> Self {
        self.parser_error = Some(message.into());
        self
    }
}

impl std::fmt::Debug for StubBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubBackend")
            .field("kind", &self.kind)
            .field("inner", &self.inner.kind())
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

impl Backend for StubBackend {
    fn kind(&self) -> BackendKind {
        self.kind.clone()
    }

    fn category(&self) -> BackendCategory {
        self.category
    }

    fn language_form(&self) -> LanguageForm {
        self.inner.language_form()
    }

    fn manifest(&self) -> BackendManifest {
        self.manifest.clone()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn load_language(
        &self,
        name: &LanguageName,
        registration: &Registration,
    ) -> Result<LanguageHandle> {
        let handle = self.inner.load_language(name, registration)?;
        Ok(LanguageHandle::new(
            handle.name().clone(),
            self.kind.clone(),
            handle.provenance().clone(),
            handle.payload().clone(),
        ))
    }

    fn new_parser(&self) -> Result<Box<dyn BackendParser>> {
        match &self.parser_error {
            Some(message) => Err(Error::not_available(message.clone())),
            None => self.inner.new_parser(),
        }
    }
}
