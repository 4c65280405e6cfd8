//! Core value types shared by the registry, the parser facade and the
//! unification layer.

use std::borrow::Cow;
use std::fmt;
use std::ops::Index;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::security::path::{safe_backend_name, safe_language_name};

// ============================================================================
// Identity types
// ============================================================================

/// A validated grammar name (`^[a-z][a-z0-9_]*$`).
///
/// This is the identity key for every registry operation. Construction never
/// rewrites the input: a name either validates as-is or is rejected, so a name
/// round-trips unchanged into registry keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageName(String);

impl LanguageName {
    /// Validate a language name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is empty, too long, does not
    /// start with a lowercase letter, or contains characters other than
    /// lowercase letters, digits and underscores.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if safe_language_name(&name) {
            Ok(Self(name))
        } else {
            Err(Error::configuration(format!(
                "invalid language name `{name}` (expected lowercase letters, digits and underscores, starting with a letter)"
            )))
        }
    }

    /// Lowercase the input and map `-` to `_` before validating.
    ///
    /// Useful for names derived from file names such as `tree-sitter-c-sharp`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the normalized name is still invalid.
    pub fn sanitize(name: &str) -> Result<Self> {
        Self::new(name.trim().to_ascii_lowercase().replace('-', "_"))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LanguageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for LanguageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for LanguageName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<LanguageName> for String {
    fn from(value: LanguageName) -> Self {
        value.0
    }
}

/// Tag identifying a backend implementation family.
///
/// The set is open: built-in kinds are available as constants, and external
/// collaborators create new kinds at runtime with [`BackendKind::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendKind(Cow<'static, str>);

impl BackendKind {
    /// Native tree-sitter binding.
    pub const TREE_SITTER: Self = Self(Cow::Borrowed("tree_sitter"));

    /// Pure in-process grammar engine.
    pub const GRAMMAR: Self = Self(Cow::Borrowed("grammar"));

    /// Create a backend kind from a runtime name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is not a safe identifier.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if safe_backend_name(&name) {
            Ok(Self(Cow::Owned(name)))
        } else {
            Err(Error::configuration(format!(
                "invalid backend name `{name}`"
            )))
        }
    }

    /// The kind as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.trim().to_ascii_lowercase())
    }
}

impl TryFrom<String> for BackendKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BackendKind> for String {
    fn from(value: BackendKind) -> Self {
        value.0.into_owned()
    }
}

/// Implementation family of a backend.
///
/// Decides whether the parser facade may switch to a backend on its own:
/// switching to an in-process engine is silent, switching between native
/// bindings never happens implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendCategory {
    /// Binding to a native parsing runtime loading shared libraries.
    Native,
    /// Pure in-process grammar engine.
    InProcess,
}

impl fmt::Display for BackendCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::InProcess => write!(f, "in-process"),
        }
    }
}

/// The raw language value a backend kind expects from the facade.
///
/// The mapping from [`BackendKind`] to form is fixed when the backend is
/// registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageForm {
    /// A `tree_sitter::Language` struct.
    Struct,
    /// The plain language name.
    Name,
    /// The [`LanguageHandle`](crate::LanguageHandle) itself.
    Handle,
    /// A reference to an in-process [`Grammar`](crate::Grammar).
    Grammar,
}

/// Memoization key for loaded language handles.
///
/// Includes the effective backend so a handle loaded for one backend is never
/// served to another, even for the same nominal language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Backend the handle is loaded for
    pub backend: BackendKind,
    /// Library path or grammar identifier
    pub location: String,
    /// Exported symbol, for library-backed registrations
    pub symbol: Option<String>,
    /// Language name
    pub name: LanguageName,
}

impl CacheKey {
    /// Key for a handle loaded from a native library.
    #[must_use]
    pub fn library(
        backend: BackendKind,
        path: &std::path::Path,
        symbol: &str,
        name: LanguageName,
    ) -> Self {
        Self {
            backend,
            location: path.display().to_string(),
            symbol: Some(symbol.to_string()),
            name,
        }
    }

    /// Key for a handle backed by an in-process grammar.
    #[must_use]
    pub fn grammar(backend: BackendKind, source_identifier: &str, name: LanguageName) -> Self {
        Self {
            backend,
            location: source_identifier.to_string(),
            symbol: None,
            name,
        }
    }
}

// ============================================================================
// Positions
// ============================================================================

/// A zero-based row/column position.
///
/// Supports field access (`point.row`), index access (`point[0]`) and named
/// lookup (`point.get("column")`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Point {
    /// Zero-based line
    pub row: usize,
    /// Zero-based byte column
    pub column: usize,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Look up a coordinate by name (`row` or `column`).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<usize> {
        match key {
            "row" => Some(self.row),
            "column" => Some(self.column),
            _ => None,
        }
    }

    /// Compute the point of `byte` within `source`.
    ///
    /// Offsets past the end clamp to the end of the source.
    #[must_use]
    pub fn from_byte_offset(source: &str, byte: usize) -> Self {
        let prefix = &source.as_bytes()[..byte.min(source.len())];
        let row = prefix.iter().filter(|&&b| b == b'\n').count();
        let column = prefix
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(prefix.len(), |newline| prefix.len() - newline - 1);
        Self { row, column }
    }
}

impl Index<usize> for Point {
    type Output = usize;

    /// `0` is the row, `1` the column.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than 1.
    fn index(&self, index: usize) -> &usize {
        match index {
            0 => &self.row,
            1 => &self.column,
            _ => panic!("point index out of range: {index} (expected 0 or 1)"),
        }
    }
}

impl From<(usize, usize)> for Point {
    fn from((row, column): (usize, usize)) -> Self {
        Self { row, column }
    }
}

impl From<tree_sitter::Point> for Point {
    fn from(point: tree_sitter::Point) -> Self {
        Self {
            row: point.row,
            column: point.column,
        }
    }
}

impl From<Point> for tree_sitter::Point {
    fn from(point: Point) -> Self {
        Self {
            row: point.row,
            column: point.column,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Description of a text edit, recorded on a tree before an incremental
/// re-parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputEdit {
    /// Byte offset where the edit starts
    pub start_byte: usize,
    /// End of the replaced range in the old text
    pub old_end_byte: usize,
    /// End of the inserted range in the new text
    pub new_end_byte: usize,
    /// Position where the edit starts
    pub start_point: Point,
    /// End of the replaced range in the old text
    pub old_end_point: Point,
    /// End of the inserted range in the new text
    pub new_end_point: Point,
}

impl InputEdit {
    /// Build an edit from byte offsets, deriving the points from the old and
    /// new source text.
    #[must_use]
    pub fn from_bytes(
        old_source: &str,
        new_source: &str,
        start_byte: usize,
        old_end_byte: usize,
        new_end_byte: usize,
    ) -> Self {
        Self {
            start_byte,
            old_end_byte,
            new_end_byte,
            start_point: Point::from_byte_offset(old_source, start_byte),
            old_end_point: Point::from_byte_offset(old_source, old_end_byte),
            new_end_point: Point::from_byte_offset(new_source, new_end_byte),
        }
    }
}

impl From<&InputEdit> for tree_sitter::InputEdit {
    fn from(edit: &InputEdit) -> Self {
        Self {
            start_byte: edit.start_byte,
            old_end_byte: edit.old_end_byte,
            new_end_byte: edit.new_end_byte,
            start_position: edit.start_point.into(),
            old_end_position: edit.old_end_point.into(),
            new_end_position: edit.new_end_point.into(),
        }
    }
}

/// A library located on disk together with its expected exported symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatedGrammar {
    /// Absolute path to the shared library
    pub path: PathBuf,
    /// Exported language symbol
    pub symbol: String,
}
