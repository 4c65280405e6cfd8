//! Path and symbol validation for native grammar libraries.
//!
//! Everything here is a pure function: no file is opened or loaded. The
//! locator and the registry call these before a shared library path or an
//! exported symbol name is handed to a native backend.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Longest accepted language or backend name.
pub const MAX_NAME_LENGTH: usize = 64;

/// Longest accepted exported symbol name.
pub const MAX_SYMBOL_LENGTH: usize = 128;

/// Conventional prefix of exported tree-sitter language functions.
pub const SYMBOL_PREFIX: &str = "tree_sitter_";

/// Why a candidate library path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Leading or trailing whitespace.
    Whitespace,
    /// Contains a `..` segment.
    Traversal,
    /// Extension is not the platform's shared-library suffix.
    Extension,
    /// Path is relative.
    NotAbsolute,
    /// Contains characters outside the allowed set.
    InvalidCharacters,
    /// Not inside any trusted directory.
    UntrustedDirectory,
    /// Nothing exists at the path.
    NotFound,
}

impl RejectionReason {
    /// Stable identifier for programmatic filtering.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Traversal => "traversal",
            Self::Extension => "extension",
            Self::NotAbsolute => "not_absolute",
            Self::InvalidCharacters => "invalid_characters",
            Self::UntrustedDirectory => "untrusted_directory",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Whitespace => "leading or trailing whitespace",
            Self::Traversal => "path traversal segment",
            Self::Extension => "not a native library for this platform",
            Self::NotAbsolute => "path is not absolute",
            Self::InvalidCharacters => "disallowed characters",
            Self::UntrustedDirectory => "outside trusted directories",
            Self::NotFound => "file does not exist",
        };
        f.write_str(text)
    }
}

fn is_identifier(
    name: &str,
    max_len: usize,
    first: impl Fn(char) -> bool,
    rest: impl Fn(char) -> bool,
) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if first(c) => {}
        _ => return false,
    }
    name.len() <= max_len && chars.all(rest)
}

/// Returns `true` for `^[a-z][a-z0-9_]*$` up to [`MAX_NAME_LENGTH`] bytes.
#[must_use]
pub fn safe_language_name(name: &str) -> bool {
    is_identifier(
        name,
        MAX_NAME_LENGTH,
        |c| c.is_ascii_lowercase(),
        |c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_',
    )
}

/// Backend names follow the same rule as language names.
#[must_use]
pub fn safe_backend_name(name: &str) -> bool {
    safe_language_name(name)
}

/// Returns `true` for a C identifier up to [`MAX_SYMBOL_LENGTH`] bytes.
#[must_use]
pub fn safe_symbol_name(name: &str) -> bool {
    is_identifier(
        name,
        MAX_SYMBOL_LENGTH,
        |c| c.is_ascii_alphabetic() || c == '_',
        |c| c.is_ascii_alphanumeric() || c == '_',
    )
}

/// Shared-library extension for the target OS, without the dot.
#[must_use]
pub fn native_library_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// Returns `true` if the path carries the platform's shared-library extension.
#[must_use]
pub fn has_native_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == native_library_extension())
}

/// Structural checks that hold for any library path, from any source.
///
/// Checked in order: whitespace, traversal, absoluteness, extension. The file
/// system is not consulted, so a path is rejected whether or not it exists.
///
/// # Errors
///
/// Returns the first [`RejectionReason`] that applies.
pub fn check_library_path(path: &Path) -> Result<(), RejectionReason> {
    let raw = path.to_str().ok_or(RejectionReason::InvalidCharacters)?;
    if raw.is_empty() {
        return Err(RejectionReason::NotAbsolute);
    }
    if raw.trim() != raw {
        return Err(RejectionReason::Whitespace);
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(RejectionReason::Traversal);
    }
    if !path.is_absolute() {
        return Err(RejectionReason::NotAbsolute);
    }
    if !has_native_extension(path) {
        return Err(RejectionReason::Extension);
    }
    Ok(())
}

/// Character-class check applied to environment-supplied paths.
///
/// Allows ASCII alphanumerics and `/ . _ - + @`; on Windows also `\` and `:`.
///
/// # Errors
///
/// Returns [`RejectionReason::InvalidCharacters`] on any other character.
pub fn check_character_class(path: &Path) -> Result<(), RejectionReason> {
    let raw = path.to_str().ok_or(RejectionReason::InvalidCharacters)?;
    let windows = cfg!(target_os = "windows");
    let allowed = |c: char| {
        c.is_ascii_alphanumeric()
            || matches!(c, '/' | '.' | '_' | '-' | '+' | '@')
            || (windows && matches!(c, '\\' | ':'))
    };
    if raw.chars().all(allowed) {
        Ok(())
    } else {
        Err(RejectionReason::InvalidCharacters)
    }
}

/// Returns `true` if `path` lies inside one of `trusted`.
///
/// Both sides are canonicalized when they exist so symlinks cannot smuggle a
/// path out of a trusted directory. Paths with `..` segments never qualify.
#[must_use]
pub fn within_trusted_directory(path: &Path, trusted: &[PathBuf]) -> bool {
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return false;
    }
    let candidate = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    trusted.iter().any(|dir| {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        candidate.starts_with(&dir)
    })
}

/// Normalize a library file name or symbol to the exported-symbol convention.
///
/// | input                        | output             |
/// |------------------------------|--------------------|
/// | `libtree-sitter-toml.so`     | `tree_sitter_toml` |
/// | `libtree_sitter_toml.dylib`  | `tree_sitter_toml` |
/// | `tree-sitter-c-sharp`        | `tree_sitter_c_sharp` |
/// | `tree_sitter_json`           | `tree_sitter_json` |
/// | `/usr/lib/toml.so`           | `tree_sitter_toml` |
///
/// Returns `None` if nothing identifier-like remains.
#[must_use]
pub fn derive_symbol_name(input: &str) -> Option<String> {
    let file_name = Path::new(input.trim()).file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    let normalized = stem.to_ascii_lowercase().replace('-', "_");
    if normalized.is_empty() {
        return None;
    }

    let symbol = if normalized.starts_with(SYMBOL_PREFIX) {
        normalized
    } else {
        format!("{SYMBOL_PREFIX}{normalized}")
    };

    (symbol.len() > SYMBOL_PREFIX.len() && safe_symbol_name(&symbol)).then_some(symbol)
}

/// Extract the language name from a library file name or symbol.
///
/// The inverse of [`derive_symbol_name`]: `libtree-sitter-toml.so` → `toml`.
#[must_use]
pub fn language_from_library_name(input: &str) -> Option<String> {
    let symbol = derive_symbol_name(input)?;
    let language = symbol.strip_prefix(SYMBOL_PREFIX)?;
    safe_language_name(language).then(|| language.to_string())
}

/// System directories where package managers install grammar libraries.
#[must_use]
pub fn default_trusted_directories() -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(target_os = "windows") {
        &[]
    } else if cfg!(target_os = "macos") {
        &["/opt/homebrew/lib", "/usr/local/lib", "/usr/lib"]
    } else {
        &[
            "/usr/lib",
            "/usr/lib64",
            "/usr/local/lib",
            "/usr/lib/x86_64-linux-gnu",
            "/usr/lib/aarch64-linux-gnu",
        ]
    };
    dirs.iter().map(PathBuf::from).collect()
}
