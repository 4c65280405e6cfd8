//! Registrations and loaded language handles.
//!
//! A [`Registration`] says where a grammar comes from for one backend. A
//! [`LanguageHandle`] is the result of loading it: backend-tagged, immutable,
//! and carrying enough [`Provenance`] to be reloaded for another backend.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{Grammar, RawLanguage};
use crate::error::{Error, Result};
use crate::security::path::{check_library_path, derive_symbol_name, safe_symbol_name};
use crate::types::{BackendCategory, BackendKind, CacheKey, LanguageForm, LanguageName};

/// Backend-specific configuration for one (language, backend) slot.
///
/// Build through [`Registration::library`] or [`Registration::grammar`]; the
/// registry re-validates on [`register`](crate::LanguageRegistry::register),
/// so an invalid registration never reaches a backend.
#[derive(Debug, Clone)]
pub enum Registration {
    /// Native grammar in a shared library.
    Library {
        /// Absolute library path
        path: PathBuf,
        /// Exported language symbol
        symbol: String,
    },
    /// In-process grammar engine.
    Grammar {
        /// The engine
        grammar: Arc<dyn Grammar>,
        /// Stable identifier used in cache keys and diagnostics
        source_identifier: String,
    },
}

impl Registration {
    /// Library registration. Without an explicit symbol, the symbol is derived
    /// from the file name (`libtree-sitter-toml.so` → `tree_sitter_toml`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the path fails structural validation,
    /// the symbol is unsafe, or no symbol can be derived.
    pub fn library(path: impl Into<PathBuf>, symbol: Option<&str>) -> Result<Self> {
        let path = path.into();
        let symbol = match symbol {
            Some(symbol) => symbol.to_string(),
            None => path
                .to_str()
                .and_then(derive_symbol_name)
                .ok_or_else(|| {
                    Error::configuration(format!(
                        "cannot derive a language symbol from {}",
                        path.display()
                    ))
                })?,
        };
        let registration = Self::Library { path, symbol };
        registration.validate()?;
        Ok(registration)
    }

    /// In-process grammar registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the identifier is blank.
    pub fn grammar(grammar: Arc<dyn Grammar>, source_identifier: impl Into<String>) -> Result<Self> {
        let registration = Self::Grammar {
            grammar,
            source_identifier: source_identifier.into(),
        };
        registration.validate()?;
        Ok(registration)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Self::Library { path, symbol } => {
                check_library_path(path).map_err(|reason| {
                    Error::configuration(format!(
                        "unsafe library path {}: {reason}",
                        path.display()
                    ))
                })?;
                if !safe_symbol_name(symbol) {
                    return Err(Error::configuration(format!(
                        "unsafe symbol name `{symbol}`"
                    )));
                }
            }
            Self::Grammar {
                source_identifier, ..
            } => {
                if source_identifier.trim().is_empty() {
                    return Err(Error::configuration(
                        "grammar registration needs a source identifier",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Category of backend able to serve this registration.
    #[must_use]
    pub fn category(&self) -> BackendCategory {
        match self {
            Self::Library { .. } => BackendCategory::Native,
            Self::Grammar { .. } => BackendCategory::InProcess,
        }
    }

    /// Where a handle loaded from this registration came from.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        match self {
            Self::Library { path, symbol } => Provenance::Library {
                path: path.clone(),
                symbol: symbol.clone(),
            },
            Self::Grammar {
                source_identifier, ..
            } => Provenance::Grammar {
                source_identifier: source_identifier.clone(),
            },
        }
    }

    /// Cache key for loading this registration with `backend`.
    #[must_use]
    pub fn cache_key(&self, backend: BackendKind, name: LanguageName) -> CacheKey {
        match self {
            Self::Library { path, symbol } => CacheKey::library(backend, path, symbol, name),
            Self::Grammar {
                source_identifier, ..
            } => CacheKey::grammar(backend, source_identifier, name),
        }
    }
}

impl PartialEq for Registration {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Library { path, symbol },
                Self::Library {
                    path: other_path,
                    symbol: other_symbol,
                },
            ) => path == other_path && symbol == other_symbol,
            (
                Self::Grammar {
                    grammar,
                    source_identifier,
                },
                Self::Grammar {
                    grammar: other_grammar,
                    source_identifier: other_identifier,
                },
            ) => Arc::ptr_eq(grammar, other_grammar) && source_identifier == other_identifier,
            _ => false,
        }
    }
}

/// Where a loaded language came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Loaded from a shared library; can be reloaded by any native backend.
    Library {
        /// Library path
        path: PathBuf,
        /// Exported symbol
        symbol: String,
    },
    /// An in-process grammar; cannot be reloaded by a native backend.
    Grammar {
        /// Grammar identifier
        source_identifier: String,
    },
}

impl Provenance {
    /// Library path and symbol, when the language can be reloaded from disk.
    #[must_use]
    pub fn library(&self) -> Option<(&Path, &str)> {
        match self {
            Self::Library { path, symbol } => Some((path.as_path(), symbol.as_str())),
            Self::Grammar { .. } => None,
        }
    }
}

/// The backend's own language value.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum LanguagePayload {
    /// A tree-sitter language.
    TreeSitter(tree_sitter::Language),
    /// An in-process grammar engine.
    Grammar(Arc<dyn Grammar>),
    /// Backend identifies languages by name only.
    Named,
    /// Backend-specific value.
    Opaque(Arc<dyn Any + Send + Sync>),
}

#[derive(Debug)]
struct HandleInner {
    name: LanguageName,
    backend: BackendKind,
    provenance: Provenance,
    payload: LanguagePayload,
}

/// A loaded grammar, tagged with the backend it was loaded for.
///
/// Cloning is cheap and preserves identity; see [`LanguageHandle::ptr_eq`].
#[derive(Clone)]
pub struct LanguageHandle {
    inner: Arc<HandleInner>,
}

impl LanguageHandle {
    /// Create a handle. Called by backends from
    /// [`Backend::load_language`](crate::Backend::load_language).
    #[must_use]
    pub fn new(
        name: LanguageName,
        backend: BackendKind,
        provenance: Provenance,
        payload: LanguagePayload,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                name,
                backend,
                provenance,
                payload,
            }),
        }
    }

    /// Language name.
    #[must_use]
    pub fn name(&self) -> &LanguageName {
        &self.inner.name
    }

    /// Backend this handle was loaded for.
    #[must_use]
    pub fn backend(&self) -> &BackendKind {
        &self.inner.backend
    }

    /// Where the grammar came from.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.inner.provenance
    }

    /// The backend's own language value.
    #[must_use]
    pub fn payload(&self) -> &LanguagePayload {
        &self.inner.payload
    }

    /// Returns `true` if both handles are the same loaded object.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Unwrap into the raw value a backend with `form` expects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the payload cannot take that form.
    pub fn unwrap_for(&self, form: LanguageForm) -> Result<RawLanguage<'_>> {
        match (form, &self.inner.payload) {
            (LanguageForm::Struct, LanguagePayload::TreeSitter(language)) => {
                Ok(RawLanguage::TreeSitter(language))
            }
            (LanguageForm::Grammar, LanguagePayload::Grammar(grammar)) => {
                Ok(RawLanguage::Grammar(grammar))
            }
            (LanguageForm::Name, _) => Ok(RawLanguage::Name(self.inner.name.as_str())),
            (LanguageForm::Handle, _) => Ok(RawLanguage::Handle(self)),
            (form, payload) => Err(Error::configuration(format!(
                "language `{}` loaded for `{}` cannot be unwrapped to {form:?} (payload is {})",
                self.inner.name,
                self.inner.backend,
                payload_label(payload)
            ))),
        }
    }
}

fn payload_label(payload: &LanguagePayload) -> &'static str {
    match payload {
        LanguagePayload::TreeSitter(_) => "a tree-sitter language",
        LanguagePayload::Grammar(_) => "an in-process grammar",
        LanguagePayload::Named => "a name",
        LanguagePayload::Opaque(_) => "an opaque value",
    }
}

impl fmt::Debug for LanguageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageHandle")
            .field("name", &self.inner.name)
            .field("backend", &self.inner.backend)
            .field("provenance", &self.inner.provenance)
            .finish_non_exhaustive()
    }
}
