//! # Switchyard: one parsing API over many engines
//!
//! Switchyard lets code walk syntax trees without caring which engine built
//! them. A native tree-sitter grammar loaded from a shared library and a pure
//! in-process grammar produce the same [`Tree`] and [`Node`] surface.
//!
//! ## Pieces
//!
//! - [`LanguageRegistry`] - backends, per-backend language registrations and
//!   a thread-safe cache of loaded [`LanguageHandle`]s
//! - [`Parser`] - binds to one backend, explicitly or automatically, and
//!   reconciles language handles loaded for another backend
//! - [`Tree`] / [`Node`] - the unified traversal API with capability-driven
//!   fallbacks
//! - [`GrammarLocator`] - finds grammar libraries through environment
//!   overrides and well-known directories, rejecting unsafe paths
//! - [`conformance::check`] - reports whether a backend declares the surface
//!   the facade relies on
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use switchyard::{
//!     BackendKind, Grammar, GrammarError, GrammarTree, GrammarTreeBuilder, LanguageName,
//!     LanguageRegistry, Parser, Registration,
//! };
//!
//! /// Every space-separated word becomes a `word` node.
//! #[derive(Debug)]
//! struct Words;
//!
//! impl Grammar for Words {
//!     fn name(&self) -> &str {
//!         "words"
//!     }
//!
//!     fn parse(&self, source: &str) -> Result<GrammarTree, GrammarError> {
//!         let mut builder = GrammarTreeBuilder::new("words");
//!         builder.open("text", 0);
//!         let mut offset = 0;
//!         for word in source.split(' ') {
//!             if !word.is_empty() {
//!                 builder.leaf("word", offset, offset + word.len());
//!             }
//!             offset += word.len() + 1;
//!         }
//!         builder.close(source.len());
//!         builder.build()
//!     }
//! }
//!
//! let registry = Arc::new(LanguageRegistry::default());
//! let words = LanguageName::new("words")?;
//! registry.register(
//!     words.clone(),
//!     BackendKind::GRAMMAR,
//!     Registration::grammar(Arc::new(Words), "words")?,
//! )?;
//!
//! let mut parser = Parser::for_language(&registry, &words, None)?;
//! let tree = parser.parse("hello switchyard")?;
//! let root = tree.root_node().expect("non-empty tree");
//!
//! assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
//! assert_eq!(root.child_count(), 2);
//! assert_eq!(root.child(1).map(|n| n.text().into_owned()), Some("switchyard".into()));
//! assert_eq!(root.child(1).map(|n| n.start_point().column), Some(6));
//! # Ok::<(), switchyard::Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod conformance;
pub mod context;
mod error;
pub mod language;
pub mod locator;
mod parser;
pub mod registry;
pub mod security;
mod tree;
mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{
    Backend, BackendManifest, BackendNode, BackendParser, BackendTree, Capabilities, Construct,
    Grammar, GrammarBackend, GrammarTree, GrammarTreeBuilder, NativeNode, NativeTree,
    NodeIdentity, RawLanguage, TreeSitterBackend,
};
pub use config::{EnvPathPolicy, LocatorConfig, SwitchyardConfig};
pub use conformance::ConformanceReport;
pub use error::{Error, ErrorCategory, GrammarError, Result};
pub use language::{LanguageHandle, LanguagePayload, Provenance, Registration};
pub use locator::{Discovery, GrammarLocator};
pub use parser::Parser;
pub use registry::{BackendTag, LanguageRegistry, ResolvedBackend};
pub use tree::{Node, Tree};
pub use types::{
    BackendCategory, BackendKind, CacheKey, InputEdit, LanguageForm, LanguageName,
    LocatedGrammar, Point,
};
