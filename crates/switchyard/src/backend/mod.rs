//! The backend module contract.
//!
//! A backend is one parsing engine family. It provides four constructs, each
//! behind a trait:
//!
//! - [`Backend`]: the factory. Loads languages and creates parsers.
//! - [`BackendParser`]: a live native parser.
//! - [`BackendTree`]: a native parse result.
//! - [`BackendNode`]: a native syntax node.
//!
//! Node and tree traits are two-tier: a few required methods every engine
//! has, and optional methods with `None` / no-op defaults. Anything outside
//! the unified surface is reached through the explicit escape hatches
//! [`BackendNode::native`] and [`BackendTree::native`].
//!
//! ## Adding a Backend
//!
//! 1. Implement the four traits
//! 2. Describe the surface in a [`BackendManifest`]
//! 3. Register with [`LanguageRegistry::register_backend`](crate::LanguageRegistry::register_backend)
//! 4. Check it with [`conformance::check`](crate::conformance::check)

pub mod grammar;
pub mod manifest;
pub mod treesitter;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::language::{LanguageHandle, Registration};
use crate::types::{BackendCategory, BackendKind, InputEdit, LanguageForm, LanguageName, Point};

pub use grammar::{Grammar, GrammarBackend, GrammarNode, GrammarTree, GrammarTreeBuilder};
pub use manifest::{BackendManifest, Capabilities, Construct};
pub use treesitter::TreeSitterBackend;

/// A boxed native node borrowing from its tree.
pub type BoxedNode<'t> = Box<dyn BackendNode<'t> + 't>;

/// Identity of a native node: which tree, which node.
///
/// Two wrappers are equal exactly when their identities are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    tree: usize,
    node: usize,
}

impl NodeIdentity {
    /// Combine a tree address and a per-tree node id.
    #[must_use]
    pub const fn new(tree: usize, node: usize) -> Self {
        Self { tree, node }
    }

    /// Identity derived from the address of the owning tree.
    #[must_use]
    pub fn of<T>(tree: &T, node: usize) -> Self {
        Self::new(std::ptr::from_ref(tree).addr(), node)
    }
}

/// A native node as seen through the unified surface.
///
/// Optional methods default to "not provided". Whether the unification layer
/// calls them at all is decided by the backend's [`Capabilities`].
pub trait BackendNode<'t>: fmt::Debug {
    /// Node type name.
    fn kind(&self) -> &str;

    /// Byte offset where the node starts.
    fn start_byte(&self) -> usize;

    /// Byte offset where the node ends (exclusive).
    fn end_byte(&self) -> usize;

    /// Number of children, named and anonymous.
    fn child_count(&self) -> usize;

    /// Child at `index`.
    fn child(&self, index: usize) -> Option<BoxedNode<'t>>;

    /// Identity of the wrapped native node.
    fn identity(&self) -> NodeIdentity;

    /// The backend's own node object.
    fn native(&self) -> NativeNode<'t>;

    /// A second box around the same native node.
    fn boxed_clone(&self) -> BoxedNode<'t>;

    /// Start position, if the engine tracks rows and columns.
    fn start_point(&self) -> Option<Point> {
        None
    }

    /// End position, if the engine tracks rows and columns.
    fn end_point(&self) -> Option<Point> {
        None
    }

    /// Node text, if the engine can produce it without the source.
    fn text(&self) -> Option<String> {
        None
    }

    /// Whether this node or a descendant is an error node.
    fn has_error(&self) -> bool {
        false
    }

    /// Whether the node was inserted by error recovery.
    fn is_missing(&self) -> Option<bool> {
        None
    }

    /// Whether the node is named (as opposed to an anonymous token).
    fn is_named(&self) -> Option<bool> {
        None
    }

    /// Parent node.
    fn parent(&self) -> Option<BoxedNode<'t>> {
        None
    }

    /// Next sibling.
    fn next_sibling(&self) -> Option<BoxedNode<'t>> {
        None
    }

    /// Previous sibling.
    fn prev_sibling(&self) -> Option<BoxedNode<'t>> {
        None
    }

    /// Child labelled with `field`.
    fn child_by_field_name(&self, field: &str) -> Option<BoxedNode<'t>> {
        let _ = field;
        None
    }
}

/// A native parse result.
pub trait BackendTree: fmt::Debug + Send + Sync {
    /// Root node, or `None` for a rootless tree.
    fn root_node(&self) -> Option<BoxedNode<'_>>;

    /// The backend's own tree object.
    fn native(&self) -> NativeTree<'_>;

    /// Record an edit ahead of an incremental re-parse.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] unless the backend overrides it.
    fn edit(&mut self, edit: &InputEdit) -> Result<()> {
        let _ = edit;
        Err(Error::not_supported(
            "incremental parsing is not supported by this backend",
        ))
    }
}

/// A live native parser.
pub trait BackendParser: Send {
    /// Assign the grammar, already unwrapped to the backend's [`LanguageForm`].
    ///
    /// # Errors
    ///
    /// Returns an error if the value has the wrong form or the engine rejects it.
    fn set_language(&mut self, language: RawLanguage<'_>) -> Result<()>;

    /// Parse `source` from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the engine produces no tree.
    fn parse(&mut self, source: &str) -> Result<Box<dyn BackendTree>>;

    /// Parse `source` reusing an edited tree from the same backend.
    ///
    /// Only called when the backend's capabilities declare incremental support.
    /// The default ignores the old tree.
    ///
    /// # Errors
    ///
    /// Same as [`BackendParser::parse`].
    fn reparse(&mut self, old_tree: &dyn BackendTree, source: &str) -> Result<Box<dyn BackendTree>> {
        let _ = old_tree;
        self.parse(source)
    }
}

/// A parsing engine family.
pub trait Backend: Send + Sync {
    /// Tag identifying this backend.
    fn kind(&self) -> BackendKind;

    /// Native binding or in-process engine.
    fn category(&self) -> BackendCategory;

    /// Raw language value the parser expects.
    fn language_form(&self) -> LanguageForm;

    /// Declared method surface.
    fn manifest(&self) -> BackendManifest;

    /// Whether the engine's runtime is present in this process.
    fn is_available(&self) -> bool {
        true
    }

    /// Load a language from a registration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAvailable`] if this backend cannot serve the
    /// registration.
    fn load_language(&self, name: &LanguageName, registration: &Registration)
    -> Result<LanguageHandle>;

    /// Create a native parser.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAvailable`] if the native runtime is missing.
    fn new_parser(&self) -> Result<Box<dyn BackendParser>>;
}

/// Escape hatch to a backend's own node object.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum NativeNode<'t> {
    /// A `tree_sitter::Node`.
    TreeSitter(tree_sitter::Node<'t>),
    /// A node of an in-process [`GrammarTree`].
    Grammar(GrammarNode<'t>),
    /// A node of a backend outside this crate.
    Other(&'t (dyn Any + Send + Sync)),
    /// Backend without a public node type.
    Opaque,
}

impl<'t> NativeNode<'t> {
    /// The node object of a backend outside this crate, if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&'t T> {
        match *self {
            Self::Other(node) => node.downcast_ref(),
            _ => None,
        }
    }
}

/// Escape hatch to a backend's own tree object.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub enum NativeTree<'a> {
    /// A `tree_sitter::Tree`.
    TreeSitter(&'a tree_sitter::Tree),
    /// An in-process [`GrammarTree`].
    Grammar(&'a GrammarTree),
    /// A tree of a backend outside this crate.
    Other(&'a (dyn Any + Send + Sync)),
    /// Backend without a public tree type.
    Opaque,
}

impl<'a> NativeTree<'a> {
    /// The tree object of a backend outside this crate, if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        match *self {
            Self::Other(tree) => tree.downcast_ref(),
            _ => None,
        }
    }
}

/// A language handle unwrapped into the value a backend parser expects.
#[derive(Debug, Clone, Copy)]
pub enum RawLanguage<'a> {
    /// [`LanguageForm::Struct`]
    TreeSitter(&'a tree_sitter::Language),
    /// [`LanguageForm::Name`]
    Name(&'a str),
    /// [`LanguageForm::Handle`]
    Handle(&'a LanguageHandle),
    /// [`LanguageForm::Grammar`]
    Grammar(&'a Arc<dyn Grammar>),
}

impl RawLanguage<'_> {
    /// The form this value has.
    #[must_use]
    pub fn form(&self) -> LanguageForm {
        match self {
            Self::TreeSitter(_) => LanguageForm::Struct,
            Self::Name(_) => LanguageForm::Name,
            Self::Handle(_) => LanguageForm::Handle,
            Self::Grammar(_) => LanguageForm::Grammar,
        }
    }
}
