//! Backend-independent trees and nodes.
//!
//! [`Tree`] and [`Node`] wrap whatever a backend produced and expose one
//! traversal API. Each optional accessor is answered in order by:
//!
//! 1. the native method, if the backend's [`Capabilities`] declare it
//! 2. a value derived from the source text or the tree structure
//! 3. a neutral default (`is_missing` is `false`, `is_named` is `true`)
//!
//! Backend-specific features outside this surface are reached through
//! [`Node::native`] and [`Tree::native`].

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use crate::backend::{BackendTree, BoxedNode, Capabilities, NativeNode, NativeTree, NodeIdentity};
use crate::error::{Error, Result};
use crate::types::{BackendKind, InputEdit, Point};

/// A parse result together with its source text.
pub struct Tree {
    inner: Box<dyn BackendTree>,
    source: String,
    backend: BackendKind,
    capabilities: Capabilities,
}

impl Tree {
    pub(crate) fn new(
        inner: Box<dyn BackendTree>,
        source: String,
        backend: BackendKind,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            inner,
            source,
            backend,
            capabilities,
        }
    }

    /// Root node, or `None` if the backend produced an empty tree.
    #[must_use]
    pub fn root_node(&self) -> Option<Node<'_>> {
        self.inner
            .root_node()
            .map(|inner| Node::new(inner, &self.source, self.capabilities))
    }

    /// Record an edit ahead of [`Parser::parse_string`](crate::Parser::parse_string).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the backend cannot edit trees.
    pub fn edit(&mut self, edit: &InputEdit) -> Result<()> {
        if !self.capabilities.editing {
            return Err(Error::not_supported(format!(
                "backend `{}` does not support tree editing",
                self.backend
            )));
        }
        self.inner.edit(edit)
    }

    /// Returns `true` if [`Tree::edit`] is supported.
    #[must_use]
    pub fn supports_editing(&self) -> bool {
        self.capabilities.editing
    }

    /// Source text the tree was parsed from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Backend that produced the tree.
    #[must_use]
    pub fn backend(&self) -> &BackendKind {
        &self.backend
    }

    /// Capability table of the producing backend.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The backend's own tree object.
    #[must_use]
    pub fn native(&self) -> NativeTree<'_> {
        self.inner.native()
    }

    pub(crate) fn backend_tree(&self) -> &dyn BackendTree {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("backend", &self.backend)
            .field("source_len", &self.source.len())
            .field("inner", &self.inner)
            .finish()
    }
}

/// A syntax node borrowed from a [`Tree`].
///
/// Equality and hashing follow node identity: two `Node`s are equal when
/// they wrap the same native node of the same tree, regardless of how they
/// were reached. Use [`Node::cmp_position`] to order nodes by position.
pub struct Node<'t> {
    inner: BoxedNode<'t>,
    source: &'t str,
    caps: Capabilities,
}

impl<'t> Node<'t> {
    fn new(inner: BoxedNode<'t>, source: &'t str, caps: Capabilities) -> Self {
        Self {
            inner,
            source,
            caps,
        }
    }

    fn wrap(&self, inner: BoxedNode<'t>) -> Self {
        Self::new(inner, self.source, self.caps)
    }

    /// Node type name.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.inner.kind()
    }

    /// Start byte.
    #[must_use]
    pub fn start_byte(&self) -> usize {
        self.inner.start_byte()
    }

    /// End byte (exclusive).
    #[must_use]
    pub fn end_byte(&self) -> usize {
        self.inner.end_byte()
    }

    /// `start_byte..end_byte`.
    #[must_use]
    pub fn byte_range(&self) -> Range<usize> {
        self.start_byte()..self.end_byte()
    }

    /// Start position. Computed from the source when the backend does not
    /// track points.
    #[must_use]
    pub fn start_point(&self) -> Point {
        self.caps
            .points
            .then(|| self.inner.start_point())
            .flatten()
            .unwrap_or_else(|| Point::from_byte_offset(self.source, self.start_byte()))
    }

    /// End position. Computed from the source when the backend does not
    /// track points.
    #[must_use]
    pub fn end_point(&self) -> Point {
        self.caps
            .points
            .then(|| self.inner.end_point())
            .flatten()
            .unwrap_or_else(|| Point::from_byte_offset(self.source, self.end_byte()))
    }

    /// Node text. Sliced from the source unless the backend supplies it.
    ///
    /// A range that does not fall on character boundaries is decoded lossily.
    #[must_use]
    pub fn text(&self) -> Cow<'t, str> {
        if self.caps.native_text
            && let Some(text) = self.inner.text()
        {
            return Cow::Owned(text);
        }
        let end = self.end_byte().min(self.source.len());
        let start = self.start_byte().min(end);
        match self.source.get(start..end) {
            Some(text) => Cow::Borrowed(text),
            None => String::from_utf8_lossy(&self.source.as_bytes()[start..end]),
        }
    }

    /// Whether this node or a descendant is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.inner.has_error()
    }

    /// Whether the node was inserted by error recovery.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.caps.missing_flag && self.inner.is_missing().unwrap_or(false)
    }

    /// Whether the node is named. Backends without the distinction report
    /// every node as named.
    #[must_use]
    pub fn is_named(&self) -> bool {
        !self.caps.named_flag || self.inner.is_named().unwrap_or(true)
    }

    /// Number of children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.inner.child_count()
    }

    /// Child at `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<Node<'t>> {
        self.inner.child(index).map(|inner| self.wrap(inner))
    }

    /// All children in order.
    #[must_use]
    pub fn children(&self) -> Vec<Node<'t>> {
        (0..self.child_count())
            .filter_map(|i| self.child(i))
            .collect()
    }

    /// Named children in order.
    #[must_use]
    pub fn named_children(&self) -> Vec<Node<'t>> {
        self.children()
            .into_iter()
            .filter(Node::is_named)
            .collect()
    }

    /// Number of named children.
    #[must_use]
    pub fn named_child_count(&self) -> usize {
        (0..self.child_count())
            .filter_map(|i| self.child(i))
            .filter(Node::is_named)
            .count()
    }

    /// Parent node, if the backend tracks parents.
    #[must_use]
    pub fn parent(&self) -> Option<Node<'t>> {
        if !self.caps.parent {
            return None;
        }
        self.inner.parent().map(|inner| self.wrap(inner))
    }

    /// Next sibling. Derived from the parent's children when the backend has
    /// no sibling links, which scans the parent on every call.
    #[must_use]
    pub fn next_sibling(&self) -> Option<Node<'t>> {
        if self.caps.siblings {
            return self.inner.next_sibling().map(|inner| self.wrap(inner));
        }
        let (parent, position) = self.position_in_parent()?;
        parent.child(position + 1)
    }

    /// Previous sibling. Derived from the parent's children when the backend
    /// has no sibling links, which scans the parent on every call.
    #[must_use]
    pub fn prev_sibling(&self) -> Option<Node<'t>> {
        if self.caps.siblings {
            return self.inner.prev_sibling().map(|inner| self.wrap(inner));
        }
        let (parent, position) = self.position_in_parent()?;
        parent.child(position.checked_sub(1)?)
    }

    fn position_in_parent(&self) -> Option<(Node<'t>, usize)> {
        let parent = self.parent()?;
        let identity = self.identity();
        let position = (0..parent.child_count())
            .find(|&i| parent.child(i).is_some_and(|c| c.identity() == identity))?;
        Some((parent, position))
    }

    /// Child labelled with `field`, if the backend supports field lookup.
    #[must_use]
    pub fn child_by_field_name(&self, field: &str) -> Option<Node<'t>> {
        if !self.caps.field_lookup {
            return None;
        }
        self.inner
            .child_by_field_name(field)
            .map(|inner| self.wrap(inner))
    }

    /// This node followed by all its descendants, in pre-order.
    #[must_use]
    pub fn descendants(&self) -> Vec<Node<'t>> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Identity of the wrapped native node.
    #[must_use]
    pub fn identity(&self) -> NodeIdentity {
        self.inner.identity()
    }

    /// The backend's own node object.
    #[must_use]
    pub fn native(&self) -> NativeNode<'t> {
        self.inner.native()
    }

    /// `(start_byte, end_byte, kind)`, the key [`Node::cmp_position`] orders by.
    #[must_use]
    pub fn position_key(&self) -> (usize, usize, &str) {
        (self.start_byte(), self.end_byte(), self.kind())
    }

    /// Order by start byte, then end byte, then kind.
    #[must_use]
    pub fn cmp_position(&self, other: &Node<'_>) -> Ordering {
        self.position_key().cmp(&other.position_key())
    }
}

impl Clone for Node<'_> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.boxed_clone(),
            source: self.source,
            caps: self.caps,
        }
    }
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Node<'_> {}

impl Hash for Node<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node({} {}..{})",
            self.kind(),
            self.start_byte(),
            self.end_byte()
        )
    }
}
