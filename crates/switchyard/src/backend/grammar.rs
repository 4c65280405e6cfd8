//! In-process grammar backend.
//!
//! Grammar engines that run inside the process implement [`Grammar`] and
//! produce a [`GrammarTree`]: a flat arena of nodes built with
//! [`GrammarTreeBuilder`]. Arena trees know parents, siblings, fields and the
//! missing/named flags, but not row/column points or node text; the
//! unification layer fills those in from the source.

use std::fmt;
use std::sync::Arc;

use crate::backend::{
    Backend, BackendManifest, BackendNode, BackendParser, BackendTree, BoxedNode, NativeNode,
    NativeTree, NodeIdentity, RawLanguage,
};
use crate::error::{Error, GrammarError, Result};
use crate::language::{LanguageHandle, LanguagePayload, Registration};
use crate::types::{BackendCategory, BackendKind, LanguageForm, LanguageName};

/// Kind given to nodes created with [`GrammarTreeBuilder::error`].
pub const ERROR_KIND: &str = "ERROR";

/// A pure in-process grammar engine.
pub trait Grammar: Send + Sync + fmt::Debug {
    /// Grammar name, used in diagnostics.
    fn name(&self) -> &str;

    /// Parse `source` into an arena tree.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] if the engine cannot produce any tree.
    /// Recoverable syntax errors belong in the tree as error nodes.
    fn parse(&self, source: &str) -> std::result::Result<GrammarTree, GrammarError>;
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: String,
    start: usize,
    end: usize,
    named: bool,
    missing: bool,
    error: bool,
    field: Option<String>,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Parse result of an in-process grammar.
///
/// Node 0 is the root. Children always have a higher index than their parent.
#[derive(Debug, Clone, Default)]
pub struct GrammarTree {
    nodes: Vec<NodeData>,
}

impl GrammarTree {
    /// Root node, or `None` for an empty tree.
    #[must_use]
    pub fn root(&self) -> Option<GrammarNode<'_>> {
        (!self.nodes.is_empty()).then_some(GrammarNode {
            tree: self,
            index: 0,
        })
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// S-expression of the named nodes, with field labels.
    #[must_use]
    pub fn sexp(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root() {
            write_sexp(root, &mut out);
        }
        out
    }

    fn data(&self, index: usize) -> &NodeData {
        &self.nodes[index]
    }
}

fn write_sexp(node: GrammarNode<'_>, out: &mut String) {
    if node.is_missing() {
        out.push_str("(MISSING ");
        out.push_str(node.kind());
        out.push(')');
        return;
    }
    out.push('(');
    out.push_str(node.kind());
    for child in (0..node.child_count()).filter_map(|i| node.child(i)) {
        if !child.is_named() && !child.is_missing() {
            continue;
        }
        out.push(' ');
        if let Some(field) = child.field_name() {
            out.push_str(field);
            out.push_str(": ");
        }
        write_sexp(child, out);
    }
    out.push(')');
}

/// Builds a [`GrammarTree`] from a sequence of open/close calls.
///
/// ```
/// use switchyard::GrammarTreeBuilder;
///
/// let mut builder = GrammarTreeBuilder::new("assign");
/// builder.open("program", 0);
/// builder.open("assignment", 0);
/// builder.leaf_field("name", "identifier", 0, 1);
/// builder.anonymous("=", 2, 3);
/// builder.leaf_field("value", "number", 4, 6);
/// builder.close(6);
/// builder.close(6);
/// let tree = builder.build().unwrap();
///
/// assert_eq!(tree.sexp(), "(program (assignment name: (identifier) value: (number)))");
/// ```
#[derive(Debug)]
pub struct GrammarTreeBuilder {
    grammar: String,
    nodes: Vec<NodeData>,
    stack: Vec<usize>,
    problem: Option<String>,
}

impl GrammarTreeBuilder {
    /// Start an empty tree for the named grammar.
    #[must_use]
    pub fn new(grammar: impl Into<String>) -> Self {
        Self {
            grammar: grammar.into(),
            nodes: Vec::new(),
            stack: Vec::new(),
            problem: None,
        }
    }

    /// Open a named node starting at `start`.
    pub fn open(&mut self, kind: &str, start: usize) -> &mut Self {
        self.open_node(kind, start, None)
    }

    /// Open a named node labelled with `field` in its parent.
    pub fn open_field(&mut self, field: &str, kind: &str, start: usize) -> &mut Self {
        self.open_node(kind, start, Some(field))
    }

    /// Close the innermost open node at `end`.
    pub fn close(&mut self, end: usize) -> &mut Self {
        match self.stack.pop() {
            Some(index) => self.nodes[index].end = end,
            None => self.record_problem("close without a matching open"),
        }
        self
    }

    /// Add a named leaf.
    pub fn leaf(&mut self, kind: &str, start: usize, end: usize) -> &mut Self {
        self.push(kind, start, end, true, None)
    }

    /// Add a named leaf labelled with `field`.
    pub fn leaf_field(&mut self, field: &str, kind: &str, start: usize, end: usize) -> &mut Self {
        self.push(kind, start, end, true, Some(field))
    }

    /// Add an anonymous token such as punctuation.
    pub fn anonymous(&mut self, kind: &str, start: usize, end: usize) -> &mut Self {
        self.push(kind, start, end, false, None)
    }

    /// Add a zero-width node the grammar expected but did not find.
    pub fn missing(&mut self, kind: &str, at: usize) -> &mut Self {
        self.push(kind, at, at, true, None);
        if let Some(last) = self.nodes.last_mut() {
            last.missing = true;
            last.error = true;
        }
        self
    }

    /// Add an error node covering unparseable input.
    pub fn error(&mut self, start: usize, end: usize) -> &mut Self {
        self.push(ERROR_KIND, start, end, true, None);
        if let Some(last) = self.nodes.last_mut() {
            last.error = true;
        }
        self
    }

    /// Finish the tree, propagating error flags to ancestors.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] if nodes are still open, a close had no
    /// matching open, or there is more than one root.
    pub fn build(mut self) -> std::result::Result<GrammarTree, GrammarError> {
        if let Some(problem) = self.problem.take() {
            return Err(GrammarError::new(self.grammar, problem, 0));
        }
        if let Some(&open) = self.stack.last() {
            let data = &self.nodes[open];
            return Err(GrammarError::new(
                self.grammar,
                format!("unclosed `{}` node", data.kind),
                data.start,
            ));
        }
        for index in (1..self.nodes.len()).rev() {
            if self.nodes[index].error
                && let Some(parent) = self.nodes[index].parent
            {
                self.nodes[parent].error = true;
            }
        }
        Ok(GrammarTree { nodes: self.nodes })
    }

    fn open_node(&mut self, kind: &str, start: usize, field: Option<&str>) -> &mut Self {
        self.push(kind, start, start, true, field);
        let index = self.nodes.len() - 1;
        self.stack.push(index);
        self
    }

    fn push(
        &mut self,
        kind: &str,
        start: usize,
        end: usize,
        named: bool,
        field: Option<&str>,
    ) -> &mut Self {
        let parent = self.stack.last().copied();
        if parent.is_none() && !self.nodes.is_empty() {
            self.record_problem("tree has more than one root");
        }
        let index = self.nodes.len();
        self.nodes.push(NodeData {
            kind: kind.to_string(),
            start,
            end,
            named,
            missing: false,
            error: false,
            field: field.map(str::to_string),
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        self
    }

    fn record_problem(&mut self, problem: &str) {
        if self.problem.is_none() {
            self.problem = Some(problem.to_string());
        }
    }
}

/// A node in a [`GrammarTree`].
#[derive(Clone, Copy)]
pub struct GrammarNode<'t> {
    tree: &'t GrammarTree,
    index: usize,
}

impl<'t> GrammarNode<'t> {
    fn at(&self, index: usize) -> Self {
        Self {
            tree: self.tree,
            index,
        }
    }

    fn data(&self) -> &'t NodeData {
        self.tree.data(self.index)
    }

    /// Arena index of this node.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Node type name.
    #[must_use]
    pub fn kind(&self) -> &'t str {
        &self.data().kind
    }

    /// Start byte.
    #[must_use]
    pub fn start_byte(&self) -> usize {
        self.data().start
    }

    /// End byte (exclusive).
    #[must_use]
    pub fn end_byte(&self) -> usize {
        self.data().end
    }

    /// Number of children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.data().children.len()
    }

    /// Child at `index`.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<Self> {
        self.data().children.get(index).map(|&i| self.at(i))
    }

    /// Whether the node is named.
    #[must_use]
    pub fn is_named(&self) -> bool {
        self.data().named
    }

    /// Whether the node was inserted for an expected but absent token.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.data().missing
    }

    /// Whether this node or a descendant is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.data().error
    }

    /// Field label of this node in its parent.
    #[must_use]
    pub fn field_name(&self) -> Option<&'t str> {
        self.data().field.as_deref()
    }

    /// Parent node.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.data().parent.map(|i| self.at(i))
    }

    /// Next sibling.
    #[must_use]
    pub fn next_sibling(&self) -> Option<Self> {
        let (siblings, position) = self.position_in_parent()?;
        siblings.get(position + 1).map(|&i| self.at(i))
    }

    /// Previous sibling.
    #[must_use]
    pub fn prev_sibling(&self) -> Option<Self> {
        let (siblings, position) = self.position_in_parent()?;
        position
            .checked_sub(1)
            .and_then(|p| siblings.get(p))
            .map(|&i| self.at(i))
    }

    /// First child labelled with `field`.
    #[must_use]
    pub fn child_by_field_name(&self, field: &str) -> Option<Self> {
        self.data()
            .children
            .iter()
            .map(|&i| self.at(i))
            .find(|child| child.field_name() == Some(field))
    }

    fn position_in_parent(&self) -> Option<(&'t [usize], usize)> {
        let parent = self.data().parent?;
        let siblings = self.tree.data(parent).children.as_slice();
        let position = siblings.iter().position(|&i| i == self.index)?;
        Some((siblings, position))
    }
}

impl fmt::Debug for GrammarNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GrammarNode({} {}..{})",
            self.kind(),
            self.start_byte(),
            self.end_byte()
        )
    }
}

impl<'t> BackendNode<'t> for GrammarNode<'t> {
    fn kind(&self) -> &str {
        GrammarNode::kind(self)
    }

    fn start_byte(&self) -> usize {
        GrammarNode::start_byte(self)
    }

    fn end_byte(&self) -> usize {
        GrammarNode::end_byte(self)
    }

    fn child_count(&self) -> usize {
        GrammarNode::child_count(self)
    }

    fn child(&self, index: usize) -> Option<BoxedNode<'t>> {
        GrammarNode::child(self, index).map(boxed)
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity::of(self.tree, self.index)
    }

    fn native(&self) -> NativeNode<'t> {
        NativeNode::Grammar(*self)
    }

    fn boxed_clone(&self) -> BoxedNode<'t> {
        Box::new(*self)
    }

    fn has_error(&self) -> bool {
        GrammarNode::has_error(self)
    }

    fn is_missing(&self) -> Option<bool> {
        Some(GrammarNode::is_missing(self))
    }

    fn is_named(&self) -> Option<bool> {
        Some(GrammarNode::is_named(self))
    }

    fn parent(&self) -> Option<BoxedNode<'t>> {
        GrammarNode::parent(self).map(boxed)
    }

    fn next_sibling(&self) -> Option<BoxedNode<'t>> {
        GrammarNode::next_sibling(self).map(boxed)
    }

    fn prev_sibling(&self) -> Option<BoxedNode<'t>> {
        GrammarNode::prev_sibling(self).map(boxed)
    }

    fn child_by_field_name(&self, field: &str) -> Option<BoxedNode<'t>> {
        GrammarNode::child_by_field_name(self, field).map(boxed)
    }
}

fn boxed(node: GrammarNode<'_>) -> BoxedNode<'_> {
    Box::new(node)
}

impl BackendTree for GrammarTree {
    fn root_node(&self) -> Option<BoxedNode<'_>> {
        self.root().map(boxed)
    }

    fn native(&self) -> NativeTree<'_> {
        NativeTree::Grammar(self)
    }
}

#[derive(Debug, Default)]
struct GrammarParser {
    grammar: Option<Arc<dyn Grammar>>,
}

impl BackendParser for GrammarParser {
    fn set_language(&mut self, language: RawLanguage<'_>) -> Result<()> {
        match language {
            RawLanguage::Grammar(grammar) => {
                self.grammar = Some(Arc::clone(grammar));
                Ok(())
            }
            other => Err(Error::configuration(format!(
                "grammar parser expects an in-process grammar, got {:?}",
                other.form()
            ))),
        }
    }

    fn parse(&mut self, source: &str) -> Result<Box<dyn BackendTree>> {
        let grammar = self
            .grammar
            .as_ref()
            .ok_or_else(|| Error::configuration("no grammar assigned to the parser"))?;
        let tree = grammar.parse(source)?;
        Ok(Box::new(tree))
    }
}

/// Backend for in-process [`Grammar`] engines.
#[derive(Debug, Clone)]
pub struct GrammarBackend {
    kind: BackendKind,
}

impl GrammarBackend {
    /// Backend registered as [`BackendKind::GRAMMAR`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_kind(BackendKind::GRAMMAR)
    }

    /// Backend registered under a custom kind, for hosting several grammar
    /// engine families side by side.
    #[must_use]
    pub fn with_kind(kind: BackendKind) -> Self {
        Self { kind }
    }
}

impl Default for GrammarBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for GrammarBackend {
    fn kind(&self) -> BackendKind {
        self.kind.clone()
    }

    fn category(&self) -> BackendCategory {
        BackendCategory::InProcess
    }

    fn language_form(&self) -> LanguageForm {
        LanguageForm::Grammar
    }

    fn manifest(&self) -> BackendManifest {
        BackendManifest::new()
            .with_language(["from_grammar", "name"])
            .with_parser(["new", "set_grammar", "parse"])
            .with_tree(["root"])
            .with_node([
                "type",
                "start_byte",
                "end_byte",
                "child_count",
                "child",
                "named",
                "has_error",
                "missing",
                "parent",
                "next_sibling",
                "previous_sibling",
                "field",
            ])
    }

    fn load_language(
        &self,
        name: &LanguageName,
        registration: &Registration,
    ) -> Result<LanguageHandle> {
        match registration {
            Registration::Grammar { grammar, .. } => Ok(LanguageHandle::new(
                name.clone(),
                self.kind.clone(),
                registration.provenance(),
                LanguagePayload::Grammar(Arc::clone(grammar)),
            )),
            Registration::Library { path, .. } => Err(Error::not_available(format!(
                "`{}` backend cannot load native library {} for `{name}`",
                self.kind,
                path.display()
            ))),
        }
    }

    fn new_parser(&self) -> Result<Box<dyn BackendParser>> {
        Ok(Box::new(GrammarParser::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Capabilities;
    use crate::testing::AssignmentGrammar;

    fn sample_tree() -> GrammarTree {
        AssignmentGrammar.parse("x = 1\ny = 22\n").expect("should parse")
    }

    #[test]
    fn builder_produces_nested_tree() {
        let tree = sample_tree();
        let root = tree.root().expect("root");

        assert_eq!(root.kind(), "program");
        assert_eq!(root.child_count(), 2);
        assert_eq!(
            tree.sexp(),
            "(program (assignment name: (identifier) value: (number)) \
             (assignment name: (identifier) value: (number)))"
        );
    }

    #[test]
    fn navigation_follows_arena_links() {
        let tree = sample_tree();
        let root = tree.root().expect("root");
        let first = root.child(0).expect("first assignment");
        let second = first.next_sibling().expect("second assignment");

        assert_eq!(second.start_byte(), 6);
        assert_eq!(second.prev_sibling().map(|n| n.index()), Some(first.index()));
        assert!(first.prev_sibling().is_none());
        assert!(second.next_sibling().is_none());
        assert_eq!(first.parent().map(|n| n.index()), Some(0));

        let value = second.child_by_field_name("value").expect("value field");
        assert_eq!((value.start_byte(), value.end_byte()), (10, 12));
    }

    #[test]
    fn error_flag_propagates_to_ancestors() {
        let mut builder = GrammarTreeBuilder::new("test");
        builder.open("program", 0);
        builder.open("assignment", 0);
        builder.leaf("identifier", 0, 1);
        builder.missing("number", 3);
        builder.close(3);
        builder.leaf("comment", 4, 8);
        builder.close(8);
        let tree = builder.build().expect("should build");

        let root = tree.root().expect("root");
        assert!(root.has_error());
        assert!(root.child(0).expect("assignment").has_error());
        assert!(!root.child(1).expect("comment").has_error());
        assert!(
            root.child(0)
                .and_then(|a| a.child(1))
                .expect("missing")
                .is_missing()
        );
    }

    #[test]
    fn builder_rejects_unclosed_nodes() {
        let mut builder = GrammarTreeBuilder::new("test");
        builder.open("program", 0);

        let error = builder.build().expect_err("unclosed");
        assert!(error.message.contains("unclosed `program`"));
    }

    #[test]
    fn builder_rejects_second_root() {
        let mut builder = GrammarTreeBuilder::new("test");
        builder.leaf("a", 0, 1);
        builder.leaf("b", 1, 2);

        let error = builder.build().expect_err("two roots");
        assert!(error.message.contains("more than one root"));
    }

    #[test]
    fn backend_rejects_library_registrations() {
        let backend = GrammarBackend::new();
        let path = format!(
            "/usr/lib/libtree-sitter-toml.{}",
            crate::security::path::native_library_extension()
        );
        let registration = Registration::library(path, None).expect("valid");
        let name = LanguageName::new("toml").expect("valid");

        let error = backend
            .load_language(&name, &registration)
            .expect_err("grammar backend cannot load libraries");
        assert!(matches!(error, Error::NotAvailable(_)));
    }

    #[test]
    fn parser_requires_grammar_before_parse() {
        let mut parser = GrammarBackend::new().new_parser().expect("parser");

        let error = parser.parse("x = 1").expect_err("no grammar");
        assert!(matches!(error, Error::Configuration(_)));
    }

    #[test]
    fn manifest_yields_structural_capabilities_only() {
        let caps = Capabilities::from_manifest(&GrammarBackend::new().manifest());

        assert!(caps.field_lookup);
        assert!(caps.parent);
        assert!(caps.siblings);
        assert!(caps.missing_flag);
        assert!(caps.named_flag);
        assert!(!caps.points);
        assert!(!caps.native_text);
        assert!(!caps.incremental);
        assert!(!caps.editing);
    }
}
