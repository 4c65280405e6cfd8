//! Native tree-sitter backend.
//!
//! Library registrations are resolved against the grammars linked into this
//! build: the registered library must exist on disk, and its exported symbol
//! selects the linked `tree_sitter::Language`. The crate forbids `unsafe`, so
//! arbitrary shared objects are never opened at runtime.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::backend::{
    Backend, BackendManifest, BackendNode, BackendParser, BackendTree, BoxedNode, NativeNode,
    NativeTree, NodeIdentity, RawLanguage,
};
use crate::error::{Error, Result};
use crate::language::{LanguageHandle, LanguagePayload, Registration};
use crate::types::{BackendCategory, BackendKind, InputEdit, LanguageForm, LanguageName, Point};

/// Backend wrapping the `tree-sitter` crate.
#[derive(Clone)]
pub struct TreeSitterBackend {
    linked: HashMap<String, tree_sitter::Language>,
}

impl TreeSitterBackend {
    /// Backend with the grammars this crate links (`tree_sitter_rust`,
    /// `tree_sitter_c_sharp`).
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
            .with_grammar("tree_sitter_rust", tree_sitter_rust::LANGUAGE.into())
            .with_grammar("tree_sitter_c_sharp", tree_sitter_c_sharp::LANGUAGE.into())
    }

    /// Backend without any linked grammar.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            linked: HashMap::new(),
        }
    }

    /// Link another grammar under its exported symbol name.
    #[must_use]
    pub fn with_grammar(mut self, symbol: &str, language: tree_sitter::Language) -> Self {
        self.linked.insert(symbol.to_string(), language);
        self
    }

    /// Symbols this backend can resolve, sorted.
    #[must_use]
    pub fn linked_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.linked.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }
}

impl Default for TreeSitterBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TreeSitterBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeSitterBackend")
            .field("linked", &self.linked_symbols())
            .finish()
    }
}

fn check_abi(language: &tree_sitter::Language, symbol: &str) -> Result<()> {
    let version = language.version();
    if (tree_sitter::MIN_COMPATIBLE_LANGUAGE_VERSION..=tree_sitter::LANGUAGE_VERSION)
        .contains(&version)
    {
        Ok(())
    } else {
        Err(Error::not_available(format!(
            "`{symbol}` uses language ABI {version}, supported range is {}..={}",
            tree_sitter::MIN_COMPATIBLE_LANGUAGE_VERSION,
            tree_sitter::LANGUAGE_VERSION
        )))
    }
}

impl Backend for TreeSitterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TREE_SITTER
    }

    fn category(&self) -> BackendCategory {
        BackendCategory::Native
    }

    fn language_form(&self) -> LanguageForm {
        LanguageForm::Struct
    }

    fn manifest(&self) -> BackendManifest {
        BackendManifest::new()
            .with_language(["from_library", "name"])
            .with_parser(["new", "set_language", "parse", "reparse"])
            .with_tree(["root_node", "edit"])
            .with_node([
                "kind",
                "start_byte",
                "end_byte",
                "child_count",
                "child",
                "start_point",
                "end_point",
                "has_error",
                "is_missing",
                "is_named",
                "parent",
                "next_sibling",
                "prev_sibling",
                "child_by_field_name",
            ])
    }

    fn load_language(
        &self,
        name: &LanguageName,
        registration: &Registration,
    ) -> Result<LanguageHandle> {
        let Registration::Library { path, symbol } = registration else {
            return Err(Error::not_available(format!(
                "tree-sitter needs a native library for `{name}`, but it is registered as an in-process grammar"
            )));
        };

        if !path.is_file() {
            return Err(Error::not_available(format!(
                "grammar library {} for `{name}` does not exist",
                path.display()
            )));
        }

        let language = self.linked.get(symbol).cloned().ok_or_else(|| {
            Error::not_available(format!(
                "symbol `{symbol}` from {} is not linked into this build",
                path.display()
            ))
        })?;
        check_abi(&language, symbol)?;

        debug!(
            language = %name,
            path = %path.display(),
            symbol = %symbol,
            "Loaded tree-sitter language"
        );

        Ok(LanguageHandle::new(
            name.clone(),
            BackendKind::TREE_SITTER,
            registration.provenance(),
            LanguagePayload::TreeSitter(language),
        ))
    }

    fn new_parser(&self) -> Result<Box<dyn BackendParser>> {
        Ok(Box::new(TsParser {
            parser: tree_sitter::Parser::new(),
            has_language: false,
        }))
    }
}

struct TsParser {
    parser: tree_sitter::Parser,
    has_language: bool,
}

impl TsParser {
    fn run(&mut self, source: &str, old: Option<&tree_sitter::Tree>) -> Result<Box<dyn BackendTree>> {
        if !self.has_language {
            return Err(Error::configuration("no language assigned to the parser"));
        }
        let tree = self
            .parser
            .parse(source, old)
            .ok_or_else(|| Error::Parse("tree-sitter returned no tree".to_string()))?;
        Ok(Box::new(TsTree { tree }))
    }
}

impl BackendParser for TsParser {
    fn set_language(&mut self, language: RawLanguage<'_>) -> Result<()> {
        let RawLanguage::TreeSitter(language) = language else {
            return Err(Error::configuration(format!(
                "tree-sitter parser expects a language struct, got {:?}",
                language.form()
            )));
        };
        self.parser
            .set_language(language)
            .map_err(|e| Error::not_available(format!("tree-sitter rejected language: {e}")))?;
        self.has_language = true;
        Ok(())
    }

    fn parse(&mut self, source: &str) -> Result<Box<dyn BackendTree>> {
        self.run(source, None)
    }

    fn reparse(&mut self, old_tree: &dyn BackendTree, source: &str) -> Result<Box<dyn BackendTree>> {
        match old_tree.native() {
            NativeTree::TreeSitter(old) => self.run(source, Some(old)),
            _ => self.run(source, None),
        }
    }
}

#[derive(Debug)]
struct TsTree {
    tree: tree_sitter::Tree,
}

impl BackendTree for TsTree {
    fn root_node(&self) -> Option<BoxedNode<'_>> {
        Some(Box::new(TsNode {
            node: self.tree.root_node(),
            tree: &self.tree,
        }))
    }

    fn native(&self) -> NativeTree<'_> {
        NativeTree::TreeSitter(&self.tree)
    }

    fn edit(&mut self, edit: &InputEdit) -> Result<()> {
        self.tree.edit(&edit.into());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct TsNode<'t> {
    node: tree_sitter::Node<'t>,
    tree: &'t tree_sitter::Tree,
}

impl<'t> TsNode<'t> {
    fn wrap(&self, node: Option<tree_sitter::Node<'t>>) -> Option<BoxedNode<'t>> {
        node.map(|node| {
            Box::new(TsNode {
                node,
                tree: self.tree,
            }) as BoxedNode<'t>
        })
    }
}

impl<'t> BackendNode<'t> for TsNode<'t> {
    fn kind(&self) -> &str {
        self.node.kind()
    }

    fn start_byte(&self) -> usize {
        self.node.start_byte()
    }

    fn end_byte(&self) -> usize {
        self.node.end_byte()
    }

    fn child_count(&self) -> usize {
        self.node.child_count()
    }

    fn child(&self, index: usize) -> Option<BoxedNode<'t>> {
        self.wrap(self.node.child(index))
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity::of(self.tree, self.node.id())
    }

    fn native(&self) -> NativeNode<'t> {
        NativeNode::TreeSitter(self.node)
    }

    fn boxed_clone(&self) -> BoxedNode<'t> {
        Box::new(*self)
    }

    fn start_point(&self) -> Option<Point> {
        Some(self.node.start_position().into())
    }

    fn end_point(&self) -> Option<Point> {
        Some(self.node.end_position().into())
    }

    fn has_error(&self) -> bool {
        self.node.has_error()
    }

    fn is_missing(&self) -> Option<bool> {
        Some(self.node.is_missing())
    }

    fn is_named(&self) -> Option<bool> {
        Some(self.node.is_named())
    }

    fn parent(&self) -> Option<BoxedNode<'t>> {
        self.wrap(self.node.parent())
    }

    fn next_sibling(&self) -> Option<BoxedNode<'t>> {
        self.wrap(self.node.next_sibling())
    }

    fn prev_sibling(&self) -> Option<BoxedNode<'t>> {
        self.wrap(self.node.prev_sibling())
    }

    fn child_by_field_name(&self, field: &str) -> Option<BoxedNode<'t>> {
        self.wrap(self.node.child_by_field_name(field))
    }
}
