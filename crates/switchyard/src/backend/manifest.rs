//! Declared backend surfaces and the capability table derived from them.
//!
//! Backends do not expose their methods through reflection. Instead each one
//! publishes a [`BackendManifest`]: the method names its native Language,
//! Parser, Tree and Node constructs provide, in the backend's own vocabulary.
//! Names are resolved against a fixed alias table so `type` satisfies `kind`,
//! `previous_sibling` satisfies `prev_sibling`, and so on.
//!
//! [`Capabilities`] is computed from the manifest once, when the backend is
//! registered, and consulted instead of probing on every call.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The four constructs a backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construct {
    /// Grammar / language object.
    Language,
    /// Parser object.
    Parser,
    /// Parse result.
    Tree,
    /// Syntax node.
    Node,
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Language => write!(f, "language"),
            Self::Parser => write!(f, "parser"),
            Self::Tree => write!(f, "tree"),
            Self::Node => write!(f, "node"),
        }
    }
}

/// Canonical method name paired with the names backends use for it.
pub type AliasEntry = (&'static str, &'static [&'static str]);

/// Language construct aliases.
pub const LANGUAGE_ALIASES: &[AliasEntry] = &[
    ("load_language", &["from_library", "from_grammar", "load", "new"]),
    ("name", &["language_name"]),
];

/// Parser construct aliases.
pub const PARSER_ALIASES: &[AliasEntry] = &[
    ("new", &["create"]),
    ("set_language", &["language=", "set_grammar"]),
    ("parse", &["parse_string_full"]),
    ("reparse", &["parse_string", "parse_with_old_tree"]),
];

/// Tree construct aliases.
pub const TREE_ALIASES: &[AliasEntry] = &[("root_node", &["root"]), ("edit", &[])];

/// Node construct aliases.
pub const NODE_ALIASES: &[AliasEntry] = &[
    ("kind", &["type", "node_type"]),
    ("start_byte", &[]),
    ("end_byte", &[]),
    ("child_count", &[]),
    ("child", &["child_at"]),
    ("start_point", &["start_position"]),
    ("end_point", &["end_position"]),
    ("text", &["utf8_text", "to_s"]),
    ("has_error", &["has_error?", "contains_error"]),
    ("is_missing", &["missing", "missing?"]),
    ("is_named", &["named", "named?"]),
    ("parent", &[]),
    ("next_sibling", &["next"]),
    ("prev_sibling", &["previous_sibling", "prev"]),
    ("child_by_field_name", &["field", "child_by_field"]),
];

/// Alias table for one construct.
#[must_use]
pub fn alias_table(construct: Construct) -> &'static [AliasEntry] {
    match construct {
        Construct::Language => LANGUAGE_ALIASES,
        Construct::Parser => PARSER_ALIASES,
        Construct::Tree => TREE_ALIASES,
        Construct::Node => NODE_ALIASES,
    }
}

/// Aliases accepted for `canonical` on `construct`.
#[must_use]
pub fn aliases_for(construct: Construct, canonical: &str) -> &'static [&'static str] {
    alias_table(construct)
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// Method names a backend declares per construct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendManifest {
    language: BTreeSet<String>,
    parser: BTreeSet<String>,
    tree: BTreeSet<String>,
    node: BTreeSet<String>,
}

impl BackendManifest {
    /// An empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add language methods.
    #[must_use]
    pub fn with_language<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Construct::Language, methods)
    }

    /// Add parser methods.
    #[must_use]
    pub fn with_parser<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Construct::Parser, methods)
    }

    /// Add tree methods.
    #[must_use]
    pub fn with_tree<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Construct::Tree, methods)
    }

    /// Add node methods.
    #[must_use]
    pub fn with_node<I, S>(self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Construct::Node, methods)
    }

    /// Add methods to any construct.
    #[must_use]
    pub fn with<I, S>(mut self, construct: Construct, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods_mut(construct)
            .extend(methods.into_iter().map(Into::into));
        self
    }

    /// Methods declared for a construct.
    #[must_use]
    pub fn methods(&self, construct: Construct) -> &BTreeSet<String> {
        match construct {
            Construct::Language => &self.language,
            Construct::Parser => &self.parser,
            Construct::Tree => &self.tree,
            Construct::Node => &self.node,
        }
    }

    fn methods_mut(&mut self, construct: Construct) -> &mut BTreeSet<String> {
        match construct {
            Construct::Language => &mut self.language,
            Construct::Parser => &mut self.parser,
            Construct::Tree => &mut self.tree,
            Construct::Node => &mut self.node,
        }
    }

    /// Resolve a canonical method: the canonical name if declared, otherwise
    /// the first declared alias.
    #[must_use]
    pub fn resolve(&self, construct: Construct, canonical: &str) -> Option<&str> {
        let methods = self.methods(construct);
        if let Some(found) = methods.get(canonical) {
            return Some(found.as_str());
        }
        aliases_for(construct, canonical)
            .iter()
            .find_map(|alias| methods.get(*alias).map(String::as_str))
    }

    /// Returns `true` if the canonical method or one of its aliases is declared.
    #[must_use]
    pub fn provides(&self, construct: Construct, canonical: &str) -> bool {
        self.resolve(construct, canonical).is_some()
    }
}

/// Optional features of a backend, computed once from its manifest.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities {
    /// Parser can reuse an edited old tree.
    pub incremental: bool,
    /// Trees accept [`InputEdit`](crate::InputEdit)s.
    pub editing: bool,
    /// Nodes support lookup by field name.
    pub field_lookup: bool,
    /// Nodes report row/column points.
    pub points: bool,
    /// Nodes return their own text.
    pub native_text: bool,
    /// Nodes know their parent.
    pub parent: bool,
    /// Nodes know their siblings.
    pub siblings: bool,
    /// Nodes distinguish missing (error-recovery) nodes.
    pub missing_flag: bool,
    /// Nodes distinguish named from anonymous nodes.
    pub named_flag: bool,
}

impl Capabilities {
    /// Derive the capability table from a manifest.
    #[must_use]
    pub fn from_manifest(manifest: &BackendManifest) -> Self {
        let node = |name| manifest.provides(Construct::Node, name);
        Self {
            incremental: manifest.provides(Construct::Parser, "reparse"),
            editing: manifest.provides(Construct::Tree, "edit"),
            field_lookup: node("child_by_field_name"),
            points: node("start_point") && node("end_point"),
            native_text: node("text"),
            parent: node("parent"),
            siblings: node("next_sibling") && node("prev_sibling"),
            missing_flag: node("is_missing"),
            named_flag: node("is_named"),
        }
    }

    /// Every optional feature enabled.
    #[must_use]
    pub fn all() -> Self {
        Self {
            incremental: true,
            editing: true,
            field_lookup: true,
            points: true,
            native_text: true,
            parent: true,
            siblings: true,
            missing_flag: true,
            named_flag: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_canonical_name() {
        let manifest = BackendManifest::new().with_node(["kind", "type"]);

        assert_eq!(manifest.resolve(Construct::Node, "kind"), Some("kind"));
    }

    #[test]
    fn resolve_falls_back_to_alias() {
        let manifest = BackendManifest::new().with_node(["type", "previous_sibling"]);

        assert_eq!(manifest.resolve(Construct::Node, "kind"), Some("type"));
        assert_eq!(
            manifest.resolve(Construct::Node, "prev_sibling"),
            Some("previous_sibling")
        );
        assert_eq!(manifest.resolve(Construct::Node, "parent"), None);
    }

    #[test]
    fn aliases_are_scoped_to_their_construct() {
        let manifest = BackendManifest::new().with_parser(["type"]);

        assert!(!manifest.provides(Construct::Node, "kind"));
    }

    #[test]
    fn capabilities_follow_declared_methods() {
        let manifest = BackendManifest::new()
            .with_parser(["new", "set_language", "parse", "parse_string"])
            .with_tree(["root_node"])
            .with_node(["type", "field", "start_position", "end_position", "named?"]);

        let caps = Capabilities::from_manifest(&manifest);

        assert!(caps.incremental);
        assert!(!caps.editing);
        assert!(caps.field_lookup);
        assert!(caps.points);
        assert!(caps.named_flag);
        assert!(!caps.missing_flag);
        assert!(!caps.siblings);
    }

    #[test]
    fn points_require_both_ends() {
        let manifest = BackendManifest::new().with_node(["start_point"]);

        assert!(!Capabilities::from_manifest(&manifest).points);
    }
}
