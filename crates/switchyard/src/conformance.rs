//! Backend conformance checking.
//!
//! Inspects a backend's [`BackendManifest`] against the module contract. The
//! backend is never instantiated: no language is loaded and no parser is
//! created. Use it when writing a new backend, or in a test that guards one.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::backend::{Backend, BackendManifest, Capabilities, Construct};
use crate::types::{BackendCategory, BackendKind};

/// Methods every backend must provide, per construct.
pub const REQUIRED: &[(Construct, &[&str])] = &[
    (Construct::Language, &["load_language"]),
    (Construct::Parser, &["new", "set_language", "parse"]),
    (Construct::Tree, &["root_node"]),
    (
        Construct::Node,
        &["kind", "start_byte", "end_byte", "child_count", "child"],
    ),
];

/// Methods a backend may provide, per construct.
pub const OPTIONAL: &[(Construct, &[&str])] = &[
    (Construct::Language, &["name"]),
    (Construct::Parser, &["reparse"]),
    (Construct::Tree, &["edit"]),
    (
        Construct::Node,
        &[
            "start_point",
            "end_point",
            "text",
            "has_error",
            "is_missing",
            "is_named",
            "parent",
            "next_sibling",
            "prev_sibling",
            "child_by_field_name",
        ],
    ),
];

/// Result of checking one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformanceReport {
    /// Backend that was checked.
    pub backend: BackendKind,
    /// Category the backend reports.
    pub category: BackendCategory,
    /// `true` when there are no errors.
    pub valid: bool,
    /// Missing required methods (and, in strict mode, missing optional ones).
    pub errors: Vec<String>,
    /// Missing optional methods.
    pub warnings: Vec<String>,
    /// Capability table the registry would compute.
    pub capabilities: Capabilities,
    /// `construct.canonical` → backend's own name, for every method satisfied
    /// through an alias.
    pub aliases: BTreeMap<String, String>,
}

impl ConformanceReport {
    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Check a backend's declared surface.
///
/// With `strict`, missing optional methods are errors instead of warnings.
#[must_use]
pub fn check(backend: &dyn Backend, strict: bool) -> ConformanceReport {
    let kind = backend.kind();
    let manifest = backend.manifest();
    let (errors, warnings, aliases) = check_manifest(&manifest, strict);
    debug!(
        backend = %kind,
        errors = errors.len(),
        warnings = warnings.len(),
        strict,
        "Checked backend conformance"
    );
    ConformanceReport {
        backend: kind,
        category: backend.category(),
        valid: errors.is_empty(),
        errors,
        warnings,
        capabilities: Capabilities::from_manifest(&manifest),
        aliases,
    }
}

/// Check a manifest on its own. Returns `(errors, warnings, aliases)`.
#[must_use]
pub fn check_manifest(
    manifest: &BackendManifest,
    strict: bool,
) -> (Vec<String>, Vec<String>, BTreeMap<String, String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut aliases = BTreeMap::new();

    let mut visit = |table: &[(Construct, &[&str])], required: bool| {
        for (construct, methods) in table {
            for canonical in *methods {
                match manifest.resolve(*construct, canonical) {
                    Some(found) if found != *canonical => {
                        aliases.insert(format!("{construct}.{canonical}"), found.to_string());
                    }
                    Some(_) => {}
                    None if required => {
                        errors.push(format!("{construct} is missing required method `{canonical}`"));
                    }
                    None if strict => {
                        errors.push(format!("{construct} is missing optional method `{canonical}`"));
                    }
                    None => {
                        warnings.push(format!("{construct} is missing optional method `{canonical}`"));
                    }
                }
            }
        }
    };
    visit(REQUIRED, true);
    visit(OPTIONAL, false);

    (errors, warnings, aliases)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{GrammarBackend, TreeSitterBackend};
    use crate::testing::{StubBackend, minimal_manifest};

    fn stub(manifest: BackendManifest) -> StubBackend {
        StubBackend::wrapping(
            BackendKind::new("stub").expect("valid"),
            Arc::new(GrammarBackend::new()),
        )
        .with_manifest(manifest)
    }

    #[test]
    fn tree_sitter_backend_conforms_with_one_warning() {
        let report = check(&TreeSitterBackend::new(), false);

        assert!(report.valid);
        assert_eq!(report.warnings, vec!["node is missing optional method `text`"]);
        assert_eq!(
            report.aliases.get("language.load_language").map(String::as_str),
            Some("from_library")
        );
    }

    #[test]
    fn strict_mode_promotes_warnings() {
        let report = check(&TreeSitterBackend::new(), true);

        assert!(!report.valid);
        assert_eq!(report.errors, vec!["node is missing optional method `text`"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn minimal_manifest_is_valid_through_aliases() {
        let report = check(&stub(minimal_manifest()), false);

        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.capabilities, Capabilities::default());
        assert_eq!(report.aliases.get("node.kind").map(String::as_str), Some("type"));
        assert_eq!(report.aliases.get("node.child").map(String::as_str), Some("child_at"));
        assert_eq!(
            report.aliases.get("parser.set_language").map(String::as_str),
            Some("set_grammar")
        );
    }

    #[test]
    fn missing_required_method_is_an_error() {
        let manifest = BackendManifest::new()
            .with_language(["load"])
            .with_parser(["new", "parse"])
            .with_tree(["root"])
            .with_node(["kind", "start_byte", "end_byte", "child_count", "child"]);

        let report = check(&stub(manifest), false);

        assert!(!report.valid);
        assert_eq!(
            report.errors,
            vec!["parser is missing required method `set_language`"]
        );
    }

    #[test]
    fn grammar_backend_reports_alias_names() {
        let report = check(&GrammarBackend::new(), false);

        assert!(report.valid);
        assert_eq!(
            report.aliases.get("node.prev_sibling").map(String::as_str),
            Some("previous_sibling")
        );
        assert_eq!(
            report.aliases.get("node.child_by_field_name").map(String::as_str),
            Some("field")
        );
        assert!(
            report
                .warnings
                .contains(&"parser is missing optional method `reparse`".to_string())
        );
    }

    #[test]
    fn report_serializes_to_json() {
        let report = check(&GrammarBackend::new(), false);

        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().expect("serialize")).expect("parse");

        assert_eq!(json["backend"], "grammar");
        assert_eq!(json["valid"], true);
        assert_eq!(json["capabilities"]["parent"], true);
        assert_eq!(json["aliases"]["node.kind"], "type");
    }
}
