//! The parser facade.
//!
//! A [`Parser`] is bound to one backend at a time. How it got that backend
//! decides what it may do later:
//!
//! - **Explicit** ([`Parser::with_backend`], a [`context::with_backend`]
//!   scope, or the configured default): the backend is never substituted. A
//!   constructor failure is returned, and a language loaded for another
//!   backend is reloaded for this one or refused.
//! - **Automatic** ([`Parser::new`] with nothing configured): the first
//!   available backend is used. If its parser cannot be built, the facade
//!   falls back once to an in-process backend and records why. Assigning a
//!   language that belongs to an in-process backend switches to it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{BackendParser, BackendTree, Capabilities};
use crate::context;
use crate::error::{Error, Result};
use crate::language::LanguageHandle;
use crate::registry::{LanguageRegistry, ResolvedBackend};
use crate::tree::Tree;
use crate::types::{BackendCategory, BackendKind, LanguageName};

/// Backend-independent parser.
pub struct Parser {
    registry: Arc<LanguageRegistry>,
    active: ResolvedBackend,
    native: Box<dyn BackendParser>,
    language: Option<LanguageHandle>,
    explicit: bool,
    fallback_reason: Option<String>,
}

impl Parser {
    /// Create a parser, choosing the backend automatically.
    ///
    /// A backend scoped with [`context::with_backend`] wins, then the
    /// configured default; both count as explicit. Otherwise available
    /// backends are tried in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAvailable`] if no backend is available, or the
    /// explicit backend's error.
    pub fn new(registry: &Arc<LanguageRegistry>) -> Result<Self> {
        if let Some(kind) = context::current_backend() {
            debug!(backend = %kind, "Using scoped backend");
            return Self::with_backend(registry, &kind);
        }
        if let Some(kind) = registry.config().backend.clone() {
            debug!(backend = %kind, "Using configured backend");
            return Self::with_backend(registry, &kind);
        }

        let kind = registry
            .available_backends()
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_available("no parsing backend is available"))?;

        match Self::bind(registry, &kind, false) {
            Ok(parser) => Ok(parser),
            Err(e) => Self::fall_back(registry, &kind, e),
        }
    }

    /// Create a parser bound to `kind`. The backend is never substituted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAvailable`] if the backend is not registered or not
    /// available, or the backend's constructor error.
    pub fn with_backend(registry: &Arc<LanguageRegistry>, kind: &BackendKind) -> Result<Self> {
        Self::bind(registry, kind, true)
    }

    /// Create a parser and assign a registered language.
    ///
    /// With `backend`, only that backend's registration is used. Without it,
    /// the language is loaded as [`LanguageRegistry::language`] would and the
    /// parser follows it as [`Parser::set_language`] allows.
    ///
    /// # Errors
    ///
    /// Returns any error from parser creation, language loading or
    /// [`Parser::set_language`].
    pub fn for_language(
        registry: &Arc<LanguageRegistry>,
        name: &LanguageName,
        backend: Option<&BackendKind>,
    ) -> Result<Self> {
        let mut parser = match backend {
            Some(kind) => Self::with_backend(registry, kind)?,
            None => Self::new(registry)?,
        };
        let handle = registry.language_for(name, backend)?;
        parser.set_language(&handle)?;
        Ok(parser)
    }

    fn bind(registry: &Arc<LanguageRegistry>, kind: &BackendKind, explicit: bool) -> Result<Self> {
        let active = registry
            .backend(kind)
            .ok_or_else(|| Error::not_available(format!("backend `{kind}` is not registered")))?;
        if !registry.is_available(kind) {
            return Err(Error::not_available(format!(
                "backend `{kind}` is not available in this process"
            )));
        }
        let native = active.backend().new_parser()?;
        debug!(backend = %kind, explicit, "Created parser");
        Ok(Self {
            registry: Arc::clone(registry),
            active,
            native,
            language: None,
            explicit,
            fallback_reason: None,
        })
    }

    fn fall_back(registry: &Arc<LanguageRegistry>, failed: &BackendKind, error: Error) -> Result<Self> {
        let Some(fallback) = registry
            .backends_in(BackendCategory::InProcess)
            .into_iter()
            .find(|kind| kind != failed)
        else {
            return Err(error);
        };

        warn!(
            backend = %failed,
            fallback = %fallback,
            error = %error,
            "Parser construction failed, falling back"
        );
        let mut parser = Self::bind(registry, &fallback, false)?;
        parser.fallback_reason = Some(error.to_string());
        Ok(parser)
    }

    /// Active backend.
    #[must_use]
    pub fn backend(&self) -> &BackendKind {
        self.active.kind()
    }

    /// Capability table of the active backend.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.active.capabilities()
    }

    /// Assigned language.
    #[must_use]
    pub fn language(&self) -> Option<&LanguageHandle> {
        self.language.as_ref()
    }

    /// Whether the backend was chosen explicitly.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Why construction fell back to another backend, if it did.
    #[must_use]
    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    /// Assign a language.
    ///
    /// A handle for the active backend is assigned directly. A handle for an
    /// in-process backend switches an automatic parser to that backend.
    /// Otherwise the grammar is reloaded for the active backend from its
    /// shared library.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendMismatch`] if the handle must be reloaded but
    /// came from an in-process grammar, or any load error from the reload.
    pub fn set_language(&mut self, handle: &LanguageHandle) -> Result<()> {
        if handle.backend() == self.active.kind() {
            return self.assign(handle.clone());
        }

        if !self.explicit
            && let Some(target) = self.registry.backend(handle.backend())
            && target.category() == BackendCategory::InProcess
            && self.registry.is_available(target.kind())
        {
            let mut native = target.backend().new_parser()?;
            native.set_language(handle.unwrap_for(target.backend().language_form())?)?;
            debug!(
                from = %self.active.kind(),
                to = %target.kind(),
                language = %handle.name(),
                "Switched parser backend"
            );
            self.active = target;
            self.native = native;
            self.language = Some(handle.clone());
            return Ok(());
        }

        let Some((path, symbol)) = handle.provenance().library() else {
            return Err(Error::BackendMismatch {
                language: handle.name().to_string(),
                loaded_for: handle.backend().clone(),
                active: self.active.kind().clone(),
            });
        };
        debug!(
            language = %handle.name(),
            from = %handle.backend(),
            to = %self.active.kind(),
            "Reloading language for active backend"
        );
        let reloaded = self
            .registry
            .load_library(self.active.kind(), handle.name(), path, symbol)?;
        self.assign(reloaded)
    }

    fn assign(&mut self, handle: LanguageHandle) -> Result<()> {
        let raw = handle.unwrap_for(self.active.backend().language_form())?;
        self.native.set_language(raw)?;
        self.language = Some(handle);
        Ok(())
    }

    /// Parse `source` from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no language is assigned, or the
    /// backend's parse error.
    pub fn parse(&mut self, source: &str) -> Result<Tree> {
        self.ensure_language()?;
        let native = self.native.parse(source)?;
        Ok(self.wrap(native, source))
    }

    /// Parse `source`, reusing `old_tree` when the active backend supports
    /// incremental parsing and produced that tree. Otherwise a full parse.
    ///
    /// # Errors
    ///
    /// Same as [`Parser::parse`].
    pub fn parse_string(&mut self, old_tree: Option<&Tree>, source: &str) -> Result<Tree> {
        self.ensure_language()?;
        let native = match old_tree {
            Some(old) if self.active.capabilities().incremental && old.backend() == self.active.kind() => {
                self.native.reparse(old.backend_tree(), source)?
            }
            _ => self.native.parse(source)?,
        };
        Ok(self.wrap(native, source))
    }

    fn ensure_language(&self) -> Result<()> {
        if self.language.is_none() {
            return Err(Error::configuration(
                "no language assigned; call set_language first",
            ));
        }
        Ok(())
    }

    fn wrap(&self, native: Box<dyn BackendTree>, source: &str) -> Tree {
        Tree::new(
            native,
            source.to_string(),
            self.active.kind().clone(),
            self.active.capabilities(),
        )
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("backend", self.active.kind())
            .field("language", &self.language.as_ref().map(LanguageHandle::name))
            .field("explicit", &self.explicit)
            .field("fallback_reason", &self.fallback_reason)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GrammarBackend, TreeSitterBackend};
    use crate::config::SwitchyardConfig;
    use crate::language::Registration;
    use crate::security::path::native_library_extension;
    use crate::testing::{StubBackend, assignment_registration};

    fn name(s: &str) -> LanguageName {
        LanguageName::new(s).expect("valid name")
    }

    fn registry_with_assign() -> Arc<LanguageRegistry> {
        let registry = Arc::new(LanguageRegistry::default());
        registry
            .register(name("assign"), BackendKind::GRAMMAR, assignment_registration())
            .expect("register");
        registry
    }

    fn register_rust(registry: &LanguageRegistry, dir: &tempfile::TempDir) {
        let path = dir
            .path()
            .join(format!("libtree-sitter-rust.{}", native_library_extension()));
        std::fs::write(&path, b"").expect("write fake library");
        registry
            .register(
                name("rust"),
                BackendKind::TREE_SITTER,
                Registration::library(path, None).expect("valid"),
            )
            .expect("register rust");
    }

    #[test]
    fn auto_parser_uses_first_available_backend() {
        let registry = registry_with_assign();
        let parser = Parser::new(&registry).expect("parser");

        assert_eq!(parser.backend(), &BackendKind::TREE_SITTER);
        assert!(!parser.is_explicit());
        assert!(parser.fallback_reason().is_none());
    }

    #[test]
    fn parse_without_language_is_configuration_error() {
        let registry = registry_with_assign();
        let mut parser = Parser::new(&registry).expect("parser");

        let error = parser.parse("x = 1").expect_err("no language");
        assert!(matches!(error, Error::Configuration(_)));
    }

    #[test]
    fn auto_parser_switches_to_in_process_backend() {
        let registry = registry_with_assign();
        let handle = registry.language(&name("assign")).expect("load");
        let mut parser = Parser::new(&registry).expect("parser");

        parser.set_language(&handle).expect("switch");

        assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
        let tree = parser.parse("x = 1").expect("parse");
        assert_eq!(tree.backend(), &BackendKind::GRAMMAR);
    }

    #[test]
    fn explicit_parser_refuses_grammar_handle() {
        let registry = registry_with_assign();
        let handle = registry.language(&name("assign")).expect("load");
        let mut parser =
            Parser::with_backend(&registry, &BackendKind::TREE_SITTER).expect("parser");

        let error = parser.set_language(&handle).expect_err("mismatch");

        assert!(matches!(
            error,
            Error::BackendMismatch { ref loaded_for, ref active, .. }
                if loaded_for == &BackendKind::GRAMMAR && active == &BackendKind::TREE_SITTER
        ));
        assert_eq!(parser.backend(), &BackendKind::TREE_SITTER);
        assert!(parser.language().is_none());
    }

    #[test]
    fn scoped_backend_is_explicit() {
        let registry = registry_with_assign();

        let parser = context::with_backend(BackendKind::GRAMMAR, || Parser::new(&registry))
            .expect("parser");

        assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
        assert!(parser.is_explicit());
    }

    #[test]
    fn configured_backend_is_explicit() {
        let config = SwitchyardConfig {
            backend: Some(BackendKind::GRAMMAR),
            ..SwitchyardConfig::default()
        };
        let registry = Arc::new(LanguageRegistry::with_defaults(config));

        let parser = Parser::new(&registry).expect("parser");

        assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
        assert!(parser.is_explicit());
    }

    #[test]
    fn constructor_failure_falls_back_once_with_reason() {
        let registry = Arc::new(LanguageRegistry::new(SwitchyardConfig::default()));
        let broken = BackendKind::new("broken_native").expect("valid");
        registry
            .register_backend(Arc::new(
                StubBackend::wrapping(broken.clone(), Arc::new(TreeSitterBackend::new()))
                    .failing_parser("runtime library missing"),
            ))
            .expect("register stub");
        registry
            .register_backend(Arc::new(GrammarBackend::new()))
            .expect("register grammar");

        let parser = Parser::new(&registry).expect("fallback parser");

        assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
        assert!(
            parser
                .fallback_reason()
                .is_some_and(|reason| reason.contains("runtime library missing"))
        );
    }

    #[test]
    fn explicit_constructor_failure_surfaces() {
        let registry = Arc::new(LanguageRegistry::default());
        let broken = BackendKind::new("broken_native").expect("valid");
        registry
            .register_backend(Arc::new(
                StubBackend::wrapping(broken.clone(), Arc::new(TreeSitterBackend::new()))
                    .failing_parser("runtime library missing"),
            ))
            .expect("register stub");

        let error = Parser::with_backend(&registry, &broken).expect_err("no fallback");
        assert!(matches!(error, Error::NotAvailable(ref msg) if msg.contains("runtime library missing")));
    }

    #[test]
    fn auto_parser_without_available_backend_is_not_available() {
        let registry = Arc::new(LanguageRegistry::new(SwitchyardConfig::default()));
        registry
            .register_backend(Arc::new(
                StubBackend::wrapping(
                    BackendKind::new("offline").expect("valid"),
                    Arc::new(TreeSitterBackend::new()),
                )
                .unavailable(),
            ))
            .expect("register stub");

        let error = Parser::new(&registry).expect_err("nothing available");

        assert!(matches!(error, Error::NotAvailable(ref msg) if msg.contains("no parsing backend")));
    }

    #[test]
    fn auto_parser_skips_unavailable_backends() {
        let registry = Arc::new(LanguageRegistry::new(SwitchyardConfig::default()));
        registry
            .register_backend(Arc::new(
                StubBackend::wrapping(
                    BackendKind::new("offline").expect("valid"),
                    Arc::new(TreeSitterBackend::new()),
                )
                .unavailable(),
            ))
            .expect("register stub");
        registry
            .register_backend(Arc::new(GrammarBackend::new()))
            .expect("register grammar");

        let parser = Parser::new(&registry).expect("parser");

        assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
        assert!(parser.fallback_reason().is_none());
    }

    #[test]
    fn explicit_unavailable_backend_is_refused() {
        let registry = Arc::new(LanguageRegistry::default());
        let offline = BackendKind::new("offline").expect("valid");
        registry
            .register_backend(Arc::new(
                StubBackend::wrapping(offline.clone(), Arc::new(GrammarBackend::new()))
                    .unavailable(),
            ))
            .expect("register stub");

        let error = Parser::with_backend(&registry, &offline).expect_err("unavailable");

        assert!(matches!(error, Error::NotAvailable(ref msg) if msg.contains("not available in this process")));
    }

    #[test]
    fn unregistered_explicit_backend_is_not_available() {
        let registry = registry_with_assign();
        let missing = BackendKind::new("missing").expect("valid");

        let error = Parser::with_backend(&registry, &missing).expect_err("unregistered");

        assert!(matches!(error, Error::NotAvailable(ref msg) if msg.contains("not registered")));
    }

    #[test]
    fn failed_construction_without_in_process_fallback_keeps_original_error() {
        let registry = Arc::new(LanguageRegistry::new(SwitchyardConfig::default()));
        let stubs = [
            StubBackend::wrapping(
                BackendKind::new("broken_native").expect("valid"),
                Arc::new(TreeSitterBackend::new()),
            )
            .failing_parser("runtime library missing"),
            StubBackend::wrapping(
                BackendKind::new("grammar_as_native").expect("valid"),
                Arc::new(GrammarBackend::new()),
            )
            .with_category(BackendCategory::Native),
            StubBackend::wrapping(
                BackendKind::new("offline_grammar").expect("valid"),
                Arc::new(GrammarBackend::new()),
            )
            .unavailable(),
        ];
        for stub in stubs {
            registry.register_backend(Arc::new(stub)).expect("register stub");
        }

        let error = Parser::new(&registry).expect_err("no in-process fallback");

        assert!(matches!(error, Error::NotAvailable(ref msg) if msg.contains("runtime library missing")));
    }

    #[test]
    fn explicit_native_parser_reloads_library_handle() {
        let registry = Arc::new(LanguageRegistry::default());
        let mirror = BackendKind::new("ts_mirror").expect("valid");
        registry
            .register_backend(Arc::new(StubBackend::wrapping(
                mirror.clone(),
                Arc::new(TreeSitterBackend::new()),
            )))
            .expect("register mirror");
        let dir = tempfile::tempdir().expect("tempdir");
        register_rust(&registry, &dir);

        let handle = registry.language(&name("rust")).expect("load");
        assert_eq!(handle.backend(), &BackendKind::TREE_SITTER);

        let mut parser = Parser::with_backend(&registry, &mirror).expect("parser");
        parser.set_language(&handle).expect("reload");

        assert_eq!(parser.language().map(LanguageHandle::backend), Some(&mirror));
        let tree = parser.parse("fn main() {}").expect("parse");
        assert_eq!(tree.root_node().expect("root").kind(), "source_file");
    }

    #[test]
    fn for_language_assigns_registered_language() {
        let registry = registry_with_assign();

        let mut parser =
            Parser::for_language(&registry, &name("assign"), None).expect("parser");

        assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
        assert_eq!(
            parser.parse("x = 1").expect("parse").root_node().expect("root").kind(),
            "program"
        );
    }

    #[test]
    fn parse_string_without_incremental_support_is_full_parse() {
        let registry = registry_with_assign();
        let mut parser =
            Parser::for_language(&registry, &name("assign"), None).expect("parser");

        let mut old = parser.parse("x = 1").expect("parse");
        let edit = crate::types::InputEdit::from_bytes("x = 1", "x = 42", 4, 5, 6);
        assert!(matches!(old.edit(&edit), Err(Error::NotSupported(_))));
        let reparsed = parser.parse_string(Some(&old), "x = 42").expect("parse_string");
        let fresh = parser.parse("x = 42").expect("parse");

        let shape = |tree: &Tree| -> Vec<(usize, usize, String)> {
            tree.root_node()
                .expect("root")
                .descendants()
                .iter()
                .map(|n| (n.start_byte(), n.end_byte(), n.kind().to_string()))
                .collect()
        };
        assert_eq!(shape(&fresh), shape(&reparsed));
    }
}
