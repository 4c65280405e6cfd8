//! The language registry.
//!
//! Records which backends are present, which registration serves each
//! (language, backend) slot, and memoizes loaded [`LanguageHandle`]s.
//!
//! The registry is an explicit value: build one at the composition root and
//! share it as `Arc<LanguageRegistry>`. All state sits behind one mutex that
//! is never held while a backend loads a grammar.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::backend::{Backend, Capabilities, GrammarBackend, TreeSitterBackend};
use crate::config::SwitchyardConfig;
use crate::context;
use crate::error::{Error, Result};
use crate::language::{LanguageHandle, Registration};
use crate::types::{BackendCategory, BackendKind, CacheKey, LanguageForm, LanguageName};

/// Availability predicate for a backend.
pub type AvailabilityCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Metadata describing a backend kind.
///
/// Registered automatically with each backend, or ahead of time with
/// [`LanguageRegistry::register_tag`] to override availability or to
/// describe a backend that is not linked into the process yet.
#[derive(Clone)]
pub struct BackendTag {
    kind: BackendKind,
    category: BackendCategory,
    language_form: LanguageForm,
    load_path: Option<String>,
    availability: Option<AvailabilityCheck>,
}

impl BackendTag {
    /// Tag with no availability predicate (always available once a backend
    /// implementation is registered).
    #[must_use]
    pub fn new(kind: BackendKind, category: BackendCategory, language_form: LanguageForm) -> Self {
        Self {
            kind,
            category,
            language_form,
            load_path: None,
            availability: None,
        }
    }

    fn for_backend(backend: &Arc<dyn Backend>) -> Self {
        let probe = Arc::clone(backend);
        Self::new(backend.kind(), backend.category(), backend.language_form())
            .with_availability(move || probe.is_available())
    }

    /// Attach an availability predicate.
    #[must_use]
    pub fn with_availability(mut self, check: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.availability = Some(Arc::new(check));
        self
    }

    /// Record where the backend implementation is loaded from.
    #[must_use]
    pub fn with_load_path(mut self, path: impl Into<String>) -> Self {
        self.load_path = Some(path.into());
        self
    }

    /// Backend kind.
    #[must_use]
    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    /// Backend category.
    #[must_use]
    pub fn category(&self) -> BackendCategory {
        self.category
    }

    /// Raw language value the backend's parser expects.
    #[must_use]
    pub fn language_form(&self) -> LanguageForm {
        self.language_form
    }

    /// Where the implementation is loaded from, if recorded.
    #[must_use]
    pub fn load_path(&self) -> Option<&str> {
        self.load_path.as_deref()
    }

    /// Evaluate the availability predicate.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.availability.as_ref().is_none_or(|check| check())
    }
}

impl fmt::Debug for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendTag")
            .field("kind", &self.kind)
            .field("category", &self.category)
            .field("language_form", &self.language_form)
            .field("load_path", &self.load_path)
            .field("availability", &self.availability.as_ref().map(|_| ".."))
            .finish()
    }
}

/// A registered backend with its precomputed capability table.
#[derive(Clone)]
pub struct ResolvedBackend {
    kind: BackendKind,
    backend: Arc<dyn Backend>,
    capabilities: Capabilities,
}

impl ResolvedBackend {
    fn new(backend: Arc<dyn Backend>) -> Self {
        let capabilities = Capabilities::from_manifest(&backend.manifest());
        Self {
            kind: backend.kind(),
            backend,
            capabilities,
        }
    }

    /// Backend kind.
    #[must_use]
    pub fn kind(&self) -> &BackendKind {
        &self.kind
    }

    /// The backend implementation.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Capabilities computed from the backend's manifest at registration.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Backend category.
    #[must_use]
    pub fn category(&self) -> BackendCategory {
        self.backend.category()
    }
}

impl fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("kind", &self.kind)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryState {
    registrations: HashMap<LanguageName, BTreeMap<BackendKind, Registration>>,
    cache: HashMap<CacheKey, LanguageHandle>,
    // Priority order: first registered, first probed.
    tags: Vec<BackendTag>,
    backends: HashMap<BackendKind, ResolvedBackend>,
}

impl RegistryState {
    fn tag(&self, kind: &BackendKind) -> Option<&BackendTag> {
        self.tags.iter().find(|tag| &tag.kind == kind)
    }

    fn upsert_tag(&mut self, tag: BackendTag) {
        match self.tags.iter_mut().find(|existing| existing.kind == tag.kind) {
            Some(existing) => *existing = tag,
            None => self.tags.push(tag),
        }
    }

    fn install_backend(&mut self, backend: Arc<dyn Backend>) {
        let resolved = ResolvedBackend::new(backend);
        if self.tag(&resolved.kind).is_none() {
            self.tags.push(BackendTag::for_backend(&resolved.backend));
        }
        debug!(
            backend = %resolved.kind,
            capabilities = ?resolved.capabilities,
            "Registered backend"
        );
        self.backends.insert(resolved.kind.clone(), resolved);
    }
}

/// Registry of backends, language registrations and loaded handles.
pub struct LanguageRegistry {
    config: SwitchyardConfig,
    state: Mutex<RegistryState>,
}

impl LanguageRegistry {
    /// An empty registry with no backends.
    #[must_use]
    pub fn new(config: SwitchyardConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// A registry with the built-in backends, tree-sitter first.
    #[must_use]
    pub fn with_defaults(config: SwitchyardConfig) -> Self {
        let registry = Self::new(config);
        {
            let mut state = registry.lock();
            state.install_backend(Arc::new(TreeSitterBackend::new()));
            state.install_backend(Arc::new(GrammarBackend::new()));
        }
        registry
    }

    // Critical sections are single map operations, so a poisoned lock still
    // guards consistent state.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    // ========================================================================
    // Backends and tags
    // ========================================================================

    /// Register a backend implementation. Its capability table is computed
    /// here, once.
    ///
    /// A backend registered for a new kind is appended to the priority order;
    /// re-registering a kind replaces the implementation in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a tag for this kind declares a
    /// different category or language form.
    pub fn register_backend(&self, backend: Arc<dyn Backend>) -> Result<()> {
        let mut state = self.lock();
        if let Some(tag) = state.tag(&backend.kind()) {
            check_tag_matches(tag, backend.as_ref())?;
        }
        state.install_backend(backend);
        Ok(())
    }

    /// Register or replace the tag for a backend kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a backend of this kind is already
    /// registered with a different category or language form.
    pub fn register_tag(&self, tag: BackendTag) -> Result<()> {
        let mut state = self.lock();
        if let Some(resolved) = state.backends.get(&tag.kind) {
            check_tag_matches(&tag, resolved.backend.as_ref())?;
        }
        debug!(backend = %tag.kind, category = %tag.category, "Registered backend tag");
        state.upsert_tag(tag);
        Ok(())
    }

    /// Tag for a backend kind.
    #[must_use]
    pub fn tag(&self, kind: &BackendKind) -> Option<BackendTag> {
        self.lock().tag(kind).cloned()
    }

    /// All tags in priority order.
    #[must_use]
    pub fn tags(&self) -> Vec<BackendTag> {
        self.lock().tags.clone()
    }

    /// Registered backend of this kind.
    #[must_use]
    pub fn backend(&self, kind: &BackendKind) -> Option<ResolvedBackend> {
        self.lock().backends.get(kind).cloned()
    }

    /// Returns `true` if a backend of this kind is registered and its tag
    /// reports it available.
    #[must_use]
    pub fn is_available(&self, kind: &BackendKind) -> bool {
        // Predicates are evaluated outside the lock.
        let (registered, tag) = {
            let state = self.lock();
            (state.backends.contains_key(kind), state.tag(kind).cloned())
        };
        registered && tag.is_some_and(|tag| tag.is_available())
    }

    /// Available backends in priority order.
    #[must_use]
    pub fn available_backends(&self) -> Vec<BackendKind> {
        let (tags, registered): (Vec<BackendTag>, Vec<BackendKind>) = {
            let state = self.lock();
            (state.tags.clone(), state.backends.keys().cloned().collect())
        };
        tags.into_iter()
            .filter(|tag| registered.contains(&tag.kind) && tag.is_available())
            .map(|tag| tag.kind)
            .collect()
    }

    /// Available backends of one category, in priority order.
    #[must_use]
    pub fn backends_in(&self, category: BackendCategory) -> Vec<BackendKind> {
        let tags = self.tags();
        self.available_backends()
            .into_iter()
            .filter(|kind| {
                tags.iter()
                    .any(|tag| &tag.kind == kind && tag.category == category)
            })
            .collect()
    }

    // ========================================================================
    // Registrations
    // ========================================================================

    /// Set the registration for one (language, backend) slot. Other slots of
    /// the same language are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the registration is invalid or its
    /// category does not match the backend's tag.
    pub fn register(
        &self,
        name: LanguageName,
        backend: BackendKind,
        registration: Registration,
    ) -> Result<()> {
        registration.validate()?;
        let mut state = self.lock();
        if let Some(tag) = state.tag(&backend)
            && tag.category != registration.category()
        {
            return Err(Error::configuration(format!(
                "`{backend}` is a {} backend and cannot serve a {} registration for `{name}`",
                tag.category,
                registration.category()
            )));
        }
        debug!(language = %name, backend = %backend, "Registered language");
        state
            .registrations
            .entry(name)
            .or_default()
            .insert(backend, registration);
        Ok(())
    }

    /// All registrations of a language, keyed by backend.
    #[must_use]
    pub fn registered(&self, name: &LanguageName) -> BTreeMap<BackendKind, Registration> {
        self.lock()
            .registrations
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Registration of one (language, backend) slot.
    #[must_use]
    pub fn registered_for(&self, name: &LanguageName, backend: &BackendKind) -> Option<Registration> {
        self.lock()
            .registrations
            .get(name)
            .and_then(|slots| slots.get(backend))
            .cloned()
    }

    /// Languages with at least one registration, sorted.
    #[must_use]
    pub fn registered_languages(&self) -> Vec<LanguageName> {
        let mut names: Vec<LanguageName> = self.lock().registrations.keys().cloned().collect();
        names.sort();
        names
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Return the cached handle for `key`, or compute and store it.
    ///
    /// `compute` runs without the lock held, so concurrent callers may each
    /// compute a handle; only the first one stored is ever returned.
    ///
    /// # Errors
    ///
    /// Propagates the error from `compute`. Failures are not cached.
    pub fn fetch<F>(&self, key: CacheKey, compute: F) -> Result<LanguageHandle>
    where
        F: FnOnce() -> Result<LanguageHandle>,
    {
        let cached = self.lock().cache.get(&key).cloned();
        if let Some(handle) = cached {
            trace!(language = %key.name, backend = %key.backend, "Language cache hit");
            return Ok(handle);
        }

        let computed = compute()?;

        let mut state = self.lock();
        let stored = state.cache.entry(key).or_insert(computed);
        Ok(stored.clone())
    }

    /// Load a language, choosing the backend automatically.
    ///
    /// # Errors
    ///
    /// See [`LanguageRegistry::language_for`].
    pub fn language(&self, name: &LanguageName) -> Result<LanguageHandle> {
        self.language_for(name, None)
    }

    /// Load a language for `backend`, or choose one.
    ///
    /// With an explicit backend only that slot is tried. Otherwise the scoped
    /// backend ([`context::with_backend`]) or the configured default is used
    /// if the language is registered for it; failing that, available
    /// backends are tried in priority order until one loads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAvailable`] if the language has no usable
    /// registration, or the explicit backend's load error.
    pub fn language_for(
        &self,
        name: &LanguageName,
        backend: Option<&BackendKind>,
    ) -> Result<LanguageHandle> {
        let slots = self.registered(name);
        if slots.is_empty() {
            return Err(Error::not_available(format!(
                "no registration for language `{name}`"
            )));
        }

        if let Some(kind) = backend {
            let registration = slots.get(kind).ok_or_else(|| {
                Error::not_available(format!("`{name}` has no registration for backend `{kind}`"))
            })?;
            return self.load(kind, name, registration);
        }

        let preferred = context::current_backend().or_else(|| self.config.backend.clone());
        if let Some(kind) = preferred {
            if let Some(registration) = slots.get(&kind) {
                return self.load(&kind, name, registration);
            }
            debug!(
                language = %name,
                backend = %kind,
                "Preferred backend has no registration, trying others"
            );
        }

        let mut attempts = Vec::new();
        for kind in self.available_backends() {
            let Some(registration) = slots.get(&kind) else {
                continue;
            };
            match self.load(&kind, name, registration) {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    debug!(language = %name, backend = %kind, error = %e, "Load failed, trying next backend");
                    attempts.push(format!("{kind}: {e}"));
                }
            }
        }

        if attempts.is_empty() {
            let kinds: Vec<&str> = slots.keys().map(BackendKind::as_str).collect();
            Err(Error::not_available(format!(
                "`{name}` is registered for {} but none of those backends is available",
                kinds.join(", ")
            )))
        } else {
            warn!(language = %name, attempts = attempts.len(), "No backend could load language");
            Err(Error::not_available(format!(
                "no backend could load `{name}` ({})",
                attempts.join("; ")
            )))
        }
    }

    /// Load a shared-library grammar for a specific backend, through the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unsafe path or symbol, or the
    /// backend's load error.
    pub fn load_library(
        &self,
        backend: &BackendKind,
        name: &LanguageName,
        path: &Path,
        symbol: &str,
    ) -> Result<LanguageHandle> {
        let registration = Registration::library(path, Some(symbol))?;
        self.load(backend, name, &registration)
    }

    fn load(
        &self,
        kind: &BackendKind,
        name: &LanguageName,
        registration: &Registration,
    ) -> Result<LanguageHandle> {
        let resolved = self
            .backend(kind)
            .ok_or_else(|| Error::not_available(format!("backend `{kind}` is not registered")))?;
        if !self.is_available(kind) {
            return Err(Error::not_available(format!(
                "backend `{kind}` is not available in this process"
            )));
        }
        let key = registration.cache_key(kind.clone(), name.clone());
        self.fetch(key, || resolved.backend.load_language(name, registration))
    }

    /// Drop every cached handle. Registrations are kept.
    pub fn clear_cache(&self) {
        self.lock().cache.clear();
    }

    /// Drop every cached handle and every registration. Backends and tags
    /// are kept.
    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.cache.clear();
        state.registrations.clear();
    }

    /// Number of cached handles.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.lock().cache.len()
    }
}

fn check_tag_matches(tag: &BackendTag, backend: &dyn Backend) -> Result<()> {
    if tag.category != backend.category() || tag.language_form != backend.language_form() {
        return Err(Error::configuration(format!(
            "tag for `{}` declares a {} backend taking {:?}, but the implementation is {} taking {:?}",
            tag.kind,
            tag.category,
            tag.language_form,
            backend.category(),
            backend.language_form()
        )));
    }
    Ok(())
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::with_defaults(SwitchyardConfig::default())
    }
}

impl fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("LanguageRegistry")
            .field("backends", &state.tags.iter().map(|t| &t.kind).collect::<Vec<_>>())
            .field("languages", &state.registrations.len())
            .field("cached", &state.cache.len())
            .finish()
    }
}
