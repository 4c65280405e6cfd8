//! Discovery of native grammar libraries on disk.
//!
//! Candidates are tried in priority order:
//!
//! 1. the environment override `<PREFIX>_<LANG>_PATH`, trusted according to
//!    [`EnvPathPolicy`]
//! 2. caller-supplied extra directories
//! 3. trusted system directories
//!
//! Every candidate passes the checks in [`crate::security::path`] before it
//! is reported. Discovery never fails: absence is `None`, and refused
//! candidates are collected as [`Rejection`]s for diagnostics.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::{EnvLookup, EnvPathPolicy, LocatorConfig, SwitchyardConfig, process_env};
use crate::error::Result;
use crate::language::Registration;
use crate::registry::LanguageRegistry;
use crate::security::path::{
    RejectionReason, SYMBOL_PREFIX, check_character_class, check_library_path,
    native_library_extension, within_trusted_directory,
};
use crate::types::{BackendKind, LanguageName, LocatedGrammar};

/// Where a candidate path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// `<PREFIX>_<LANG>_PATH`
    Environment,
    /// A caller-supplied directory
    ExtraDirectory,
    /// A trusted system directory
    TrustedDirectory,
}

/// A candidate that was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Candidate path
    pub path: PathBuf,
    /// Where it came from
    pub source: CandidateSource,
    /// Why it was refused
    pub reason: RejectionReason,
}

/// Outcome of a discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// First acceptable candidate
    pub found: Option<LocatedGrammar>,
    /// Candidates refused before `found`
    pub rejections: Vec<Rejection>,
}

/// Finds the shared library for one language.
#[derive(Clone)]
pub struct GrammarLocator {
    language: LanguageName,
    config: LocatorConfig,
    debug: bool,
    env: EnvLookup,
}

impl GrammarLocator {
    /// Locator reading the process environment.
    #[must_use]
    pub fn new(language: &LanguageName, config: &SwitchyardConfig) -> Self {
        Self {
            language: language.clone(),
            config: config.locator.clone(),
            debug: config.debug,
            env: process_env(),
        }
    }

    /// Replace the environment lookup.
    #[must_use]
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Language this locator searches for.
    #[must_use]
    pub fn language(&self) -> &LanguageName {
        &self.language
    }

    /// Name of the override variable, e.g. `TREE_SITTER_TOML_PATH`.
    #[must_use]
    pub fn env_var_name(&self) -> String {
        format!(
            "{}_{}_PATH",
            self.config.env_prefix,
            self.language.as_str().to_ascii_uppercase()
        )
    }

    /// Exported symbol expected in the library, e.g. `tree_sitter_toml`.
    #[must_use]
    pub fn symbol_name(&self) -> String {
        format!("{SYMBOL_PREFIX}{}", self.language)
    }

    /// File names tried in each directory, in order.
    #[must_use]
    pub fn library_filenames(&self) -> Vec<String> {
        let lang = self.language.as_str();
        let dashed = lang.replace('_', "-");
        let ext = native_library_extension();
        vec![
            format!("libtree-sitter-{dashed}.{ext}"),
            format!("libtree_sitter_{lang}.{ext}"),
            format!("tree-sitter-{dashed}.{ext}"),
            format!("{lang}.{ext}"),
        ]
    }

    /// Every directory candidate, extra directories first.
    #[must_use]
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.directory_candidates(true)
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    fn directory_candidates(&self, include_extra: bool) -> Vec<(PathBuf, CandidateSource)> {
        let filenames = self.library_filenames();
        let extra = self
            .config
            .extra_dirs
            .iter()
            .filter(|_| include_extra)
            .map(|dir| (dir, CandidateSource::ExtraDirectory));
        let trusted = self
            .config
            .trusted_dirs
            .iter()
            .map(|dir| (dir, CandidateSource::TrustedDirectory));

        extra
            .chain(trusted)
            .flat_map(|(dir, source)| {
                filenames
                    .iter()
                    .map(move |name| (dir.join(name), source))
            })
            .collect()
    }

    /// Run discovery honouring the environment override and extra directories.
    #[must_use]
    pub fn discover(&self) -> Discovery {
        let mut discovery = Discovery::default();

        if let Some(raw) = self.env_override() {
            let path = PathBuf::from(&raw);
            match self.check_env_candidate(&path) {
                Ok(()) => {
                    debug!(
                        language = %self.language,
                        path = %path.display(),
                        "Using grammar library from environment"
                    );
                    discovery.found = Some(self.located(path));
                    return discovery;
                }
                Err(reason) => self.reject(
                    &mut discovery,
                    path,
                    CandidateSource::Environment,
                    reason,
                ),
            }
        }

        self.scan_directories(&mut discovery, true);
        discovery
    }

    /// Run discovery over trusted directories only.
    #[must_use]
    pub fn discover_safe(&self) -> Discovery {
        let mut discovery = Discovery::default();
        self.scan_directories(&mut discovery, false);
        discovery
    }

    /// Path of the first acceptable library.
    #[must_use]
    pub fn find_library_path(&self) -> Option<PathBuf> {
        self.discover().found.map(|grammar| grammar.path)
    }

    /// Path of the first acceptable library in a trusted directory, ignoring
    /// the environment override and extra directories.
    #[must_use]
    pub fn find_library_path_safe(&self) -> Option<PathBuf> {
        self.discover_safe().found.map(|grammar| grammar.path)
    }

    /// Returns `true` if a library can be found.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.find_library_path().is_some()
    }

    /// Human-readable hint for when no library was found.
    #[must_use]
    pub fn not_found_message(&self) -> String {
        let dirs: Vec<String> = self
            .config
            .extra_dirs
            .iter()
            .chain(&self.config.trusted_dirs)
            .map(|dir| dir.display().to_string())
            .collect();
        let filenames = self.library_filenames();
        let first = filenames.first().map_or("", String::as_str);
        format!(
            "tree-sitter grammar for `{}` not found. Set {} to the library path, \
             or install {first} into one of: {}",
            self.language,
            self.env_var_name(),
            if dirs.is_empty() {
                "(no search directories configured)".to_string()
            } else {
                dirs.join(", ")
            }
        )
    }

    /// Register the discovered library for the tree-sitter backend.
    ///
    /// Returns `Ok(false)` if nothing was found.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry refuses the registration.
    pub fn register_into(&self, registry: &LanguageRegistry) -> Result<bool> {
        let Some(found) = self.discover().found else {
            debug!(language = %self.language, "No grammar library to register");
            return Ok(false);
        };
        let registration = Registration::library(found.path, Some(&found.symbol))?;
        registry.register(self.language.clone(), BackendKind::TREE_SITTER, registration)?;
        Ok(true)
    }

    fn env_override(&self) -> Option<String> {
        if self.config.env_policy == EnvPathPolicy::Ignore {
            return None;
        }
        (self.env)(&self.env_var_name()).filter(|value| !value.is_empty())
    }

    fn check_env_candidate(&self, path: &Path) -> std::result::Result<(), RejectionReason> {
        check_library_path(path)?;
        match self.config.env_policy {
            EnvPathPolicy::CharacterClass => check_character_class(path)?,
            EnvPathPolicy::TrustedDirectories => {
                if !within_trusted_directory(path, &self.config.trusted_dirs) {
                    return Err(RejectionReason::UntrustedDirectory);
                }
            }
            EnvPathPolicy::Ignore => {}
        }
        if path.is_file() {
            Ok(())
        } else {
            Err(RejectionReason::NotFound)
        }
    }

    fn scan_directories(&self, discovery: &mut Discovery, include_extra: bool) {
        for (path, source) in self.directory_candidates(include_extra) {
            if let Err(reason) = check_library_path(&path) {
                self.reject(discovery, path, source, reason);
                continue;
            }
            if !path.is_file() {
                trace!(path = %path.display(), "Candidate does not exist");
                continue;
            }
            // A link inside a trusted directory may resolve anywhere.
            if source == CandidateSource::TrustedDirectory
                && !within_trusted_directory(&path, &self.config.trusted_dirs)
            {
                self.reject(discovery, path, source, RejectionReason::UntrustedDirectory);
                continue;
            }
            debug!(
                language = %self.language,
                path = %path.display(),
                source = ?source,
                "Found grammar library"
            );
            discovery.found = Some(self.located(path));
            return;
        }
    }

    fn located(&self, path: PathBuf) -> LocatedGrammar {
        LocatedGrammar {
            path,
            symbol: self.symbol_name(),
        }
    }

    fn reject(
        &self,
        discovery: &mut Discovery,
        path: PathBuf,
        source: CandidateSource,
        reason: RejectionReason,
    ) {
        if self.debug {
            warn!(
                language = %self.language,
                path = %path.display(),
                source = ?source,
                reason = %reason,
                "Rejected grammar library candidate"
            );
        } else {
            debug!(
                language = %self.language,
                path = %path.display(),
                source = ?source,
                reason = %reason,
                "Rejected grammar library candidate"
            );
        }
        discovery.rejections.push(Rejection {
            path,
            source,
            reason,
        });
    }
}

impl std::fmt::Debug for GrammarLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarLocator")
            .field("language", &self.language)
            .field("config", &self.config)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::map_env;
    use tempfile::TempDir;

    fn locator_in(dirs: &[&Path]) -> GrammarLocator {
        let mut config = SwitchyardConfig::default();
        config.locator.trusted_dirs = dirs.iter().map(|d| d.to_path_buf()).collect();
        GrammarLocator::new(&LanguageName::new("toml").expect("valid"), &config)
            .with_env(map_env(Vec::<(String, String)>::new()))
    }

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"").expect("write");
        path
    }

    fn lib(name: &str) -> String {
        format!("{name}.{}", native_library_extension())
    }

    #[test]
    fn env_var_name_uses_prefix_and_uppercase_language() {
        let locator = locator_in(&[]);
        assert_eq!(locator.env_var_name(), "TREE_SITTER_TOML_PATH");
        assert_eq!(locator.symbol_name(), "tree_sitter_toml");
    }

    #[test]
    fn filenames_cover_naming_conventions() {
        let config = SwitchyardConfig::default();
        let locator =
            GrammarLocator::new(&LanguageName::new("c_sharp").expect("valid"), &config);

        assert_eq!(
            locator.library_filenames(),
            vec![
                lib("libtree-sitter-c-sharp"),
                lib("libtree_sitter_c_sharp"),
                lib("tree-sitter-c-sharp"),
                lib("c_sharp"),
            ]
        );
    }

    #[test]
    fn finds_first_convention_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir, &lib("toml"));
        let preferred = touch(&dir, &lib("libtree_sitter_toml"));

        let locator = locator_in(&[dir.path()]);
        assert_eq!(locator.find_library_path(), Some(preferred));
    }

    #[test]
    fn absent_library_is_none_without_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let locator = locator_in(&[dir.path()]);

        let discovery = locator.discover();
        assert!(discovery.found.is_none());
        assert!(discovery.rejections.is_empty());
        assert!(!locator.is_available());
    }

    #[test]
    fn env_override_wins_over_directories() {
        let trusted = tempfile::tempdir().expect("tempdir");
        touch(&trusted, &lib("libtree-sitter-toml"));
        let custom = tempfile::tempdir().expect("tempdir");
        let override_path = touch(&custom, &lib("custom-toml"));

        let locator = locator_in(&[trusted.path()]).with_env(map_env([(
            "TREE_SITTER_TOML_PATH",
            override_path.display().to_string(),
        )]));

        assert_eq!(locator.find_library_path(), Some(override_path));
    }

    #[test]
    fn invalid_env_override_is_rejected_and_search_continues() {
        let trusted = tempfile::tempdir().expect("tempdir");
        let expected = touch(&trusted, &lib("libtree-sitter-toml"));

        let locator = locator_in(&[trusted.path()]).with_env(map_env([(
            "TREE_SITTER_TOML_PATH",
            "../evil/libtree-sitter-toml.so",
        )]));

        let discovery = locator.discover();
        assert_eq!(discovery.found.map(|g| g.path), Some(expected));
        assert_eq!(discovery.rejections.len(), 1);
        assert_eq!(discovery.rejections[0].source, CandidateSource::Environment);
        assert_eq!(discovery.rejections[0].reason, RejectionReason::Traversal);
    }

    #[test]
    fn trusted_directory_policy_rejects_outside_paths() {
        let trusted = tempfile::tempdir().expect("tempdir");
        let elsewhere = tempfile::tempdir().expect("tempdir");
        let outside = touch(&elsewhere, &lib("libtree-sitter-toml"));

        let mut locator = locator_in(&[trusted.path()]).with_env(map_env([(
            "TREE_SITTER_TOML_PATH",
            outside.display().to_string(),
        )]));
        locator.config.env_policy = EnvPathPolicy::TrustedDirectories;

        let discovery = locator.discover();
        assert!(discovery.found.is_none());
        assert_eq!(
            discovery.rejections[0].reason,
            RejectionReason::UntrustedDirectory
        );
    }

    #[test]
    fn ignore_policy_skips_env_override() {
        let custom = tempfile::tempdir().expect("tempdir");
        let override_path = touch(&custom, &lib("custom-toml"));

        let mut locator = locator_in(&[]).with_env(map_env([(
            "TREE_SITTER_TOML_PATH",
            override_path.display().to_string(),
        )]));
        locator.config.env_policy = EnvPathPolicy::Ignore;

        assert!(locator.find_library_path().is_none());
    }

    #[test]
    fn missing_env_file_is_reported_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ghost = dir.path().join(lib("libtree-sitter-toml"));

        let locator = locator_in(&[]).with_env(map_env([(
            "TREE_SITTER_TOML_PATH",
            ghost.display().to_string(),
        )]));

        let discovery = locator.discover();
        assert_eq!(discovery.rejections[0].reason, RejectionReason::NotFound);
    }

    #[test]
    fn safe_mode_ignores_env_and_extra_dirs() {
        let extra = tempfile::tempdir().expect("tempdir");
        touch(&extra, &lib("libtree-sitter-toml"));
        let trusted = tempfile::tempdir().expect("tempdir");

        let mut locator = locator_in(&[trusted.path()]).with_env(map_env([(
            "TREE_SITTER_TOML_PATH",
            "/nonexistent/libtree-sitter-toml.so",
        )]));
        locator.config.extra_dirs = vec![extra.path().to_path_buf()];

        assert!(locator.find_library_path().is_some());
        assert!(locator.find_library_path_safe().is_none());

        let expected = touch(&trusted, &lib("tree-sitter-toml"));
        assert_eq!(locator.find_library_path_safe(), Some(expected));
    }

    #[cfg(unix)]
    #[test]
    fn safe_mode_rejects_link_leaving_trusted_directory() {
        let trusted = tempfile::tempdir().expect("tempdir");
        let outside = tempfile::tempdir().expect("tempdir");
        let target = touch(&outside, &lib("evil"));
        let link = trusted.path().join(lib("libtree-sitter-toml"));
        std::os::unix::fs::symlink(&target, &link).expect("symlink");

        let locator = locator_in(&[trusted.path()]);
        let discovery = locator.discover_safe();

        assert!(discovery.found.is_none());
        assert_eq!(discovery.rejections.len(), 1);
        assert_eq!(discovery.rejections[0].path, link);
        assert_eq!(
            discovery.rejections[0].reason,
            RejectionReason::UntrustedDirectory
        );
        assert!(locator.find_library_path().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn link_within_trusted_directory_is_accepted() {
        let trusted = tempfile::tempdir().expect("tempdir");
        let target = touch(&trusted, &lib("toml-0.23"));
        let link = trusted.path().join(lib("libtree-sitter-toml"));
        std::os::unix::fs::symlink(&target, &link).expect("symlink");

        assert_eq!(locator_in(&[trusted.path()]).find_library_path_safe(), Some(link));
    }

    #[test]
    fn search_paths_list_extra_directories_first() {
        let mut locator = locator_in(&[Path::new("/usr/lib")]);
        locator.config.extra_dirs = vec![PathBuf::from("/opt/grammars")];

        let paths = locator.search_paths();

        assert_eq!(paths.len(), 8);
        assert_eq!(paths[0], Path::new("/opt/grammars").join(lib("libtree-sitter-toml")));
        assert_eq!(paths[4], Path::new("/usr/lib").join(lib("libtree-sitter-toml")));
    }

    #[test]
    fn relative_extra_directory_is_rejected() {
        let mut locator = locator_in(&[]);
        locator.config.extra_dirs = vec![PathBuf::from("grammars")];

        let discovery = locator.discover();
        assert!(discovery.found.is_none());
        assert!(
            discovery
                .rejections
                .iter()
                .all(|r| r.reason == RejectionReason::NotAbsolute
                    && r.source == CandidateSource::ExtraDirectory)
        );
        assert_eq!(discovery.rejections.len(), 4);
    }

    #[test]
    fn not_found_message_names_override_variable() {
        let message = locator_in(&[Path::new("/usr/lib")]).not_found_message();

        assert!(message.contains("TREE_SITTER_TOML_PATH"));
        assert!(message.contains("/usr/lib"));
    }
}
