//! Grammar discovery feeding the registry, configured from YAML and the
//! environment.

mod common;

use std::sync::Arc;

use common::{fake_library, init_tracing, lang};
use switchyard::config::{BACKEND_ENV, TRUSTED_DIRS_ENV, map_env};
use switchyard::{
    BackendKind, EnvPathPolicy, GrammarLocator, LanguageRegistry, Parser, SwitchyardConfig,
};

#[test]
fn configured_directory_grammar_is_registered_and_parses() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    fake_library(&dir, "rust");
    let config_path = dir.path().join("switchyard.yaml");
    std::fs::write(
        &config_path,
        format!(
            "locator:\n  extra-dirs:\n    - {}\n  trusted-dirs: []\n  env-policy: ignore\n",
            dir.path().display()
        ),
    )
    .expect("write config");

    let config = SwitchyardConfig::load(&config_path).expect("load config");
    assert_eq!(config.locator.env_policy, EnvPathPolicy::Ignore);
    let registry = Arc::new(LanguageRegistry::with_defaults(config.clone()));

    let locator = GrammarLocator::new(&lang("rust"), &config);
    assert!(locator.register_into(&registry).expect("register"));

    let mut parser = Parser::for_language(&registry, &lang("rust"), None).expect("parser");
    let tree = parser.parse("struct Unit;").expect("parse");
    assert_eq!(
        tree.root_node().and_then(|root| root.child(0)).map(|n| n.kind().to_string()),
        Some("struct_item".to_string())
    );
}

#[test]
fn environment_override_is_registered() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let library = fake_library(&dir, "c_sharp");
    let env = map_env([(
        "TREE_SITTER_C_SHARP_PATH",
        library.to_str().expect("utf-8 temp path"),
    )]);
    let mut config = SwitchyardConfig::default();
    config.locator.trusted_dirs.clear();
    let registry = LanguageRegistry::with_defaults(config.clone());

    let locator = GrammarLocator::new(&lang("c_sharp"), &config).with_env(env);

    assert_eq!(locator.find_library_path(), Some(library));
    assert!(locator.register_into(&registry).expect("register"));
    let handle = registry.language(&lang("c_sharp")).expect("load");
    assert_eq!(handle.backend(), &BackendKind::TREE_SITTER);
}

#[test]
fn nothing_found_registers_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = SwitchyardConfig::default();
    config.locator.trusted_dirs = vec![dir.path().to_path_buf()];
    let registry = LanguageRegistry::with_defaults(config.clone());

    let locator = GrammarLocator::new(&lang("toml"), &config)
        .with_env(map_env(Vec::<(String, String)>::new()));

    assert!(!locator.register_into(&registry).expect("no error"));
    assert!(registry.registered_languages().is_empty());
    assert!(locator.not_found_message().contains("TREE_SITTER_TOML_PATH"));
}

#[test]
fn environment_selects_default_backend_and_trusted_dirs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env = map_env([
        (BACKEND_ENV, "grammar".to_string()),
        (TRUSTED_DIRS_ENV, dir.path().display().to_string()),
    ]);
    let mut config = SwitchyardConfig::default();

    config.apply_env(&env).expect("apply env");

    assert_eq!(config.backend, Some(BackendKind::GRAMMAR));
    assert_eq!(config.locator.trusted_dirs.last(), Some(&dir.path().to_path_buf()));

    let registry = Arc::new(LanguageRegistry::with_defaults(config));
    let parser = Parser::new(&registry).expect("parser");
    assert_eq!(parser.backend(), &BackendKind::GRAMMAR);
    assert!(parser.is_explicit());
}
