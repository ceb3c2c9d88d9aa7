//! Configuration loading tests

use std::path::{Path, PathBuf};
use terra_common::config::{database_path, resolve_root_folder, ConfigOverrides, TomlConfig};
use terra_common::Error;

#[test]
fn test_load_unreadable_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    // An explicit path that does not exist is a read error
    let err = TomlConfig::load(Some(&missing), &ConfigOverrides::default()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_cli_root_overrides_toml_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scraper.toml");
    std::fs::write(&path, "root_folder = \"/srv/terraminer\"\n").unwrap();

    let config = TomlConfig::load(Some(&path), &ConfigOverrides::default()).unwrap();
    assert_eq!(
        resolve_root_folder(Some(Path::new("/tmp/terraminer-cli")), &config),
        PathBuf::from("/tmp/terraminer-cli")
    );
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/srv/terraminer")
    );
}

#[test]
fn test_overrides_applied_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scraper.toml");
    std::fs::write(&path, "[portal]\nbase_url = \"https://portal.example\"\n").unwrap();

    let overrides = ConfigOverrides {
        portal_url: Some("http://localhost:9000".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };
    let config = TomlConfig::load(Some(&path), &overrides).unwrap();

    assert_eq!(config.portal.base_url, "http://localhost:9000");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.server.bind, "127.0.0.1:5740");
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scraper.toml");

    for content in ["[retry]\nmultiplier = 0.5\n", "[retry]\nmultiplier = inf\n"] {
        std::fs::write(&path, content).unwrap();
        assert!(matches!(
            TomlConfig::load(Some(&path), &ConfigOverrides::default()),
            Err(Error::Config(_))
        ));
    }

    // An empty portal URL from the command line is caught too
    std::fs::write(&path, "").unwrap();
    let overrides = ConfigOverrides {
        portal_url: Some(" ".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        TomlConfig::load(Some(&path), &overrides),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_database_lives_in_root_folder() {
    let root = PathBuf::from("/data/terraminer");
    assert_eq!(database_path(&root), root.join("terraminer.db"));
}
