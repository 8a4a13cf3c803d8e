//! Root folder resolution tests
//!
//! Uses serial_test to prevent IMON_ROOT_FOLDER races between tests that
//! manipulate the process environment.

use imon_common::config::{get_default_root_folder, resolve_root_folder, ROOT_FOLDER_ENV};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, None);
    assert_eq!(resolved, get_default_root_folder());
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/imon-test-env-folder");

    let toml = PathBuf::from("/tmp/imon-test-toml-folder");
    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&toml));
    assert_eq!(resolved, PathBuf::from("/tmp/imon-test-env-folder"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_cli_beats_env_var() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/imon-test-env-folder");

    let cli = PathBuf::from("/tmp/imon-test-cli-folder");
    let resolved = resolve_root_folder(Some(&cli), ROOT_FOLDER_ENV, None);
    assert_eq!(resolved, cli);

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "   ");

    let toml = PathBuf::from("/tmp/imon-test-toml-folder");
    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, Some(&toml));
    assert_eq!(resolved, toml);

    env::remove_var(ROOT_FOLDER_ENV);
}
