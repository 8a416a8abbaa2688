//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Directory holding the fixture config files.
pub fn configs_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/configs")
}

/// Path to a named fixture config file.
pub fn config_path(name: &str) -> PathBuf {
    configs_dir().join(name)
}

/// Argv for the harness, program name first.
pub fn argv(args: &[&str]) -> Vec<String> {
    std::iter::once("releng")
        .chain(args.iter().copied())
        .map(String::from)
        .collect()
}
