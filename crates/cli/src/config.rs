use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};
use store::BatchLimits;

#[cfg(windows)]
pub fn config_dir() -> PathBuf {
    std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("conftrace")
}

#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".config")
        .join("conftrace")
}

fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./conftrace-store")
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_generic() -> usize {
    BatchLimits::default().generic
}

fn default_small() -> usize {
    BatchLimits::default().small
}

fn default_range_chunk() -> u64 {
    BatchLimits::default().range_chunk
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchConfig {
    #[serde(default = "default_generic")]
    pub generic: usize,
    #[serde(default = "default_small")]
    pub small: usize,
    #[serde(default = "default_range_chunk")]
    pub range_chunk: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            generic: default_generic(),
            small: default_small(),
            range_chunk: default_range_chunk(),
        }
    }
}

impl BatchConfig {
    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            generic: self.generic,
            small: self.small,
            range_chunk: self.range_chunk,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Config {
    /// Store directory, with `--store` taking precedence.
    pub fn store_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .unwrap_or_else(|| self.store.dir.clone())
    }
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_file_path())
}

/// Reads `path`, falling back to defaults when it does not exist.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.store.dir, PathBuf::from("./conftrace-store"));
        assert_eq!(cfg.batch.limits(), BatchLimits::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[batch]\nsmall = 10\n").unwrap();
        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.batch.small, 10);
        assert_eq!(cfg.batch.generic, 5000);
        assert_eq!(cfg.batch.range_chunk, 500);
        assert_eq!(cfg.store, StoreConfig::default());
    }

    #[test]
    fn store_flag_overrides_file() {
        let cfg = Config::default();
        assert_eq!(
            cfg.store_dir(Some(Path::new("/tmp/s"))),
            PathBuf::from("/tmp/s")
        );
        assert_eq!(cfg.store_dir(None), PathBuf::from("./conftrace-store"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[batch\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }
}
