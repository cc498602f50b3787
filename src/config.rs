//! Configuration: a TOML file layered under CLI overrides, with tolerant
//! fallback to defaults when the file is missing or partial.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

/// On-disk configuration, loaded from a TOML file (default `config.toml`).
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub account_id: String,
    pub application_key: String,
    pub bucket_id: String,
    pub bucket_name: String,
    pub enable_hashfiles: bool,
    pub temp_folder: PathBuf,
    pub use_disk: bool,
    /// When `use_disk` is false, selects the sparse byte-range strategy
    /// over the default whole-file `SequentialMemory` strategy.
    pub sparse_reads: bool,
    /// Soft cap on in-memory buffered bytes across all open files, in MiB.
    /// `None` means unbounded.
    pub memory_limit_mib: Option<u64>,
    /// Part size for the sparse, byte-range strategy, in MiB.
    pub file_download_split_mib: u64,
    pub cache_ttl_seconds: u64,
    pub kernel_attr_timeout_seconds: u64,
    pub kernel_entry_timeout_seconds: u64,
    /// Size of the async write-pipeline worker pool. Zero disables the
    /// pipeline entirely: flush/release then upload synchronously.
    pub pipeline_workers: usize,
    pub debounce_secs: u64,
    pub max_retries: u32,
    pub purge_on_release: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            application_key: String::new(),
            bucket_id: String::new(),
            bucket_name: String::new(),
            enable_hashfiles: false,
            temp_folder: std::env::temp_dir().join("b2fs"),
            use_disk: false,
            sparse_reads: false,
            memory_limit_mib: None,
            file_download_split_mib: 1,
            cache_ttl_seconds: 120,
            kernel_attr_timeout_seconds: 1,
            kernel_entry_timeout_seconds: 1,
            pipeline_workers: 0,
            debounce_secs: 15,
            max_retries: 3,
            purge_on_release: false,
        }
    }
}

impl Config {
    pub fn part_size_bytes(&self) -> u64 {
        self.file_download_split_mib * 1024 * 1024
    }
}

/// `b2fs` — mount a remote object-storage bucket as a POSIX-like filesystem.
#[derive(Parser, Debug)]
#[command(name = "b2fs", about = "Mount a remote bucket as a filesystem")]
pub struct Cli {
    /// Directory to mount the filesystem at.
    pub mountpoint: PathBuf,

    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    #[arg(long)]
    pub account_id: Option<String>,
    #[arg(long)]
    pub application_key: Option<String>,
    #[arg(long)]
    pub bucket_id: Option<String>,
    #[arg(long)]
    pub bucket_name: Option<String>,
    #[arg(long)]
    pub enable_hashfiles: bool,
    #[arg(long)]
    pub temp_folder: Option<PathBuf>,
    #[arg(long)]
    pub use_disk: bool,
    #[arg(long)]
    pub sparse_reads: bool,
    #[arg(long)]
    pub memory_limit: Option<u64>,
    #[arg(long)]
    pub file_download_split: Option<u64>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub debounce_secs: Option<u64>,
}

impl Cli {
    /// Loads the file config, falling back to defaults on any error (logging
    /// why), and layers the CLI flags on top.
    pub fn into_config(self) -> Config {
        let mut config = load_config(&self.config);

        if let Some(v) = self.account_id {
            config.account_id = v;
        }
        if let Some(v) = self.application_key {
            config.application_key = v;
        }
        if let Some(v) = self.bucket_id {
            config.bucket_id = v;
        }
        if let Some(v) = self.bucket_name {
            config.bucket_name = v;
        }
        if self.enable_hashfiles {
            config.enable_hashfiles = true;
        }
        if let Some(v) = self.temp_folder {
            config.temp_folder = v;
        }
        if self.use_disk {
            config.use_disk = true;
        }
        if self.sparse_reads {
            config.sparse_reads = true;
        }
        if let Some(v) = self.memory_limit {
            config.memory_limit_mib = Some(v);
        }
        if let Some(v) = self.file_download_split {
            config.file_download_split_mib = v;
        }
        if let Some(v) = self.workers {
            config.pipeline_workers = v;
        }
        if let Some(v) = self.debounce_secs {
            config.debounce_secs = v;
        }
        config
    }
}

fn load_config(path: &Path) -> Config {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Config::default();
    }

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read config file, using defaults");
            return Config::default();
        }
    };

    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to parse config file, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_part_size() {
        let config = Config::default();
        assert_eq!(config.part_size_bytes(), 1024 * 1024);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = load_config(Path::new("/nonexistent/b2fs-config.toml"));
        assert_eq!(config.bucket_id, "");
        assert_eq!(config.debounce_secs, 15);
    }
}
