//! Engine configuration.
//!
//! Values come from, in rising priority: the defaults, an optional TOML file
//! with a `[tsumiki]` table, and `TSUMIKI_*` environment variables.
//!
//! ```toml
//! [tsumiki]
//! store_path = ".tsumiki_cache"
//! log_file = "pipeline.log"
//! verbose = true
//! ```

use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_STORE_ROOT: &str = ".tsumiki_cache";

pub const ENV_STORE_PATH: &str = "TSUMIKI_STORE_PATH";
pub const ENV_LOG_FILE: &str = "TSUMIKI_LOG_FILE";
pub const ENV_VERBOSE: &str = "TSUMIKI_VERBOSE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding one sub-directory per pipeline.
    pub store_root: Utf8PathBuf,
    /// Plain-text log destination used by `init_logging`.
    pub log_file: Option<Utf8PathBuf>,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_root: Utf8PathBuf::from(DEFAULT_STORE_ROOT),
            log_file: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    tsumiki: Section,
}

#[derive(Debug, Default, Deserialize)]
struct Section {
    store_path: Option<Utf8PathBuf>,
    log_file: Option<Utf8PathBuf>,
    verbose: Option<bool>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("no config file at {}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                });
            }
        };

        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(text)?;
        Ok(Self::default().apply(file.tsumiki))
    }

    fn apply(mut self, section: Section) -> Self {
        if let Some(store_path) = section.store_path {
            self.store_root = store_path;
        }
        if let Some(log_file) = section.log_file {
            self.log_file = Some(log_file);
        }
        if let Some(verbose) = section.verbose {
            self.verbose = verbose;
        }
        self
    }

    /// Applies the `TSUMIKI_*` environment overrides.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup. Blank values are ignored.
    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v: &String| !v.trim().is_empty());

        if let Some(v) = lookup(ENV_STORE_PATH) {
            self.store_root = v.into();
        }
        if let Some(v) = lookup(ENV_LOG_FILE) {
            self.log_file = Some(v.into());
        }
        if let Some(v) = lookup(ENV_VERBOSE) {
            self.verbose = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        self
    }

    pub fn with_store_root(mut self, store_root: impl Into<Utf8PathBuf>) -> Self {
        self.store_root = store_root.into();
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<Utf8PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Where the store of the pipeline named `pipeline` lives.
    pub fn store_path(&self, pipeline: &str) -> Utf8PathBuf {
        self.store_root.join(pipeline)
    }
}
