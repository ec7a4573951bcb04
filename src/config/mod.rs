//! Project configuration for `autoreload.toml`.
//!
//! # Sections
//!
//! | Section   | Purpose                                          |
//! |-----------|--------------------------------------------------|
//! | `[paths]` | Source roots modules are loaded from             |
//! | `[watch]` | Watched prefixes, reload mode, debounce interval |
//!
//! # Example
//!
//! ```toml
//! [paths]
//! roots = ["src", "~/shared/modules"]
//!
//! [watch]
//! prefixes = ["app"]
//! recursive = true
//! mode = "update-inplace"
//! debounce_ms = 300
//! ```
//!
//! CLI flags override the file. Without a config file every field takes its
//! default and the current directory is the project root.

mod error;
mod util;

pub use error::ConfigError;
pub use util::{find_config_file, resolve_path};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{Cli, Commands};
use crate::loader::DirLoader;
use crate::log;
use crate::reload::{ReloadMode, WatchConfig};

/// Default config file name, searched upward from the working directory.
pub const CONFIG_FILE: &str = "autoreload.toml";

/// Default watcher debounce interval.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Module source roots, relative to the project root.
    pub roots: Vec<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchSection {
    pub prefixes: Vec<String>,
    pub recursive: bool,
    pub mode: ReloadMode,
    pub verbose: bool,
    /// Quiet period after the last file event before a reload cycle runs.
    pub debounce_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            prefixes: Vec::new(),
            recursive: true,
            mode: ReloadMode::default(),
            verbose: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Root configuration structure for `autoreload.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub paths: PathsConfig,
    pub watch: WatchSection,

    /// Path of the loaded config file (None when running on defaults).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Project root: the config file's directory, or the working directory.
    #[serde(skip)]
    pub root: PathBuf,
}

impl ReloadConfig {
    /// Load configuration for `cli`, searching upward from the working
    /// directory for the config file.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        Self::load_from(&cwd, cli)
    }

    /// [`load`](Self::load) with an explicit starting directory.
    pub fn load_from(cwd: &Path, cli: &Cli) -> Result<Self> {
        let mut config = match find_config_file(cwd, &cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                config.config_path = Some(path);
                config
            }
            None => Self {
                root: cwd.to_path_buf(),
                ..Self::default()
            },
        };

        config.apply_cli(cli);
        config.normalize_paths();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let (config, ignored) = Self::parse_with_ignored(&content)?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        eprintln!();
        log!("warning"; "unknown fields in {}:", display_path);
        log!("warning"; "ignoring:");
        for field in fields {
            eprintln!("- {}", field);
        }
        eprintln!();
    }

    /// CLI flags win over the file.
    fn apply_cli(&mut self, cli: &Cli) {
        if !cli.root.is_empty() {
            self.paths.roots = cli.root.clone();
        }
        if !cli.watch.is_empty() {
            self.watch.prefixes = cli.watch.clone();
        }
        Self::update_option(&mut self.watch.mode, cli.mode.as_ref());
        if cli.verbose {
            self.watch.verbose = true;
        }
        if cli.no_recursive {
            self.watch.recursive = false;
        }
        if let Commands::Watch { debounce } = &cli.command {
            Self::update_option(&mut self.watch.debounce_ms, debounce.as_ref());
        }
    }

    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(value) = cli_option {
            *config_option = value.clone();
        }
    }

    fn normalize_paths(&mut self) {
        let root = self.root.clone();
        for path in &mut self.paths.roots {
            *path = resolve_path(&root, path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.paths.roots.is_empty() {
            return Err(ConfigError::Validation("[paths.roots] must not be empty".into()).into());
        }
        for prefix in &self.watch.prefixes {
            if !is_valid_module_name(prefix) {
                return Err(ConfigError::Validation(format!(
                    "[watch.prefixes] `{prefix}` is not a dotted module name"
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            prefixes: self.watch.prefixes.clone(),
            recursive: self.watch.recursive,
            mode: self.watch.mode,
            verbose: self.watch.verbose,
        }
    }

    pub fn loader(&self) -> DirLoader {
        DirLoader::new(self.paths.roots.iter().cloned())
    }
}

/// `a`, `a.b_c`: non-empty segments without whitespace or path separators.
fn is_valid_module_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && !segment
                    .chars()
                    .any(|c| c.is_whitespace() || c == '/' || c == '\\' || c == ':')
        })
}

// ============================================================================
// tests
// ============================================================================
