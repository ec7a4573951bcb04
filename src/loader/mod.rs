//! Module source discovery and parsing.
//!
//! A [`SourceLoader`] maps dotted module names to files and parses them into
//! [`ModuleSource`]s. The runtime executes sources; the loader never touches
//! the heap.

mod source;

pub use source::{
    ClassSource, Code, FunctionSource, InstanceSource, Literal, ModuleSource, PropertySource,
};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use thiserror::Error;

/// Extension of module source files.
pub const SOURCE_EXTENSION: &str = "toml";

/// File name that makes a directory a package (`pkg/mod.toml` is `pkg`).
pub const PACKAGE_FILE: &str = "mod.toml";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid module source `{0}`")]
    Toml(PathBuf, #[source] toml::de::Error),
}

/// Locates and reads module sources.
pub trait SourceLoader {
    /// Path of the source file backing `name`, if one exists.
    fn locate(&self, name: &str) -> Option<PathBuf>;

    /// Read and parse a source file.
    fn load(&self, path: &Path) -> Result<ModuleSource, LoadError> {
        let content =
            fs::read_to_string(path).map_err(|err| LoadError::Io(path.to_path_buf(), err))?;
        parse_source(&content, path)
    }
}

/// Parse module source text; `path` is only used for diagnostics.
pub fn parse_source(content: &str, path: &Path) -> Result<ModuleSource, LoadError> {
    toml::from_str(content).map_err(|err| LoadError::Toml(path.to_path_buf(), err))
}

/// Loads modules from a list of source roots; the first root that has the
/// module wins.
///
/// ```text
/// <root>/app/shapes.toml      ← app.shapes
/// <root>/app/mod.toml         ← app
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirLoader {
    roots: Vec<PathBuf>,
}

impl DirLoader {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Names of every module with a source file under the roots.
    pub fn discover(&self) -> BTreeSet<String> {
        self.roots
            .iter()
            .flat_map(|root| {
                WalkDir::new(root)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .filter_map(|e| module_name_for(root, &e.path()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Candidate relative paths for a module name.
    fn candidates(name: &str) -> [PathBuf; 2] {
        let rel: PathBuf = name.split('.').collect();
        [rel.with_extension(SOURCE_EXTENSION), rel.join(PACKAGE_FILE)]
    }
}

impl SourceLoader for DirLoader {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return None;
        }
        let candidates = Self::candidates(name);
        self.roots
            .iter()
            .flat_map(|root| candidates.iter().map(move |rel| root.join(rel)))
            .find(|path| path.is_file())
    }
}

/// Dotted module name for a source file under `root`, if it is one.
///
/// Inverse of [`DirLoader::locate`]; used to map watcher events back to
/// module names.
pub fn module_name_for(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
        return None;
    }

    let rel = if rel.file_name().and_then(|n| n.to_str()) == Some(PACKAGE_FILE) {
        rel.parent()?.to_path_buf()
    } else {
        rel.with_extension("")
    };

    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("."))
}
