//! Test helpers: temporary module trees with controlled mtimes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::loader::DirLoader;
use crate::runtime::{Runtime, Value};

/// A temporary source root. Every write moves the file's mtime forward by a
/// fixed step, so staleness checks never depend on filesystem granularity.
pub struct ModuleTree {
    dir: TempDir,
    clock: SystemTime,
}

impl ModuleTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            clock: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path_of(&self, module: &str) -> PathBuf {
        let rel: PathBuf = module.split('.').collect();
        self.root().join(rel.with_extension("toml"))
    }

    /// Write `<module>.toml` and advance its mtime.
    pub fn write(&mut self, module: &str, content: &str) -> PathBuf {
        let path = self.path_of(module);
        self.write_path(&path, content);
        path
    }

    /// Write `<package>/mod.toml` and advance its mtime.
    pub fn write_package(&mut self, package: &str, content: &str) -> PathBuf {
        let rel: PathBuf = package.split('.').collect();
        let path = self.root().join(rel).join("mod.toml");
        self.write_path(&path, content);
        path
    }

    /// Advance the mtime of an existing module file without changing it.
    pub fn touch(&mut self, module: &str) {
        let path = self.path_of(module);
        self.bump(&path);
    }

    fn write_path(&mut self, path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self.bump(path);
    }

    fn bump(&mut self, path: &Path) {
        self.clock += Duration::from_secs(10);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(self.clock).unwrap();
    }

    pub fn runtime(&self) -> Runtime {
        Runtime::new(DirLoader::new([self.root().to_path_buf()]))
    }
}

/// Call `path` (dotted, starting from a session variable) with no arguments.
pub fn call0(rt: &mut Runtime, base: &Value, path: &str) -> Value {
    let callee = rt.get_path(base, path).unwrap();
    rt.call(&callee, Vec::new()).unwrap()
}
