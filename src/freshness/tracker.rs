//! Per-module staleness tracking.
//!
//! Each module name maps to the last successful mtime reading of its source
//! file. A module is dirty when a new reading is strictly newer than the
//! stored one, or when it is seen for the first time with a readable file.
//!
//! # Unavailable readings
//!
//! | previous      | current     | dirty | stored after |
//! |---------------|-------------|-------|--------------|
//! | (first sight) | `Some(t)`   | yes   | `Some(t)`    |
//! | (first sight) | `None`      | no    | `None`       |
//! | `Some(p)`     | `Some(t>p)` | yes   | `Some(t)`    |
//! | `Some(p)`     | `Some(t<=p)`| no    | `Some(t)`    |
//! | `Some(p)`     | `None`      | no    | `Some(p)`    |
//! | `None`        | `Some(t)`   | no    | `Some(t)`    |
//!
//! A failed stat never discards the last good reading, so a transient error
//! followed by an unchanged file does not trigger a reload.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;

use rustc_hash::FxHashMap;

use super::get_mtime;
use crate::runtime::Runtime;

#[derive(Debug, Default)]
pub struct StalenessTracker {
    last: FxHashMap<String, Option<SystemTime>>,
}

impl StalenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading for `name` and report whether it is newly dirty.
    ///
    /// `path` is `None` for modules without a backing file; those are never
    /// dirty.
    pub fn observe(&mut self, name: &str, path: Option<&Path>) -> bool {
        let current = path.and_then(get_mtime);

        let Some(previous) = self.last.get_mut(name) else {
            self.last.insert(name.to_string(), current);
            return current.is_some();
        };

        match (*previous, current) {
            (_, None) => false,
            (Some(prev), Some(now)) => {
                *previous = Some(now);
                now > prev
            }
            (None, Some(now)) => {
                *previous = Some(now);
                false
            }
        }
    }

    /// Record a reading without reporting it.
    pub fn prime(&mut self, name: &str, path: Option<&Path>) {
        self.observe(name, path);
    }

    /// Check `names` against the runtime's registered modules and return
    /// the ones that changed since the last check.
    ///
    /// Names that are not registered are skipped.
    pub fn check<'a>(
        &mut self,
        runtime: &Runtime,
        names: impl IntoIterator<Item = &'a String>,
    ) -> BTreeSet<String> {
        names
            .into_iter()
            .filter(|name| {
                let path = module_path(runtime, name);
                self.observe(name, path)
            })
            .cloned()
            .collect()
    }

    /// Record current readings of `names` without reporting changes.
    pub fn prime_all<'a>(&mut self, runtime: &Runtime, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            self.prime(name, module_path(runtime, name));
        }
    }

    /// Drop the reading for `name`, so the next check treats it as first
    /// sight.
    pub fn forget(&mut self, name: &str) {
        self.last.remove(name);
    }

    /// Last stored reading for `name` (outer `None`: never observed).
    pub fn last_reading(&self, name: &str) -> Option<Option<SystemTime>> {
        self.last.get(name).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.last.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Source path of a registered module, `None` for file-less modules.
fn module_path<'r>(runtime: &'r Runtime, name: &str) -> Option<&'r Path> {
    let handle = runtime.module(name)?;
    runtime.heap().module(handle).ok()?.path.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MAIN_MODULE;
    use crate::testing::ModuleTree;
    use std::fs;

    #[test]
    fn test_first_sight_with_file_is_dirty() {
        let mut tree = ModuleTree::new();
        let path = tree.write("a", "");
        let mut tracker = StalenessTracker::new();

        assert!(tracker.observe("a", Some(&path)));
        assert!(!tracker.observe("a", Some(&path)));
    }

    #[test]
    fn test_modules_without_file_are_never_dirty() {
        let mut tracker = StalenessTracker::new();
        assert!(!tracker.observe(MAIN_MODULE, None));
        assert!(!tracker.observe(MAIN_MODULE, None));
        assert_eq!(tracker.last_reading(MAIN_MODULE), Some(None));
    }

    #[test]
    fn test_newer_mtime_is_dirty_once() {
        let mut tree = ModuleTree::new();
        let path = tree.write("a", "");
        let mut tracker = StalenessTracker::new();
        tracker.prime("a", Some(&path));

        tree.touch("a");

        assert!(tracker.observe("a", Some(&path)));
        assert!(!tracker.observe("a", Some(&path)));
    }

    #[test]
    fn test_stat_failure_keeps_last_reading() {
        let mut tree = ModuleTree::new();
        let path = tree.write("a", "");
        let mut tracker = StalenessTracker::new();
        tracker.prime("a", Some(&path));
        let before = tracker.last_reading("a");

        let moved = path.with_extension("bak");
        fs::rename(&path, &moved).unwrap();
        assert!(!tracker.observe("a", Some(&path)));
        assert_eq!(tracker.last_reading("a"), before);

        fs::rename(&moved, &path).unwrap();
        assert!(!tracker.observe("a", Some(&path)));
    }

    #[test]
    fn test_unavailable_then_readable_is_not_dirty() {
        let mut tree = ModuleTree::new();
        let path = tree.path_of("a");
        let mut tracker = StalenessTracker::new();

        assert!(!tracker.observe("a", Some(&path)));
        tree.write("a", "");
        assert!(!tracker.observe("a", Some(&path)));

        tree.touch("a");
        assert!(tracker.observe("a", Some(&path)));
    }

    #[test]
    fn test_forgotten_module_is_dirty_again() {
        let mut tree = ModuleTree::new();
        let path = tree.write("a", "");
        let mut tracker = StalenessTracker::new();
        tracker.prime("a", Some(&path));

        tracker.forget("a");
        assert_eq!(tracker.last_reading("a"), None);
        assert!(tracker.observe("a", Some(&path)));
        assert!(!tracker.observe("a", Some(&path)));
    }

    #[test]
    fn test_check_against_runtime() {
        let mut tree = ModuleTree::new();
        tree.write("a", "");
        tree.write("b", "");
        let mut rt = tree.runtime();
        rt.import_module("a").unwrap();
        rt.import_module("b").unwrap();

        let names: Vec<String> = ["a", "b", MAIN_MODULE, "unloaded"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut tracker = StalenessTracker::new();

        let first = tracker.check(&rt, &names);
        assert_eq!(first, BTreeSet::from(["a".to_string(), "b".to_string()]));
        assert!(tracker.check(&rt, &names).is_empty());

        tree.touch("b");
        assert_eq!(tracker.check(&rt, &names), BTreeSet::from(["b".to_string()]));
    }
}
