//! Loaded-module registry.
//!
//! Maps fully-qualified module names to the module object currently
//! considered "the" module. Removing an entry does not free the module:
//! anything still holding its handle keeps using it until the next
//! collection finds it unreachable.

use indexmap::IndexMap;

use super::heap::ObjRef;

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: IndexMap<String, ObjRef>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<ObjRef> {
        self.modules.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, module: ObjRef) -> Option<ObjRef> {
        self.modules.insert(name.into(), module)
    }

    /// Drop the cache entry for `name`, returning the old module handle.
    pub fn remove(&mut self, name: &str) -> Option<ObjRef> {
        self.modules.shift_remove(name)
    }

    /// Module names in import order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// All registered module handles (the GC roots).
    pub fn handles(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.modules.values().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
