//! Weak snapshots of previous module generations.

use indexmap::IndexMap;

use crate::runtime::{Heap, ObjRef, RunResult};

/// Handles to every earlier version of one module and to the patchable
/// objects its top-level bindings held.
///
/// Handles do not keep anything alive. Dead entries are only dropped by
/// [`ModuleRefs::update_refs_with_new_module`], which returns a fresh set
/// holding the survivors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModuleRefs {
    pub(super) modules: Vec<ObjRef>,
    pub(super) objs: IndexMap<String, Vec<ObjRef>>,
}

impl ModuleRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `module` and the objects it owns.
    ///
    /// Only bindings whose value was defined by this module (not re-exported
    /// from elsewhere) and that the patcher can update are tracked.
    pub fn save_module(&mut self, heap: &Heap, module: ObjRef) -> RunResult<()> {
        let m = heap.module(module)?;
        self.modules.push(module);

        for (name, value) in &m.namespace {
            let Some(obj) = value.as_obj() else {
                continue;
            };
            let patchable = heap.kind(obj).is_some_and(|k| k.is_patchable());
            if !patchable || heap.owner_module(obj) != Some(m.name.as_str()) {
                continue;
            }
            self.objs.entry(name.clone()).or_default().push(obj);
        }

        Ok(())
    }

    /// Module versions recorded so far.
    pub fn modules(&self) -> &[ObjRef] {
        &self.modules
    }

    /// Objects recorded under the binding `name`, oldest first.
    pub fn objs(&self, name: &str) -> &[ObjRef] {
        self.objs.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Binding names with tracked objects.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objs.keys().map(String::as_str)
    }

    /// Total number of tracked objects.
    pub fn object_count(&self) -> usize {
        self.objs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.objs.is_empty()
    }
}
