//! In-place patching of old objects from a freshly reloaded module.
//!
//! Old objects keep their identity; only their contents change:
//!
//! | old → new             | update                                          |
//! |-----------------------|-------------------------------------------------|
//! | module → module       | namespace replaced by a copy of the new one     |
//! | class → class         | attributes patched/rebound/deleted, instances   |
//! |                       | repointed to the new class                      |
//! | function → function   | code, params, defaults, doc, closure, globals,  |
//! |                       | attribute dict copied                           |
//! | method → method       | function rule on the underlying functions       |
//! | property → property   | getter, setter, deleter patched                 |
//!
//! Any other pairing, and identical handles, are left alone.

use rustc_hash::FxHashSet;

use super::snapshot::ModuleRefs;
use crate::log;
use crate::logger::plural_count;
use crate::runtime::{Heap, ObjRef, ObjectKind, RunResult};

/// Counters of one patch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PatchStats {
    pub classes: usize,
    pub functions: usize,
    pub properties: usize,
    /// Instances repointed to a new class.
    pub instances: usize,
    pub attrs_deleted: usize,
    /// Read-only attributes left untouched.
    pub attrs_skipped: usize,
}

/// Outcome of patching the old generations of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePatch {
    pub module: String,
    /// Old module versions before pruning.
    pub versions: usize,
    /// Old module versions still alive.
    pub versions_retained: usize,
    /// Tracked objects before pruning.
    pub objects: usize,
    /// Tracked objects still alive and still bound in the new module.
    pub objects_retained: usize,
    pub stats: PatchStats,
}

/// Applies the update rules, remembering `(old, new)` pairs so a class
/// graph with cycles is patched once per pair and terminates.
pub struct Patcher<'h> {
    heap: &'h mut Heap,
    visited: FxHashSet<(ObjRef, ObjRef)>,
    stats: PatchStats,
}

impl<'h> Patcher<'h> {
    pub fn new(heap: &'h mut Heap) -> Self {
        Self {
            heap,
            visited: FxHashSet::default(),
            stats: PatchStats::default(),
        }
    }

    pub fn stats(&self) -> PatchStats {
        self.stats
    }

    /// Replace the old module's namespace with a copy of the new one.
    pub fn update_module(&mut self, old: ObjRef, new: ObjRef) -> RunResult<()> {
        if old == new {
            return Ok(());
        }
        let new = self.heap.module(new)?;
        let (namespace, doc) = (new.namespace.clone(), new.doc.clone());
        let old = self.heap.module_mut(old)?;
        old.namespace = namespace;
        old.doc = doc;
        old.invalidated = false;
        Ok(())
    }

    /// Update `old` from `new` with the rule matching both kinds.
    pub fn update_generic(&mut self, old: ObjRef, new: ObjRef) -> RunResult<()> {
        if old == new || !self.visited.insert((old, new)) {
            return Ok(());
        }

        match (self.heap.kind(old), self.heap.kind(new)) {
            (Some(ObjectKind::Class), Some(ObjectKind::Class)) => self.update_class(old, new),
            (Some(ObjectKind::Function), Some(ObjectKind::Function)) => {
                self.update_function(old, new)
            }
            (Some(ObjectKind::Method), Some(ObjectKind::Method)) => {
                let old_fn = self.heap.method(old)?.function;
                let new_fn = self.heap.method(new)?.function;
                if old_fn == new_fn {
                    return Ok(());
                }
                self.update_function(old_fn, new_fn)
            }
            (Some(ObjectKind::Property), Some(ObjectKind::Property)) => {
                self.update_property(old, new)
            }
            _ => Ok(()),
        }
    }

    fn update_class(&mut self, old: ObjRef, new: ObjRef) -> RunResult<()> {
        let keys: Vec<String> = self.heap.class(old)?.attrs.keys().cloned().collect();

        for key in keys {
            let old_attr = self.heap.class(old)?.attrs.get(&key).cloned();
            let new_attr = self.heap.class(new)?.attrs.get(&key).cloned();

            let Some(new_attr) = new_attr else {
                // obsolete attribute
                match self.heap.class_mut(old)?.del_attr(&key) {
                    Ok(()) => self.stats.attrs_deleted += 1,
                    Err(_) => self.stats.attrs_skipped += 1,
                }
                continue;
            };

            if let (Some(old_obj), Some(new_obj)) =
                (old_attr.as_ref().and_then(|v| v.as_obj()), new_attr.as_obj())
            {
                self.update_generic(old_obj, new_obj)?;
            }

            if self.heap.class_mut(old)?.set_attr(&key, new_attr).is_err() {
                self.stats.attrs_skipped += 1;
            }
        }

        let (doc, fields) = {
            let new = self.heap.class(new)?;
            (new.doc.clone(), new.fields.clone())
        };
        let class = self.heap.class_mut(old)?;
        class.doc = doc;
        class.fields = fields;

        self.stats.classes += 1;
        self.update_instances(old, new)
    }

    fn update_function(&mut self, old: ObjRef, new: ObjRef) -> RunResult<()> {
        let new = self.heap.function(new)?;
        let params = new.params.clone();
        let defaults = new.defaults.clone();
        let doc = new.doc.clone();
        let code = new.code.clone();
        let closure = new.closure.clone();
        let globals = new.globals;
        let dict = new.dict.clone();

        let old = self.heap.function_mut(old)?;
        old.params = params;
        old.defaults = defaults;
        old.doc = doc;
        old.code = code;
        old.closure = closure;
        old.globals = globals;
        old.dict = dict;

        self.stats.functions += 1;
        Ok(())
    }

    fn update_property(&mut self, old: ObjRef, new: ObjRef) -> RunResult<()> {
        let o = self.heap.property(old)?;
        let n = self.heap.property(new)?;
        let pairs = [
            (o.getter, n.getter),
            (o.setter, n.setter),
            (o.deleter, n.deleter),
        ];

        for pair in pairs {
            if let (Some(old_fn), Some(new_fn)) = pair {
                self.update_generic(old_fn, new_fn)?;
            }
        }

        self.stats.properties += 1;
        Ok(())
    }

    /// Repoint every live instance of `old` to `new`.
    fn update_instances(&mut self, old: ObjRef, new: ObjRef) -> RunResult<()> {
        for instance in self.heap.instances_of(old) {
            self.heap.instance_mut(instance)?.class = new;
            self.stats.instances += 1;
        }
        Ok(())
    }
}

impl ModuleRefs {
    /// Patch every live earlier version of a module, and every live object
    /// tracked under a binding the new module still has, from `new_module`.
    ///
    /// Returns the survivors as a fresh set: dead handles and bindings the
    /// new module dropped are forgotten.
    pub fn update_refs_with_new_module(
        &self,
        heap: &mut Heap,
        new_module: ObjRef,
        verbose: bool,
    ) -> RunResult<(ModuleRefs, ModulePatch)> {
        let modules: Vec<ObjRef> = self
            .modules
            .iter()
            .copied()
            .filter(|m| heap.kind(*m) == Some(ObjectKind::Module))
            .collect();

        let new = heap.module(new_module)?;
        let module_name = new.name.clone();
        let bindings: Vec<(String, Option<ObjRef>)> = new
            .namespace
            .iter()
            .map(|(name, value)| (name.clone(), value.as_obj()))
            .collect();

        let mut patcher = Patcher::new(heap);
        for old in &modules {
            patcher.update_module(*old, new_module)?;
        }

        let mut survivors = ModuleRefs {
            modules,
            objs: Default::default(),
        };

        for (name, new_obj) in bindings {
            let Some(old_refs) = self.objs.get(&name) else {
                continue;
            };
            let live: Vec<ObjRef> = old_refs
                .iter()
                .copied()
                .filter(|r| patcher.heap.is_alive(*r))
                .collect();

            if let Some(new_obj) = new_obj {
                for old in &live {
                    patcher.update_generic(*old, new_obj)?;
                }
            }
            survivors.objs.insert(name, live);
        }

        let report = ModulePatch {
            module: module_name,
            versions: self.modules.len(),
            versions_retained: survivors.modules.len(),
            objects: self.object_count(),
            objects_retained: survivors.object_count(),
            stats: patcher.stats(),
        };

        if verbose {
            log!(
                "reload";
                "updated refs of module {}: {} (retained {}), {} (retained {})",
                report.module,
                plural_count(report.versions, "version"),
                report.versions_retained,
                plural_count(report.objects, "object"),
                report.objects_retained
            );
        }

        Ok((survivors, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Runtime, Value};
    use crate::testing::{ModuleTree, call0};

    /// Snapshot `name`, drop it from the registry and import it again.
    fn reimport(rt: &mut Runtime, name: &str) -> (ModuleRefs, ObjRef) {
        let old = rt.module(name).unwrap();
        let mut refs = ModuleRefs::new();
        refs.save_module(rt.heap(), old).unwrap();
        rt.registry_mut().remove(name);
        (refs, rt.import_module(name).unwrap())
    }

    #[test]
    fn test_function_keeps_identity() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[functions.f]\nbody = 1\n");
        let mut rt = tree.runtime();
        let a = Value::Ref(rt.import_module("a").unwrap());
        let old_f = rt.get_attr(&a, "f").unwrap();

        tree.write("a", "[functions.f]\nparams = [\"x\"]\ndefaults = [2]\nbody = { arg = \"x\" }\n");
        let (refs, new) = reimport(&mut rt, "a");
        let (survivors, report) = refs
            .update_refs_with_new_module(rt.heap_mut(), new, false)
            .unwrap();

        assert_eq!(rt.call(&old_f, vec![]).unwrap(), Value::Int(2));
        assert_eq!(survivors.objs("f"), [old_f.as_obj().unwrap()]);
        assert_eq!(report.stats.functions, 1);
        // the old module now exposes the new namespace
        let new_f = rt.get_attr(&Value::Ref(new), "f").unwrap();
        assert_eq!(rt.get_attr(&a, "f").unwrap(), new_f);
    }

    #[test]
    fn test_class_attributes_and_instances() {
        let mut tree = ModuleTree::new();
        tree.write(
            "a",
            r#"
            [classes.C]
            attrs = { OLD = 1, KEEP = "k" }
            readonly = ["KEEP"]
            methods.f = { body = 1 }
            "#,
        );
        let mut rt = tree.runtime();
        let a = Value::Ref(rt.import_module("a").unwrap());
        let old_class = rt.get_attr(&a, "C").unwrap();
        let obj = rt.call(&old_class, vec![]).unwrap();

        tree.write(
            "a",
            r#"
            [classes.C]
            attrs = { NEW = 2, KEEP = "changed" }
            readonly = ["KEEP"]
            methods.f = { body = 2 }
            "#,
        );
        let (refs, new) = reimport(&mut rt, "a");
        let (_, report) = refs
            .update_refs_with_new_module(rt.heap_mut(), new, false)
            .unwrap();

        let new_class = rt.get_attr(&Value::Ref(new), "C").unwrap();
        let old = rt.heap().class(old_class.as_obj().unwrap()).unwrap();
        assert!(!old.attrs.contains_key("OLD"));
        assert_eq!(old.attrs.get("KEEP"), Some(&Value::Str("k".into())));
        assert_eq!(
            rt.heap().instance(obj.as_obj().unwrap()).unwrap().class,
            new_class.as_obj().unwrap()
        );
        assert_eq!(call0(&mut rt, &obj, "f"), Value::Int(2));
        assert_eq!(report.stats.attrs_deleted, 1);
        assert_eq!(report.stats.attrs_skipped, 1);
        assert_eq!(report.stats.instances, 1);
    }

    #[test]
    fn test_property_accessors_patched() {
        let mut tree = ModuleTree::new();
        tree.write(
            "a",
            "[classes.C]\nfields = { n = 1 }\nproperties.p = { get = { attr = \"n\" } }\n",
        );
        let mut rt = tree.runtime();
        let a = Value::Ref(rt.import_module("a").unwrap());
        let class = rt.get_attr(&a, "C").unwrap();
        let old_prop = rt
            .heap()
            .class(class.as_obj().unwrap())
            .unwrap()
            .attrs
            .get("p")
            .cloned()
            .unwrap();
        let getter = rt
            .heap()
            .property(old_prop.as_obj().unwrap())
            .unwrap()
            .getter
            .unwrap();

        tree.write(
            "a",
            "[classes.C]\nfields = { n = 1 }\nproperties.p = { get = \"patched\" }\n",
        );
        let (refs, new) = reimport(&mut rt, "a");
        refs.update_refs_with_new_module(rt.heap_mut(), new, false)
            .unwrap();

        let value = rt.call(&Value::Ref(getter), vec![Value::None]).unwrap();
        assert_eq!(value, Value::Str("patched".into()));
    }

    #[test]
    fn test_dead_refs_are_pruned() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[functions.f]\nbody = 1\n");
        let mut rt = tree.runtime();
        rt.import_module("a").unwrap();

        tree.write("a", "[functions.f]\nbody = 2\n");
        let (refs, new) = reimport(&mut rt, "a");
        rt.collect_garbage();

        let (survivors, report) = refs
            .update_refs_with_new_module(rt.heap_mut(), new, false)
            .unwrap();

        assert_eq!((report.versions, report.versions_retained), (1, 0));
        assert_eq!((report.objects, report.objects_retained), (1, 0));
        assert!(survivors.modules().is_empty());
        assert_eq!(survivors.object_count(), 0);
    }

    #[test]
    fn test_survivors_keep_only_live_bound_names() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[functions.f]\nbody = 1\n[functions.g]\nbody = 1\n");
        let mut rt = tree.runtime();
        let a = Value::Ref(rt.import_module("a").unwrap());
        let kept = rt.get_attr(&a, "f").unwrap();
        rt.session_set("kept", kept.clone()).unwrap();

        tree.write("a", "[functions.f]\nbody = 2\n[functions.h]\nbody = 3\n");
        let (refs, new) = reimport(&mut rt, "a");
        rt.collect_garbage();

        let (survivors, report) = refs
            .update_refs_with_new_module(rt.heap_mut(), new, false)
            .unwrap();

        // `kept` holds the old function, whose globals hold the old module
        assert_eq!(report.versions_retained, 1);
        assert_eq!(report.objects, 2);
        assert_eq!(report.objects_retained, 1);
        assert!(survivors.objs("g").is_empty());
        assert_eq!(survivors.names().collect::<Vec<_>>(), ["f"]);
        assert_eq!(rt.call(&kept, vec![]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_cyclic_class_graph_terminates() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[classes.C]\nattrs = { N = 1 }\n");
        let mut rt = tree.runtime();
        let a = Value::Ref(rt.import_module("a").unwrap());
        let old_class = rt.get_attr(&a, "C").unwrap();
        rt.set_attr(&old_class, "me", old_class.clone()).unwrap();
        rt.session_set("old", old_class.clone()).unwrap();

        tree.write("a", "[classes.C]\nattrs = { N = 2 }\n");
        let (refs, new) = reimport(&mut rt, "a");
        let new_class = rt.get_attr(&Value::Ref(new), "C").unwrap();
        rt.set_attr(&new_class, "me", new_class.clone()).unwrap();

        refs.update_refs_with_new_module(rt.heap_mut(), new, false)
            .unwrap();

        assert_eq!(rt.get_attr(&old_class, "N").unwrap(), Value::Int(2));
        assert_eq!(rt.get_attr(&old_class, "me").unwrap(), new_class);
    }

    #[test]
    fn test_identical_handles_untouched() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[functions.f]\nbody = 1\n");
        let mut rt = tree.runtime();
        let a = rt.import_module("a").unwrap();
        let f = rt.get_attr(&Value::Ref(a), "f").unwrap().as_obj().unwrap();

        let mut patcher = Patcher::new(rt.heap_mut());
        patcher.update_generic(f, f).unwrap();
        patcher.update_module(a, a).unwrap();

        assert_eq!(patcher.stats(), PatchStats::default());
    }
}
