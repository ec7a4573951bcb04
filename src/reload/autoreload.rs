//! Session autoreload: reload changed watched modules before each unit of
//! work and keep the session's module bindings current.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use super::error::ReloadError;
use super::graph::{ModuleSearch, build_graph};
use super::orchestrator::{InPlaceReloader, ReloadMode, ReloadPhase};
use super::patch::ModulePatch;
use super::resolve::{matches_prefix, resolve};
use crate::freshness::StalenessTracker;
use crate::logger::plural_count;
use crate::runtime::{ObjRef, Object, Runtime, Value};
use crate::{debug, log};

/// REPL scratch variables (`_`, `__`, `_12`) are never tracked.
static SCRATCH_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^_+([0-9]+)?$").unwrap());

/// What to watch and how to reload it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchConfig {
    /// Module name prefixes, e.g. `app` or `app.models`.
    pub prefixes: Vec<String>,
    /// Include dotted descendants of each prefix.
    pub recursive: bool,
    pub mode: ReloadMode,
    pub verbose: bool,
}

impl WatchConfig {
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            recursive: true,
            mode: ReloadMode::default(),
            verbose: false,
        }
    }

    /// Whether `module` is under one of the watched prefixes.
    pub fn watches(&self, module: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| matches_prefix(module, prefix, self.recursive))
    }
}

/// What one [`AutoReloader::pre_run`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Modules whose source changed.
    pub dirty: BTreeSet<String>,
    /// Modules reloaded: the dirty ones plus everything referencing them.
    pub reloaded: Vec<String>,
    /// Session variables pointed at a reloaded module.
    pub rebound: Vec<String>,
    /// Tracked session variables left alone because they were reassigned.
    pub overwritten: Vec<String>,
    pub patch: Vec<ModulePatch>,
}

impl CycleReport {
    /// Nothing was dirty.
    pub fn is_idle(&self) -> bool {
        self.dirty.is_empty()
    }
}

/// A session binding that held a watched module when it was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackedGlobal {
    module: String,
    instance: ObjRef,
}

pub struct AutoReloader {
    config: WatchConfig,
    tracker: StalenessTracker,
    reloader: InPlaceReloader,
    globals: IndexMap<String, TrackedGlobal>,
}

impl AutoReloader {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            tracker: StalenessTracker::new(),
            reloader: InPlaceReloader::new(),
            globals: IndexMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    #[inline]
    pub fn phase(&self) -> ReloadPhase {
        self.reloader.phase()
    }

    #[inline]
    pub fn reloader(&self) -> &InPlaceReloader {
        &self.reloader
    }

    /// Currently loaded modules under the watched prefixes.
    pub fn watched(&self, runtime: &Runtime) -> BTreeSet<String> {
        resolve(
            runtime.registry(),
            &self.config.prefixes,
            self.config.recursive,
        )
    }

    /// Record the current mtime of every watched module so only later
    /// edits trigger a reload.
    pub fn register(&mut self, runtime: &Runtime) -> Result<(), ReloadError> {
        if self.config.prefixes.is_empty() {
            return Err(ReloadError::NothingToWatch);
        }
        let watched = self.watched(runtime);
        self.tracker.prime_all(runtime, &watched);
        debug!("reload"; "watching {}", plural_count(watched.len(), "module"));
        Ok(())
    }

    /// Remember session variables that hold a watched module, so they can
    /// be pointed at the new module object after a reload.
    ///
    /// Symbols imported from a module are not tracked; they are kept current
    /// by in-place patching instead.
    pub fn track_globals(&mut self, runtime: &Runtime) {
        let heap = runtime.heap();

        for (name, value) in runtime.session_bindings() {
            let Some(Object::Module(module)) = value.as_obj().and_then(|r| heap.get(r)) else {
                continue;
            };
            if !self.config.watches(&module.name) || SCRATCH_NAME.is_match(&name) {
                continue;
            }
            let Some(instance) = value.as_obj() else {
                continue;
            };

            let tracked = TrackedGlobal {
                module: module.name.clone(),
                instance,
            };
            if self.globals.get(&name) != Some(&tracked) {
                if self.config.verbose {
                    log!("reload"; "registering {} for autoreload ({})", name, tracked.module);
                }
                self.globals.insert(name, tracked);
            }
        }
    }

    /// Prime watched modules the tracker has never seen, e.g. ones imported
    /// during the last unit of work. Returns how many were primed.
    pub fn prime_new_modules(&mut self, runtime: &Runtime) -> usize {
        let fresh: Vec<String> = self
            .watched(runtime)
            .into_iter()
            .filter(|name| self.tracker.last_reading(name).is_none())
            .collect();
        self.tracker.prime_all(runtime, &fresh);
        fresh.len()
    }

    /// Session variable names currently tracked.
    pub fn tracked_globals(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }

    /// Check watched modules and reload what changed.
    ///
    /// Call once before every unit of submitted work. Cheap when nothing
    /// changed: one stat per watched module.
    pub fn pre_run(&mut self, runtime: &mut Runtime) -> Result<CycleReport, ReloadError> {
        self.reloader.enter(ReloadPhase::Scanning);

        let watched = self.watched(runtime);
        let dirty = self.tracker.check(runtime, &watched);
        if dirty.is_empty() {
            self.reloader.enter(ReloadPhase::Idle);
            return Ok(CycleReport::default());
        }

        let graph = build_graph(runtime, &watched);
        let closure = ModuleSearch::new(&dirty, &graph).closure();
        debug!(
            "reload";
            "dirty: {:?}, reloading: {:?}",
            dirty,
            closure
        );

        let before: Vec<(String, Option<ObjRef>)> = closure
            .iter()
            .map(|name| (name.clone(), runtime.module(name)))
            .collect();
        let outcome = match self
            .reloader
            .reload(runtime, &closure, self.config.mode, self.config.verbose)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.forget_unreached(runtime, &before, &err);
                return Err(err);
            }
        };

        if self.config.verbose {
            log!("reload"; "{} reloaded", plural_count(outcome.reloaded.len(), "module"));
        }

        let (rebound, overwritten) = self.rebind_globals(runtime, &closure);

        Ok(CycleReport {
            dirty,
            reloaded: outcome.reloaded,
            rebound,
            overwritten,
            patch: outcome.patches,
        })
    }

    /// After a failed cycle, modules the reload never got to still hold their
    /// old object while the tracker already stored their new mtime. Forget
    /// them so the next cycle picks their edits up. The failing module keeps
    /// its reading and waits for the next edit.
    fn forget_unreached(
        &mut self,
        runtime: &Runtime,
        before: &[(String, Option<ObjRef>)],
        err: &ReloadError,
    ) {
        let failed = match err {
            ReloadError::Import { module, .. } => Some(module.as_str()),
            _ => None,
        };
        for (name, old) in before {
            if Some(name.as_str()) == failed || runtime.module(name) != *old {
                continue;
            }
            debug!("reload"; "{} not reloaded, checking again next run", name);
            self.tracker.forget(name);
        }
    }

    /// Point tracked session variables at their reloaded module, unless the
    /// user has rebound them since.
    fn rebind_globals(
        &mut self,
        runtime: &mut Runtime,
        reloaded: &BTreeSet<String>,
    ) -> (Vec<String>, Vec<String>) {
        let mut rebound = Vec::new();
        let mut overwritten = Vec::new();

        for (name, info) in self.globals.iter_mut() {
            if !reloaded.contains(&info.module) {
                continue;
            }
            if runtime.session_get(name) != Some(Value::Ref(info.instance)) {
                if self.config.verbose {
                    log!("reload"; "ignoring {} (was overwritten)", name);
                }
                overwritten.push(name.clone());
                continue;
            }
            let Some(module) = runtime.module(&info.module) else {
                continue;
            };
            if runtime.session_set(name.as_str(), Value::Ref(module)).is_ok() {
                if self.config.verbose {
                    log!("reload"; "overwriting {} to new module {}", name, info.module);
                }
                info.instance = module;
                rebound.push(name.clone());
            }
        }

        (rebound, overwritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ModuleTree, call0};

    fn watch(prefixes: &[&str]) -> AutoReloader {
        AutoReloader::new(WatchConfig::new(prefixes.iter().copied()))
    }

    #[test]
    fn test_register_requires_prefix() {
        let tree = ModuleTree::new();
        let rt = tree.runtime();
        let mut reloader = AutoReloader::new(WatchConfig::default());
        assert!(matches!(
            reloader.register(&rt),
            Err(ReloadError::NothingToWatch)
        ));
    }

    #[test]
    fn test_nothing_changed_is_idle() {
        let mut tree = ModuleTree::new();
        tree.write("app", "[values]\nX = 1\n");
        let mut rt = tree.runtime();
        rt.import_module("app").unwrap();

        let mut reloader = watch(&["app"]);
        reloader.register(&rt).unwrap();

        let report = reloader.pre_run(&mut rt).unwrap();
        assert!(report.is_idle());
        assert_eq!(reloader.phase(), ReloadPhase::Idle);
    }

    #[test]
    fn test_method_change_reaches_existing_instance() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[classes.A]\nmethods.f = { body = 1 }\n");
        let mut rt = tree.runtime();
        let a = Value::Ref(rt.import_module("a").unwrap());
        let class = rt.get_attr(&a, "A").unwrap();
        let obj = rt.call(&class, vec![]).unwrap();
        rt.session_set("obj", obj.clone()).unwrap();

        let mut reloader = watch(&["a"]);
        reloader.register(&rt).unwrap();
        assert_eq!(call0(&mut rt, &obj, "f"), Value::Int(1));

        tree.write("a", "[classes.A]\nmethods.f = { body = 2 }\n");
        let report = reloader.pre_run(&mut rt).unwrap();

        assert_eq!(report.dirty, BTreeSet::from(["a".to_string()]));
        assert_eq!(call0(&mut rt, &obj, "f"), Value::Int(2));
        assert_eq!(report.patch.len(), 1);
    }

    #[test]
    fn test_mutual_imports_reload_together() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[imports]\nb = \"b\"\n[values]\nX = 1\n");
        tree.write("b", "[imports]\na = \"a\"\n[values]\nY = 1\n");
        tree.write("c", "[values]\nZ = 1\n");
        let mut rt = tree.runtime();
        for name in ["a", "b", "c"] {
            rt.import_module(name).unwrap();
        }

        let mut reloader = watch(&["a", "b", "c"]);
        reloader.register(&rt).unwrap();

        tree.touch("b");
        let report = reloader.pre_run(&mut rt).unwrap();

        assert_eq!(report.dirty, BTreeSet::from(["b".to_string()]));
        assert_eq!(report.reloaded, ["a", "b"]);

        // the reloaded pair references each other, not the old objects
        let a = Value::Ref(rt.module("a").unwrap());
        let b = Value::Ref(rt.module("b").unwrap());
        assert_eq!(rt.get_attr(&a, "b").unwrap(), b);
        assert_eq!(rt.get_attr(&b, "a").unwrap(), a);
    }

    #[test]
    fn test_dependents_are_reloaded() {
        let mut tree = ModuleTree::new();
        tree.write("app.util", "[values]\nN = 1\n");
        tree.write(
            "app.main",
            "[imports]\nutil = \"app.util\"\n[functions.get]\nbody = { global = \"util.N\" }\n",
        );
        tree.write("app.other", "[values]\nM = 1\n");
        let mut rt = tree.runtime();
        for name in ["app.main", "app.other"] {
            rt.import_module(name).unwrap();
        }
        let main = Value::Ref(rt.module("app.main").unwrap());
        let get = rt.get_attr(&main, "get").unwrap();

        let mut reloader = watch(&["app"]);
        reloader.register(&rt).unwrap();

        tree.write("app.util", "[values]\nN = 2\n");
        let report = reloader.pre_run(&mut rt).unwrap();

        assert_eq!(report.reloaded, ["app.main", "app.util"]);
        assert_eq!(rt.call(&get, vec![]).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_first_observation_is_dirty() {
        let mut tree = ModuleTree::new();
        tree.write("app.a", "[values]\nX = 1\n");
        tree.write("app.b", "[values]\nX = 1\n");
        let mut rt = tree.runtime();
        rt.import_module("app.a").unwrap();

        let mut reloader = watch(&["app"]);
        reloader.register(&rt).unwrap();

        rt.import_module("app.b").unwrap();
        let report = reloader.pre_run(&mut rt).unwrap();
        assert_eq!(report.dirty, BTreeSet::from(["app.b".to_string()]));

        assert!(reloader.pre_run(&mut rt).unwrap().is_idle());
    }

    #[test]
    fn test_prime_new_modules() {
        let mut tree = ModuleTree::new();
        tree.write("app.a", "[values]\nX = 1\n");
        tree.write("app.b", "[values]\nX = 1\n");
        let mut rt = tree.runtime();
        rt.import_module("app.a").unwrap();

        let mut reloader = watch(&["app"]);
        reloader.register(&rt).unwrap();
        assert_eq!(reloader.prime_new_modules(&rt), 0);

        rt.import_module("app.b").unwrap();
        assert_eq!(reloader.prime_new_modules(&rt), 1);
        assert!(reloader.pre_run(&mut rt).unwrap().is_idle());

        tree.touch("app.b");
        let report = reloader.pre_run(&mut rt).unwrap();
        assert_eq!(report.dirty, BTreeSet::from(["app.b".to_string()]));
    }

    #[test]
    fn test_session_module_never_dirty() {
        let tree = ModuleTree::new();
        let mut rt = tree.runtime();
        let mut reloader = watch(&[crate::runtime::MAIN_MODULE]);
        reloader.register(&rt).unwrap();

        assert!(reloader.pre_run(&mut rt).unwrap().is_idle());
        assert!(reloader.pre_run(&mut rt).unwrap().is_idle());
    }

    #[test]
    fn test_globals_rebound_unless_overwritten() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[values]\nX = 1\n");
        tree.write("b", "[values]\nX = 1\n");
        let mut rt = tree.runtime();
        let a = Value::Ref(rt.import_module("a").unwrap());
        let b = Value::Ref(rt.import_module("b").unwrap());
        rt.session_set("a", a.clone()).unwrap();
        rt.session_set("b", b).unwrap();
        rt.session_set("_", a.clone()).unwrap();
        rt.session_set("_12", a).unwrap();

        let mut reloader = AutoReloader::new(WatchConfig {
            mode: ReloadMode::Invalidate,
            ..WatchConfig::new(["a", "b"])
        });
        reloader.register(&rt).unwrap();
        reloader.track_globals(&rt);
        assert_eq!(reloader.tracked_globals().collect::<Vec<_>>(), ["a", "b"]);

        rt.session_set("b", Value::Int(0)).unwrap();
        tree.touch("a");
        tree.touch("b");
        let report = reloader.pre_run(&mut rt).unwrap();

        assert_eq!(report.rebound, ["a"]);
        assert_eq!(report.overwritten, ["b"]);
        let a_now = rt.session_get("a").unwrap();
        assert_eq!(a_now.as_obj(), rt.module("a"));
        assert_eq!(rt.get_attr(&a_now, "X").unwrap(), Value::Int(1));
        assert_eq!(rt.session_get("b"), Some(Value::Int(0)));
    }

    #[test]
    fn test_import_error_propagates() {
        let mut tree = ModuleTree::new();
        tree.write("a", "[values]\nX = 1\n");
        let mut rt = tree.runtime();
        rt.import_module("a").unwrap();

        let mut reloader = watch(&["a"]);
        reloader.register(&rt).unwrap();

        tree.write("a", "[values\n");
        assert!(matches!(
            reloader.pre_run(&mut rt),
            Err(ReloadError::Import { .. })
        ));
        assert_eq!(reloader.phase(), ReloadPhase::Idle);

        // fixing the file is picked up on the next run
        tree.write("a", "[values]\nX = 2\n");
        let report = reloader.pre_run(&mut rt).unwrap();
        assert_eq!(report.reloaded, ["a"]);
    }

    #[test]
    fn test_failed_cycle_keeps_unreached_edits() {
        let mut tree = ModuleTree::new();
        tree.write("app.b", "[values]\nX = 1\n");
        tree.write("app.c", "[values]\nY = 1\n");
        let mut rt = tree.runtime();
        rt.import_module("app.b").unwrap();
        rt.import_module("app.c").unwrap();

        let mut reloader = watch(&["app"]);
        reloader.register(&rt).unwrap();

        tree.write("app.b", "[values\n");
        tree.write("app.c", "[values]\nY = 2\n");
        assert!(matches!(
            reloader.pre_run(&mut rt),
            Err(ReloadError::Import { ref module, .. }) if module == "app.b"
        ));

        tree.write("app.b", "[values]\nX = 2\n");
        let report = reloader.pre_run(&mut rt).unwrap();
        assert_eq!(report.reloaded, ["app.b", "app.c"]);
        let c = Value::Ref(rt.module("app.c").unwrap());
        assert_eq!(rt.get_attr(&c, "Y").unwrap(), Value::Int(2));
        assert!(reloader.pre_run(&mut rt).unwrap().is_idle());
    }

    #[test]
    fn test_host_handles_follow_every_generation() {
        let mut tree = ModuleTree::new();
        let source = |n: i64| format!("[functions.f]\nbody = {n}\n\n[classes.A]\nmethods.g = {{ body = {n} }}\n");
        tree.write("app.m", &source(1));
        let mut rt = tree.runtime();
        let m = Value::Ref(rt.import_module("app.m").unwrap());
        let f = rt.get_attr(&m, "f").unwrap();
        let class = rt.get_attr(&m, "A").unwrap();
        let obj = rt.call(&class, vec![]).unwrap();

        let mut reloader = watch(&["app"]);
        reloader.register(&rt).unwrap();

        for n in 2..=4 {
            tree.write("app.m", &source(n));
            let report = reloader.pre_run(&mut rt).unwrap();
            assert_eq!(report.reloaded, ["app.m"]);

            assert_eq!(rt.call(&f, vec![]).unwrap(), Value::Int(n));
            assert_eq!(call0(&mut rt, &obj, "g"), Value::Int(n));
            let fresh = rt.call(&class, vec![]).unwrap();
            assert_eq!(call0(&mut rt, &fresh, "g"), Value::Int(n));
        }
    }
}
