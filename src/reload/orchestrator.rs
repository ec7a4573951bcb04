//! Reload cycle: snapshot, clear, re-import, patch.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::error::ReloadError;
use super::patch::ModulePatch;
use super::snapshot::ModuleRefs;
use crate::runtime::{ObjRef, Runtime};
use crate::{debug, log};

/// What happens to the old module objects of a reload.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadMode {
    /// Patch old modules and their objects with the reloaded definitions.
    #[default]
    UpdateInplace,
    /// Mark old modules unusable; attribute access on them fails.
    Invalidate,
    /// Leave old modules alone; both versions coexist.
    KeepOld,
}

impl ReloadMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpdateInplace => "update-inplace",
            Self::Invalidate => "invalidate",
            Self::KeepOld => "keep-old",
        }
    }
}

impl fmt::Display for ReloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of the reload state machine.
///
/// ```text
/// Idle → Scanning → Reloading → Patching → Idle
///                 ↘ Idle (nothing dirty)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReloadPhase {
    #[default]
    Idle,
    Scanning,
    Reloading,
    /// Only entered in [`ReloadMode::UpdateInplace`].
    Patching,
}

/// Result of one successful [`InPlaceReloader::reload`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Modules that now have a new module object, in name order.
    pub reloaded: Vec<String>,
    pub patches: Vec<ModulePatch>,
}

/// Tracks previous generations of every module it reloaded.
///
/// When a module is reloaded with [`ReloadMode::UpdateInplace`], all of its
/// earlier versions (and the objects they defined) are patched in place.
#[derive(Debug, Default)]
pub struct InPlaceReloader {
    previous: FxHashMap<String, ModuleRefs>,
    phase: ReloadPhase,
}

impl InPlaceReloader {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn phase(&self) -> ReloadPhase {
        self.phase
    }

    pub(super) fn enter(&mut self, phase: ReloadPhase) {
        debug!("reload"; "{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Snapshot of the previous generations recorded for `module`.
    pub fn previous(&self, module: &str) -> Option<&ModuleRefs> {
        self.previous.get(module)
    }

    /// Reload exactly `modules`.
    ///
    /// Every listed module is snapshotted and dropped from the registry
    /// (invalidated in [`ReloadMode::Invalidate`]), then imported again in
    /// name order. In [`ReloadMode::UpdateInplace`] the old generations are
    /// patched afterwards.
    ///
    /// An import failure stops the remaining imports. Modules reloaded up to
    /// that point stay reloaded and are still patched; the failing module's
    /// old object is put back in the registry so a later fix is picked up.
    ///
    /// No garbage is collected here. The host may hold handles the heap
    /// cannot see; dead generations are pruned once an explicit
    /// [`Runtime::collect_garbage`] has freed them.
    pub fn reload(
        &mut self,
        runtime: &mut Runtime,
        modules: &BTreeSet<String>,
        mode: ReloadMode,
        verbose: bool,
    ) -> Result<ReloadOutcome, ReloadError> {
        self.enter(ReloadPhase::Reloading);
        let result = self.run(runtime, modules, mode, verbose);
        self.enter(ReloadPhase::Idle);
        result
    }

    fn run(
        &mut self,
        runtime: &mut Runtime,
        modules: &BTreeSet<String>,
        mode: ReloadMode,
        verbose: bool,
    ) -> Result<ReloadOutcome, ReloadError> {
        let old = self.save_objs(runtime, modules, mode);
        clear_modules(runtime, &old, mode, verbose);

        let mut failure = None;
        for name in modules {
            if let Err(source) = runtime.import_module(name) {
                failure = Some(ReloadError::Import {
                    module: name.clone(),
                    source,
                });
                break;
            }
        }

        // A module counts as reloaded once the registry holds a new object
        // for it, including ones pulled in by an earlier import.
        let reloaded: Vec<(String, ObjRef)> = modules
            .iter()
            .filter_map(|name| {
                let current = runtime.module(name)?;
                (old.get(name.as_str()) != Some(&current)).then(|| (name.clone(), current))
            })
            .collect();

        if failure.is_some() {
            restore_missing(runtime, &old);
        }

        let mut patches = Vec::new();
        if mode == ReloadMode::UpdateInplace {
            self.enter(ReloadPhase::Patching);
            patches = self.update_old_modules(runtime, &reloaded, verbose)?;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(ReloadOutcome {
                reloaded: reloaded.into_iter().map(|(name, _)| name).collect(),
                patches,
            }),
        }
    }

    /// Handles of the registered modules in `modules`. Only
    /// [`ReloadMode::UpdateInplace`] records them as previous generations,
    /// since no other mode ever patches or prunes them.
    fn save_objs(
        &mut self,
        runtime: &Runtime,
        modules: &BTreeSet<String>,
        mode: ReloadMode,
    ) -> FxHashMap<String, ObjRef> {
        let mut old = FxHashMap::default();
        for name in modules {
            let Some(module) = runtime.module(name) else {
                continue;
            };
            let saved = if mode == ReloadMode::UpdateInplace {
                let refs = self.previous.entry(name.clone()).or_default();
                refs.save_module(runtime.heap(), module).is_ok()
            } else {
                runtime.heap().module(module).is_ok()
            };
            if saved {
                old.insert(name.clone(), module);
            }
        }
        old
    }

    fn update_old_modules(
        &mut self,
        runtime: &mut Runtime,
        reloaded: &[(String, ObjRef)],
        verbose: bool,
    ) -> Result<Vec<ModulePatch>, ReloadError> {
        let mut patches = Vec::with_capacity(reloaded.len());

        for (name, new_module) in reloaded {
            let Some(refs) = self.previous.get(name) else {
                continue;
            };
            let (survivors, patch) = refs
                .update_refs_with_new_module(runtime.heap_mut(), *new_module, verbose)
                .map_err(|source| ReloadError::Patch {
                    module: name.clone(),
                    source,
                })?;
            self.previous.insert(name.clone(), survivors);
            patches.push(patch);
        }

        Ok(patches)
    }
}

/// Drop `old` modules from the registry, invalidating them when asked.
fn clear_modules(
    runtime: &mut Runtime,
    old: &FxHashMap<String, ObjRef>,
    mode: ReloadMode,
    verbose: bool,
) {
    for (name, module) in old {
        runtime.registry_mut().remove(name);
        if mode == ReloadMode::Invalidate
            && let Ok(m) = runtime.heap_mut().module_mut(*module)
        {
            m.invalidated = true;
        }
        if verbose {
            log!("reload"; "cleared {}", name);
        }
    }
}

/// Put back old modules whose re-import failed.
fn restore_missing(runtime: &mut Runtime, old: &FxHashMap<String, ObjRef>) {
    for (name, module) in old {
        if runtime.registry().contains(name) {
            continue;
        }
        if let Ok(m) = runtime.heap_mut().module_mut(*module) {
            m.invalidated = false;
        }
        runtime.registry_mut().insert(name.clone(), *module);
        debug!("reload"; "restored previous {}", name);
    }
}
