//! In-place module reloading.
//!
//! # Architecture
//!
//! ```text
//! AutoReloader::pre_run
//!   ├── resolve         watched prefixes → loaded module names
//!   ├── StalenessTracker  mtimes → dirty modules
//!   ├── build_graph     module → modules it binds
//!   ├── ModuleSearch    dirty set → everything that reaches it
//!   └── InPlaceReloader
//!         ├── ModuleRefs::save_module      snapshot old generations
//!         ├── clear + import_module        fresh module objects
//!         └── ModuleRefs::update_refs_with_new_module   patch old objects
//! ```
//!
//! # Modules
//!
//! - `autoreload` - Session hook: staleness scan, closure, global rebinding
//! - `error` - Reload error type
//! - `graph` - Dependency graph and memoised reachability search
//! - `orchestrator` - Reload modes and the snapshot/clear/import/patch cycle
//! - `patch` - Update rules applied to old objects
//! - `resolve` - Watched-prefix name resolution
//! - `snapshot` - Weak handles to previous module generations

mod autoreload;
mod error;
mod graph;
mod orchestrator;
mod patch;
mod resolve;
mod snapshot;

pub use autoreload::{AutoReloader, CycleReport, WatchConfig};
pub use error::ReloadError;
pub use graph::{ModuleGraph, ModuleSearch, build_graph};
pub use orchestrator::{InPlaceReloader, ReloadMode, ReloadOutcome, ReloadPhase};
pub use patch::{ModulePatch, PatchStats, Patcher};
pub use resolve::{matches_prefix, resolve};
pub use snapshot::ModuleRefs;
