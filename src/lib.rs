//! autoreload - in-place module hot reloading for interactive sessions.
//!
//! Modules are TOML source files executed into an explicit object heap.
//! When a watched module's source changes, it is re-imported together with
//! every module that references it, and the objects created from the old
//! version are patched in place: existing instances, functions and classes
//! keep their identity and pick up the new code.
//!
//! # Modules
//!
//! - `loader` - Module source files and their TOML schema
//! - `runtime` - Object heap, module registry, import and evaluation
//! - `freshness` - File mtimes and the staleness tracker
//! - `reload` - Name resolution, dependency graph, reload and patching
//! - `config` - `autoreload.toml`
//! - `cli` - `repl`, `watch` and `graph` commands

pub mod logger;

pub mod cli;
pub mod config;
pub mod freshness;
pub mod loader;
pub mod reload;
pub mod runtime;

#[cfg(test)]
mod testing;
