//! Common utilities shared across CLI commands.

use std::collections::BTreeSet;

use crate::config::ReloadConfig;
use crate::log;
use crate::reload::WatchConfig;
use crate::runtime::Runtime;

/// Fresh runtime over the configured roots with every watched module that
/// has a source file already imported. Returns the number imported.
pub fn load_watched(config: &ReloadConfig) -> (Runtime, usize) {
    let loader = config.loader();
    let candidates = loader.discover();
    let mut runtime = Runtime::new(loader);
    let imported = import_watched(&mut runtime, &config.watch_config(), candidates);
    (runtime, imported)
}

/// Import every candidate under the watched prefixes, in name order.
///
/// A module that fails to import is reported and skipped. Returns the number
/// of modules imported.
pub fn import_watched(
    runtime: &mut Runtime,
    config: &WatchConfig,
    candidates: BTreeSet<String>,
) -> usize {
    let mut imported = 0;
    for name in candidates.iter().filter(|name| config.watches(name)) {
        match runtime.import_module(name) {
            Ok(_) => imported += 1,
            Err(err) => log!("load"; "skipping {}: {:#}", name, anyhow::Error::new(err)),
        }
    }
    imported
}
