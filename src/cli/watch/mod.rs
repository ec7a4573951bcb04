//! `watch` command: reload modules as their source files change.
//!
//! ```text
//! notify → Debouncer (timing, dedup) → import new modules → AutoReloader::pre_run → WatchStatus
//! ```
//!
//! Everything runs on the calling thread; the notify callback only forwards
//! events over a channel.

mod debouncer;


use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashMap;

use super::common::{import_watched, load_watched};
use crate::config::ReloadConfig;
use crate::loader::module_name_for;
use crate::logger::{
    plural_count, status_clear, status_error, status_success, status_unchanged,
};
use crate::reload::AutoReloader;
use crate::runtime::Runtime;
use crate::{debug_do, log};
use debouncer::{ChangeKind, Debouncer};

pub fn run(config: &ReloadConfig) -> Result<()> {
    let (mut runtime, imported) = load_watched(config);
    let mut reloader = AutoReloader::new(config.watch_config());
    reloader
        .register(&runtime)
        .context("nothing to watch, pass --watch <prefix> or set [watch] prefixes")?;

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    for root in &config.paths.roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch `{}`", root.display()))?;
    }

    log!(
        "watch";
        "{} loaded, watching {}",
        plural_count(imported, "module"),
        plural_count(config.paths.roots.len(), "root")
    );

    let mut debouncer = Debouncer::new(Duration::from_millis(config.watch.debounce_ms));
    loop {
        match rx.recv_timeout(debouncer.sleep_duration()) {
            Ok(Ok(event)) => debouncer.add_event(&event),
            Ok(Err(e)) => {
                log!("watch"; "notify error: {}", e);
                status_clear();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let Some(changes) = debouncer.take_if_ready() else {
            continue;
        };

        import_unloaded(&mut reloader, &mut runtime, &config.paths.roots, &changes);

        debug_do! {
            let changed = changed_modules(&config.paths.roots, changes.keys());
            log!("watch"; "changed: {:?}", changed);
            status_clear();
        }

        run_cycle(&mut reloader, &mut runtime);
    }

    Ok(())
}

/// Import watched modules that changed on disk but are not loaded yet: new
/// files, and ones that failed to import earlier and have been edited since.
/// Returns the number imported.
fn import_unloaded(
    reloader: &mut AutoReloader,
    runtime: &mut Runtime,
    roots: &[PathBuf],
    changes: &FxHashMap<PathBuf, ChangeKind>,
) -> usize {
    let touched = changes
        .iter()
        .filter(|(_, kind)| **kind != ChangeKind::Removed)
        .map(|(path, _)| path);
    let unloaded = changed_modules(roots, touched)
        .into_iter()
        .filter(|name| runtime.module(name).is_none())
        .collect();

    let imported = import_watched(runtime, reloader.config(), unloaded);
    if imported > 0 {
        reloader.prime_new_modules(runtime);
    }
    imported
}

/// One reload cycle, reported on the status line.
fn run_cycle(reloader: &mut AutoReloader, runtime: &mut Runtime) {
    match reloader.pre_run(runtime) {
        Ok(report) if report.is_idle() => status_unchanged("no module changed"),
        Ok(report) => {
            let mut message = format!(
                "reloaded {}: {}",
                plural_count(report.reloaded.len(), "module"),
                report.reloaded.join(", ")
            );
            let instances: usize = report.patch.iter().map(|p| p.stats.instances).sum();
            if instances > 0 {
                message.push_str(&format!(" ({} updated)", plural_count(instances, "instance")));
            }
            status_success(&message);
        }
        Err(err) => {
            let err = anyhow::Error::new(err);
            let detail: Vec<String> = err.chain().skip(1).map(|e| format!("  {e}")).collect();
            status_error(&err.to_string(), &detail.join("\n"));
        }
    }
}

/// Module names for source paths under any of `roots`.
fn changed_modules<'a>(
    roots: &[PathBuf],
    paths: impl IntoIterator<Item = &'a PathBuf>,
) -> BTreeSet<String> {
    paths
        .into_iter()
        .filter_map(|path| roots.iter().find_map(|root| module_name_for(root, path)))
        .collect()
}
