//! `graph` command: print which watched modules bind which.

use std::io::Write;

use anyhow::Result;

use super::common::load_watched;
use crate::config::ReloadConfig;
use crate::reload::{ModuleGraph, ReloadError, build_graph, resolve};

pub fn run(config: &ReloadConfig, json: bool) -> Result<()> {
    if config.watch.prefixes.is_empty() {
        return Err(ReloadError::NothingToWatch.into());
    }

    let (runtime, _) = load_watched(config);
    let names = resolve(
        runtime.registry(),
        &config.watch.prefixes,
        config.watch.recursive,
    );
    let graph = build_graph(&runtime, &names);

    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", render(&graph, json)?)?;
    Ok(())
}

/// `module -> dep, dep` per line, or a JSON object of arrays.
fn render(graph: &ModuleGraph, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(graph)?);
    }

    let lines: Vec<String> = graph
        .iter()
        .map(|(module, deps)| {
            if deps.is_empty() {
                module.to_string()
            } else {
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                format!("{module} -> {}", deps.join(", "))
            }
        })
        .collect();
    Ok(lines.join("\n"))
}
