//! Module dependency graph and reachability search.
//!
//! Edges come from top-level bindings only: `a → b` when a binding in
//! `a`'s namespace holds the module object `b`. Symbol re-exports
//! (`from b import f`) do not create edges.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::runtime::{Object, Runtime};

/// `module → modules it binds`, restricted to one name set.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModuleGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, module: impl Into<String>) {
        self.edges.entry(module.into()).or_default();
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.edges.entry(from.into()).or_default().insert(to.into());
    }

    /// Direct dependencies of `module`.
    pub fn neighbours(&self, module: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(module)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.edges.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Build the graph over `names` from the modules' current namespaces.
///
/// Every name in `names` that is registered becomes a node, even without
/// edges. Self-edges are kept.
pub fn build_graph(runtime: &Runtime, names: &BTreeSet<String>) -> ModuleGraph {
    let heap = runtime.heap();
    let mut graph = ModuleGraph::new();

    for source in names {
        let Some(module) = runtime.module(source).and_then(|m| heap.module(m).ok()) else {
            continue;
        };
        graph.add_node(source.as_str());

        for value in module.namespace.values() {
            if let Some(Object::Module(dep)) = value.as_obj().and_then(|r| heap.get(r))
                && names.contains(&dep.name)
            {
                graph.add_edge(source.as_str(), dep.name.as_str());
            }
        }
    }

    graph
}

/// Reachability queries towards a fixed target set, memoised per source.
///
/// Lives for one reload cycle: the memo is only valid for the graph and
/// targets it was built with.
pub struct ModuleSearch<'g> {
    graph: &'g ModuleGraph,
    targets: &'g BTreeSet<String>,
    cache: FxHashMap<String, bool>,
}

impl<'g> ModuleSearch<'g> {
    pub fn new(targets: &'g BTreeSet<String>, graph: &'g ModuleGraph) -> Self {
        Self {
            graph,
            targets,
            cache: FxHashMap::default(),
        }
    }

    /// Whether `source` is a target or references one, directly or
    /// transitively. The answer is memoised for later queries.
    pub fn reaches_targets(&mut self, source: &str) -> bool {
        let reaches = self.search(source);
        self.cache.insert(source.to_string(), reaches);
        reaches
    }

    fn search(&self, source: &str) -> bool {
        let mut queue = VecDeque::from([source]);
        let mut visited: FxHashSet<&str> = FxHashSet::from_iter([source]);

        while let Some(module) = queue.pop_front() {
            match self.cache.get(module) {
                Some(true) => return true,
                // Known dead end: skip its neighbours too.
                Some(false) => continue,
                None => {}
            }

            if self.targets.contains(module) {
                return true;
            }

            for neighbour in self.graph.neighbours(module) {
                if visited.insert(neighbour) {
                    queue.push_back(neighbour);
                }
            }
        }

        false
    }

    /// Every node of the graph that reaches the targets.
    pub fn closure(&mut self) -> BTreeSet<String> {
        let graph = self.graph;
        graph
            .nodes()
            .filter(|node| self.reaches_targets(node))
            .map(str::to_string)
            .collect()
    }
}
