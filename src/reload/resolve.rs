//! Module name resolution under watched prefixes.

use std::collections::BTreeSet;

use crate::runtime::ModuleRegistry;

/// Whether `name` is `prefix` itself or, when `recursive`, a dotted
/// descendant of it (`prefix.` followed by at least one more character).
pub fn matches_prefix(name: &str, prefix: &str, recursive: bool) -> bool {
    if name == prefix {
        return true;
    }
    recursive
        && name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|rest| !rest.is_empty())
}

/// Currently registered module names matching any of `prefixes`.
///
/// Reads the registry at call time; nothing is cached.
pub fn resolve<S: AsRef<str>>(
    registry: &ModuleRegistry,
    prefixes: &[S],
    recursive: bool,
) -> BTreeSet<String> {
    registry
        .names()
        .filter(|name| {
            prefixes
                .iter()
                .any(|prefix| matches_prefix(name, prefix.as_ref(), recursive))
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Heap, ModuleObject, Object};

    fn registry(names: &[&str]) -> ModuleRegistry {
        let mut heap = Heap::new();
        let mut registry = ModuleRegistry::new();
        for name in names {
            let m = heap.alloc(Object::Module(ModuleObject::new(*name, None)));
            registry.insert(*name, m);
        }
        registry
    }

    #[test]
    fn test_matches_prefix() {
        assert!(matches_prefix("app", "app", false));
        assert!(matches_prefix("app.a.b", "app", true));
        assert!(!matches_prefix("app.a", "app", false));
        assert!(!matches_prefix("apple", "app", true));
        assert!(!matches_prefix("app.", "app", true));
    }

    #[test]
    fn test_resolve_recursive() {
        let registry = registry(&["app", "app.a", "app.a.b", "apple", "other"]);

        let names = resolve(&registry, &["app"], true);
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            ["app", "app.a", "app.a.b"]
        );
    }

    #[test]
    fn test_resolve_non_recursive() {
        let registry = registry(&["app", "app.a", "other", "other.x"]);

        let names = resolve(&registry, &["app", "other.x"], false);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), ["app", "other.x"]);
    }

    #[test]
    fn test_resolve_reads_registry_at_call_time() {
        let mut registry = registry(&["app.a"]);
        assert_eq!(resolve(&registry, &["app"], true).len(), 1);

        registry.remove("app.a");
        assert!(resolve(&registry, &["app"], true).is_empty());
    }
}
