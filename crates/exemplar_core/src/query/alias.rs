//! Join alias resolution for dotted attribute paths.
//!
//! # Invariants
//! - Every distinct non-terminal prefix gets exactly one binding; leaves never
//!   do.
//! - Parents are bound before their children.
//! - Alias names derive from the full prefix (`address.city` ->
//!   `address__city`), so equal leaf names under different parents never
//!   collide.

use std::collections::HashSet;

/// Alias of the queried entity itself.
pub const ROOT_ALIAS: &str = "this_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasBinding {
    /// Dotted prefix (`address`, `address.city`).
    pub path: String,
    pub alias: String,
}

/// Alias name for a dotted prefix.
pub fn alias_for(path: &str) -> String {
    path.replace('.', "__")
}

/// Accumulates bindings across all paths of one query.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    bindings: Vec<AliasBinding>,
    bound_paths: HashSet<String>,
    used_aliases: HashSet<String>,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds every non-terminal prefix of `path` not bound yet.
    pub fn register(&mut self, path: &str) {
        let segments = path.split('.').collect::<Vec<_>>();
        for end in 1..segments.len() {
            let prefix = segments[..end].join(".");
            if self.bound_paths.contains(&prefix) {
                continue;
            }
            let alias = self.unique_alias(alias_for(&prefix));
            self.bound_paths.insert(prefix.clone());
            self.bindings.push(AliasBinding {
                path: prefix,
                alias,
            });
        }
    }

    // `a__b` is a legal attribute name, so `a__b.c` and `a.b.c` can clash.
    fn unique_alias(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        let mut suffix = 1;
        while candidate == ROOT_ALIAS || self.used_aliases.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.used_aliases.insert(candidate.clone());
        candidate
    }

    pub fn alias_of(&self, path: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|binding| binding.path == path)
            .map(|binding| binding.alias.as_str())
    }

    pub fn bindings(&self) -> &[AliasBinding] {
        &self.bindings
    }

    pub fn into_bindings(self) -> Vec<AliasBinding> {
        self.bindings
    }
}

/// Resolves the bindings needed by `paths`, in first-seen order.
pub fn resolve_aliases<'a>(paths: impl IntoIterator<Item = &'a str>) -> Vec<AliasBinding> {
    let mut resolver = AliasResolver::new();
    for path in paths {
        resolver.register(path);
    }
    resolver.into_bindings()
}

#[cfg(test)]
mod tests {
    use super::{alias_for, resolve_aliases, AliasResolver};

    #[test]
    fn single_segment_prefix_aliases_to_itself() {
        assert_eq!(alias_for("address"), "address");
        assert_eq!(alias_for("address.city"), "address__city");
    }

    #[test]
    fn leaf_paths_get_no_binding() {
        assert!(resolve_aliases(["name", "email"]).is_empty());
    }

    #[test]
    fn prefixes_are_shared_and_parents_come_first() {
        let bindings = resolve_aliases(["address.city.name", "address.street", "city.id"]);
        let paths = bindings
            .iter()
            .map(|binding| (binding.path.as_str(), binding.alias.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                ("address", "address"),
                ("address.city", "address__city"),
                ("city", "city"),
            ]
        );
    }

    #[test]
    fn clashing_alias_names_are_disambiguated() {
        let mut resolver = AliasResolver::new();
        resolver.register("a__b.c");
        resolver.register("a.b.c");
        assert_eq!(resolver.alias_of("a__b"), Some("a__b"));
        assert_eq!(resolver.alias_of("a.b"), Some("a__b_1"));
    }
}
