//! Import Path Resolution
//!
//! Schema files sometimes import a dependency by a path other than the one
//! it is actually registered under. An [`ImportResolver`] holds rewrite rules
//! from the path written in an import statement to the real path, either
//! globally or only for importing files under a given source scope.
//!
//! Resolution order for `(requesting file, requested path)`:
//! 1. the matching scoped rule with the longest scope
//! 2. the resolver's own global rule
//! 3. the global rules of the fallback resolver (scoped rules never leak)
//! 4. the requested path unchanged
//!
//! Resolvers made with [`ImportResolver::new`] fall back to the process-wide
//! resolver that [`register_import_path`] writes to.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

#[derive(Debug, Clone)]
struct ScopedRule {
    scope: Vec<String>,
    actual: String,
}

#[derive(Debug, Default)]
struct RuleSet {
    global: HashMap<String, String>,
    scoped: HashMap<String, Vec<ScopedRule>>,
}

/// Rewrites import paths for a schema loader
#[derive(Debug)]
pub struct ImportResolver {
    rules: RwLock<RuleSet>,
    fallback: Option<Arc<ImportResolver>>,
}

static SHARED: LazyLock<Arc<ImportResolver>> =
    LazyLock::new(|| Arc::new(ImportResolver::isolated()));

impl Default for ImportResolver {
    fn default() -> Self {
        Self::with_shared_fallback()
    }
}

impl ImportResolver {
    /// Resolver with no rules that falls back to the process-wide resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver with no rules and no fallback
    pub fn isolated() -> Self {
        Self {
            rules: RwLock::default(),
            fallback: None,
        }
    }

    /// Resolver that falls back to the global rules of `fallback`
    pub fn with_fallback(fallback: Arc<ImportResolver>) -> Self {
        Self {
            rules: RwLock::default(),
            fallback: Some(fallback),
        }
    }

    /// Resolver that falls back to the process-wide resolver
    pub fn with_shared_fallback() -> Self {
        Self::with_fallback(Self::shared())
    }

    /// The process-wide resolver
    pub fn shared() -> Arc<ImportResolver> {
        SHARED.clone()
    }

    /// Rewrite `requested` to `actual` for every importing file.
    ///
    /// # Panics
    ///
    /// Panics if either path is empty.
    pub fn register_path(&self, requested: &str, actual: &str) {
        self.register_path_from(requested, actual, "");
    }

    /// Rewrite `requested` to `actual` only for files under `scope`.
    ///
    /// `scope` names either one exact file or a directory; a requester
    /// matches when it is that file, lives beneath that directory, or its
    /// directory ends with `scope`. An empty scope registers a global rule.
    ///
    /// # Panics
    ///
    /// Panics if `requested` or `actual` is empty.
    pub fn register_path_from(&self, requested: &str, actual: &str, scope: &str) {
        assert!(!requested.is_empty(), "requested import path must not be empty");
        assert!(!actual.is_empty(), "actual import path must not be empty");

        let scope = clean_path(scope);
        debug!(requested, actual, scope = %scope.join("/"), "registering import path");

        let mut rules = self.rules.write();
        if scope.is_empty() {
            rules.global.insert(requested.to_string(), actual.to_string());
            return;
        }
        let scoped = rules.scoped.entry(requested.to_string()).or_default();
        match scoped.iter_mut().find(|r| r.scope == scope) {
            Some(rule) => rule.actual = actual.to_string(),
            None => scoped.push(ScopedRule {
                scope,
                actual: actual.to_string(),
            }),
        }
    }

    /// Real path for `requested` as imported from `requesting_file`
    pub fn resolve(&self, requesting_file: &str, requested: &str) -> String {
        if let Some(actual) = self.resolve_local(requesting_file, requested) {
            return actual;
        }
        if let Some(actual) = self.fallback.as_ref().and_then(|f| f.resolve_global(requested)) {
            return actual;
        }
        requested.to_string()
    }

    fn resolve_local(&self, requesting_file: &str, requested: &str) -> Option<String> {
        let rules = self.rules.read();
        if let Some(scoped) = rules.scoped.get(requested) {
            let requester = clean_path(requesting_file);
            let best = scoped
                .iter()
                .filter(|rule| scope_matches(&rule.scope, &requester))
                .max_by_key(|rule| rule.scope.len());
            if let Some(rule) = best {
                return Some(rule.actual.clone());
            }
        }
        rules.global.get(requested).cloned()
    }

    fn resolve_global(&self, requested: &str) -> Option<String> {
        self.rules.read().global.get(requested).cloned()
    }
}

/// Register a global rule on the process-wide resolver
pub fn register_import_path(requested: &str, actual: &str) {
    ImportResolver::shared().register_path(requested, actual);
}

/// Resolve against the process-wide resolver's global rules
pub fn resolve_import(requested: &str) -> String {
    ImportResolver::shared()
        .resolve_global(requested)
        .unwrap_or_else(|| requested.to_string())
}

fn scope_matches(scope: &[String], requester: &[String]) -> bool {
    if requester == scope {
        return true;
    }
    let dir = &requester[..requester.len().saturating_sub(1)];
    dir.starts_with(scope) || dir.ends_with(scope)
}

/// Path components with `.`, `..` and empty segments folded away
fn clean_path(path: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(last) if last != "..") {
                    out.pop();
                } else {
                    out.push(part.to_string());
                }
            }
            _ => out.push(part.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("a//b/./c/../d.proto"), vec!["a", "b", "d.proto"]);
        assert_eq!(clean_path("../x"), vec!["..", "x"]);
        assert!(clean_path("").is_empty());
    }

    #[test]
    fn test_scope_matches() {
        let scope = clean_path("a/b");
        assert!(scope_matches(&scope, &clean_path("a/b/c.proto")));
        assert!(scope_matches(&scope, &clean_path("a/b/deep/c.proto")));
        assert!(scope_matches(&scope, &clean_path("root/a/b/c.proto")));
        assert!(scope_matches(&clean_path("a/b/c.proto"), &clean_path("a/b/c.proto")));
        assert!(!scope_matches(&scope, &clean_path("a/c.proto")));
        assert!(!scope_matches(&scope, &clean_path("a/bc/c.proto")));
    }

    #[test]
    fn test_longest_scope_wins() {
        let resolver = ImportResolver::isolated();
        resolver.register_path("x.proto", "global/x.proto");
        resolver.register_path_from("x.proto", "short/x.proto", "a");
        resolver.register_path_from("x.proto", "long/x.proto", "a/b");

        assert_eq!(resolver.resolve("a/b/file.proto", "x.proto"), "long/x.proto");
        assert_eq!(resolver.resolve("a/file.proto", "x.proto"), "short/x.proto");
        assert_eq!(resolver.resolve("z/file.proto", "x.proto"), "global/x.proto");
        assert_eq!(resolver.resolve("z/file.proto", "y.proto"), "y.proto");
    }

    #[test]
    fn test_fallback_uses_only_global_rules() {
        let parent = Arc::new(ImportResolver::isolated());
        parent.register_path("g.proto", "parent/g.proto");
        parent.register_path_from("s.proto", "parent/s.proto", "dir");

        let child = ImportResolver::with_fallback(parent);
        assert_eq!(child.resolve("dir/f.proto", "g.proto"), "parent/g.proto");
        assert_eq!(child.resolve("dir/f.proto", "s.proto"), "s.proto");

        child.register_path("g.proto", "child/g.proto");
        assert_eq!(child.resolve("dir/f.proto", "g.proto"), "child/g.proto");
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn test_empty_requested_panics() {
        ImportResolver::isolated().register_path("", "a/b.proto");
    }

    #[test]
    fn test_new_falls_back_to_shared_rules() {
        ImportResolver::shared().register_path("shared_default.proto", "real/shared_default.proto");
        assert_eq!(
            ImportResolver::new().resolve("any/file.proto", "shared_default.proto"),
            "real/shared_default.proto"
        );
        assert_eq!(
            ImportResolver::isolated().resolve("any/file.proto", "shared_default.proto"),
            "shared_default.proto"
        );
    }
}
