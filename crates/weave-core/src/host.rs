//! Host-specific configuration overlay
//!
//! A key written as `host:<host>.<key>` overrides `<key>` for requests
//! addressed to `<host>`. The host key always wins, whatever order the keys
//! were declared in.

use crate::config::Config;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Compute the effective configuration for `host`.
///
/// Keys outside this host's section pass through unchanged.
pub fn overlay(host: &str, base: &Config) -> Config {
    let section = format!("host:{}.", host);
    let mut effective = Config::new();

    for (key, value) in base.iter() {
        if key.starts_with(&section) {
            continue;
        }
        effective.insert(key, value.clone());
    }
    for (key, value) in base.iter() {
        if let Some(stripped) = key.strip_prefix(&section) {
            effective.insert(stripped, value.clone());
        }
    }

    effective
}

/// Per-host cache of effective configurations, kept for the process lifetime
#[derive(Debug, Default)]
pub struct HostConfigCache {
    entries: RwLock<HashMap<String, Arc<Config>>>,
}

impl HostConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached overlay for `host`, computing it on first use.
    ///
    /// Two threads racing on an unseen host may both compute the overlay; the
    /// first insert is kept and both get the same `Arc`.
    pub fn resolve(&self, host: &str, base: &Config) -> Arc<Config> {
        if let Some(config) = self.entries.read().get(host) {
            return Arc::clone(config);
        }

        let computed = Arc::new(overlay(host, base));
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(host.to_string()).or_insert(computed))
    }

    /// Number of hosts seen so far
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> Config {
        Config::new()
            .with("global.retry_after", 60)
            .with("host:example.com.foo", "bar")
            .with("foo", "baz")
    }

    #[test]
    fn test_host_key_overrides_generic() {
        let config = example();
        assert_eq!(overlay("example.com", &config).get_str("foo"), Some("bar"));
        assert_eq!(overlay("other.com", &config).get_str("foo"), Some("baz"));
    }

    #[test]
    fn test_precedence_ignores_declaration_order() {
        // "foo" sorts before "host:..." and is inserted first here.
        let config = Config::from_pairs([("foo", "generic"), ("host:a.org.foo", "specific")]);
        assert_eq!(overlay("a.org", &config).get_str("foo"), Some("specific"));

        let config = Config::from_pairs([("host:a.org.foo", "specific"), ("foo", "generic")]);
        assert_eq!(overlay("a.org", &config).get_str("foo"), Some("specific"));
    }

    #[test]
    fn test_other_keys_pass_through() {
        let config = example().with("host:other.com.foo", "qux");
        let effective = overlay("example.com", &config);

        assert_eq!(effective.get_int("global.retry_after"), Some(60));
        assert_eq!(effective.get_str("host:other.com.foo"), Some("qux"));
        assert!(!effective.contains_key("host:example.com.foo"));
    }

    #[test]
    fn test_host_prefix_must_match_exactly() {
        let config = Config::new().with("host:example.com.au.foo", "au").with("foo", "x");
        // Host names contain dots, so the section prefix is matched literally.
        let effective = overlay("example.com", &config);
        assert_eq!(effective.get_str("foo"), Some("x"));
        assert_eq!(effective.get_str("au.foo"), Some("au"));
    }

    #[test]
    fn test_cache_returns_same_arc() {
        let cache = HostConfigCache::new();
        let config = example();

        let first = cache.resolve("example.com", &config);
        let second = cache.resolve("example.com", &config);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let other = cache.resolve("other.com", &config);
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_concurrent_first_access() {
        let cache = Arc::new(HostConfigCache::new());
        let config = Arc::new(example());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let config = Arc::clone(&config);
                std::thread::spawn(move || cache.resolve("example.com", &config))
            })
            .collect();

        let results: Vec<Arc<Config>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert!(Arc::ptr_eq(&results[0], r));
        }
    }
}
