//! Blocked IP and domain sets.

use parking_lot::RwLock;
use relay_kernel::{BlockKind, BlocklistEntry};
use std::collections::HashSet;
use std::sync::Arc;

/// One complete generation of the blocklist.
#[derive(Debug, Default)]
pub struct BlocklistSnapshot {
    ips: HashSet<String>,
    domains: HashSet<String>,
}

impl BlocklistSnapshot {
    pub fn from_entries(entries: &[BlocklistEntry]) -> Self {
        let mut snapshot = Self::default();
        for entry in entries {
            let value = entry.value.trim();
            if value.is_empty() {
                continue;
            }
            match entry.kind {
                BlockKind::Ip => {
                    snapshot.ips.insert(value.to_string());
                }
                BlockKind::Domain => {
                    snapshot.domains.insert(normalize_host(value));
                }
            }
        }
        snapshot
    }

    pub fn ip_count(&self) -> usize {
        self.ips.len()
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }
}

/// Shared admission state.
///
/// Starts empty and is replaced wholesale by the refresher; readers always
/// see one complete snapshot.
#[derive(Debug, Default)]
pub struct BlocklistCache {
    current: RwLock<Arc<BlocklistSnapshot>>,
}

impl BlocklistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a snapshot built from `entries`.
    pub fn replace(&self, entries: &[BlocklistEntry]) -> Arc<BlocklistSnapshot> {
        let snapshot = Arc::new(BlocklistSnapshot::from_entries(entries));
        *self.current.write() = Arc::clone(&snapshot);
        snapshot
    }

    pub fn snapshot(&self) -> Arc<BlocklistSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        self.current.read().ips.contains(ip.trim())
    }

    /// `domain` may carry a port and any letter case.
    pub fn is_domain_blocked(&self, domain: &str) -> bool {
        self.current.read().domains.contains(&normalize_host(domain))
    }
}

/// Lower-case `host` and strip a trailing `:port`, including the port after
/// a bracketed IPv6 literal.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let bare = if let Some(rest) = host.strip_prefix('[') {
        match rest.split_once(']') {
            Some((addr, _)) => addr,
            None => rest,
        }
    } else {
        match host.rsplit_once(':') {
            // More than one colon without brackets is a bare IPv6 literal.
            Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
                name
            }
            _ => host,
        }
    };
    bare.trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("Evil.COM:8080"), "evil.com");
        assert_eq!(normalize_host("evil.com"), "evil.com");
        assert_eq!(normalize_host("evil.com."), "evil.com");
        assert_eq!(normalize_host("[::1]:443"), "::1");
        assert_eq!(normalize_host("fe80::1"), "fe80::1");
        assert_eq!(normalize_host("host:abc"), "host:abc");
    }

    #[test]
    fn membership_checks() {
        let cache = BlocklistCache::new();
        assert!(!cache.is_ip_blocked("10.0.0.9"));

        cache.replace(&[
            BlocklistEntry::ip("10.0.0.9"),
            BlocklistEntry::domain("Bad.Example.com"),
            BlocklistEntry::ip("  "),
        ]);
        assert!(cache.is_ip_blocked("10.0.0.9"));
        assert!(!cache.is_ip_blocked("10.0.0.10"));
        assert!(cache.is_domain_blocked("bad.example.com:8000"));
        assert!(cache.is_domain_blocked("BAD.example.com"));
        assert!(!cache.is_domain_blocked("example.com"));
        assert_eq!(cache.snapshot().ip_count(), 1);
    }

    #[test]
    fn replace_is_wholesale() {
        let cache = BlocklistCache::new();
        cache.replace(&[BlocklistEntry::ip("10.0.0.1")]);
        let old = cache.snapshot();

        cache.replace(&[BlocklistEntry::ip("10.0.0.2")]);
        assert!(!cache.is_ip_blocked("10.0.0.1"));
        assert!(cache.is_ip_blocked("10.0.0.2"));
        // Holders of the previous generation keep a consistent view.
        assert!(old.ips.contains("10.0.0.1"));
    }
}
