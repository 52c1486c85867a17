//! Static registry of known nodes, used only by the Ring Manager's
//! repair algorithm and, at startup, by config resolution for the env
//! vars this process didn't receive directly.
//!
//! A fixed `node_id -> (host, socket_port)` table shipped with the
//! deployment, plus a default log-aggregator address.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryEntry {
    pub host: String,
    pub socket_port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatorAddr {
    pub host: String,
    pub port: u16,
}

/// Built-in five-node example deployment. Real deployments override
/// entries via `Registry::with_entry`/`Registry::from_entries` at
/// startup rather than editing this table.
pub fn default_entries() -> HashMap<u64, RegistryEntry> {
    let mut map = HashMap::new();
    map.insert(1, RegistryEntry { host: "http://127.0.0.1:8001".into(), socket_port: 9001 });
    map.insert(2, RegistryEntry { host: "http://127.0.0.1:8002".into(), socket_port: 9002 });
    map.insert(3, RegistryEntry { host: "http://127.0.0.1:8003".into(), socket_port: 9003 });
    map.insert(4, RegistryEntry { host: "http://127.0.0.1:8004".into(), socket_port: 9004 });
    map.insert(5, RegistryEntry { host: "http://127.0.0.1:8005".into(), socket_port: 9005 });
    map
}

pub fn default_log_aggregator() -> AggregatorAddr {
    AggregatorAddr { host: "127.0.0.1".into(), port: 9020 }
}

/// A static registry snapshot, cheap to clone (cloned once at startup
/// and shared behind an `Arc`).
#[derive(Clone, Debug)]
pub struct Registry {
    entries: HashMap<u64, RegistryEntry>,
}

impl Registry {
    pub fn new(entries: HashMap<u64, RegistryEntry>) -> Self {
        Registry { entries }
    }

    pub fn default_deployment() -> Self {
        Registry::new(default_entries())
    }

    pub fn get(&self, node_id: u64) -> Option<&RegistryEntry> {
        self.entries.get(&node_id)
    }

    /// Returns node ids in ring order starting just after `start`,
    /// wrapping around, excluding any id in `excluded` — used by
    /// repair to find a replacement successor.
    pub fn ordered_after(&self, start: u64, excluded: &[u64]) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        let pivot = ids.iter().position(|id| *id > start).unwrap_or(ids.len());
        let (after, before) = ids.split_at(pivot);
        after
            .iter()
            .chain(before.iter())
            .copied()
            .filter(|id| !excluded.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_after_wraps() {
        let reg = Registry::default_deployment();
        let order = reg.ordered_after(3, &[]);
        assert_eq!(order, vec![4, 5, 1, 2]);
    }

    #[test]
    fn ordered_after_excludes() {
        let reg = Registry::default_deployment();
        let order = reg.ordered_after(1, &[2, 5]);
        assert_eq!(order, vec![3, 4]);
    }
}
