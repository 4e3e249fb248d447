pub mod extractor;
pub mod gatherer;

pub use gatherer::Gatherer;

use std::collections::HashSet;

use serde::Deserialize;
use tokio::sync::Mutex;

/// One entry of a feed list. The `url` field is frequently a pipe-delimited
/// list of sub-URLs and is split by the gatherer.
#[derive(Debug, Clone, Deserialize)]
pub struct SubEntry {
    pub url: String,
}

/// Run-scoped registry of candidate node URIs.
///
/// Keyed by exact string equality; insertion is idempotent so the
/// extractor's over-splitting collapses here. Coarse single mutex: the
/// gatherer is dominated by network latency, not registry access.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Mutex<HashSet<String>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node URI. Returns false if it was already present.
    pub async fn insert(&self, node: String) -> bool {
        self.nodes.lock().await.insert(node)
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }

    /// Snapshot of the current contents, sorted for a stable test order.
    pub async fn snapshot(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.nodes.lock().await.iter().cloned().collect();
        nodes.sort();
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent() {
        let registry = NodeRegistry::new();
        assert!(registry.insert("vmess://AAAA".to_string()).await);
        assert!(!registry.insert("vmess://AAAA".to_string()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn never_contains_two_identical_strings() {
        let registry = NodeRegistry::new();
        for _ in 0..50 {
            registry.insert("trojan://x@y:443".to_string()).await;
            registry.insert("vless://a@b:443".to_string()).await;
        }
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn snapshot_is_sorted() {
        let registry = NodeRegistry::new();
        registry.insert("vmess://b".to_string()).await;
        registry.insert("vmess://a".to_string()).await;
        assert_eq!(registry.snapshot().await, vec!["vmess://a", "vmess://b"]);
    }
}
