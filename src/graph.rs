//! Graph store seam.
//!
//! The enumeration only ever talks to the graph through the `GraphStore`
//! trait: upserts of discovered FQDNs under the current run, existence
//! checks for the duplicate tracker, and reads of prior runs for seeding.
//! The persistent schema lives elsewhere; `MemoryGraph` is the in-process
//! implementation used by the binary and the test suite, and it tolerates
//! concurrent access from the store stage, seeder, duplicate tracker, and
//! output sink.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{EnumError, Result};

/// A node handle inside the graph. Today only FQDN nodes are addressed by
/// the enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub kind: String,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update an FQDN under the given run, recording the
    /// discovering source.
    async fn upsert_fqdn(&self, name: &str, source: &str, run_id: &str) -> Result<Node>;

    /// Fetch a node by name and kind; absent nodes are an error.
    async fn read_node(&self, name: &str, kind: &str) -> Result<Node>;

    /// Run identifiers that touched at least one of the given domains.
    async fn events_in_scope(&self, domains: &[String]) -> Vec<String>;

    /// All FQDNs recorded under a run.
    async fn event_fqdns(&self, event: &str) -> Vec<String>;

    /// The sources that discovered a node within a run, in first-seen
    /// order.
    async fn node_sources(&self, node: &Node, event: &str) -> Result<Vec<String>>;
}

#[derive(Default)]
struct GraphData {
    /// name -> event -> discovering sources, first-seen order.
    fqdns: HashMap<String, HashMap<String, Vec<String>>>,
}

/// In-memory `GraphStore`.
#[derive(Default)]
pub struct MemoryGraph {
    data: RwLock<GraphData>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every FQDN currently in the graph, across runs.
    pub async fn all_fqdns(&self) -> Vec<String> {
        let data = self.data.read().await;
        let mut names: Vec<String> = data.fqdns.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn upsert_fqdn(&self, name: &str, source: &str, run_id: &str) -> Result<Node> {
        if name.is_empty() {
            return Err(EnumError::store("upsert_fqdn", name, "empty name"));
        }

        let mut data = self.data.write().await;
        let events = data.fqdns.entry(name.to_string()).or_default();
        let sources = events.entry(run_id.to_string()).or_default();
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
        Ok(Node {
            name: name.to_string(),
            kind: "fqdn".to_string(),
        })
    }

    async fn read_node(&self, name: &str, kind: &str) -> Result<Node> {
        if kind != "fqdn" {
            return Err(EnumError::store("read_node", name, "unknown node kind"));
        }
        let data = self.data.read().await;
        if data.fqdns.contains_key(name) {
            Ok(Node {
                name: name.to_string(),
                kind: kind.to_string(),
            })
        } else {
            Err(EnumError::store("read_node", name, "node not found"))
        }
    }

    async fn events_in_scope(&self, domains: &[String]) -> Vec<String> {
        let data = self.data.read().await;
        let mut events: Vec<String> = Vec::new();
        for (name, by_event) in &data.fqdns {
            let in_scope = domains
                .iter()
                .any(|d| name == d || name.ends_with(&format!(".{d}")));
            if !in_scope {
                continue;
            }
            for event in by_event.keys() {
                if !events.iter().any(|e| e == event) {
                    events.push(event.clone());
                }
            }
        }
        events.sort();
        events
    }

    async fn event_fqdns(&self, event: &str) -> Vec<String> {
        let data = self.data.read().await;
        let mut names: Vec<String> = data
            .fqdns
            .iter()
            .filter(|(_, by_event)| by_event.contains_key(event))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    async fn node_sources(&self, node: &Node, event: &str) -> Result<Vec<String>> {
        let data = self.data.read().await;
        data.fqdns
            .get(&node.name)
            .and_then(|by_event| by_event.get(event))
            .cloned()
            .filter(|sources| !sources.is_empty())
            .ok_or_else(|| EnumError::store("node_sources", &node.name, "no sources recorded"))
    }
}
