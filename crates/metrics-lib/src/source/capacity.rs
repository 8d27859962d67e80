//! Node capacity summation shared by every source
//!
//! `kubectl get nodes -o json` and `GET /api/v1/nodes` return the same node
//! list document, so both adapters decode it here and sum
//! `status.capacity.<resource>` the same way.

use crate::models::Resource;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct NodeList {
    items: Vec<Node>,
}

/// Every field is optional so one odd node cannot sink the whole list
#[derive(Debug, Deserialize)]
struct Node {
    #[serde(default)]
    metadata: Option<NodeMeta>,
    #[serde(default)]
    status: Option<NodeStatus>,
}

#[derive(Debug, Deserialize)]
struct NodeMeta {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NodeStatus {
    #[serde(default)]
    capacity: Option<HashMap<String, String>>,
}

/// Declared capacity of the cluster's nodes for one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapacitySnapshot {
    total: f64,
    per_node: HashMap<String, f64>,
}

impl CapacitySnapshot {
    /// Capacity used when the node list could not be obtained
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode a node list document and sum the capacity of `resource`
    ///
    /// Nodes without a status, a capacity map or the resource key contribute
    /// nothing. Nodes without a name still count towards the total.
    pub fn from_node_list(document: &[u8], resource: Resource) -> Result<Self, serde_json::Error> {
        let list: NodeList = serde_json::from_slice(document)?;
        let mut snapshot = Self::empty();

        for node in list.items {
            let Some(quantity) = node
                .status
                .as_ref()
                .and_then(|status| status.capacity.as_ref())
                .and_then(|capacity| capacity.get(resource.as_str()))
            else {
                continue;
            };

            let value = resource.normalize(quantity);
            snapshot.total += value;
            if let Some(name) = node
                .metadata
                .and_then(|meta| meta.name)
                .filter(|name| !name.is_empty())
            {
                snapshot.per_node.insert(name, value);
            }
        }

        Ok(snapshot)
    }

    /// Sum of the capacity of all nodes, canonical unit
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Capacity of a single node, if the node list declared one
    pub fn node(&self, name: &str) -> Option<f64> {
        self.per_node.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_LIST: &str = r#"{
        "apiVersion": "v1",
        "kind": "NodeList",
        "items": [
            {"metadata": {"name": "node-a"}, "status": {"capacity": {"cpu": "4", "memory": "16Gi", "pods": "110"}}},
            {"metadata": {"name": "node-b"}, "status": {"capacity": {"cpu": "3500m", "memory": "8388608Ki"}}},
            {"metadata": {"name": "node-c"}, "status": {}},
            {"metadata": {"name": "node-d"}}
        ]
    }"#;

    #[test]
    fn test_cpu_capacity_sum() {
        let snapshot = CapacitySnapshot::from_node_list(NODE_LIST.as_bytes(), Resource::Cpu).unwrap();
        assert_eq!(snapshot.total(), 7.5);
        assert_eq!(snapshot.node("node-a"), Some(4.0));
        assert_eq!(snapshot.node("node-b"), Some(3.5));
        assert_eq!(snapshot.node("node-c"), None);
    }

    #[test]
    fn test_memory_capacity_sum() {
        let snapshot = CapacitySnapshot::from_node_list(NODE_LIST.as_bytes(), Resource::Memory).unwrap();
        assert_eq!(snapshot.total(), 16384.0 + 8192.0);
    }

    #[test]
    fn test_unnamed_and_null_capacity_nodes_do_not_fail_the_list() {
        let document = r#"{"items": [
            {"metadata": {"name": "a"}, "status": {"capacity": {"cpu": "4"}}},
            {"metadata": {}, "status": {"capacity": {"cpu": "4"}}},
            {"metadata": null, "status": {"capacity": {"cpu": "2"}}},
            {"metadata": {"name": "c"}, "status": {"capacity": null}},
            {"metadata": {"name": "d"}, "status": null}
        ]}"#;

        let snapshot = CapacitySnapshot::from_node_list(document.as_bytes(), Resource::Cpu).unwrap();

        assert_eq!(snapshot.total(), 10.0);
        assert_eq!(snapshot.node("a"), Some(4.0));
        assert_eq!(snapshot.node("c"), None);
        assert_eq!(snapshot.node(""), None);
    }

    #[test]
    fn test_missing_items_is_error() {
        assert!(CapacitySnapshot::from_node_list(b"{}", Resource::Cpu).is_err());
        assert!(CapacitySnapshot::from_node_list(b"not json", Resource::Cpu).is_err());
    }

    #[test]
    fn test_empty_list() {
        let snapshot = CapacitySnapshot::from_node_list(br#"{"items": []}"#, Resource::Cpu).unwrap();
        assert_eq!(snapshot, CapacitySnapshot::empty());
    }
}
