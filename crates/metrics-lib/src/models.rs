//! Core data models for cluster utilization readings

use crate::quantity::{normalize_cpu, normalize_memory, round_to};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision of the cluster-level percentage
const PERCENT_PRECISION: u32 = 2;

/// Resource a reading is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// CPU, canonical unit is cores
    Cpu,
    /// Memory, canonical unit is mebibytes
    Memory,
}

/// JSON keys used on the wire for one resource
struct WireFields {
    total_usage: &'static str,
    total_capacity: &'static str,
    cluster_percent: &'static str,
    node_usage: &'static str,
    node_percent: &'static str,
}

const CPU_FIELDS: WireFields = WireFields {
    total_usage: "totalCpuCoresUsed",
    total_capacity: "totalCpuCoresCapacity",
    cluster_percent: "clusterCpuPercent",
    node_usage: "cpuCores",
    node_percent: "cpuPercent",
};

const MEMORY_FIELDS: WireFields = WireFields {
    total_usage: "totalMemoryMi",
    total_capacity: "totalMemoryMiCapacity",
    cluster_percent: "clusterMemoryPercent",
    node_usage: "memoryMi",
    node_percent: "memoryPercent",
};

impl Resource {
    /// Key of this resource under `usage` and `status.capacity`
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
        }
    }

    /// Convert a quantity string to the canonical unit
    pub fn normalize(&self, quantity: &str) -> f64 {
        match self {
            Resource::Cpu => normalize_cpu(quantity),
            Resource::Memory => normalize_memory(quantity),
        }
    }

    /// Decimals kept for usage and capacity totals
    pub fn precision(&self) -> u32 {
        match self {
            Resource::Cpu => 4,
            Resource::Memory => 2,
        }
    }

    /// Body of the "not found" response
    pub fn not_found_message(&self) -> &'static str {
        match self {
            Resource::Cpu => "Could not retrieve cluster metrics.",
            Resource::Memory => "Could not retrieve memory metrics.",
        }
    }

    fn wire_fields(&self) -> &'static WireFields {
        match self {
            Resource::Cpu => &CPU_FIELDS,
            Resource::Memory => &MEMORY_FIELDS,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend that produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Local `kubectl` invocation
    #[serde(rename = "kubectl")]
    Kubectl,
    /// In-cluster metrics.k8s.io API
    #[serde(rename = "metrics-api")]
    MetricsApi,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Kubectl => "kubectl",
            SourceKind::MetricsApi => "metrics-api",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node's usage snapshot
///
/// `usage_percent` is whatever the source reported or derived for the node.
/// It is never reconciled against `usage` and never feeds the cluster
/// percentage.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReading {
    pub name: String,
    pub usage: f64,
    pub usage_percent: f64,
}

impl NodeReading {
    pub fn new(name: impl Into<String>, usage: f64, usage_percent: f64) -> Self {
        Self {
            name: name.into(),
            usage,
            usage_percent,
        }
    }
}

/// Cluster-wide utilization for one resource
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReading {
    pub resource: Resource,
    pub source: SourceKind,
    pub node_count: usize,
    pub total_usage: f64,
    pub total_capacity: f64,
    pub cluster_percent: f64,
    /// Nodes in the order the source emitted them
    pub nodes: Vec<NodeReading>,
}

impl ClusterReading {
    /// Aggregate node readings against the summed node capacity
    pub fn aggregate(
        resource: Resource,
        source: SourceKind,
        nodes: Vec<NodeReading>,
        total_capacity: f64,
    ) -> Self {
        let total_usage: f64 = nodes.iter().map(|n| n.usage).sum();
        let cluster_percent = if total_capacity > 0.0 {
            total_usage / total_capacity * 100.0
        } else {
            0.0
        };

        Self {
            resource,
            source,
            node_count: nodes.len(),
            total_usage: round_to(total_usage, resource.precision()),
            total_capacity: round_to(total_capacity, resource.precision()),
            cluster_percent: round_to(cluster_percent, PERCENT_PRECISION),
            nodes,
        }
    }
}

impl Serialize for ClusterReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.resource.wire_fields();
        let nodes: Vec<NodeEntry<'_>> = self
            .nodes
            .iter()
            .map(|node| NodeEntry { fields, node })
            .collect();

        let mut map = serializer.serialize_map(Some(6))?;
        map.serialize_entry("source", &self.source)?;
        map.serialize_entry("nodeCount", &self.node_count)?;
        map.serialize_entry(fields.total_usage, &self.total_usage)?;
        map.serialize_entry(fields.total_capacity, &self.total_capacity)?;
        map.serialize_entry(fields.cluster_percent, &self.cluster_percent)?;
        map.serialize_entry("nodes", &nodes)?;
        map.end()
    }
}

struct NodeEntry<'a> {
    fields: &'static WireFields,
    node: &'a NodeReading,
}

impl Serialize for NodeEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("name", &self.node.name)?;
        map.serialize_entry(self.fields.node_usage, &self.node.usage)?;
        map.serialize_entry(self.fields.node_percent, &self.node.usage_percent)?;
        map.end()
    }
}
