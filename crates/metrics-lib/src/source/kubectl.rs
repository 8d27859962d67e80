//! Local kubectl source
//!
//! Usage comes from `kubectl top nodes --no-headers`, one whitespace
//! separated row per node:
//!
//! ```text
//! NAME     CPU(cores)  CPU%  MEMORY(bytes)  MEMORY%
//! node-a   250m        6%    1843Mi         24%
//! ```
//!
//! The columns are positional. CPU rows need the first three fields, memory
//! rows need all five. Shorter rows are skipped. Capacity comes from
//! `kubectl get nodes -o json`.

use super::capacity::CapacitySnapshot;
use super::runner::CommandRunner;
use super::{MetricsSource, SourceOutcome};
use crate::models::{ClusterReading, NodeReading, Resource, SourceKind};
use crate::quantity::parse_percent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default kubectl executable, resolved through `PATH`
pub const DEFAULT_KUBECTL: &str = "kubectl";

/// How long a single kubectl invocation may run
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const TOP_NODES_ARGS: &[&str] = &["top", "nodes", "--no-headers"];
const GET_NODES_ARGS: &[&str] = &["get", "nodes", "-o", "json"];

/// Column positions of one resource in `kubectl top nodes` output
struct TopColumns {
    min_fields: usize,
    value: usize,
    percent: usize,
}

impl TopColumns {
    fn for_resource(resource: Resource) -> Self {
        match resource {
            Resource::Cpu => Self {
                min_fields: 3,
                value: 1,
                percent: 2,
            },
            Resource::Memory => Self {
                min_fields: 5,
                value: 3,
                percent: 4,
            },
        }
    }
}

/// Parse `kubectl top nodes --no-headers` output
///
/// Rows keep their output order. Rows with too few fields are dropped;
/// unparseable values inside a row become zero.
pub fn parse_top_nodes(output: &str, resource: Resource) -> Vec<NodeReading> {
    let columns = TopColumns::for_resource(resource);

    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < columns.min_fields {
                if !fields.is_empty() {
                    debug!(line = %line, "Skipping short kubectl top row");
                }
                return None;
            }

            Some(NodeReading::new(
                fields[0],
                resource.normalize(fields[columns.value]),
                parse_percent(fields[columns.percent]),
            ))
        })
        .collect()
}

/// Source backed by a locally installed kubectl
pub struct KubectlSource {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl KubectlSource {
    /// Create a source using the default executable and timeout
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            program: DEFAULT_KUBECTL.to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the kubectl executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the per-invocation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run kubectl and return its stdout, or why there is nothing to use
    async fn invoke(&self, args: &[&str]) -> Result<String, String> {
        let output = self
            .runner
            .run(&self.program, args, self.timeout)
            .await
            .map_err(|e| e.to_string())?;

        if !output.success {
            return Err(format!(
                "{} {} exited with {:?}: {}",
                self.program,
                args.join(" "),
                output.code,
                output.stderr.trim()
            ));
        }

        if output.stdout.trim().is_empty() {
            return Err(format!("{} {} produced no output", self.program, args.join(" ")));
        }

        Ok(output.stdout)
    }

    /// Capacity from the node list, empty if it cannot be obtained
    async fn capacity(&self, resource: Resource) -> CapacitySnapshot {
        let document = match self.invoke(GET_NODES_ARGS).await {
            Ok(document) => document,
            Err(reason) => {
                warn!(reason = %reason, "kubectl node list unavailable, capacity treated as zero");
                return CapacitySnapshot::empty();
            }
        };

        CapacitySnapshot::from_node_list(document.as_bytes(), resource).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to decode kubectl node list, capacity treated as zero");
            CapacitySnapshot::empty()
        })
    }
}

#[async_trait]
impl MetricsSource for KubectlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Kubectl
    }

    async fn read(&self, resource: Resource) -> SourceOutcome {
        let usage = match self.invoke(TOP_NODES_ARGS).await {
            Ok(usage) => usage,
            Err(reason) => return SourceOutcome::Unavailable(reason),
        };

        let nodes = parse_top_nodes(&usage, resource);
        let capacity = self.capacity(resource).await;
        debug!(
            resource = %resource,
            nodes = nodes.len(),
            capacity = capacity.total(),
            "Parsed kubectl top output"
        );

        SourceOutcome::Success(ClusterReading::aggregate(
            resource,
            SourceKind::Kubectl,
            nodes,
            capacity.total(),
        ))
    }
}
