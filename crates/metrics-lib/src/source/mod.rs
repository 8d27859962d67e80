//! Metric sources
//!
//! A source turns one backend's view of the cluster into a [`ClusterReading`].
//! Two are provided: a local kubectl invocation and the in-cluster metrics
//! API. Both sum node capacity through [`CapacitySnapshot`].

mod capacity;
mod kubectl;
mod metrics_api;
mod runner;

pub use capacity::CapacitySnapshot;
pub use kubectl::{parse_top_nodes, KubectlSource, DEFAULT_COMMAND_TIMEOUT, DEFAULT_KUBECTL};
pub use metrics_api::{
    api_server_from_env, ClusterApiConfig, MetricsApiSource, NodePercentBasis, TrustConfig,
    DEFAULT_API_SERVER, DEFAULT_REQUEST_TIMEOUT, SERVICE_ACCOUNT_DIR,
};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};

use crate::error::SourceError;
use crate::models::{ClusterReading, Resource, SourceKind};
use async_trait::async_trait;

/// Result of asking one source for a reading
#[derive(Debug)]
pub enum SourceOutcome {
    /// The source produced a reading, possibly with zero nodes
    Success(ClusterReading),
    /// The backend is not there; the reason is for logs only
    Unavailable(String),
    /// The backend is there but the attempt broke
    Failed(SourceError),
}

impl SourceOutcome {
    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            SourceOutcome::Success(_) => "success",
            SourceOutcome::Unavailable(_) => "unavailable",
            SourceOutcome::Failed(_) => "failed",
        }
    }
}

/// A backend able to report cluster utilization
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Tag identifying this source in readings
    fn kind(&self) -> SourceKind;

    /// Produce a fresh reading for `resource`
    async fn read(&self, resource: Resource) -> SourceOutcome;
}
