//! Fallback between metric sources
//!
//! Sources are tried strictly in order and the first reading wins. What a
//! failed attempt means is decided per stage by its [`FailurePolicy`]: the
//! standard chain swallows a kubectl failure, since kubectl is routinely
//! absent from containers, and surfaces a metrics API failure.

use crate::error::SourceError;
use crate::models::{ClusterReading, Resource, SourceKind};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::source::{
    ClusterApiConfig, KubectlSource, MetricsApiSource, MetricsSource, ProcessRunner, SourceOutcome,
};
use std::sync::Arc;
use std::time::Instant;

/// What a stage's failure does to the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Treat the failure like missing data and move on
    Swallow,
    /// End the request with the failure
    Surface,
}

/// Final result of resolving a reading
#[derive(Debug)]
pub enum MetricsOutcome {
    /// A source produced a reading
    Found(ClusterReading),
    /// No source had data
    NotFound,
    /// A surfacing stage failed
    Failed {
        source: SourceKind,
        error: SourceError,
    },
}

impl MetricsOutcome {
    /// Label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            MetricsOutcome::Found(_) => "found",
            MetricsOutcome::NotFound => "not_found",
            MetricsOutcome::Failed { .. } => "failed",
        }
    }
}

struct Stage {
    source: Arc<dyn MetricsSource>,
    policy: FailurePolicy,
}

/// Ordered chain of metric sources
pub struct FallbackOrchestrator {
    stages: Vec<Stage>,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl FallbackOrchestrator {
    /// Start an empty chain
    pub fn builder() -> FallbackOrchestratorBuilder {
        FallbackOrchestratorBuilder::new()
    }

    /// kubectl first with failures swallowed, then the metrics API with
    /// failures surfaced
    pub fn standard(local: Arc<dyn MetricsSource>, cluster_api: Arc<dyn MetricsSource>) -> Self {
        Self::builder()
            .stage(local, FailurePolicy::Swallow)
            .stage(cluster_api, FailurePolicy::Surface)
            .build()
    }

    /// Standard chain with `kubectl` from `PATH` and in-cluster API settings
    pub fn with_defaults() -> Self {
        Self::standard(
            Arc::new(KubectlSource::new(Arc::new(ProcessRunner))),
            Arc::new(MetricsApiSource::new(ClusterApiConfig::in_cluster())),
        )
    }

    /// Number of stages in the chain
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Try each stage in order until one yields a reading or surfaces a failure
    pub async fn resolve(&self, resource: Resource) -> MetricsOutcome {
        let outcome = self.run_stages(resource).await;

        if let MetricsOutcome::NotFound = outcome {
            self.logger.log_no_backend(resource.as_str());
        }
        self.metrics.record_request(resource.as_str(), outcome.label());

        outcome
    }

    async fn run_stages(&self, resource: Resource) -> MetricsOutcome {
        for stage in &self.stages {
            let kind = stage.source.kind();
            let started = Instant::now();
            let outcome = stage.source.read(resource).await;
            let elapsed = started.elapsed();

            self.metrics
                .record_source_attempt(kind.as_str(), outcome.label(), elapsed);

            match outcome {
                SourceOutcome::Success(reading) => {
                    self.logger.log_source_success(
                        kind.as_str(),
                        resource.as_str(),
                        reading.node_count,
                        elapsed,
                    );
                    return MetricsOutcome::Found(reading);
                }
                SourceOutcome::Unavailable(reason) => {
                    self.logger
                        .log_source_unavailable(kind.as_str(), resource.as_str(), &reason);
                }
                SourceOutcome::Failed(error) => {
                    let surfaced = stage.policy == FailurePolicy::Surface;
                    self.logger.log_source_failure(
                        kind.as_str(),
                        resource.as_str(),
                        &error.to_string(),
                        surfaced,
                    );
                    if surfaced {
                        return MetricsOutcome::Failed {
                            source: kind,
                            error,
                        };
                    }
                }
            }
        }

        MetricsOutcome::NotFound
    }
}

/// Builder for a [`FallbackOrchestrator`]
pub struct FallbackOrchestratorBuilder {
    stages: Vec<Stage>,
    logger: StructuredLogger,
}

impl FallbackOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            logger: StructuredLogger::default(),
        }
    }

    /// Append a source to the end of the chain
    pub fn stage(mut self, source: Arc<dyn MetricsSource>, policy: FailurePolicy) -> Self {
        self.stages.push(Stage { source, policy });
        self
    }

    /// Set the logger used for source events
    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> FallbackOrchestrator {
        FallbackOrchestrator {
            stages: self.stages,
            metrics: ServiceMetrics::new(),
            logger: self.logger,
        }
    }
}

impl Default for FallbackOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
