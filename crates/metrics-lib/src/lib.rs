//! Cluster utilization library
//!
//! This crate provides the core functionality for:
//! - Normalizing Kubernetes CPU and memory quantities
//! - Reading node usage and capacity from kubectl or the metrics API
//! - Aggregating node readings into cluster-wide utilization
//! - Falling back between sources with per-source failure policies
//! - Prometheus metrics and structured logging

pub mod error;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod quantity;
pub mod source;

pub use error::{CommandError, SourceError};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use orchestrator::{FailurePolicy, FallbackOrchestrator, FallbackOrchestratorBuilder, MetricsOutcome};
