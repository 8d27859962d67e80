//! API client for the cluster metrics service

use anyhow::{Context, Result};
use metrics_lib::{ClusterReading, NodeReading, Resource, SourceKind};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

/// API client for the cluster metrics service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Fetch the cluster reading for `resource`
    ///
    /// Returns `None` when the service has no source with data.
    pub async fn cluster_reading(&self, resource: Resource) -> Result<Option<ClusterReading>> {
        let path = format!("cluster/{}", resource.as_str());
        let url = self.base_url.join(&path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProblemDetails>(&body)
                .ok()
                .and_then(|problem| problem.detail)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        let view: ReadingView = response.json().await.context("Failed to parse response")?;
        Ok(Some(view.into_reading(resource)))
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct ProblemDetails {
    detail: Option<String>,
}

/// Either resource's reading, keyed by whichever field names it was sent with
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadingView {
    source: SourceKind,
    node_count: usize,
    #[serde(alias = "totalCpuCoresUsed", alias = "totalMemoryMi")]
    total_usage: f64,
    #[serde(alias = "totalCpuCoresCapacity", alias = "totalMemoryMiCapacity")]
    total_capacity: f64,
    #[serde(alias = "clusterCpuPercent", alias = "clusterMemoryPercent")]
    cluster_percent: f64,
    #[serde(default)]
    nodes: Vec<NodeView>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeView {
    name: String,
    #[serde(alias = "cpuCores", alias = "memoryMi")]
    usage: f64,
    #[serde(alias = "cpuPercent", alias = "memoryPercent")]
    usage_percent: f64,
}

impl ReadingView {
    fn into_reading(self, resource: Resource) -> ClusterReading {
        ClusterReading {
            resource,
            source: self.source,
            node_count: self.node_count,
            total_usage: self.total_usage,
            total_capacity: self.total_capacity,
            cluster_percent: self.cluster_percent,
            nodes: self
                .nodes
                .into_iter()
                .map(|n| NodeReading::new(n.name, n.usage, n.usage_percent))
                .collect(),
        }
    }
}
