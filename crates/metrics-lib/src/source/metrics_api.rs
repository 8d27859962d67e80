//! In-cluster metrics API source
//!
//! Reads live node usage from `metrics.k8s.io` and node capacity from the core
//! API, authenticating with the pod's service account token. A missing token
//! file means the process is not running inside a cluster, which is reported
//! as unavailable rather than as an error.

use super::capacity::CapacitySnapshot;
use super::{MetricsSource, SourceOutcome};
use crate::error::SourceError;
use crate::models::{ClusterReading, NodeReading, Resource, SourceKind};
use crate::quantity::round_to;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Certificate, Client};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Mount point of the pod's service account credentials
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// API server address when the service environment variables are absent
pub const DEFAULT_API_SERVER: &str = "https://kubernetes.default.svc";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const NODE_METRICS_PATH: &str = "/apis/metrics.k8s.io/v1beta1/nodes";
const NODES_PATH: &str = "/api/v1/nodes";

/// How the API server certificate is verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustConfig {
    /// Trust only the CA bundle at this path
    PinnedCa(PathBuf),
    /// Accept any server certificate
    AcceptAny,
    /// Use the built-in web PKI roots
    System,
}

impl Default for TrustConfig {
    fn default() -> Self {
        TrustConfig::PinnedCa(Path::new(SERVICE_ACCOUNT_DIR).join("ca.crt"))
    }
}

/// Capacity each node's percentage is measured against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePercentBasis {
    /// Cluster capacity divided by the number of nodes
    #[default]
    Average,
    /// The node's own declared capacity, falling back to the average
    Own,
}

/// Connection settings for the in-cluster API
#[derive(Debug, Clone)]
pub struct ClusterApiConfig {
    pub api_server: String,
    pub token_path: PathBuf,
    pub trust: TrustConfig,
    pub request_timeout: Duration,
    pub percent_basis: NodePercentBasis,
}

impl ClusterApiConfig {
    /// Configuration derived from the pod environment
    pub fn in_cluster() -> Self {
        Self {
            api_server: api_server_from_env(),
            token_path: Path::new(SERVICE_ACCOUNT_DIR).join("token"),
            trust: TrustConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            percent_basis: NodePercentBasis::default(),
        }
    }
}

impl Default for ClusterApiConfig {
    fn default() -> Self {
        Self::in_cluster()
    }
}

/// API server URL from `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT`
pub fn api_server_from_env() -> String {
    std::env::var("KUBERNETES_SERVICE_HOST")
        .map(|host| {
            let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
            if host.contains(':') {
                format!("https://[{}]:{}", host, port)
            } else {
                format!("https://{}:{}", host, port)
            }
        })
        .unwrap_or_else(|_| DEFAULT_API_SERVER.into())
}

#[derive(Debug, Deserialize)]
struct NodeMetricsList {
    items: Vec<NodeMetrics>,
}

#[derive(Debug, Deserialize)]
struct NodeMetrics {
    metadata: ObjectMeta,
    usage: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

/// Source backed by the Kubernetes metrics API
pub struct MetricsApiSource {
    config: ClusterApiConfig,
}

impl MetricsApiSource {
    pub fn new(config: ClusterApiConfig) -> Self {
        Self { config }
    }

    async fn build_client(&self) -> Result<Client, SourceError> {
        let builder = Client::builder().timeout(self.config.request_timeout);

        let builder = match &self.config.trust {
            TrustConfig::PinnedCa(path) => load_ca_bundle(path)
                .await?
                .into_iter()
                .fold(builder.tls_built_in_root_certs(false), |b, cert| {
                    b.add_root_certificate(cert)
                }),
            TrustConfig::AcceptAny => builder.danger_accept_invalid_certs(true),
            TrustConfig::System => builder,
        };

        builder.build().map_err(SourceError::Client)
    }

    fn url(&self, path: &str) -> Result<Url, SourceError> {
        let invalid = |source| SourceError::InvalidUrl {
            url: self.config.api_server.clone(),
            source,
        };
        Url::parse(&self.config.api_server)
            .map_err(invalid)?
            .join(path)
            .map_err(invalid)
    }

    /// GET a path, `None` if the server answered with a non-success status
    async fn get(
        &self,
        client: &Client,
        token: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, SourceError> {
        let url = self.url(path)?;
        let transport = |source| SourceError::Transport {
            url: url.to_string(),
            source,
        };

        let response = client
            .get(url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "API server returned non-success status");
            return Ok(None);
        }

        let body = response.bytes().await.map_err(transport)?;
        Ok(Some(body.to_vec()))
    }

    /// Capacity from the node list, empty on any failure
    async fn capacity(&self, client: &Client, token: &str, resource: Resource) -> CapacitySnapshot {
        let document = match self.get(client, token, NODES_PATH).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                warn!("Node list request rejected, capacity treated as zero");
                return CapacitySnapshot::empty();
            }
            Err(e) => {
                warn!(error = %e, "Node list request failed, capacity treated as zero");
                return CapacitySnapshot::empty();
            }
        };

        CapacitySnapshot::from_node_list(&document, resource).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to decode node list, capacity treated as zero");
            CapacitySnapshot::empty()
        })
    }

    async fn try_read(&self, resource: Resource) -> Result<SourceOutcome, SourceError> {
        let token_path = &self.config.token_path;
        if !tokio::fs::try_exists(token_path).await.unwrap_or(false) {
            return Ok(SourceOutcome::Unavailable(format!(
                "no service account token at {}",
                token_path.display()
            )));
        }

        let token = tokio::fs::read_to_string(token_path)
            .await
            .map_err(|source| SourceError::Credential {
                path: token_path.clone(),
                source,
            })?;
        let token = token.trim();

        let client = self.build_client().await?;

        let Some(document) = self.get(&client, token, NODE_METRICS_PATH).await? else {
            return Ok(SourceOutcome::Unavailable(
                "metrics API rejected the node metrics request".to_string(),
            ));
        };

        let metrics: NodeMetricsList =
            serde_json::from_slice(&document).map_err(|source| SourceError::Decode {
                url: NODE_METRICS_PATH.to_string(),
                source,
            })?;

        let capacity = self.capacity(&client, token, resource).await;
        let nodes = node_readings(metrics, &capacity, resource, self.config.percent_basis)?;

        Ok(SourceOutcome::Success(ClusterReading::aggregate(
            resource,
            SourceKind::MetricsApi,
            nodes,
            capacity.total(),
        )))
    }
}

#[async_trait]
impl MetricsSource for MetricsApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MetricsApi
    }

    async fn read(&self, resource: Resource) -> SourceOutcome {
        self.try_read(resource)
            .await
            .unwrap_or_else(SourceOutcome::Failed)
    }
}

/// Convert metrics items to node readings with a derived percentage
///
/// The metrics API reports no percentage, so each node is measured against
/// `basis`. With [`NodePercentBasis::Average`] that is the cluster capacity
/// spread evenly over the reported nodes, an approximation of the node's
/// real share.
fn node_readings(
    metrics: NodeMetricsList,
    capacity: &CapacitySnapshot,
    resource: Resource,
    basis: NodePercentBasis,
) -> Result<Vec<NodeReading>, SourceError> {
    let items: Vec<NodeMetrics> = metrics
        .items
        .into_iter()
        .filter(|item| {
            if item.metadata.name.is_empty() {
                warn!("Skipping node metrics item without a name");
            }
            !item.metadata.name.is_empty()
        })
        .collect();

    let node_count = items.len();
    let average = if node_count > 0 {
        capacity.total() / node_count as f64
    } else {
        0.0
    };

    items
        .into_iter()
        .map(|item| {
            let name = item.metadata.name;
            let quantity = item
                .usage
                .get(resource.as_str())
                .ok_or_else(|| SourceError::MissingField {
                    node: name.clone(),
                    field: resource.as_str(),
                })?;
            let usage = resource.normalize(quantity);

            let node_capacity = match basis {
                NodePercentBasis::Average => average,
                NodePercentBasis::Own => capacity.node(&name).unwrap_or(average),
            };
            let percent = if capacity.total() > 0.0 && node_capacity > 0.0 {
                round_to(usage / node_capacity * 100.0, resource.precision())
            } else {
                0.0
            };

            Ok(NodeReading::new(name, usage, percent))
        })
        .collect()
}

async fn load_ca_bundle(path: &Path) -> Result<Vec<Certificate>, SourceError> {
    let trust_anchor = |reason: String| SourceError::TrustAnchor {
        path: path.to_path_buf(),
        reason,
    };

    let pem = tokio::fs::read(path)
        .await
        .map_err(|e| trust_anchor(e.to_string()))?;
    let ders = rustls_pemfile::certs(&mut pem.as_slice()).map_err(|e| trust_anchor(e.to_string()))?;
    if ders.is_empty() {
        return Err(trust_anchor("no certificates found".to_string()));
    }

    ders.iter()
        .map(|der| Certificate::from_der(der).map_err(|e| trust_anchor(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const METRICS_JSON: &str = r#"{
        "kind": "NodeMetricsList",
        "apiVersion": "metrics.k8s.io/v1beta1",
        "items": [
            {"metadata": {"name": "node-a"}, "timestamp": "2024-01-01T00:00:00Z", "window": "20s",
             "usage": {"cpu": "500000000n", "memory": "2097152Ki"}},
            {"metadata": {"name": "node-b"}, "timestamp": "2024-01-01T00:00:00Z", "window": "20s",
             "usage": {"cpu": "1500m", "memory": "3Gi"}}
        ]
    }"#;

    const NODES_JSON: &str = r#"{"items": [
        {"metadata": {"name": "node-a"}, "status": {"capacity": {"cpu": "2", "memory": "8Gi"}}},
        {"metadata": {"name": "node-b"}, "status": {"capacity": {"cpu": "6", "memory": "8Gi"}}}
    ]}"#;

    fn token_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "test-token").unwrap();
        file
    }

    fn config(server: &Server, token_path: &Path) -> ClusterApiConfig {
        ClusterApiConfig {
            api_server: server.url(),
            token_path: token_path.to_path_buf(),
            trust: TrustConfig::System,
            request_timeout: Duration::from_secs(5),
            percent_basis: NodePercentBasis::Average,
        }
    }

    async fn mock_endpoint(server: &mut Server, path: &str, status: usize, body: &str) -> mockito::Mock {
        server
            .mock("GET", path)
            .match_header("authorization", "Bearer test-token")
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    fn expect_success(outcome: SourceOutcome) -> ClusterReading {
        match outcome {
            SourceOutcome::Success(reading) => reading,
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_cpu_with_average_node_percent() {
        let mut server = Server::new_async().await;
        let metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 200, METRICS_JSON).await;
        let nodes = mock_endpoint(&mut server, NODES_PATH, 200, NODES_JSON).await;
        let token = token_file();

        let source = MetricsApiSource::new(config(&server, token.path()));
        let reading = expect_success(source.read(Resource::Cpu).await);

        metrics.assert_async().await;
        nodes.assert_async().await;
        assert_eq!(reading.source, SourceKind::MetricsApi);
        assert_eq!(reading.node_count, 2);
        assert_eq!(reading.total_usage, 2.0);
        assert_eq!(reading.total_capacity, 8.0);
        assert_eq!(reading.cluster_percent, 25.0);
        // Average capacity is 4 cores per node
        assert_eq!(reading.nodes[0], NodeReading::new("node-a", 0.5, 12.5));
        assert_eq!(reading.nodes[1], NodeReading::new("node-b", 1.5, 37.5));
    }

    #[tokio::test]
    async fn test_read_memory() {
        let mut server = Server::new_async().await;
        let _metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 200, METRICS_JSON).await;
        let _nodes = mock_endpoint(&mut server, NODES_PATH, 200, NODES_JSON).await;
        let token = token_file();

        let source = MetricsApiSource::new(config(&server, token.path()));
        let reading = expect_success(source.read(Resource::Memory).await);

        assert_eq!(reading.total_usage, 2048.0 + 3072.0);
        assert_eq!(reading.total_capacity, 16384.0);
        assert_eq!(reading.cluster_percent, 31.25);
        assert_eq!(reading.nodes[0].usage_percent, 25.0);
        assert_eq!(reading.nodes[1].usage_percent, 37.5);
    }

    #[tokio::test]
    async fn test_own_capacity_basis() {
        let mut server = Server::new_async().await;
        let _metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 200, METRICS_JSON).await;
        let _nodes = mock_endpoint(&mut server, NODES_PATH, 200, NODES_JSON).await;
        let token = token_file();

        let mut config = config(&server, token.path());
        config.percent_basis = NodePercentBasis::Own;
        let reading = expect_success(MetricsApiSource::new(config).read(Resource::Cpu).await);

        assert_eq!(reading.nodes[0].usage_percent, 25.0);
        assert_eq!(reading.nodes[1].usage_percent, 25.0);
        assert_eq!(reading.cluster_percent, 25.0);
    }

    #[tokio::test]
    async fn test_missing_token_is_unavailable() {
        let server = Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();

        let source = MetricsApiSource::new(config(&server, &dir.path().join("token")));
        assert!(matches!(
            source.read(Resource::Cpu).await,
            SourceOutcome::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_rejected_metrics_request_is_unavailable() {
        let mut server = Server::new_async().await;
        let _metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 403, r#"{"kind": "Status"}"#).await;
        let token = token_file();

        let source = MetricsApiSource::new(config(&server, token.path()));
        assert!(matches!(
            source.read(Resource::Cpu).await,
            SourceOutcome::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_rejected_capacity_request_gives_zero_capacity() {
        let mut server = Server::new_async().await;
        let _metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 200, METRICS_JSON).await;
        let _nodes = mock_endpoint(&mut server, NODES_PATH, 500, "oops").await;
        let token = token_file();

        let source = MetricsApiSource::new(config(&server, token.path()));
        let reading = expect_success(source.read(Resource::Cpu).await);

        assert_eq!(reading.total_capacity, 0.0);
        assert_eq!(reading.cluster_percent, 0.0);
        assert!(reading.nodes.iter().all(|n| n.usage_percent == 0.0));
    }

    #[tokio::test]
    async fn test_malformed_metrics_body_is_failure() {
        let mut server = Server::new_async().await;
        let _metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 200, r#"{"kind": "NodeMetricsList"}"#).await;
        let token = token_file();

        let source = MetricsApiSource::new(config(&server, token.path()));
        match source.read(Resource::Cpu).await {
            SourceOutcome::Failed(SourceError::Decode { .. }) => {}
            other => panic!("expected decode failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_item_without_usage_is_failure() {
        let mut server = Server::new_async().await;
        let body = r#"{"items": [{"metadata": {"name": "node-a"}, "usage": {"cpu": "1"}}]}"#;
        let _metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 200, body).await;
        let _nodes = mock_endpoint(&mut server, NODES_PATH, 200, NODES_JSON).await;
        let token = token_file();

        let source = MetricsApiSource::new(config(&server, token.path()));
        match source.read(Resource::Memory).await {
            SourceOutcome::Failed(e) => assert_eq!(e.to_string(), "node node-a has no memory usage"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_failure() {
        let token = token_file();
        let config = ClusterApiConfig {
            // Port 9 (discard) on localhost is not expected to accept connections
            api_server: "http://127.0.0.1:9".to_string(),
            token_path: token.path().to_path_buf(),
            trust: TrustConfig::System,
            request_timeout: Duration::from_secs(2),
            percent_basis: NodePercentBasis::Average,
        };

        match MetricsApiSource::new(config).read(Resource::Cpu).await {
            SourceOutcome::Failed(SourceError::Transport { .. }) => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_ca_bundle_is_failure() {
        let server = Server::new_async().await;
        let token = token_file();
        let dir = tempfile::tempdir().unwrap();

        let mut config = config(&server, token.path());
        config.trust = TrustConfig::PinnedCa(dir.path().join("ca.crt"));

        match MetricsApiSource::new(config).read(Resource::Cpu).await {
            SourceOutcome::Failed(SourceError::TrustAnchor { .. }) => {}
            other => panic!("expected trust anchor failure, got {other:?}"),
        }
    }

    const TEST_CA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/ca.crt"));

    fn ca_file(copies: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for _ in 0..copies {
            file.write_all(TEST_CA.as_bytes()).unwrap();
        }
        file
    }

    fn trust_config(trust: TrustConfig) -> ClusterApiConfig {
        ClusterApiConfig {
            api_server: "https://127.0.0.1:6443".to_string(),
            token_path: PathBuf::from("/nonexistent/token"),
            trust,
            request_timeout: Duration::from_secs(5),
            percent_basis: NodePercentBasis::Average,
        }
    }

    #[tokio::test]
    async fn test_empty_ca_bundle_rejected() {
        let file = NamedTempFile::new().unwrap();
        let result = load_ca_bundle(file.path()).await;
        assert!(matches!(result, Err(SourceError::TrustAnchor { .. })));
    }

    #[tokio::test]
    async fn test_ca_bundle_loads_every_certificate() {
        let single = ca_file(1);
        assert_eq!(load_ca_bundle(single.path()).await.unwrap().len(), 1);

        let double = ca_file(2);
        assert_eq!(load_ca_bundle(double.path()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pinned_ca_client_builds() {
        let ca = ca_file(1);
        let source = MetricsApiSource::new(trust_config(TrustConfig::PinnedCa(ca.path().to_path_buf())));

        assert!(source.build_client().await.is_ok());
    }

    #[test]
    fn test_default_trust_is_pinned_service_account_ca() {
        assert_eq!(
            ClusterApiConfig::in_cluster().trust,
            TrustConfig::PinnedCa(PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt"))
        );
    }

    #[tokio::test]
    async fn test_accept_any_client_builds() {
        let source = MetricsApiSource::new(trust_config(TrustConfig::AcceptAny));
        assert!(source.build_client().await.is_ok());
    }

    #[tokio::test]
    async fn test_unnamed_metrics_item_is_skipped() {
        let mut server = Server::new_async().await;
        let body = r#"{"items": [
            {"metadata": {"name": ""}, "usage": {"cpu": "3", "memory": "1Gi"}},
            {"metadata": {"name": "node-a"}, "usage": {"cpu": "1", "memory": "1Gi"}}
        ]}"#;
        let _metrics = mock_endpoint(&mut server, NODE_METRICS_PATH, 200, body).await;
        let _nodes = mock_endpoint(&mut server, NODES_PATH, 200, NODES_JSON).await;
        let token = token_file();

        let source = MetricsApiSource::new(config(&server, token.path()));
        let reading = expect_success(source.read(Resource::Cpu).await);

        assert_eq!(reading.node_count, 1);
        assert_eq!(reading.total_usage, 1.0);
        // The single named node is measured against the whole 8 cores
        assert_eq!(reading.nodes[0], NodeReading::new("node-a", 1.0, 12.5));
    }

    #[tokio::test]
    async fn test_request_matches_bearer_token() {
        let mut server = Server::new_async().await;
        let metrics = server
            .mock("GET", NODE_METRICS_PATH)
            .match_header("authorization", Matcher::Exact("Bearer test-token".into()))
            .with_status(200)
            .with_body(r#"{"items": []}"#)
            .expect(1)
            .create_async()
            .await;
        let _nodes = mock_endpoint(&mut server, NODES_PATH, 200, r#"{"items": []}"#).await;
        let token = token_file();

        let reading = expect_success(
            MetricsApiSource::new(config(&server, token.path()))
                .read(Resource::Cpu)
                .await,
        );

        metrics.assert_async().await;
        assert_eq!(reading.node_count, 0);
        assert_eq!(reading.cluster_percent, 0.0);
    }
}
