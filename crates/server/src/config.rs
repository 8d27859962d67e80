//! Service configuration

use metrics_lib::source::{
    api_server_from_env, ClusterApiConfig, KubectlSource, MetricsApiSource, NodePercentBasis,
    ProcessRunner, TrustConfig, DEFAULT_KUBECTL, SERVICE_ACCOUNT_DIR,
};
use metrics_lib::FallbackOrchestrator;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Name of the optional configuration file, without extension
const CONFIG_FILE: &str = "cluster-metrics";

/// Prefix for environment overrides
const ENV_PREFIX: &str = "CLUSTER_METRICS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid listen address {addr}: {source}")]
    ListenAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// How the API server certificate is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Only the service account CA at `ca_path`
    #[default]
    Pinned,
    /// No verification at all
    Insecure,
    /// Built-in web PKI roots
    System,
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// kubectl executable, looked up on `PATH` when not absolute
    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: String,

    /// Wait limit for one kubectl invocation, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    #[serde(default = "api_server_from_env")]
    pub api_server: String,

    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    #[serde(default = "default_ca_path")]
    pub ca_path: PathBuf,

    #[serde(default)]
    pub tls_mode: TlsMode,

    /// Timeout for one metrics API request, in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub node_percent_basis: NodePercentBasis,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_kubectl_path() -> String {
    DEFAULT_KUBECTL.to_string()
}

fn default_command_timeout() -> u64 {
    5
}

fn default_token_path() -> PathBuf {
    PathBuf::from(SERVICE_ACCOUNT_DIR).join("token")
}

fn default_ca_path() -> PathBuf {
    PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt")
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            kubectl_path: default_kubectl_path(),
            command_timeout_secs: default_command_timeout(),
            api_server: api_server_from_env(),
            token_path: default_token_path(),
            ca_path: default_ca_path(),
            tls_mode: TlsMode::default(),
            http_timeout_secs: default_http_timeout(),
            node_percent_basis: NodePercentBasis::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize from an already built source stack
    pub fn from_config(config: config::Config) -> Result<Self, ConfigError> {
        Ok(config.try_deserialize()?)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|source| ConfigError::ListenAddr {
                addr: self.listen_addr.clone(),
                source,
            })
    }

    pub fn trust_config(&self) -> TrustConfig {
        match self.tls_mode {
            TlsMode::Pinned => TrustConfig::PinnedCa(self.ca_path.clone()),
            TlsMode::Insecure => TrustConfig::AcceptAny,
            TlsMode::System => TrustConfig::System,
        }
    }

    pub fn cluster_api_config(&self) -> ClusterApiConfig {
        ClusterApiConfig {
            api_server: self.api_server.clone(),
            token_path: self.token_path.clone(),
            trust: self.trust_config(),
            request_timeout: Duration::from_secs(self.http_timeout_secs),
            percent_basis: self.node_percent_basis,
        }
    }

    /// Build the standard kubectl then metrics API chain
    pub fn orchestrator(&self) -> FallbackOrchestrator {
        let local = KubectlSource::new(Arc::new(ProcessRunner))
            .with_program(self.kubectl_path.clone())
            .with_timeout(Duration::from_secs(self.command_timeout_secs));
        let cluster_api = MetricsApiSource::new(self.cluster_api_config());

        FallbackOrchestrator::standard(Arc::new(local), Arc::new(cluster_api))
    }
}
