use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::Error as DotenvError;
use omg_micro_command::ToolEndpoint;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MANIFEST_PATH: &str = "microservice.yml";
const DEFAULT_DOCKERFILE_PATH: &str = "Dockerfile";
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);
const PORT_ENV: &str = "PORT";
const ADDR_ENV: &str = "OMG_MICRO_ADDR";
const MANIFEST_ENV: &str = "OMG_MANIFEST_PATH";
const DOCKERFILE_ENV: &str = "OMG_DOCKERFILE_PATH";
const TOOL_ENV: &str = "OMG_CLI";
const TOOL_TIMEOUT_ENV: &str = "OMG_CLI_TIMEOUT_SECS";

/// Configuration consumed by a [`Service`](crate::Service) before it serves or builds.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Listener address; its port is also the port published in the manifest.
    pub bind_addr: SocketAddr,
    pub manifest_path: PathBuf,
    pub dockerfile_path: PathBuf,
    pub tool_endpoint: ToolEndpoint,
    pub tool_timeout: Duration,
}

impl ServiceConfig {
    /// Loads configuration from the process environment.
    ///
    /// Values from a local `.env` file (parsed via [`dotenvy::dotenv_override`]) override whatever is already set in
    /// the process environment, which makes local development workflows predictable.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_overrides()?;

        let port = match env::var(PORT_ENV) {
            Ok(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(value))?,
            Err(_) => DEFAULT_PORT,
        };

        let addr = env::var(ADDR_ENV)
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<IpAddr>()
                    .map_err(|_| ConfigError::InvalidAddr(value))
            })
            .transpose()? // convert Option<Result> -> Result<Option>
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let tool_endpoint = env::var(TOOL_ENV)
            .ok()
            .map(|value| {
                ToolEndpoint::from_str(&value).map_err(|_| ConfigError::InvalidToolEndpoint(value))
            })
            .transpose()?
            .unwrap_or_default();

        let tool_timeout = env::var(TOOL_TIMEOUT_ENV)
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidTimeout(value))
            })
            .transpose()?
            .unwrap_or(DEFAULT_TOOL_TIMEOUT);

        Ok(Self {
            bind_addr: SocketAddr::new(addr, port),
            manifest_path: env::var_os(MANIFEST_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH)),
            dockerfile_path: env::var_os(DOCKERFILE_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKERFILE_PATH)),
            tool_endpoint,
            tool_timeout,
        })
    }

    /// Returns a builder for programmatic overrides.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Port both served on and declared in the manifest.
    pub fn port(&self) -> u16 {
        self.bind_addr.port()
    }
}

impl Default for ServiceConfig {
    /// Binds to `0.0.0.0:8080` and drives `omg` from `PATH`.
    fn default() -> Self {
        ServiceConfigBuilder::default().build()
    }
}

/// Builder type for [`ServiceConfig`].
#[derive(Default, Clone, Debug)]
pub struct ServiceConfigBuilder {
    bind_addr: Option<SocketAddr>,
    port: Option<u16>,
    manifest_path: Option<PathBuf>,
    dockerfile_path: Option<PathBuf>,
    tool_endpoint: Option<ToolEndpoint>,
    tool_timeout: Option<Duration>,
}

impl ServiceConfigBuilder {
    /// Sets the full listener address.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Sets only the port, keeping the default unspecified address.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    pub fn dockerfile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dockerfile_path = Some(path.into());
        self
    }

    /// Sets the external build tool.
    pub fn tool_endpoint(mut self, endpoint: ToolEndpoint) -> Self {
        self.tool_endpoint = Some(endpoint);
        self
    }

    /// Disables the external build tool entirely.
    pub fn disable_tool(mut self) -> Self {
        self.tool_endpoint = Some(ToolEndpoint::Unavailable);
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Builds the final configuration.
    pub fn build(self) -> ServiceConfig {
        let mut bind_addr = self.bind_addr.unwrap_or_else(|| {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT)
        });
        if let Some(port) = self.port {
            bind_addr.set_port(port);
        }

        ServiceConfig {
            bind_addr,
            manifest_path: self
                .manifest_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH)),
            dockerfile_path: self
                .dockerfile_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCKERFILE_PATH)),
            tool_endpoint: self.tool_endpoint.unwrap_or_default(),
            tool_timeout: self.tool_timeout.unwrap_or(DEFAULT_TOOL_TIMEOUT),
        }
    }
}

/// Errors that can occur while building [`ServiceConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
    #[error("invalid bind address: {0:?}")]
    InvalidAddr(String),
    #[error("invalid tool endpoint: {0:?}")]
    InvalidToolEndpoint(String),
    #[error("invalid tool timeout: {0:?}")]
    InvalidTimeout(String),
    #[error("failed to load .env overrides: {0}")]
    Dotenv(#[from] DotenvError),
}

fn load_env_overrides() -> Result<(), ConfigError> {
    match dotenvy::dotenv_override() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::Dotenv(err)),
    }
}
