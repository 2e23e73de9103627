use axum::Router;
use omg_micro_command::CommandClient;

use crate::config::ServiceConfig;
use crate::dockerfile::{DockerfileTemplate, DockerfileWriter, FileDockerfileWriter};
use crate::error::{MicroError, Result};
use crate::manifest::{FileManifestWriter, Info, Manifest, ManifestWriter};
use crate::registry::{EndpointBuilder, EndpointHandle, Registry};
use crate::runtime;
use crate::tool::BuildTool;

const DEFAULT_VERSION: &str = "1.0.0";

/// A named microservice: its endpoints plus the collaborators that describe, package and
/// run it.
///
/// Manifest writing, Dockerfile writing and the external build tool are independent
/// collaborators; `Service` only delegates to them.
pub struct Service {
    name: String,
    version: String,
    description: Option<String>,
    binary: String,
    config: ServiceConfig,
    registry: Registry,
    manifest_writer: Box<dyn ManifestWriter>,
    dockerfile_writer: Box<dyn DockerfileWriter>,
    tool: Box<dyn BuildTool>,
}

impl Service {
    /// Creates a service with file-backed collaborators derived from `config`.
    pub fn new(name: impl Into<String>, config: ServiceConfig) -> Self {
        let name = name.into();
        let tool = CommandClient::with_timeout(config.tool_endpoint.clone(), config.tool_timeout);

        Self {
            binary: name.clone(),
            name,
            version: DEFAULT_VERSION.to_owned(),
            description: None,
            manifest_writer: Box::new(FileManifestWriter::new(config.manifest_path.clone())),
            dockerfile_writer: Box::new(FileDockerfileWriter::new(config.dockerfile_path.clone())),
            tool: Box::new(tool),
            registry: Registry::new(),
            config,
        }
    }

    /// Loads [`ServiceConfig`] from the environment and creates the service.
    pub fn from_env(name: impl Into<String>) -> Result<Self> {
        Ok(Self::new(name, ServiceConfig::from_env()?))
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the cargo binary the container image builds and starts; defaults to the service name.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_manifest_writer(mut self, writer: impl ManifestWriter + 'static) -> Self {
        self.manifest_writer = Box::new(writer);
        self
    }

    pub fn with_dockerfile_writer(mut self, writer: impl DockerfileWriter + 'static) -> Self {
        self.dockerfile_writer = Box::new(writer);
        self
    }

    pub fn with_build_tool(mut self, tool: impl BuildTool + 'static) -> Self {
        self.tool = Box::new(tool);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Registered endpoints.
    pub fn endpoints(&self) -> &Registry {
        &self.registry
    }

    /// Adds or replaces an endpoint; see [`Registry::register`].
    pub fn register(&mut self, endpoint: EndpointBuilder) -> Result<EndpointHandle> {
        Ok(self.registry.register(endpoint)?)
    }

    pub fn router(&self) -> Router {
        self.registry.router()
    }

    pub fn dockerfile(&self) -> DockerfileTemplate {
        DockerfileTemplate::new(self.binary.clone(), self.config.port())
    }

    pub fn manifest(&self) -> Manifest {
        let info = Info {
            title: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
        };

        Manifest::describe(info, &self.registry, self.config.port()).with_startup(vec![
            self.dockerfile().installed_binary(),
            "serve".to_owned(),
        ])
    }

    /// Writes the manifest unless it already exists.
    pub fn ensure_manifest(&self) -> Result<bool> {
        self.manifest_writer.ensure(&self.manifest())
    }

    /// Writes the Dockerfile unless it already exists.
    pub fn ensure_dockerfile(&self) -> Result<bool> {
        self.dockerfile_writer.ensure(&self.dockerfile())
    }

    /// Builds the image through the external tool; returns whether the build succeeded.
    pub async fn build(&self) -> Result<bool> {
        self.ensure_manifest()?;
        self.ensure_dockerfile()?;

        tracing::info!(service = %self.name, "building image");
        Ok(self.tool.build().await?)
    }

    /// Runs `action` through the external tool and returns its raw output.
    pub async fn run(&self, action: &str, args: &[(String, String)]) -> Result<String> {
        self.ensure_manifest()?;

        if !self.registry.contains(action) {
            tracing::warn!(service = %self.name, action, "running an action that is not registered");
        }
        Ok(self.tool.run(action, args).await?)
    }

    /// Builds and fails with [`MicroError::BuildFailed`] when the tool reports failure.
    pub async fn build_checked(&self) -> Result<()> {
        if self.build().await? {
            Ok(())
        } else {
            Err(MicroError::BuildFailed)
        }
    }

    /// Serves every registered endpoint on the configured address.
    pub async fn serve(self) -> Result<()> {
        tracing::info!(
            service = %self.name,
            endpoints = self.registry.len(),
            "starting service"
        );
        runtime::serve(self.router(), self.config.bind_addr).await
    }
}
