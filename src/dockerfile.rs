//! Container build file rendered from an embedded template.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::files::write_if_absent;

const DOCKERFILE: &str = include_str!("templates/Dockerfile.tmpl");

/// Values substituted into the Dockerfile template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerfileTemplate {
    /// Cargo binary target that serves the endpoints.
    pub binary: String,
    pub port: u16,
}

impl DockerfileTemplate {
    pub fn new(binary: impl Into<String>, port: u16) -> Self {
        Self {
            binary: binary.into(),
            port,
        }
    }

    /// Path of the binary inside the runtime image.
    pub fn installed_binary(&self) -> String {
        format!("/usr/local/bin/{}", self.binary)
    }

    pub fn render(&self) -> String {
        DOCKERFILE
            .replace("{{binary}}", &self.binary)
            .replace("{{port}}", &self.port.to_string())
    }
}

/// Persists the container build file.
pub trait DockerfileWriter: Send + Sync {
    /// Writes the rendered template unless a file already exists; returns whether it wrote.
    fn ensure(&self, template: &DockerfileTemplate) -> Result<bool>;

    fn location(&self) -> &Path;
}

#[derive(Debug, Clone)]
pub struct FileDockerfileWriter {
    path: PathBuf,
}

impl FileDockerfileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DockerfileWriter for FileDockerfileWriter {
    fn ensure(&self, template: &DockerfileTemplate) -> Result<bool> {
        let written = write_if_absent(&self.path, &template.render())?;
        if written {
            tracing::info!(path = %self.path.display(), binary = %template.binary, "dockerfile written");
        }
        Ok(written)
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
