//! `microservice.yml` generation.
//!
//! The manifest lists every registered endpoint as an OMG action so external tooling
//! (the `omg` CLI) can build, run and call the service without reading its source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::files::write_if_absent;
use crate::registry::{Endpoint, Registry};

/// Manifest format version understood by the `omg` CLI.
pub const OMG_VERSION: u32 = 1;

const OUTPUT_TYPE: &str = "string";
const ARGUMENT_TYPE: &str = "string";

/// Root of the generated YAML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub omg: u32,
    pub info: Info,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(default)]
    pub actions: BTreeMap<String, Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    pub startup: Startup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Startup {
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub help: String,
    pub output: Output,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, Argument>,
    pub http: HttpBinding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "in")]
    pub location: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpBinding {
    pub path: String,
    pub method: String,
    pub port: u16,
}

impl Manifest {
    /// Describes every endpoint in `registry`, bound to `port`.
    pub fn describe(info: Info, registry: &Registry, port: u16) -> Self {
        let actions = registry
            .iter()
            .map(|endpoint| (endpoint.name().to_owned(), Action::describe(endpoint, port)))
            .collect();

        Self {
            omg: OMG_VERSION,
            info,
            lifecycle: None,
            actions,
        }
    }

    /// Sets the command the container runs on startup.
    pub fn with_startup(mut self, command: Vec<String>) -> Self {
        self.lifecycle = Some(Lifecycle {
            startup: Startup { command },
        });
        self
    }

    pub fn render(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl Action {
    fn describe(endpoint: &Endpoint, port: u16) -> Self {
        let location = if *endpoint.method() == Method::GET || *endpoint.method() == Method::DELETE {
            "query"
        } else {
            "requestBody"
        };

        let arguments = endpoint
            .params()
            .iter()
            .map(|param| {
                (
                    param.name().to_owned(),
                    Argument {
                        kind: ARGUMENT_TYPE.to_owned(),
                        location: location.to_owned(),
                        required: param.is_required(),
                    },
                )
            })
            .collect();

        Self {
            help: endpoint.help().unwrap_or_default().to_owned(),
            output: Output {
                kind: OUTPUT_TYPE.to_owned(),
            },
            arguments,
            http: HttpBinding {
                path: endpoint.path().to_owned(),
                method: endpoint.method().as_str().to_ascii_lowercase(),
                port,
            },
        }
    }
}

/// Persists the manifest for external tooling.
pub trait ManifestWriter: Send + Sync {
    /// Writes `manifest` unless one already exists; returns whether anything was written.
    fn ensure(&self, manifest: &Manifest) -> Result<bool>;

    fn location(&self) -> &Path;
}

/// Writes the manifest to a file, never overwriting an existing one.
#[derive(Debug, Clone)]
pub struct FileManifestWriter {
    path: PathBuf,
}

impl FileManifestWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ManifestWriter for FileManifestWriter {
    fn ensure(&self, manifest: &Manifest) -> Result<bool> {
        let written = write_if_absent(&self.path, &manifest.render()?)?;
        if written {
            tracing::info!(path = %self.path.display(), actions = manifest.actions.len(), "manifest written");
        } else {
            tracing::debug!(path = %self.path.display(), "manifest already present; leaving it untouched");
        }
        Ok(written)
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Arguments, HandlerError};

    fn work(arguments: Arguments) -> std::result::Result<String, HandlerError> {
        Ok(arguments.str("prefix").unwrap_or_default().to_owned())
    }

    fn query(arguments: Arguments) -> std::result::Result<String, HandlerError> {
        Ok(arguments.require("uri")?.to_string())
    }

    fn info() -> Info {
        Info {
            title: "service".into(),
            version: "1.0.0".into(),
            description: None,
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                Endpoint::builder(work)
                    .optional("prefix")
                    .help("Prefixes a random token."),
            )
            .unwrap();
        registry
            .register(
                Endpoint::builder(query)
                    .path("/query")
                    .method(Method::POST)
                    .required("uri"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn describes_each_endpoint() {
        let manifest = Manifest::describe(info(), &registry(), 8080);

        assert_eq!(manifest.omg, 1);
        assert_eq!(manifest.actions.len(), 2);

        let work = &manifest.actions["work"];
        assert_eq!(work.help, "Prefixes a random token.");
        assert_eq!(work.output.kind, "string");
        assert_eq!(
            work.http,
            HttpBinding {
                path: "/work".into(),
                method: "get".into(),
                port: 8080,
            }
        );
        assert_eq!(work.arguments["prefix"].location, "query");
        assert!(!work.arguments["prefix"].required);

        let query = &manifest.actions["query"];
        assert_eq!(query.help, "");
        assert_eq!(query.http.method, "post");
        assert_eq!(query.arguments["uri"].location, "requestBody");
        assert!(query.arguments["uri"].required);
    }

    #[test]
    fn renders_yaml_document() {
        let manifest = Manifest::describe(info(), &registry(), 9000)
            .with_startup(vec!["/usr/local/bin/service".into(), "serve".into()]);
        let yaml = manifest.render().unwrap();

        assert!(yaml.starts_with("omg: 1\n"));
        assert!(yaml.contains("port: 9000"));
        assert!(yaml.contains("type: string"));
        assert!(yaml.contains("in: query"));

        let parsed: Manifest = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn file_writer_does_not_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("microservice.yml");
        let writer = FileManifestWriter::new(&path);

        let manifest = Manifest::describe(info(), &registry(), 8080);
        assert!(writer.ensure(&manifest).unwrap());
        let first = std::fs::read_to_string(&path).unwrap();

        let changed = Manifest::describe(info(), &Registry::new(), 1);
        assert!(!writer.ensure(&changed).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
        assert_eq!(writer.location(), path.as_path());
    }
}
