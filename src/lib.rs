//! omg-micro crate.
//!
//! Register plain functions as HTTP endpoints, generate the `microservice.yml` manifest and
//! `Dockerfile` the `omg` CLI expects, and serve everything on axum.
//!
//! Each endpoint declares the parameter names it accepts. At request time the dispatcher
//! picks exactly those names out of the query string and JSON body (the body wins when both
//! carry a name), calls the function, and answers `412 Precondition Failed` when required
//! parameters are missing.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod dockerfile;
pub mod error;
mod files;
pub mod handler;
pub mod manifest;
pub mod payload;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod tool;

pub use crate::config::{ConfigError, ServiceConfig, ServiceConfigBuilder};
pub use crate::dispatch::ArgumentMismatch;
pub use crate::dockerfile::{DockerfileTemplate, DockerfileWriter, FileDockerfileWriter};
pub use crate::error::{MicroError, Result};
pub use crate::handler::{ArgumentError, Arguments, Handler, HandlerError, IntoReply, Reply};
pub use crate::manifest::{FileManifestWriter, Manifest, ManifestWriter};
pub use crate::payload::RequestPayload;
pub use crate::registry::{
    Endpoint, EndpointBuilder, EndpointHandle, Param, Registry, RegistryError,
};
pub use crate::runtime::serve;
pub use crate::service::Service;
pub use crate::tool::BuildTool;
pub use omg_micro_command::{
    CommandClient, CommandError, CommandOutput, ToolEndpoint,
};
