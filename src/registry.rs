//! Endpoint registry: named, path-bound, method-bound handlers plus their parameter whitelist.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::routing::MethodFilter;
use thiserror::Error;

use crate::dispatch;
use crate::handler::{Arguments, Handler, HandlerError, Reply};

/// A declared handler parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    name: String,
    required: bool,
}

impl Param {
    /// A parameter the dispatcher insists on before calling the handler.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    /// A parameter the handler falls back on a default for.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// A registered handler together with its routing metadata.
pub struct Endpoint {
    name: String,
    path: String,
    method: Method,
    filter: MethodFilter,
    params: Vec<Param>,
    help: Option<String>,
    handler: Arc<dyn Handler>,
}

impl Endpoint {
    /// Starts describing an endpoint for `handler`.
    ///
    /// When `handler` is a named `fn` item its identifier becomes the default name.
    pub fn builder<H: Handler>(handler: H) -> EndpointBuilder {
        EndpointBuilder {
            inferred_name: inferred_name::<H>(),
            handler: Arc::new(handler),
            name: None,
            path: None,
            method: Method::GET,
            params: Vec::new(),
            help: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub(crate) fn method_filter(&self) -> MethodFilter {
        self.filter
    }

    /// Declared parameters in declaration order.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(Param::name)
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Invokes the handler with already-whitelisted arguments.
    pub fn call(&self, arguments: Arguments) -> Result<Reply, HandlerError> {
        self.handler.call(arguments)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("params", &self.params)
            .field("help", &self.help)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`Endpoint::builder`].
pub struct EndpointBuilder {
    handler: Arc<dyn Handler>,
    inferred_name: Option<String>,
    name: Option<String>,
    path: Option<String>,
    method: Method,
    params: Vec<Param>,
    help: Option<String>,
}

impl EndpointBuilder {
    /// Overrides the inferred name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the default `/<name>` path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Overrides the default `GET` method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Declares a parameter. Redeclaring a name keeps its position and takes the new flag.
    pub fn param(mut self, param: Param) -> Self {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => existing.required = param.required,
            None => self.params.push(param),
        }
        self
    }

    pub fn required(self, name: impl Into<String>) -> Self {
        self.param(Param::required(name))
    }

    pub fn optional(self, name: impl Into<String>) -> Self {
        self.param(Param::optional(name))
    }

    /// Sets the help text published in the manifest.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    fn build(self) -> Result<Endpoint, RegistryError> {
        let name = match self.name.or(self.inferred_name) {
            Some(name) if name.trim().is_empty() => return Err(RegistryError::InvalidName(name)),
            Some(name) => name,
            None => return Err(RegistryError::UnnamedHandler),
        };

        let path = self.path.unwrap_or_else(|| format!("/{name}"));
        if !is_static_path(&path) {
            return Err(RegistryError::InvalidPath { name, path });
        }

        let filter = MethodFilter::try_from(self.method.clone()).map_err(|_| {
            RegistryError::UnsupportedMethod {
                name: name.clone(),
                method: self.method.to_string(),
            }
        })?;

        Ok(Endpoint {
            name,
            path,
            method: self.method,
            filter,
            params: self.params,
            help: self.help,
            handler: self.handler,
        })
    }
}

/// Shared reference to a stored endpoint, returned from [`Registry::register`].
#[derive(Clone, Debug)]
pub struct EndpointHandle {
    endpoint: Arc<Endpoint>,
    replaced: bool,
}

impl EndpointHandle {
    /// Indicates whether an endpoint with the same name was overwritten.
    pub fn replaced(&self) -> bool {
        self.replaced
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }
}

impl Deref for EndpointHandle {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Errors raised while registering an endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handler name cannot be inferred; register it with an explicit name")]
    UnnamedHandler,
    #[error("invalid endpoint name: {0:?}")]
    InvalidName(String),
    #[error("invalid path {path:?} for endpoint `{name}`")]
    InvalidPath { name: String, path: String },
    #[error("unsupported HTTP method {method} for endpoint `{name}`")]
    UnsupportedMethod { name: String, method: String },
    #[error("{method} {path} is already bound to `{existing}`; refusing to bind `{incoming}`")]
    RouteConflict {
        method: String,
        path: String,
        existing: String,
        incoming: String,
    },
}

/// Name-keyed set of endpoints.
///
/// Registering an existing name replaces that endpoint. Binding a second name to a
/// `(method, path)` pair that is already taken is rejected.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    endpoints: BTreeMap<String, Arc<Endpoint>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the endpoint described by `builder`.
    pub fn register(&mut self, builder: EndpointBuilder) -> Result<EndpointHandle, RegistryError> {
        let endpoint = builder.build()?;

        if let Some(existing) = self.endpoints.values().find(|existing| {
            existing.name != endpoint.name
                && existing.method == endpoint.method
                && existing.path == endpoint.path
        }) {
            return Err(RegistryError::RouteConflict {
                method: endpoint.method.to_string(),
                path: endpoint.path,
                existing: existing.name.clone(),
                incoming: endpoint.name,
            });
        }

        let endpoint = Arc::new(endpoint);
        let previous = self
            .endpoints
            .insert(endpoint.name.clone(), Arc::clone(&endpoint));

        match &previous {
            Some(previous) => tracing::warn!(
                name = %endpoint.name,
                previous_path = %previous.path,
                path = %endpoint.path,
                method = %endpoint.method,
                "endpoint re-registered; replacing previous binding"
            ),
            None => tracing::debug!(
                name = %endpoint.name,
                path = %endpoint.path,
                method = %endpoint.method,
                "endpoint registered"
            ),
        }

        Ok(EndpointHandle {
            endpoint,
            replaced: previous.is_some(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.endpoints.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.endpoints.values()
    }

    /// Binds every registered endpoint into a fresh router.
    pub fn router(&self) -> Router {
        dispatch::router(self)
    }
}

/// Rooted path without whitespace or `:capture` / `*wildcard` syntax.
///
/// Parameters only come from the query string and body, so every path is bound literally.
fn is_static_path(path: &str) -> bool {
    path.starts_with('/') && !path.contains(|c: char| c.is_whitespace() || c == ':' || c == '*')
}

/// Identifier of a named `fn` item; `None` for closures and function pointers.
fn inferred_name<H>() -> Option<String> {
    let full = std::any::type_name::<H>();
    let path = full.split('<').next().unwrap_or(full);
    let name = path.rsplit("::").next().unwrap_or(path);

    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then(|| name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, Bytes};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn work(arguments: Arguments) -> Result<String, HandlerError> {
        let prefix = arguments.str("prefix").unwrap_or("");
        Ok(format!("{prefix}-work"))
    }

    fn query(arguments: Arguments) -> Result<serde_json::Value, HandlerError> {
        Ok(arguments.require("uri")?.clone())
    }

    #[test]
    fn infers_name_from_fn_item() {
        let mut registry = Registry::new();
        let handle = registry
            .register(Endpoint::builder(work).optional("prefix"))
            .unwrap();

        assert!(registry.contains("work"));
        assert_eq!(handle.name(), "work");
        assert_eq!(handle.path(), "/work");
        assert_eq!(handle.method(), &Method::GET);
        assert!(!handle.replaced());
    }

    #[test]
    fn explicit_name_overrides_inferred_name() {
        let mut registry = Registry::new();
        registry
            .register(Endpoint::builder(work).name("test"))
            .unwrap();

        assert!(registry.contains("test"));
        assert!(!registry.contains("work"));
        assert_eq!(registry.get("test").unwrap().path(), "/test");
    }

    #[test]
    fn explicit_path_overrides_default() {
        let mut registry = Registry::new();
        registry
            .register(Endpoint::builder(work).name("test").path("/not-test"))
            .unwrap();

        assert_eq!(registry.get("test").unwrap().path(), "/not-test");
    }

    #[test]
    fn records_declared_parameters_in_order() {
        let mut registry = Registry::new();
        registry
            .register(
                Endpoint::builder(query)
                    .required("uri")
                    .optional("limit")
                    .optional("uri"),
            )
            .unwrap();

        let endpoint = registry.get("query").unwrap();
        assert_eq!(
            endpoint.params(),
            &[Param::optional("uri"), Param::optional("limit")]
        );
        assert_eq!(endpoint.param_names().collect::<Vec<_>>(), ["uri", "limit"]);
    }

    #[test]
    fn closures_need_explicit_names() {
        let mut registry = Registry::new();
        let closure = |_: Arguments| -> Result<(), HandlerError> { Ok(()) };
        assert_eq!(
            registry.register(Endpoint::builder(closure)).unwrap_err(),
            RegistryError::UnnamedHandler
        );

        registry
            .register(Endpoint::builder(closure).name("noop"))
            .unwrap();
        assert!(registry.contains("noop"));
    }

    async fn get_status(registry: &Registry, uri: &str) -> (StatusCode, Bytes) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let response = registry.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn same_name_replaces_previous_endpoint() {
        let mut registry = Registry::new();
        registry.register(Endpoint::builder(work)).unwrap();
        let handle = registry
            .register(
                Endpoint::builder(query)
                    .name("work")
                    .path("/v2/work")
                    .required("uri"),
            )
            .unwrap();

        assert!(handle.replaced());
        assert_eq!(registry.len(), 1);

        let reply = registry
            .get("work")
            .unwrap()
            .call([("uri", json!("x"))].into_iter().collect())
            .unwrap();
        assert!(matches!(reply, Reply::Json(v) if v == json!("x")));

        let (status, body) = get_status(&registry, "/v2/work?uri=x").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], br#""x""#);

        let (status, _) = get_status(&registry, "/work").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn rejects_route_shadowing_by_another_name() {
        let mut registry = Registry::new();
        registry
            .register(Endpoint::builder(query).path("/shared"))
            .unwrap();

        let err = registry
            .register(Endpoint::builder(work).path("/shared"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::RouteConflict {
                method: "GET".into(),
                path: "/shared".into(),
                existing: "query".into(),
                incoming: "work".into(),
            }
        );
        assert!(!registry.contains("work"));

        registry
            .register(Endpoint::builder(work).path("/shared").method(Method::POST))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn validates_path_and_method() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register(Endpoint::builder(work).path("work")),
            Err(RegistryError::InvalidPath { .. })
        ));
        assert!(matches!(
            registry.register(
                Endpoint::builder(work).method(Method::from_bytes(b"PURGE").unwrap())
            ),
            Err(RegistryError::UnsupportedMethod { .. })
        ));
        assert!(matches!(
            registry.register(Endpoint::builder(work).name(" ")),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn rejects_capture_and_wildcard_segments() {
        let mut registry = Registry::new();
        registry
            .register(Endpoint::builder(work).path("/items/list"))
            .unwrap();

        for path in ["/items/:id", "/items/:key", "/x/*rest/y", "/files/*path", "/a:b"] {
            let err = registry
                .register(Endpoint::builder(query).path(path))
                .unwrap_err();
            assert_eq!(
                err,
                RegistryError::InvalidPath {
                    name: "query".into(),
                    path: path.into(),
                }
            );
            // The router must still build from what was accepted.
            let _ = registry.router();
        }

        assert!(matches!(
            registry.register(Endpoint::builder(query).name(":id")),
            Err(RegistryError::InvalidPath { .. })
        ));
        let _ = registry.router();

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn iterates_in_name_order() {
        let mut registry = Registry::new();
        registry.register(Endpoint::builder(work)).unwrap();
        registry.register(Endpoint::builder(query)).unwrap();

        let names: Vec<_> = registry.iter().map(|endpoint| endpoint.name()).collect();
        assert_eq!(names, ["query", "work"]);
    }
}
