//! Per-request glue between the HTTP layer and registered handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::on;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::handler::{ArgumentError, Arguments, HandlerError};
use crate::payload::RequestPayload;
use crate::registry::{Endpoint, Registry};

/// Body of the `412 Precondition Failed` response sent on argument mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ArgumentMismatch {
    pub message: String,
    pub expected: Vec<String>,
}

impl ArgumentMismatch {
    fn new(endpoint: &Endpoint, err: &ArgumentError) -> Self {
        let expected: Vec<String> = endpoint.param_names().map(str::to_owned).collect();
        let message = if expected.is_empty() {
            format!("{err}; `{}` takes no parameters", endpoint.name())
        } else {
            format!("{err}; expected parameters: {}", expected.join(", "))
        };
        Self { message, expected }
    }
}

impl IntoResponse for ArgumentMismatch {
    fn into_response(self) -> Response {
        (StatusCode::PRECONDITION_FAILED, Json(self)).into_response()
    }
}

/// Builds a router with one route per registered endpoint.
pub fn router(registry: &Registry) -> Router {
    registry.iter().fold(Router::new(), |router, endpoint| {
        let target = Arc::clone(endpoint);
        router.route(
            endpoint.path(),
            on(endpoint.method_filter(), move |payload: RequestPayload| {
                let target = Arc::clone(&target);
                async move { dispatch(&target, &payload) }
            }),
        )
    })
}

/// Picks the endpoint's declared parameters out of the payload.
///
/// Query values are taken first and JSON body values overwrite them, so the body wins
/// when a name appears in both. Undeclared names are dropped.
pub fn collect_arguments(endpoint: &Endpoint, payload: &RequestPayload) -> Arguments {
    let mut arguments = Arguments::new();
    for name in endpoint.param_names() {
        if let Some(value) = payload.query_value(name) {
            arguments.insert(name, Value::String(value.to_owned()));
        }
        if let Some(value) = payload.json_value(name) {
            arguments.insert(name, value.clone());
        }
    }
    arguments
}

/// Runs one request against `endpoint` and negotiates the response.
pub fn dispatch(endpoint: &Endpoint, payload: &RequestPayload) -> Response {
    let arguments = collect_arguments(endpoint, payload);

    if let Some(missing) = endpoint
        .params()
        .iter()
        .find(|param| param.is_required() && !arguments.contains(param.name()))
    {
        let err = ArgumentError::Missing(missing.name().to_owned());
        tracing::debug!(endpoint = %endpoint.name(), error = %err, "rejecting call");
        return ArgumentMismatch::new(endpoint, &err).into_response();
    }

    match endpoint.call(arguments) {
        Ok(reply) => reply.into_response(),
        Err(HandlerError::Arguments(err)) => {
            tracing::debug!(endpoint = %endpoint.name(), error = %err, "handler rejected arguments");
            ArgumentMismatch::new(endpoint, &err).into_response()
        }
        Err(err) => {
            tracing::error!(endpoint = %endpoint.name(), error = %err, "handler failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
