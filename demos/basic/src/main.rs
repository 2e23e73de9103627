use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use omg_micro::{Arguments, Endpoint, HandlerError, Service, cli};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> omg_micro::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut service = Service::from_env("basic")?
        .with_binary(env!("CARGO_BIN_NAME"))
        .with_description("Demo endpoints registered with omg-micro");

    service.register(
        Endpoint::builder(work)
            .optional("prefix")
            .help("Returns a fresh token, optionally prefixed."),
    )?;
    service.register(
        Endpoint::builder(query)
            .name("query")
            .path("/query")
            .required("uri")
            .help("Echoes the uri it was given."),
    )?;
    service.register(
        Endpoint::builder(health)
            .path("/")
            .help("Liveness probe."),
    )?;
    service.register(
        Endpoint::builder(inspect)
            .method(Method::POST)
            .optional("uri")
            .optional("tags")
            .help("Reports the arguments it received and their JSON types."),
    )?;

    cli::main(service).await
}

fn work(arguments: Arguments) -> Result<String, HandlerError> {
    let prefix = arguments.str("prefix").unwrap_or("");
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(HandlerError::other)?
        .as_nanos();
    Ok(format!("{prefix}{nanos:x}"))
}

fn query(arguments: Arguments) -> Result<Value, HandlerError> {
    Ok(arguments.require("uri")?.clone())
}

fn health(_: Arguments) -> Result<Response, HandlerError> {
    Ok((StatusCode::OK, "ok").into_response())
}

fn inspect(arguments: Arguments) -> Result<Value, HandlerError> {
    let report: serde_json::Map<String, Value> = arguments
        .iter()
        .map(|(name, value)| {
            let kind = match value {
                Value::Null => "null",
                Value::Bool(_) => "bool",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) => "array",
                Value::Object(_) => "object",
            };
            (name.to_owned(), json!({ "value": value, "type": kind }))
        })
        .collect();
    Ok(Value::Object(report))
}
