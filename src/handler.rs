use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use axum::Json;
use axum::body::Bytes;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Whitelisted parameters collected for one handler invocation.
///
/// Values are forwarded exactly as the transport supplied them: query-string values are
/// JSON strings, JSON body values keep whatever type the client sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name`, replacing any value collected earlier.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns the value for `name` when it was supplied as a string.
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the value for `name` or an [`ArgumentError::Missing`] the dispatcher maps to 412.
    pub fn require(&self, name: &str) -> Result<&Value, ArgumentError> {
        self.get(name)
            .ok_or_else(|| ArgumentError::Missing(name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut arguments = Self::new();
        for (name, value) in iter {
            arguments.insert(name, value);
        }
        arguments
    }
}

/// The call did not match the handler's parameter shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("missing required parameter `{0}`")]
    Missing(String),
    #[error("unexpected parameter `{0}`")]
    Unexpected(String),
}

/// Errors a handler may return.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Translated into `412 Precondition Failed`.
    #[error(transparent)]
    Arguments(#[from] ArgumentError),
    #[error("could not encode reply as json: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),
}

impl HandlerError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}

/// What a handler produced, before it becomes an HTTP response.
pub enum Reply {
    /// Already a framework response; forwarded untouched.
    Response(Response),
    /// Encoded as a JSON body.
    Json(Value),
    /// Passed through as the raw body.
    Raw(Bytes),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Response(response) => f
                .debug_tuple("Response")
                .field(&response.status())
                .finish(),
            Reply::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Reply::Raw(bytes) => f.debug_tuple("Raw").field(bytes).finish(),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Response(response) => response,
            Reply::Json(value) => Json(value).into_response(),
            Reply::Raw(bytes) => bytes.into_response(),
        }
    }
}

/// Conversion from a handler's return value into a [`Reply`].
///
/// Anything JSON can represent becomes [`Reply::Json`]; byte buffers, which JSON cannot
/// encode, become [`Reply::Raw`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HandlerError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(self)
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Json(self))
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Json(serde_json::to_value(self.0)?))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Raw(self))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Raw(Bytes::from(self)))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Json(Value::Null))
    }
}

macro_rules! json_reply {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Reply, HandlerError> {
                    Ok(Reply::Json(Value::from(self)))
                }
            }
        )*
    };
}

json_reply!(String, &'static str, bool, i32, i64, u32, u64, f64);

/// A registered function: takes the collected [`Arguments`] and produces a [`Reply`].
///
/// Implemented for every `Fn(Arguments) -> Result<R, HandlerError>` where `R: IntoReply`,
/// so plain functions and closures register directly.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, arguments: Arguments) -> Result<Reply, HandlerError>;
}

impl<F, R> Handler for F
where
    F: Fn(Arguments) -> Result<R, HandlerError> + Send + Sync + 'static,
    R: IntoReply,
{
    fn call(&self, arguments: Arguments) -> Result<Reply, HandlerError> {
        (self)(arguments)?.into_reply()
    }
}
