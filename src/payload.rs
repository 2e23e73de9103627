use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{FromRequest, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use thiserror::Error;

/// Every parameter a request carried, before endpoint whitelisting.
///
/// Query pairs keep their original order. The JSON body is only read when the request
/// declares a JSON content type; bodies that are not JSON objects carry no parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestPayload {
    query: Vec<(String, String)>,
    json: Option<Map<String, Value>>,
}

impl RequestPayload {
    pub fn new(query: Vec<(String, String)>, json: Option<Map<String, Value>>) -> Self {
        Self { query, json }
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn json(&self) -> Option<&Map<String, Value>> {
        self.json.as_ref()
    }

    /// First query-string value for `name`.
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn json_value(&self, name: &str) -> Option<&Value> {
        self.json.as_ref().and_then(|body| body.get(name))
    }

    fn from_parts(uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Result<Self, PayloadRejection> {
        let query = match uri.query() {
            Some(_) => Query::<Vec<(String, String)>>::try_from_uri(uri)?.0,
            None => Vec::new(),
        };

        let json = if has_json_content_type(headers) && !body.iter().all(u8::is_ascii_whitespace)
        {
            match serde_json::from_slice::<Value>(body)? {
                Value::Object(map) => Some(map),
                _ => None,
            }
        } else {
            None
        };

        Ok(Self { query, json })
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.split_once('/') {
        Some(("application", subtype)) => subtype == "json" || subtype.ends_with("+json"),
        _ => false,
    }
}

/// Reasons a request's parameters could not be read.
#[derive(Debug, Error)]
pub enum PayloadRejection {
    #[error(transparent)]
    Query(#[from] QueryRejection),
    #[error(transparent)]
    Body(#[from] BytesRejection),
    #[error("malformed json body: {0}")]
    MalformedJson(#[from] serde_json::Error),
}

impl IntoResponse for PayloadRejection {
    fn into_response(self) -> Response {
        match self {
            PayloadRejection::Query(rejection) => rejection.into_response(),
            PayloadRejection::Body(rejection) => rejection.into_response(),
            PayloadRejection::MalformedJson(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for RequestPayload
where
    S: Send + Sync,
{
    type Rejection = PayloadRejection;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let uri = request.uri().clone();
        let headers = request.headers().clone();
        let body = Bytes::from_request(request, state).await?;

        let payload = Self::from_parts(&uri, &headers, &body)?;
        tracing::trace!(
            query = payload.query.len(),
            json = payload.json.is_some(),
            "request payload extracted"
        );
        Ok(payload)
    }
}
