//! Strict JSON request bodies.
//!
//! [`JsonBody`] accepts exactly one JSON object of at most
//! [`MAX_JSON_BODY_BYTES`]. Request types opt into unknown-key rejection with
//! `#[serde(deny_unknown_fields)]`. Every failure is an
//! [`ApiError::MalformedBody`] and never reaches the domain error path.

use crate::error::{ApiError, ApiResult};
use axum::body::Body;
use axum::extract::{FromRequest, Request};
use futures::StreamExt;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::error::Category;

/// Upper bound on JSON request bodies.
pub const MAX_JSON_BODY_BYTES: usize = 1_048_576;

/// Extractor for a strictly decoded JSON object body.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_limited(req.into_body()).await?;
        decode(&bytes).map(JsonBody)
    }
}

async fn read_limited(body: Body) -> ApiResult<Vec<u8>> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::debug!(error = %e, "failed to read request body");
            ApiError::MalformedBody("body could not be read".to_string())
        })?;
        if buf.len() + chunk.len() > MAX_JSON_BODY_BYTES {
            return Err(ApiError::MalformedBody(format!(
                "body must not be larger than {MAX_JSON_BODY_BYTES} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf)
}

/// Decode one JSON object from `bytes`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ApiResult<T> {
    let malformed = |msg: &str| ApiError::MalformedBody(msg.to_string());

    let Some(first) = bytes.iter().find(|b| !b.is_ascii_whitespace()) else {
        return Err(malformed("body must not be empty"));
    };

    // Structs also deserialize from sequences; only objects are accepted here.
    if *first != b'{' && serde_json::from_slice::<IgnoredAny>(bytes).is_ok() {
        return Err(malformed("body contains incorrect JSON type"));
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize(&mut de).map_err(describe)?;
    de.end()
        .map_err(|_| malformed("body must only contain a single JSON value"))?;

    Ok(value)
}

fn describe(err: serde_path_to_error::Error<serde_json::Error>) -> ApiError {
    let path = err.path().to_string();
    let inner = err.into_inner();

    let message = match inner.classify() {
        Category::Syntax => format!(
            "body contains badly-formed JSON (at line {} column {})",
            inner.line(),
            inner.column()
        ),
        Category::Eof | Category::Io => "body contains badly-formed JSON".to_string(),
        Category::Data => {
            let text = inner.to_string();
            if let Some(key) = backticked(&text, "unknown field `") {
                format!("body contains unknown key \"{key}\"")
            } else if let Some(key) = backticked(&text, "missing field `") {
                format!("body is missing key \"{key}\"")
            } else if path.is_empty() || path == "." {
                "body contains incorrect JSON type".to_string()
            } else {
                format!("body contains incorrect JSON type for field \"{path}\"")
            }
        }
    };

    ApiError::MalformedBody(message)
}

/// Extract the name quoted after `prefix` in a serde message.
fn backticked<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.strip_prefix(prefix)?.split('`').next()
}
