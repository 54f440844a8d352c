//! HTTP plumbing shared by the backend adapters.
//!
//! Transport failures become [`Error::EngineUnavailable`] with the reqwest
//! error attached; gateway statuses (502, 503, 504) are treated the same
//! way. Any other non-success status becomes [`Error::BackendQuery`]
//! carrying the backend's own message.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value as Json;
use unisearch_core::{Error, Result};

/// Build a client with the configured per-request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))
}

/// Parse a configured base URL.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::config(format!("invalid URL '{raw}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::config(format!("'{raw}' cannot be used as a base URL")));
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| Error::config(format!("'{base}' cannot be used as a base URL")))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Send a request, mapping transport failures.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response> {
    request.send().await.map_err(|e| {
        log::warn!("Backend request failed: {e}");
        Error::unavailable_with_source(format!("request failed: {e}"), e)
    })
}

/// Read a JSON body from a successful response, or map the failure status.
pub(crate) async fn read_json(response: Response) -> Result<Json> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::unavailable_with_source(format!("failed reading response: {e}"), e))?;
    if body.is_empty() {
        return Ok(Json::Null);
    }
    serde_json::from_slice(&body).map_err(|e| {
        Error::backend_query(Some(status.as_u16()), format!("invalid JSON response: {e}"))
    })
}

/// Map a non-success status and body to the error taxonomy.
pub(crate) fn status_error(status: StatusCode, body: &str) -> Error {
    let message = backend_message(body);
    log::warn!("Backend answered HTTP {status}: {message}");
    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            Error::unavailable(format!("backend returned HTTP {}: {message}", status.as_u16()))
        }
        _ => Error::backend_query(Some(status.as_u16()), message),
    }
}

/// Pull the most specific human-readable message out of an error body.
///
/// Understands Elasticsearch (`error.root_cause[0].reason`, `error.reason`)
/// and Meilisearch or Typesense (`message`) shapes; anything else is
/// returned verbatim.
fn backend_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Json>(body) else {
        return body.trim().to_string();
    };
    let candidates = [
        &json["error"]["root_cause"][0]["reason"],
        &json["error"]["reason"],
        &json["error"],
        &json["message"],
    ];
    candidates
        .into_iter()
        .find_map(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
