//! Envelope encoding for the plugin wire protocol.
//!
//! Request and response bodies are JSON. Every reply advertises the plugin
//! media type, and a response whose `Err` is non-empty is sent with a 500
//! status while still carrying the full envelope in the body.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::error::DecodeError;
use crate::types::{VolumeRequest, VolumeResponse};

/// Media type of every plugin reply.
pub const CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";

/// Capability manifest returned by the handshake endpoint.
pub const IMPLEMENTATION_MANIFEST: &str = r#"{"Implements": ["VolumeDriver"]}"#;

/// Parse a request body.
pub fn decode_request(body: &[u8]) -> Result<VolumeRequest, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

/// Serialize a response body.
pub fn encode_response(res: &VolumeResponse) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(res)
}

/// HTTP status for a driver response.
pub fn status_for(res: &VolumeResponse) -> StatusCode {
    if res.is_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

/// A reply in the plugin media type.
pub(crate) fn plugin_reply(status: StatusCode, body: impl Into<axum::body::Body>) -> Response {
    let mut response = (status, body.into()).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(CONTENT_TYPE),
    );
    response
}

impl IntoResponse for VolumeResponse {
    fn into_response(self) -> Response {
        match encode_response(&self) {
            Ok(body) => plugin_reply(status_for(&self), body),
            Err(e) => plain_text(StatusCode::INTERNAL_SERVER_ERROR, &e),
        }
    }
}

impl IntoResponse for DecodeError {
    fn into_response(self) -> Response {
        plain_text(StatusCode::BAD_REQUEST, &self)
    }
}

fn plain_text(status: StatusCode, err: &dyn std::fmt::Display) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{err}\n"),
    )
        .into_response()
}
