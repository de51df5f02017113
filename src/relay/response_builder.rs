//! Response envelope construction.
//!
//! Decodes content-encodings, picks the body presentation (parsed JSON, text
//! or base64 for binary) and computes the canonical body size.

use super::executor::MAX_RESPONSE_BYTES;
use super::types::{ResponseBody, ResponseEnvelope, TimingInfo};
use crate::infra::decode_body;
use crate::shared::status_text;
use base64::Engine;
use hyper::header::{HeaderMap, CONTENT_ENCODING, CONTENT_TYPE};
use serde_json::Value;
use std::collections::HashMap;

/// Determines if response body is likely binary based on content-type.
///
/// A missing content-type is treated as text.
pub fn is_binary_content(content_type: Option<&str>) -> bool {
    let ct = match content_type {
        Some(ct) => ct.to_lowercase(),
        None => return false,
    };

    let text_types = [
        "text/",
        "application/json",
        "application/xml",
        "application/javascript",
        "application/x-javascript",
        "application/ecmascript",
        "application/x-www-form-urlencoded",
        "application/graphql",
        "+json",
        "+xml",
    ];

    !text_types.iter().any(|t| ct.contains(t))
}

/// True for `application/json` and structured `+json` media types.
pub fn is_json_content(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let essence = ct
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn header_str<'a>(headers: &'a HeaderMap, name: hyper::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Flattens a header map; repeated names are joined with `", "`.
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}

/// Chosen presentation of a response payload.
#[derive(Debug)]
pub struct PresentedBody {
    pub body: ResponseBody,
    pub body_base64: Option<String>,
    pub is_binary: bool,
    pub size_bytes: usize,
}

/// Presents decoded bytes according to the declared content type.
///
/// JSON that fails to parse falls back to text; the size of parsed JSON is
/// taken from its compact re-serialization.
pub fn present_body(bytes: Vec<u8>, content_type: Option<&str>) -> PresentedBody {
    if is_json_content(content_type) {
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            let size_bytes = serde_json::to_vec(&value)
                .map(|v| v.len())
                .unwrap_or(bytes.len());
            return PresentedBody {
                body: ResponseBody::Json(value),
                body_base64: None,
                is_binary: false,
                size_bytes,
            };
        }
    } else if is_binary_content(content_type) {
        let size_bytes = bytes.len();
        return PresentedBody {
            body: ResponseBody::Text(String::new()),
            body_base64: Some(base64::engine::general_purpose::STANDARD.encode(&bytes)),
            is_binary: true,
            size_bytes,
        };
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    PresentedBody {
        size_bytes: text.len(),
        body: ResponseBody::Text(text),
        body_base64: None,
        is_binary: false,
    }
}

/// Parameters for building a response envelope.
pub struct EnvelopeParams {
    pub status: u16,
    pub headers: HeaderMap,
    pub body_bytes: Vec<u8>,
    pub duration_ms: u64,
    pub timing: TimingInfo,
    pub final_url: String,
    pub redirected: bool,
}

/// Builds the envelope for a fully received upstream response.
///
/// Undecodable or oversized content-encodings fall back to the raw bytes
/// rather than failing the relay.
pub fn build_envelope(params: EnvelopeParams) -> ResponseEnvelope {
    let EnvelopeParams {
        status,
        headers,
        body_bytes,
        duration_ms,
        timing,
        final_url,
        redirected,
    } = params;

    let content_type = header_str(&headers, CONTENT_TYPE);
    let encoding = header_str(&headers, CONTENT_ENCODING);
    let decoded = match decode_body(&body_bytes, encoding, MAX_RESPONSE_BYTES) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(error = %e, "Serving undecoded response body");
            body_bytes
        }
    };

    let presented = present_body(decoded, content_type);

    ResponseEnvelope {
        status,
        status_text: status_text(status),
        headers: flatten_headers(&headers),
        body: presented.body,
        body_base64: presented.body_base64,
        is_binary: presented.is_binary,
        duration_ms,
        size_bytes: presented.size_bytes,
        url: final_url,
        redirected,
        timing,
    }
}

/// Renders a partially received payload for `RelayError::details`.
pub fn partial_payload(bytes: &[u8], content_type: Option<&str>) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    match present_body(bytes.to_vec(), content_type) {
        PresentedBody {
            body: ResponseBody::Json(value),
            ..
        } => Some(value),
        PresentedBody {
            body_base64: Some(b64),
            ..
        } => Some(Value::String(b64)),
        PresentedBody {
            body: ResponseBody::Text(text),
            ..
        } => Some(Value::String(text)),
    }
}
