//! Single-call relay execution.
//!
//! Each invocation owns its own DNS lookup, TCP connection and (for HTTPS)
//! TLS session, so concurrent calls share nothing but the resolver and the
//! TLS root store. Every upstream status is a successful outcome; only
//! failures to complete the exchange become a [`RelayError`].

use super::response_builder::{build_envelope, is_json_content, partial_payload, EnvelopeParams};
use super::types::{Method, NormalizedDescriptor, RequestBody, ResponseEnvelope};
use crate::error::{RelayError, RelayErrorKind};
use crate::infra::{connect_tls, resolve_dns, TlsError};
use crate::shared::RelayTiming;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Bytes,
    header::{
        HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE,
        HOST, LOCATION,
    },
    Request, StatusCode, Uri,
};
use hyper_util::rt::TokioIo;
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::{timeout_at, Instant},
};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum number of redirects to follow.
pub const MAX_REDIRECTS: usize = 20;

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

/// Largest upstream body accepted, before and after content decoding.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// How 3xx responses carrying a `Location` are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub follow: bool,
    pub max_hops: usize,
}

impl RedirectPolicy {
    /// Report redirect responses as-is.
    pub fn none() -> Self {
        Self {
            follow: false,
            max_hops: 0,
        }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            follow: true,
            max_hops: MAX_REDIRECTS,
        }
    }
}

/// Where the current hop is going.
#[derive(Debug)]
struct Target {
    url: Url,
    host: String,
    port: u16,
    is_https: bool,
}

impl Target {
    fn parse(raw: &str) -> Result<Self, RelayError> {
        let url = Url::parse(raw).map_err(|e| {
            RelayError::new(RelayErrorKind::MalformedUrl, format!("Invalid URL: {}", e))
        })?;
        Self::from_url(url)
    }

    fn from_url(url: Url) -> Result<Self, RelayError> {
        let is_https = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(RelayError::new(
                    RelayErrorKind::MalformedUrl,
                    format!("Unsupported URL scheme: {}", other),
                ))
            }
        };

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => {
                return Err(RelayError::new(
                    RelayErrorKind::MalformedUrl,
                    "URL has no host",
                ))
            }
        };

        let port = url
            .port_or_known_default()
            .unwrap_or(if is_https { 443 } else { 80 });

        Ok(Self {
            url,
            host,
            port,
            is_https,
        })
    }

    fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    fn host_header(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    fn same_origin(&self, other: &Target) -> bool {
        self.host.eq_ignore_ascii_case(&other.host)
            && self.port == other.port
            && self.is_https == other.is_https
    }
}

/// Fully received upstream response for one hop.
struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

fn timeout_error(message: &str) -> RelayError {
    RelayError::new(RelayErrorKind::Timeout, message)
}

/// Protocol parse errors are upstream faults; anything else on an open
/// connection (reset, early close) is a connection failure.
fn hyper_error_kind(e: &hyper::Error) -> RelayErrorKind {
    if e.is_parse() {
        RelayErrorKind::Upstream
    } else {
        RelayErrorKind::ConnectionFailure
    }
}

/// Keys differing only by case collapse into one header; the spelling that
/// sorts last wins.
fn build_header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, RelayError> {
    let mut entries: Vec<_> = headers.iter().collect();
    entries.sort();

    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in entries {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            RelayError::new(
                RelayErrorKind::InvalidHeader,
                format!("Invalid header name: {:?}", name),
            )
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            RelayError::new(
                RelayErrorKind::InvalidHeader,
                format!("Invalid value for header {}", name),
            )
        })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

/// Serializes the caller's body.
///
/// Structured values are written as compact JSON. Text goes out verbatim,
/// except that text declared as JSON through `Content-Type` must parse.
fn encode_body(descriptor: &NormalizedDescriptor) -> Result<Option<Bytes>, RelayError> {
    match &descriptor.body {
        None => Ok(None),
        Some(RequestBody::Json(value)) => serde_json::to_vec(value)
            .map(|bytes| Some(Bytes::from(bytes)))
            .map_err(|e| {
                RelayError::new(
                    RelayErrorKind::BodySerializationFailure,
                    format!("Failed to serialize request body: {}", e),
                )
            }),
        Some(RequestBody::Text(text)) => {
            if is_json_content(descriptor.header("content-type")) {
                serde_json::from_str::<serde::de::IgnoredAny>(text).map_err(|e| {
                    RelayError::new(
                        RelayErrorKind::BodySerializationFailure,
                        format!("Request body is not valid JSON: {}", e),
                    )
                })?;
            }
            Ok(Some(Bytes::from(text.clone())))
        }
    }
}

fn build_http_request(
    method: &hyper::Method,
    target: &Target,
    headers: &HeaderMap,
    body: Option<Bytes>,
) -> Result<Request<Full<Bytes>>, RelayError> {
    let uri: Uri = target.path_and_query().parse().map_err(|e| {
        RelayError::new(
            RelayErrorKind::MalformedUrl,
            format!("Invalid request target: {}", e),
        )
    })?;

    let mut request = Request::new(Full::new(body.unwrap_or_default()));
    *request.method_mut() = method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers.clone();

    if !request.headers().contains_key(HOST) {
        let host = HeaderValue::from_str(&target.host_header()).map_err(|_| {
            RelayError::new(RelayErrorKind::MalformedUrl, "Host is not a valid header value")
        })?;
        request.headers_mut().insert(HOST, host);
    }

    Ok(request)
}

/// Opens a TCP connection to the first reachable address.
///
/// A deadline hit before any connection exists is a connection failure,
/// not a timeout: nothing was ever exchanged with the upstream.
async fn connect(ips: &[IpAddr], port: u16, deadline: Instant) -> Result<TcpStream, RelayError> {
    let mut last_error = None;
    for ip in ips {
        let addr = SocketAddr::new(*ip, port);
        match timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => {
                tracing::debug!(%addr, error = %e, "TCP connect failed");
                last_error = Some(e);
            }
            Err(_) => {
                return Err(RelayError::new(
                    RelayErrorKind::ConnectionFailure,
                    format!("TCP connection to {} timed out", addr),
                ))
            }
        }
    }

    Err(RelayError::new(
        RelayErrorKind::ConnectionFailure,
        match last_error {
            Some(e) => format!("TCP connection failed: {}", e),
            None => "No addresses to connect to".to_string(),
        },
    ))
}

/// Runs one request/response exchange over an established stream and reads
/// the body to completion.
async fn exchange<T>(
    io: TokioIo<T>,
    request: Request<Full<Bytes>>,
    deadline: Instant,
    timing: &mut RelayTiming,
    is_first_request: bool,
) -> Result<RawResponse, RelayError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = match timeout_at(deadline, hyper::client::conn::http1::handshake(io)).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => {
            return Err(RelayError::new(
                hyper_error_kind(&e),
                format!("HTTP handshake failed: {}", e),
            ))
        }
        Err(_) => return Err(timeout_error("HTTP handshake timed out")),
    };

    // Ends on its own once the sender and response body are dropped.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!("Upstream connection closed with error: {}", e);
        }
    });

    if is_first_request {
        timing.start_request();
    }

    let response = match timeout_at(deadline, sender.send_request(request)).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => {
            return Err(RelayError::new(
                hyper_error_kind(&e),
                format!("Request failed: {}", e),
            ))
        }
        Err(_) => return Err(timeout_error("Request timed out")),
    };

    if is_first_request {
        timing.mark_ttfb();
    }

    timing.start_download();
    let (parts, mut incoming) = response.into_parts();
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut body = Vec::new();
    loop {
        match timeout_at(deadline, incoming.frame()).await {
            Ok(Some(Ok(frame))) => {
                if let Ok(data) = frame.into_data() {
                    if body.len() + data.len() > MAX_RESPONSE_BYTES {
                        return Err(RelayError::new(
                            RelayErrorKind::Upstream,
                            format!("Response body exceeds {} bytes", MAX_RESPONSE_BYTES),
                        ));
                    }
                    body.extend_from_slice(&data);
                }
            }
            Ok(Some(Err(e))) => {
                let mut err = RelayError::new(
                    hyper_error_kind(&e),
                    format!("Failed to read body: {}", e),
                );
                if let Some(partial) = partial_payload(&body, content_type.as_deref()) {
                    err = err.with_details(partial);
                }
                return Err(err);
            }
            Ok(None) => break,
            Err(_) => {
                let mut err = timeout_error("Body read timed out");
                if let Some(partial) = partial_payload(&body, content_type.as_deref()) {
                    err = err.with_details(partial);
                }
                return Err(err);
            }
        }
    }
    timing.end_download();

    Ok(RawResponse {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}

/// Connects to `target` and performs one exchange.
async fn send_once(
    target: &Target,
    request: Request<Full<Bytes>>,
    deadline: Instant,
    timing: &mut RelayTiming,
    is_first_request: bool,
) -> Result<RawResponse, RelayError> {
    if is_first_request {
        timing.start_dns();
    }
    let ips = match timeout_at(deadline, resolve_dns(&target.host)).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => return Err(RelayError::new(RelayErrorKind::ConnectionFailure, e)),
        Err(_) => {
            return Err(RelayError::new(
                RelayErrorKind::ConnectionFailure,
                format!("DNS lookup for {} timed out", target.host),
            ))
        }
    };
    if is_first_request {
        timing.end_dns();
        timing.start_connect();
    }

    let tcp_stream = connect(&ips, target.port, deadline).await?;
    if is_first_request {
        timing.end_connect();
    }

    if !target.is_https {
        return exchange(TokioIo::new(tcp_stream), request, deadline, timing, is_first_request).await;
    }

    if is_first_request {
        timing.start_tls();
    }
    let tls_stream = match timeout_at(deadline, connect_tls(tcp_stream, &target.host)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(TlsError::InvalidServerName(name))) => {
            return Err(RelayError::new(
                RelayErrorKind::MalformedUrl,
                format!("Invalid server name: {}", name),
            ))
        }
        Ok(Err(e)) => return Err(RelayError::new(RelayErrorKind::ConnectionFailure, e.to_string())),
        Err(_) => return Err(timeout_error("TLS handshake timed out")),
    };
    if is_first_request {
        timing.end_tls();
    }

    exchange(TokioIo::new(tls_stream), request, deadline, timing, is_first_request).await
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// 303 always becomes GET; 301/302 do so for anything but GET/HEAD, as
/// browsers do. 307/308 replay method and body.
fn redirect_switches_to_get(status: StatusCode, method: &hyper::Method) -> bool {
    match status.as_u16() {
        303 => *method != hyper::Method::HEAD,
        301 | 302 => *method != hyper::Method::GET && *method != hyper::Method::HEAD,
        _ => false,
    }
}

async fn relay(
    descriptor: &NormalizedDescriptor,
    body: Option<Bytes>,
    deadline: Instant,
    policy: RedirectPolicy,
    timing: &mut RelayTiming,
) -> Result<ResponseEnvelope, RelayError> {
    let mut target = Target::parse(&descriptor.url)?;
    let mut headers = build_header_map(&descriptor.headers)?;
    let mut method = descriptor.method.to_hyper();
    let mut body = body;
    let mut hops = 0usize;

    loop {
        let request = build_http_request(&method, &target, &headers, body.clone())?;
        timing.begin_hop();
        let response = send_once(&target, request, deadline, timing, hops == 0).await?;

        let location = response
            .headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if policy.follow && is_redirect(response.status) {
            if let Some(location) = location {
                hops += 1;
                if hops > policy.max_hops {
                    return Err(RelayError::new(
                        RelayErrorKind::Upstream,
                        format!("Too many redirects (limit {})", policy.max_hops),
                    ));
                }

                let next_url = target.url.join(&location).map_err(|e| {
                    RelayError::new(
                        RelayErrorKind::MalformedUrl,
                        format!("Invalid redirect location {:?}: {}", location, e),
                    )
                })?;
                let next = Target::from_url(next_url)?;

                tracing::debug!(
                    status = response.status.as_u16(),
                    from = %target.url,
                    to = %next.url,
                    "Following redirect"
                );

                if redirect_switches_to_get(response.status, &method) {
                    method = hyper::Method::GET;
                    body = None;
                    headers.remove(CONTENT_TYPE);
                    headers.remove(CONTENT_LENGTH);
                }
                if !target.same_origin(&next) {
                    headers.remove(AUTHORIZATION);
                    headers.remove(COOKIE);
                    headers.remove(HOST);
                }

                target = next;
                continue;
            }
        }

        return Ok(build_envelope(EnvelopeParams {
            status: response.status.as_u16(),
            headers: response.headers,
            body_bytes: response.body,
            duration_ms: timing.total_ms(),
            timing: timing.to_timing_info(),
            final_url: target.url.to_string(),
            redirected: hops > 0,
        }));
    }
}

/// Relays `descriptor` following redirects, bounded by `timeout`.
pub async fn execute(
    descriptor: NormalizedDescriptor,
    timeout: Duration,
) -> Result<ResponseEnvelope, RelayError> {
    execute_with_policy(descriptor, timeout, RedirectPolicy::default()).await
}

pub async fn execute_with_policy(
    descriptor: NormalizedDescriptor,
    timeout: Duration,
    policy: RedirectPolicy,
) -> Result<ResponseEnvelope, RelayError> {
    execute_with_cancel(descriptor, timeout, policy, CancellationToken::new()).await
}

/// Relays `descriptor`, aborting the in-flight call when `cancel` fires or
/// `timeout` elapses.
///
/// Exactly one outbound exchange is attempted per hop; nothing is retried.
pub async fn execute_with_cancel(
    descriptor: NormalizedDescriptor,
    timeout: Duration,
    policy: RedirectPolicy,
    cancel: CancellationToken,
) -> Result<ResponseEnvelope, RelayError> {
    let mut timing = RelayTiming::new();
    let deadline = Instant::now() + timeout;
    let method: Method = descriptor.method;

    tracing::debug!(%method, url = %descriptor.url, ?timeout, "Dispatching relay");

    let outcome = match encode_body(&descriptor) {
        Ok(body) => {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Err(RelayError::new(RelayErrorKind::Cancelled, "Request cancelled"))
                }
                outcome = relay(&descriptor, body, deadline, policy, &mut timing) => outcome,
            }
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(envelope) => {
            tracing::debug!(
                %method,
                status = envelope.status,
                duration_ms = envelope.duration_ms,
                size_bytes = envelope.size_bytes,
                "Relay completed"
            );
            Ok(envelope)
        }
        Err(e) => {
            let e = e.with_duration(timing.total_ms());
            tracing::warn!(
                %method,
                url = %descriptor.url,
                kind = %e.kind,
                duration_ms = e.duration_ms,
                "Relay failed: {}",
                e.message
            );
            Err(e)
        }
    }
}
