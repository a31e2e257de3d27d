//! HTTP/1.1 surface.
//!
//! Requests arrive as raw bytes (the server loop buffers the header block and
//! the `Content-Length` body) and responses are returned as raw bytes.

use healthpass_probe::{HealthCheckResult, Passthrough, ProbeError, Transport};
use serde_json::{json, Value as JsonValue};

pub const HEADER_END: &[u8] = b"\r\n\r\n";

/// Upper bound on a request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub const HEALTH_CHECK_ROUTE: &str = "/api/health";
pub const LIVENESS_ROUTE: &str = "/healthz";

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// CORS headers attached to every response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsPolicy {
    pub allowed_origin: String,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self { allowed_origin: "*".to_string() }
    }
}

impl CorsPolicy {
    pub fn new(allowed_origin: impl Into<String>) -> Self {
        Self { allowed_origin: allowed_origin.into() }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Access-Control-Allow-Origin", self.allowed_origin.clone())];
        if self.allowed_origin != "*" {
            headers.push(("Vary", "Origin".to_string()));
        }
        headers
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NoContent,
    BadRequest,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    BadGateway,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::PayloadTooLarge => 413,
            Self::BadGateway => 502,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::Unauthorized => "Unauthorized",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::BadGateway => "Bad Gateway",
        }
    }
}

pub async fn handle_http_request<T: Transport>(
    probe: &Passthrough<T>,
    cors: &CorsPolicy,
    request: &[u8],
) -> Vec<u8> {
    let Some(header_end) = find_header_end(request) else {
        return error_response(cors, StatusCode::BadRequest, "input", "missing headers");
    };
    let headers = &request[..header_end];
    let Some((method, path)) = parse_request_line(headers) else {
        return error_response(cors, StatusCode::BadRequest, "input", "invalid request line");
    };
    let (path_only, _query) = split_path_and_query(path.as_str());

    match (method.as_str(), path_only) {
        ("OPTIONS", _) => {
            let mut extra = cors.headers();
            extra.push(("Access-Control-Allow-Methods", ALLOWED_METHODS.to_string()));
            extra.push(("Access-Control-Allow-Headers", ALLOWED_HEADERS.to_string()));
            extra.push(("Access-Control-Max-Age", "600".to_string()));
            build_response(StatusCode::NoContent, &extra, None)
        }
        ("GET", LIVENESS_ROUTE) => json_response(
            cors,
            StatusCode::Ok,
            &json!({ "ok": true, "service": "healthpassd", "status": "healthy" }),
        ),
        ("POST", HEALTH_CHECK_ROUTE) => {
            let body = match request_body(headers, &request[header_end + HEADER_END.len()..]) {
                Ok(body) => body,
                Err((status, message)) => return error_response(cors, status, "input", message),
            };
            let body: JsonValue = match serde_json::from_slice(body) {
                Ok(body) => body,
                Err(err) => {
                    return error_response(
                        cors,
                        StatusCode::BadRequest,
                        "input",
                        &format!("invalid JSON body: {err}"),
                    )
                }
            };
            match probe.check_json(&body).await {
                Ok(result) => result_response(cors, &result),
                Err(error) => probe_error_response(cors, &error),
            }
        }
        (_, LIVENESS_ROUTE) | (_, HEALTH_CHECK_ROUTE) => {
            error_response(cors, StatusCode::MethodNotAllowed, "routing", "method not allowed")
        }
        _ => error_response(cors, StatusCode::NotFound, "routing", "not found"),
    }
}

fn request_body<'a>(headers: &[u8], rest: &'a [u8]) -> Result<&'a [u8], (StatusCode, &'static str)> {
    let length = parse_content_length(headers)
        .ok_or((StatusCode::BadRequest, "missing content-length"))?;
    if length > MAX_BODY_BYTES {
        return Err((StatusCode::PayloadTooLarge, "request body too large"));
    }
    rest.get(..length).ok_or((StatusCode::BadRequest, "body incomplete"))
}

pub fn find_header_end(request: &[u8]) -> Option<usize> {
    request.windows(HEADER_END.len()).position(|window| window == HEADER_END)
}

pub fn parse_content_length(headers: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(headers);
    for line in text.lines() {
        let lower = line.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("content-length:") {
            if let Ok(length) = rest.trim().parse::<usize>() {
                return Some(length);
            }
        }
    }
    None
}

pub fn parse_request_line(headers: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(headers);
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();
    Some((method, path))
}

fn split_path_and_query(path: &str) -> (&str, &str) {
    match path.split_once('?') {
        Some((path_only, query)) => (path_only, query),
        None => (path, ""),
    }
}

fn result_response(cors: &CorsPolicy, result: &HealthCheckResult) -> Vec<u8> {
    let mut body = match serde_json::to_value(result) {
        Ok(body) => body,
        Err(err) => {
            log::error!("http: failed to serialize result: {err}");
            return error_response(cors, StatusCode::BadGateway, "remote", "unserializable result");
        }
    };
    if let Some(object) = body.as_object_mut() {
        object.insert("ok".to_string(), JsonValue::Bool(true));
    }
    json_response(cors, StatusCode::Ok, &body)
}

fn probe_error_response(cors: &CorsPolicy, error: &ProbeError) -> Vec<u8> {
    let status = match error {
        ProbeError::Input { .. } => StatusCode::BadRequest,
        ProbeError::AuthRejected(_) => StatusCode::Unauthorized,
        _ => StatusCode::BadGateway,
    };
    let transport = error.transport();
    let body = json!({
        "ok": false,
        "kind": error.kind(),
        "error": error.to_string(),
        "code": transport.and_then(|transport| transport.code),
        "details": transport.and_then(|transport| transport.details.clone()),
        "metadata": transport.map(|transport| &transport.metadata),
    });
    json_response(cors, status, &body)
}

pub fn error_response(cors: &CorsPolicy, status: StatusCode, kind: &str, message: &str) -> Vec<u8> {
    json_response(cors, status, &json!({ "ok": false, "kind": kind, "error": message }))
}

fn json_response(cors: &CorsPolicy, status: StatusCode, body: &JsonValue) -> Vec<u8> {
    let body = body.to_string();
    build_response(status, &cors.headers(), Some(("application/json", body.as_bytes())))
}

fn build_response(
    status: StatusCode,
    headers: &[(&'static str, String)],
    body: Option<(&str, &[u8])>,
) -> Vec<u8> {
    let mut response = Vec::new();
    response.extend_from_slice(
        format!("HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason()).as_bytes(),
    );
    for (name, value) in headers {
        response.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    let payload: &[u8] = match body {
        Some((content_type, payload)) => {
            response.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            payload
        }
        None => &[],
    };
    response.extend_from_slice(format!("Content-Length: {}\r\n", payload.len()).as_bytes());
    response.extend_from_slice(b"Connection: close\r\n\r\n");
    response.extend_from_slice(payload);
    response
}
