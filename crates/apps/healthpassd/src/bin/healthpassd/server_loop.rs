use healthpass_daemon::http::{self, CorsPolicy, StatusCode, HEADER_END, MAX_BODY_BYTES};
use healthpass_daemon::GrpcTransport;
use healthpass_probe::Passthrough;
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// Header block limit, on top of [`MAX_BODY_BYTES`].
const MAX_HEADER_BYTES: usize = 16 * 1024;

#[derive(Debug, Default, Clone)]
struct AccessLogMeta {
    http_method: String,
    path: String,
}

pub(super) async fn run_server_loop(
    addr: SocketAddr,
    probe: Arc<Passthrough<GrpcTransport>>,
    cors: Arc<CorsPolicy>,
) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("healthpassd listening on http://{}", listener.local_addr()?);

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("[server] accept failed err={}", err);
                continue;
            }
        };
        let probe = probe.clone();
        let cors = cors.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer_addr, probe.as_ref(), cors.as_ref()).await;
        });
    }
}

async fn handle_connection<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    probe: &Passthrough<GrpcTransport>,
    cors: &CorsPolicy,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started_at = std::time::Instant::now();
    let buffer = match read_request(&mut stream).await {
        Ok(ReadOutcome::Complete(buffer)) => buffer,
        Ok(ReadOutcome::Empty) => return,
        Ok(ReadOutcome::TooLarge) => {
            let response = http::error_response(
                cors,
                StatusCode::PayloadTooLarge,
                "input",
                "request too large",
            );
            let _ = stream.write_all(&response).await;
            let _ = stream.shutdown().await;
            return;
        }
        Err(err) => {
            log::warn!("[server] read error peer={} err={}", peer_addr, err);
            return;
        }
    };

    let meta = parse_access_log_meta(&buffer);
    let response = http::handle_http_request(probe, cors, &buffer).await;
    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    emit_access_log(peer_addr, &meta, &response, elapsed_ms);
    if let Err(err) = stream.write_all(&response).await {
        log::warn!("[server] write error peer={} err={}", peer_addr, err);
    }
    let _ = stream.shutdown().await;
}

enum ReadOutcome {
    Complete(Vec<u8>),
    Empty,
    TooLarge,
}

async fn read_request<S>(stream: &mut S) -> io::Result<ReadOutcome>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    loop {
        let mut chunk = [0_u8; 4096];
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(header_end) = http::find_header_end(&buffer) {
            let headers = &buffer[..header_end];
            match http::parse_content_length(headers) {
                Some(length) if length > MAX_BODY_BYTES => return Ok(ReadOutcome::TooLarge),
                Some(length) => {
                    if buffer.len() >= header_end + HEADER_END.len() + length {
                        break;
                    }
                }
                None => break,
            }
        } else if buffer.len() > MAX_HEADER_BYTES {
            return Ok(ReadOutcome::TooLarge);
        }
    }
    if buffer.is_empty() {
        Ok(ReadOutcome::Empty)
    } else {
        Ok(ReadOutcome::Complete(buffer))
    }
}

fn parse_access_log_meta(request: &[u8]) -> AccessLogMeta {
    let mut meta = AccessLogMeta::default();
    let Some(header_end) = http::find_header_end(request) else {
        return meta;
    };
    if let Some((method, path)) = http::parse_request_line(&request[..header_end]) {
        meta.http_method = method;
        meta.path = path;
    }
    meta
}

fn parse_status_code(response: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(response).ok()?;
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    let _http_version = parts.next()?;
    parts.next()?.parse::<u16>().ok()
}

fn parse_error_message(response: &[u8]) -> Option<String> {
    let header_end = http::find_header_end(response)?;
    let body = &response[header_end + HEADER_END.len()..];
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

fn emit_access_log(peer_addr: SocketAddr, meta: &AccessLogMeta, response: &[u8], elapsed_ms: u64) {
    let status_code = parse_status_code(response).unwrap_or(0);
    let ok = (200..300).contains(&status_code);
    let error = if ok { None } else { parse_error_message(response) };
    let payload = json!({
        "event": "http_request",
        "peer": peer_addr.to_string(),
        "method": meta.http_method,
        "path": meta.path,
        "status_code": status_code,
        "elapsed_ms": elapsed_ms,
        "ok": ok,
        "error": error,
    });
    log::info!("{}", payload);
}

#[cfg(test)]
mod server_loop_tests {
    use super::*;

    #[tokio::test]
    async fn read_request_waits_for_full_body() {
        let raw = b"POST /api/health HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        let mut reader = tokio_test_reader(raw.clone());
        match read_request(&mut reader).await.expect("read") {
            ReadOutcome::Complete(buffer) => assert_eq!(buffer, raw),
            _ => panic!("expected complete request"),
        }
    }

    #[tokio::test]
    async fn read_request_rejects_oversized_body() {
        let raw = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        let mut reader = tokio_test_reader(raw.into_bytes());
        assert!(matches!(read_request(&mut reader).await.expect("read"), ReadOutcome::TooLarge));
    }

    #[tokio::test]
    async fn read_request_on_closed_socket_is_empty() {
        let mut reader = tokio_test_reader(Vec::new());
        assert!(matches!(read_request(&mut reader).await.expect("read"), ReadOutcome::Empty));
    }

    #[test]
    fn access_log_meta_extracts_method_and_path() {
        let meta = parse_access_log_meta(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(meta.http_method, "GET");
        assert_eq!(meta.path, "/healthz");
        assert_eq!(parse_access_log_meta(b"garbage").path, "");
    }

    #[test]
    fn parse_status_code_extracts_numeric_status() {
        let response = b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(parse_status_code(response), Some(502));
    }

    #[test]
    fn error_message_comes_from_json_body() {
        let response = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 42\r\n\r\n{\"ok\":false,\"kind\":\"input\",\"error\":\"bad\"}";
        assert_eq!(parse_error_message(response).as_deref(), Some("bad"));
        assert_eq!(parse_error_message(b"HTTP/1.1 204 No Content\r\n\r\n"), None);
    }

    fn tokio_test_reader(bytes: Vec<u8>) -> std::io::Cursor<Vec<u8>> {
        std::io::Cursor::new(bytes)
    }
}
