use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use healthpass_auth::{Clock, MetadataEntry};
use healthpass_probe::{
    HealthCheckRequest, Passthrough, ProbeError, RawStatus, StatusKind, Transport, TransportError,
};
use serde_json::json;

const NOW: u64 = 1_700_000_017;

struct FixedClock;

impl Clock for FixedClock {
    fn now_unix_secs(&self) -> u64 {
        NOW
    }
}

#[derive(Debug, Default)]
struct Recorded {
    opened: Vec<(String, bool)>,
    requests: Vec<Vec<u8>>,
    metadata: Vec<Vec<MetadataEntry>>,
    closed: usize,
}

enum Reply {
    Bytes(Vec<u8>),
    Fail(TransportError),
    RefuseOpen(TransportError),
}

struct FakeTransport {
    reply: Reply,
    recorded: Arc<Mutex<Recorded>>,
}

impl FakeTransport {
    fn new(reply: Reply) -> (Self, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        (Self { reply, recorded: recorded.clone() }, recorded)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Channel = u32;

    async fn open(&self, target: &str, insecure: bool) -> Result<u32, TransportError> {
        self.recorded.lock().expect("recorded lock").opened.push((target.to_string(), insecure));
        match &self.reply {
            Reply::RefuseOpen(error) => Err(error.clone()),
            _ => Ok(7),
        }
    }

    async fn call(
        &self,
        channel: &mut u32,
        request: Vec<u8>,
        metadata: &[MetadataEntry],
    ) -> Result<Vec<u8>, TransportError> {
        assert_eq!(*channel, 7);
        let mut recorded = self.recorded.lock().expect("recorded lock");
        recorded.requests.push(request);
        recorded.metadata.push(metadata.to_vec());
        match &self.reply {
            Reply::Bytes(bytes) => Ok(bytes.clone()),
            Reply::Fail(error) | Reply::RefuseOpen(error) => Err(error.clone()),
        }
    }

    async fn close(&self, channel: u32) {
        assert_eq!(channel, 7);
        self.recorded.lock().expect("recorded lock").closed += 1;
    }
}

fn passthrough(reply: Reply) -> (Passthrough<FakeTransport>, Arc<Mutex<Recorded>>) {
    let (transport, recorded) = FakeTransport::new(reply);
    (Passthrough::with_clock(transport, Arc::new(FixedClock)), recorded)
}

#[tokio::test]
async fn serving_response_round_trip() {
    let (probe, recorded) = passthrough(Reply::Bytes(vec![0x08, 0x01]));
    let result = probe
        .check_json(&json!({ "target": "localhost:50051", "service": "OK", "insecure": true }))
        .await
        .expect("health check");

    assert_eq!(result.status, StatusKind::Serving);
    assert_eq!(result.raw_status, Some(RawStatus::Code(1)));
    assert!(result.serving);

    let recorded = recorded.lock().expect("recorded lock");
    assert_eq!(recorded.opened, vec![("localhost:50051".to_string(), true)]);
    assert_eq!(recorded.requests, vec![vec![0x0a, 0x02, 0x4f, 0x4b]]);
    assert_eq!(recorded.closed, 1);
}

#[tokio::test]
async fn empty_service_sends_empty_message() {
    let (probe, recorded) = passthrough(Reply::Bytes(vec![0x08, 0x02]));
    let result = probe.check(HealthCheckRequest::new("h:1")).await.expect("health check");
    assert_eq!(result.status, StatusKind::NotServing);
    assert!(!result.serving);
    assert_eq!(recorded.lock().expect("recorded lock").requests, vec![Vec::<u8>::new()]);
}

#[tokio::test]
async fn client_key_is_rewritten_before_dispatch() {
    let (probe, recorded) = passthrough(Reply::Bytes(vec![0x08, 0x01]));
    probe
        .check_json(&json!({
            "target": "h:1",
            "metadata": [
                { "key": "x-tenant", "value": "acme" },
                { "key": "client-key", "value": "s3cr3t" },
                { "key": "Authorization", "value": "Bearer old" },
                { "key": "dropped" }
            ]
        }))
        .await
        .expect("health check");

    // HMAC-SHA256("s3cr3t", "1700000010"), the window containing NOW
    let signature = "f06bb2205876d0c6fa3896a1a690d471bcddedc6b9b4ed0e56637fef22169283";
    let recorded = recorded.lock().expect("recorded lock");
    assert_eq!(
        recorded.metadata,
        vec![vec![
            MetadataEntry::new("x-tenant", "acme"),
            MetadataEntry::new("Authorization", format!("TOTP {signature}")),
        ]]
    );
}

#[tokio::test]
async fn input_error_never_touches_transport() {
    let (probe, recorded) = passthrough(Reply::Bytes(vec![0x08, 0x01]));
    let error = probe.check_json(&json!({ "service": "x" })).await.expect_err("must fail");
    assert_eq!(error.kind(), "input");
    let recorded = recorded.lock().expect("recorded lock");
    assert!(recorded.opened.is_empty());
    assert_eq!(recorded.closed, 0);
}

#[tokio::test]
async fn call_failure_still_closes_channel() {
    let failure = TransportError::new(Some(16), "invalid credential");
    let (probe, recorded) = passthrough(Reply::Fail(failure.clone()));
    let error = probe.check(HealthCheckRequest::new("h:1")).await.expect_err("must fail");
    assert_eq!(error, ProbeError::AuthRejected(failure));
    assert_eq!(recorded.lock().expect("recorded lock").closed, 1);
}

#[tokio::test]
async fn open_failure_is_remote_and_skips_close() {
    let failure = TransportError::unavailable("connection refused");
    let (probe, recorded) = passthrough(Reply::RefuseOpen(failure.clone()));
    let error = probe.check(HealthCheckRequest::new("h:1")).await.expect_err("must fail");
    assert_eq!(error, ProbeError::Remote(failure));
    let recorded = recorded.lock().expect("recorded lock");
    assert!(recorded.requests.is_empty());
    assert_eq!(recorded.closed, 0);
}

#[tokio::test]
async fn malformed_response_degrades_instead_of_failing() {
    // status SERVING, then an unsupported fixed64 field
    let (probe, _recorded) =
        passthrough(Reply::Bytes(vec![0x08, 0x01, 0x11, 0, 0, 0, 0, 0, 0, 0, 0]));
    let result = probe.check(HealthCheckRequest::new("h:1")).await.expect("health check");
    assert_eq!(result.status, StatusKind::Serving);
    assert_eq!(result.decoded.fields.len(), 1);
    assert!(result.decoded.halt.is_some());
}

#[tokio::test]
async fn transport_metadata_is_preserved_on_failure() {
    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("retry-after".to_string(), "5".to_string());
    let failure = TransportError::new(Some(14), "overloaded").with_metadata(metadata.clone());
    let (probe, _recorded) = passthrough(Reply::Fail(failure));
    let error = probe.check(HealthCheckRequest::new("h:1")).await.expect_err("must fail");
    assert_eq!(error.transport().map(|error| &error.metadata), Some(&metadata));
}

#[tokio::test]
async fn built_request_reaches_transport_unchanged() {
    let (probe, _recorded) = passthrough(Reply::Bytes(vec![0x08, 0x03]));
    let request = HealthCheckRequest::new("db.internal:7443")
        .with_service("grpc.health.v1.Health")
        .with_insecure(true)
        .with_metadata(vec![MetadataEntry::new("x-request-id", "r-1")]);
    let result = probe.check(request).await.expect("health check");
    assert_eq!(result.status, StatusKind::ServiceUnknown);

    let recorded = probe.transport().recorded.lock().expect("recorded lock");
    assert_eq!(recorded.opened, vec![("db.internal:7443".to_string(), true)]);
    let mut expected = vec![0x0a, 21];
    expected.extend_from_slice(b"grpc.health.v1.Health");
    assert_eq!(recorded.requests, vec![expected]);
    assert_eq!(recorded.metadata, vec![vec![MetadataEntry::new("x-request-id", "r-1")]]);
}
