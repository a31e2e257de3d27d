//! gRPC transport over tonic.
//!
//! Request and response messages are passed through as opaque bytes; the
//! protobuf work happens in `healthpass-wire`.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fs;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use healthpass_auth::MetadataEntry;
use healthpass_probe::{Transport, TransportError, HEALTH_CHECK_PATH};
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Request, Status};

use crate::config::{ConfigError, DaemonConfig};

/// Codec that hands message bytes through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughCodec;

impl Codec for PassthroughCodec {
    type Encode = Vec<u8>;
    type Decode = Vec<u8>;
    type Encoder = PassthroughCodec;
    type Decoder = PassthroughCodec;

    fn encoder(&mut self) -> Self::Encoder {
        PassthroughCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        PassthroughCodec
    }
}

impl Encoder for PassthroughCodec {
    type Item = Vec<u8>;
    type Error = Status;

    fn encode(&mut self, item: Vec<u8>, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for PassthroughCodec {
    type Item = Vec<u8>;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Vec<u8>>, Status> {
        let remaining = src.remaining();
        Ok(Some(src.copy_to_bytes(remaining).to_vec()))
    }
}

pub struct GrpcTransport {
    connect_timeout: Duration,
    request_timeout: Duration,
    tls: ClientTlsConfig,
}

impl GrpcTransport {
    pub fn new(config: &DaemonConfig) -> Result<Self, ConfigError> {
        let mut tls = ClientTlsConfig::new().with_native_roots();
        if let Some(path) = config.ca_cert_path.as_ref() {
            let pem = fs::read(path)
                .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
            tls = tls.ca_certificate(Certificate::from_pem(pem));
        }
        Ok(Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            tls,
        })
    }

    fn endpoint(&self, target: &str, insecure: bool) -> Result<Endpoint, TransportError> {
        let uri = target_uri(target, insecure);
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|err| TransportError::new(None, format!("invalid target {uri}: {err}")))?
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout);
        if insecure {
            return Ok(endpoint);
        }
        endpoint.tls_config(self.tls.clone()).map_err(|err| {
            TransportError::unavailable(format!("tls setup for {uri} failed: {}", error_chain(&err)))
        })
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    type Channel = Channel;

    async fn open(&self, target: &str, insecure: bool) -> Result<Channel, TransportError> {
        let endpoint = self.endpoint(target, insecure)?;
        log::debug!("grpc: connecting to {} insecure={}", endpoint.uri(), insecure);
        endpoint.connect().await.map_err(|err| {
            TransportError::unavailable(format!("connect to {target} failed: {}", error_chain(&err)))
        })
    }

    async fn call(
        &self,
        channel: &mut Channel,
        request: Vec<u8>,
        metadata: &[MetadataEntry],
    ) -> Result<Vec<u8>, TransportError> {
        let mut grpc = tonic::client::Grpc::new(channel.clone());
        grpc.ready().await.map_err(|err| {
            TransportError::unavailable(format!("channel not ready: {}", error_chain(&err)))
        })?;

        let mut request = Request::new(request);
        attach_metadata(request.metadata_mut(), metadata);

        let path = PathAndQuery::from_static(HEALTH_CHECK_PATH);
        let response = grpc
            .unary::<Vec<u8>, Vec<u8>, _>(request, path, PassthroughCodec)
            .await
            .map_err(status_to_error)?;
        Ok(response.into_inner())
    }

    async fn close(&self, channel: Channel) {
        drop(channel);
        log::debug!("grpc: channel closed");
    }
}

/// `host:port` gains a scheme matching `insecure`; explicit schemes are kept.
pub fn target_uri(target: &str, insecure: bool) -> String {
    let target = target.trim();
    if target.contains("://") {
        return target.to_string();
    }
    let scheme = if insecure { "http" } else { "https" };
    format!("{scheme}://{target}")
}

/// Copies entries into gRPC metadata. Header names are lowercased; entries
/// gRPC cannot carry as ASCII metadata are skipped.
pub fn attach_metadata(map: &mut MetadataMap, entries: &[MetadataEntry]) {
    for entry in entries {
        let key = match AsciiMetadataKey::from_bytes(entry.key.to_ascii_lowercase().as_bytes()) {
            Ok(key) => key,
            Err(_) => {
                log::warn!("grpc: skipping metadata with invalid key {:?}", entry.key);
                continue;
            }
        };
        let value = entry.value.to_string();
        let value = match AsciiMetadataValue::try_from(value.as_str()) {
            Ok(value) => value,
            Err(_) => {
                log::warn!("grpc: skipping metadata {:?} with non-ascii value", entry.key);
                continue;
            }
        };
        map.append(key, value);
    }
}

pub fn status_to_error(status: Status) -> TransportError {
    let mut metadata = BTreeMap::new();
    for (name, value) in status.metadata().clone().into_headers().iter() {
        if let Ok(value) = value.to_str() {
            metadata.insert(name.as_str().to_string(), value.to_string());
        }
    }
    let message = status.message();
    TransportError {
        code: Some(status.code() as i32),
        details: (!message.is_empty()).then(|| message.to_string()),
        metadata,
    }
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
