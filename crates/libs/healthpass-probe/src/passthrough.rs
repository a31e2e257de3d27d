use std::sync::Arc;
use std::time::Instant;

use healthpass_auth::{apply_with_clock, Clock, MetadataEntry, SystemClock};
use healthpass_wire::{decode, encode_request};
use serde_json::Value as JsonValue;

use crate::{HealthCheckRequest, HealthCheckResult, ProbeError, Transport, TransportError};

/// Runs health checks through a [`Transport`].
///
/// Holds no per-request state; one instance serves concurrent requests.
pub struct Passthrough<T> {
    transport: T,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> Passthrough<T> {
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, Arc::new(SystemClock))
    }

    pub fn with_clock(transport: T, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Normalizes a JSON body, then runs [`Passthrough::check`].
    pub async fn check_json(&self, body: &JsonValue) -> Result<HealthCheckResult, ProbeError> {
        let request = HealthCheckRequest::from_json(body)?;
        self.check(request).await
    }

    pub async fn check(
        &self,
        request: HealthCheckRequest,
    ) -> Result<HealthCheckResult, ProbeError> {
        let HealthCheckRequest { target, service, insecure, metadata } = request;
        if target.trim().is_empty() {
            return Err(ProbeError::input("target is required"));
        }
        log::debug!(
            "probe: check target={} service={:?} insecure={} metadata_entries={}",
            target,
            service,
            insecure,
            metadata.len()
        );

        let metadata = apply_with_clock(metadata, self.clock.as_ref());
        let payload = encode_request(&service);

        let started_at = Instant::now();
        let response = match self.dispatch(&target, insecure, payload, &metadata).await {
            Ok(response) => response,
            Err(error) => {
                let error = ProbeError::from_transport(error);
                log::warn!(
                    "probe: target={} service={:?} failed kind={} err={}",
                    target,
                    service,
                    error.kind(),
                    error
                );
                return Err(error);
            }
        };

        let result = HealthCheckResult::from_decoded(decode(&response));
        log::info!(
            "probe: target={} service={:?} status={} bytes={} elapsed_ms={}",
            target,
            service,
            result.status.as_str(),
            response.len(),
            started_at.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn dispatch(
        &self,
        target: &str,
        insecure: bool,
        payload: Vec<u8>,
        metadata: &[MetadataEntry],
    ) -> Result<Vec<u8>, TransportError> {
        let mut channel = self.transport.open(target, insecure).await?;
        let outcome = self.transport.call(&mut channel, payload, metadata).await;
        self.transport.close(channel).await;
        outcome
    }
}
