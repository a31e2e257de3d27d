use healthpass_auth::MetadataEntry;
use serde_json::Value as JsonValue;

use crate::ProbeError;

/// A normalized health-check request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HealthCheckRequest {
    /// `host:port` of the remote server.
    pub target: String,
    /// Service name; empty asks for overall server health.
    pub service: String,
    /// Plaintext instead of TLS.
    pub insecure: bool,
    pub metadata: Vec<MetadataEntry>,
}

impl HealthCheckRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into(), ..Self::default() }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<MetadataEntry>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Normalizes a caller's JSON body.
    ///
    /// Only `target` and `service` can fail the request; malformed metadata
    /// entries are dropped silently.
    pub fn from_json(body: &JsonValue) -> Result<Self, ProbeError> {
        let object = body
            .as_object()
            .ok_or_else(|| ProbeError::input("request body must be a JSON object"))?;

        let target = match object.get("target") {
            Some(JsonValue::String(target)) => target.trim(),
            Some(_) => return Err(ProbeError::input("target must be a string")),
            None => return Err(ProbeError::input("target is required")),
        };
        if target.is_empty() {
            return Err(ProbeError::input("target is required"));
        }

        let service = match object.get("service") {
            None | Some(JsonValue::Null) => String::new(),
            Some(JsonValue::String(service)) => service.clone(),
            Some(_) => return Err(ProbeError::input("service must be a string")),
        };

        let insecure = object.get("insecure").and_then(JsonValue::as_bool).unwrap_or(false);

        let metadata =
            object.get("metadata").map(MetadataEntry::list_from_json).unwrap_or_default();

        Ok(Self { target: target.to_owned(), service, insecure, metadata })
    }
}
