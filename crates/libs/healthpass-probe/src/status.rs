use healthpass_wire::DecodedResponse;
use serde::Serialize;

/// `grpc.health.v1.HealthCheckResponse.ServingStatus`, as reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Serving,
    NotServing,
    ServiceUnknown,
    Unknown,
}

/// The status exactly as the server expressed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawStatus {
    Code(u64),
    Name(String),
}

impl StatusKind {
    /// Numeric codes and enum names map to the same kind; anything else is
    /// `Unknown`.
    pub fn classify(raw: &RawStatus) -> Self {
        match raw {
            RawStatus::Code(1) => Self::Serving,
            RawStatus::Code(2) => Self::NotServing,
            RawStatus::Code(3) => Self::ServiceUnknown,
            RawStatus::Code(_) => Self::Unknown,
            RawStatus::Name(name) => match name.as_str() {
                "SERVING" => Self::Serving,
                "NOT_SERVING" => Self::NotServing,
                "SERVICE_UNKNOWN" => Self::ServiceUnknown,
                _ => Self::Unknown,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serving => "SERVING",
            Self::NotServing => "NOT_SERVING",
            Self::ServiceUnknown => "SERVICE_UNKNOWN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Normalized outcome of one health check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub status: StatusKind,
    pub raw_status: Option<RawStatus>,
    pub serving: bool,
    pub decoded: DecodedResponse,
}

impl HealthCheckResult {
    pub fn from_decoded(decoded: DecodedResponse) -> Self {
        let raw_status = decoded.status.map(RawStatus::Code);
        let status = raw_status.as_ref().map(StatusKind::classify).unwrap_or(StatusKind::Unknown);
        Self { status, raw_status, serving: status == StatusKind::Serving, decoded }
    }
}
