use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// gRPC status codes the passthrough reasons about.
pub mod code {
    pub const PERMISSION_DENIED: i32 = 7;
    pub const UNAVAILABLE: i32 = 14;
    pub const UNAUTHENTICATED: i32 = 16;
}

/// Codes that mean the server refused the credentials.
const AUTH_REJECTION_CODES: [i32; 2] = [code::UNAUTHENTICATED, code::PERMISSION_DENIED];

/// Detail fragments seen when an authenticating proxy answers in place of the
/// gRPC server, so the client fails to parse the reply. Matched
/// case-insensitively; upstream wording is not a stable contract.
const AUTH_REJECTION_DETAIL_PATTERNS: [&str; 3] =
    ["response message parsing error", "invalid compression flag", "unexpected content-type"];

/// Failure reported by the transport for the remote call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransportError {
    pub code: Option<i32>,
    pub details: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl TransportError {
    pub fn new(code: Option<i32>, details: impl Into<String>) -> Self {
        Self { code, details: Some(details.into()), metadata: BTreeMap::new() }
    }

    pub fn unavailable(details: impl Into<String>) -> Self {
        Self::new(Some(code::UNAVAILABLE), details)
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Best-effort check for "credentials rejected". Absent or unrecognized
    /// signals fall back to `false`.
    pub fn looks_like_auth_rejection(&self) -> bool {
        if self.code.is_some_and(|code| AUTH_REJECTION_CODES.contains(&code)) {
            return true;
        }
        let Some(details) = self.details.as_deref() else {
            return false;
        };
        let details = details.to_ascii_lowercase();
        AUTH_REJECTION_DETAIL_PATTERNS.iter().any(|pattern| details.contains(pattern))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.details.as_deref()) {
            (Some(code), Some(details)) => write!(f, "code {code}: {details}"),
            (Some(code), None) => write!(f, "code {code}"),
            (None, Some(details)) => f.write_str(details),
            (None, None) => f.write_str("unspecified transport failure"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Why a health check produced no result.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProbeError {
    /// The request was rejected before any remote call.
    #[error("invalid request: {message}")]
    Input { message: String },

    /// The remote side refused the forwarded credentials.
    #[error("authentication rejected: {0}")]
    AuthRejected(TransportError),

    /// Any other remote or connection failure.
    #[error("remote call failed: {0}")]
    Remote(TransportError),
}

impl ProbeError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input { message: message.into() }
    }

    /// Sorts a transport failure into `AuthRejected` or `Remote`.
    pub fn from_transport(error: TransportError) -> Self {
        if error.looks_like_auth_rejection() {
            Self::AuthRejected(error)
        } else {
            Self::Remote(error)
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input { .. } => "input",
            Self::AuthRejected(_) => "auth_rejected",
            Self::Remote(_) => "remote",
        }
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Input { .. } => None,
            Self::AuthRejected(error) | Self::Remote(error) => Some(error),
        }
    }
}
