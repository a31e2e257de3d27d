//! Call metadata and the `client-key` → `Authorization` credential rewrite.

pub mod metadata;
pub mod totp;

pub use metadata::{MetadataEntry, MetadataValue};
pub use totp::{apply, apply_with_clock, signature_for_window, time_window, Clock, SystemClock};

/// Metadata key carrying the shared secret. Consumed, never forwarded.
pub const CLIENT_KEY: &str = "client-key";

/// Metadata key of the derived credential.
pub const AUTHORIZATION: &str = "Authorization";

/// Length of a credential window in seconds.
pub const WINDOW_SECS: u64 = 30;

/// Scheme prefix of the derived credential.
pub const CREDENTIAL_SCHEME: &str = "TOTP";
