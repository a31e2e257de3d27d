//! Health-check passthrough.
//!
//! [`Passthrough`] turns a caller's JSON health-check request into one remote
//! `grpc.health.v1.Health/Check` call and the raw response back into a
//! [`HealthCheckResult`]:
//!
//! ```text
//! normalize -> authorize -> encode -> dispatch -> decode -> classify
//!                                        |
//!                                        +-> ProbeError
//! ```
//!
//! The transport is abstracted behind [`Transport`] so the daemon can plug in
//! a real gRPC channel while tests use an in-memory fake.

pub mod error;
pub mod passthrough;
pub mod request;
pub mod status;
pub mod transport;

pub use error::{ProbeError, TransportError};
pub use passthrough::Passthrough;
pub use request::HealthCheckRequest;
pub use status::{HealthCheckResult, RawStatus, StatusKind};
pub use transport::Transport;

/// Fully qualified method invoked on the remote server.
pub const HEALTH_CHECK_PATH: &str = "/grpc.health.v1.Health/Check";
