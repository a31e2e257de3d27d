//! Daemon side of the health-check passthrough: configuration, the HTTP
//! surface, and the gRPC transport.

pub mod config;
pub mod http;
pub mod transport;

pub use config::{ConfigError, DaemonConfig};
pub use http::CorsPolicy;
pub use transport::GrpcTransport;
