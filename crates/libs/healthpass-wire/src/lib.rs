//! # healthpass-wire
//!
//! Schema-less protobuf wire codec for the gRPC health-checking protocol.
//!
//! The encoder produces a `HealthCheckRequest` without a compiled schema; the
//! decoder turns any response buffer into a generic field mapping plus the
//! handful of semantic fields a health check cares about. Decoding never fails:
//! malformed input only shortens the result.
//!
//! ## Wire format
//!
//! ```text
//! [tag:varint][value]...      tag = (field_number << 3) | wire_type
//!  wire_type 0 -> varint
//!  wire_type 2 -> [length:varint][bytes:length]
//! ```
//!
//! ## Example
//!
//! ```rust
//! use healthpass_wire::{decode, encode_request};
//!
//! assert_eq!(encode_request("OK"), vec![0x0a, 0x02, 0x4f, 0x4b]);
//!
//! let decoded = decode(&[0x08, 0x01]);
//! assert_eq!(decoded.status, Some(1));
//! ```

pub mod decode;
pub mod encode;
pub mod varint;

pub use decode::{decode, DecodeHalt, DecodedResponse, HaltReason, WireValue};
pub use encode::encode_request;
pub use varint::{decode_varint, encode_varint, put_varint, MAX_VARINT_LEN};

/// Wire type for base-128 varints.
pub const WIRE_TYPE_VARINT: u8 = 0;

/// Wire type for length-prefixed byte strings.
pub const WIRE_TYPE_LENGTH_DELIMITED: u8 = 2;

/// `HealthCheckResponse.status`
pub const FIELD_STATUS: u32 = 1;
/// Latency as reported by health servers that extend the response.
pub const FIELD_LATENCY: u32 = 2;
/// Error code string from extended health servers.
pub const FIELD_ERROR_CODE: u32 = 4;
/// Error message string from extended health servers.
pub const FIELD_ERROR_MESSAGE: u32 = 5;

/// `HealthCheckRequest.service`
pub const FIELD_SERVICE: u32 = 1;

/// Builds a tag from a field number and wire type.
pub const fn make_tag(field_number: u32, wire_type: u8) -> u64 {
    ((field_number as u64) << 3) | (wire_type as u64 & 0x7)
}
