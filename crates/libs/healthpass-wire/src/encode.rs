//! Request encoder.
//!
//! Only `HealthCheckRequest.service` is supported; it is the one field the
//! health-checking contract defines.

use crate::varint::put_varint;
use crate::{make_tag, FIELD_SERVICE, WIRE_TYPE_LENGTH_DELIMITED};

/// Encode a `HealthCheckRequest` for `service`.
///
/// An empty service encodes to an empty buffer, which the server reads as
/// "field absent" and answers with overall server health.
pub fn encode_request(service: &str) -> Vec<u8> {
    if service.is_empty() {
        return Vec::new();
    }
    let mut buf = Vec::with_capacity(service.len() + 3);
    put_varint(&mut buf, make_tag(FIELD_SERVICE, WIRE_TYPE_LENGTH_DELIMITED));
    put_varint(&mut buf, service.len() as u64);
    buf.extend_from_slice(service.as_bytes());
    buf
}
