//! Best-effort response decoder.
//!
//! The decoder walks the buffer left to right and stops at the first byte it
//! cannot interpret safely. Whatever was parsed before that point is kept, and
//! the stop position is recorded in [`DecodedResponse::halt`].

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::varint::decode_varint;
use crate::{
    FIELD_ERROR_CODE, FIELD_ERROR_MESSAGE, FIELD_LATENCY, FIELD_STATUS, WIRE_TYPE_LENGTH_DELIMITED,
    WIRE_TYPE_VARINT,
};

/// A single decoded field value.
///
/// `Text` and `Bytes` are both length-delimited on the wire; `Text` is used
/// whenever the payload is valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Varint(u64),
    Text(String),
    Bytes(Vec<u8>),
}

impl WireValue {
    pub fn wire_type(&self) -> u8 {
        match self {
            Self::Varint(_) => WIRE_TYPE_VARINT,
            Self::Text(_) | Self::Bytes(_) => WIRE_TYPE_LENGTH_DELIMITED,
        }
    }

    pub fn as_varint(&self) -> Option<u64> {
        match self {
            Self::Varint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    fn from_payload(data: &[u8]) -> Self {
        match std::str::from_utf8(data) {
            Ok(text) => Self::Text(text.to_owned()),
            Err(_) => Self::Bytes(data.to_vec()),
        }
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Varint(value) => serializer.serialize_u64(*value),
            Self::Text(value) => serializer.serialize_str(value),
            Self::Bytes(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("bytes", &BASE64_STANDARD.encode(value))?;
                map.end()
            }
        }
    }
}

/// Why decoding stopped before the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    /// The buffer ended inside a tag, varint, length prefix, or payload.
    Truncated,
    /// A wire type other than varint or length-delimited.
    UnsupportedWireType { wire_type: u8 },
    /// Field number zero (or one beyond `u32`).
    InvalidFieldNumber,
}

/// Position and reason of an early stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodeHalt {
    /// Offset of the tag that could not be fully consumed.
    pub offset: usize,
    #[serde(flatten)]
    pub reason: HaltReason,
}

/// Generic field mapping plus the semantic health-check projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedResponse {
    pub fields: BTreeMap<u32, WireValue>,
    pub status: Option<u64>,
    pub latency_raw: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub halt: Option<DecodeHalt>,
}

impl DecodedResponse {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, number: u32) -> Option<&WireValue> {
        self.fields.get(&number)
    }

    fn record(&mut self, number: u32, value: WireValue) {
        match (&value, number) {
            (WireValue::Varint(status), FIELD_STATUS) => self.status = Some(*status),
            (WireValue::Text(text), FIELD_LATENCY) => self.latency_raw = Some(text.clone()),
            (WireValue::Text(text), FIELD_ERROR_CODE) => self.error_code = Some(text.clone()),
            (WireValue::Text(text), FIELD_ERROR_MESSAGE) => {
                self.error_message = Some(text.clone())
            }
            _ => {}
        }
        self.fields.insert(number, value);
    }

    fn halt(&mut self, offset: usize, reason: HaltReason) {
        self.halt = Some(DecodeHalt { offset, reason });
    }
}

/// Decode an arbitrary response buffer.
///
/// Never panics and never reads past `buf.len()`. Unknown field numbers are
/// kept in [`DecodedResponse::fields`]; duplicate numbers keep the last value.
pub fn decode(buf: &[u8]) -> DecodedResponse {
    let mut decoded = DecodedResponse::default();
    let mut offset = 0usize;

    while offset < buf.len() {
        let tag_offset = offset;
        let Some((tag, tag_len)) = decode_varint(buf, offset) else {
            decoded.halt(tag_offset, HaltReason::Truncated);
            break;
        };
        offset += tag_len;

        let wire_type = (tag & 0x7) as u8;
        let field_number = match u32::try_from(tag >> 3) {
            Ok(0) | Err(_) => {
                decoded.halt(tag_offset, HaltReason::InvalidFieldNumber);
                break;
            }
            Ok(number) => number,
        };

        match wire_type {
            WIRE_TYPE_VARINT => {
                let Some((value, used)) = decode_varint(buf, offset) else {
                    decoded.halt(tag_offset, HaltReason::Truncated);
                    break;
                };
                offset += used;
                decoded.record(field_number, WireValue::Varint(value));
            }
            WIRE_TYPE_LENGTH_DELIMITED => {
                let Some((length, used)) = decode_varint(buf, offset) else {
                    decoded.halt(tag_offset, HaltReason::Truncated);
                    break;
                };
                offset += used;
                // Payloads running past the buffer are clamped to its end and kept.
                let available = buf.len() - offset;
                let take =
                    usize::try_from(length).map_or(available, |length| length.min(available));
                let end = offset + take;
                decoded.record(field_number, WireValue::from_payload(&buf[offset..end]));
                offset = end;
                if (take as u64) < length {
                    decoded.halt(tag_offset, HaltReason::Truncated);
                    break;
                }
            }
            other => {
                log::warn!(
                    "wire: unsupported wire type {} for field {} at offset {}, {} bytes left undecoded",
                    other,
                    field_number,
                    tag_offset,
                    buf.len() - tag_offset
                );
                decoded.halt(tag_offset, HaltReason::UnsupportedWireType { wire_type: other });
                break;
            }
        }
    }

    if let Some(halt) = decoded.halt {
        log::debug!(
            "wire: decode stopped at offset {} of {} ({:?}), kept {} field(s)",
            halt.offset,
            buf.len(),
            halt.reason,
            decoded.fields.len()
        );
    }
    decoded
}
