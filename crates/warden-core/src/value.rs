// SPDX-License-Identifier: Apache-2.0

//! Scalar cell values returned by query execution
//!
//! Byte strings coming off the wire are ambiguous: a `BINARY(16)` UUID column
//! and a `CHAR(16)` text column look the same at the driver level. The
//! [`decode_byte_string`] heuristic settles it without column metadata:
//!
//! - exactly 16 bytes, not all zero, and at most 12 of them printable ASCII
//!   (32..=126): rendered as a lowercase hyphenated UUID
//! - anything else: decoded as text, invalid UTF-8 replaced
//!
//! False positives (16 mostly-binary bytes that were not a UUID) and false
//! negatives (a UUID whose bytes happen to be mostly printable) are accepted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const UUID_LEN: usize = 16;
const MAX_PRINTABLE_IN_UUID: usize = 12;

/// A single typed cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl Value {
    /// Decodes a raw byte-string cell, applying the UUID heuristic.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Value::Text(decode_byte_string(bytes))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

/// Returns true when a byte string should be presented as a binary UUID.
pub fn looks_like_binary_uuid(bytes: &[u8]) -> bool {
    if bytes.len() != UUID_LEN {
        return false;
    }
    if bytes.iter().all(|b| *b == 0) {
        return false;
    }

    let printable = bytes.iter().filter(|b| (32..=126).contains(*b)).count();
    printable <= MAX_PRINTABLE_IN_UUID
}

/// Renders a byte-string cell as text: UUID form when it looks like a binary
/// UUID, otherwise the bytes as (lossy) UTF-8.
pub fn decode_byte_string(bytes: &[u8]) -> String {
    if looks_like_binary_uuid(bytes) {
        if let Ok(uuid) = Uuid::from_slice(bytes) {
            return uuid.hyphenated().to_string();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_uuid_renders_hyphenated_lowercase() {
        let bytes = [
            0x55, 0x0e, 0x84, 0x00, 0xe2, 0x9b, 0x41, 0xd4, 0xa7, 0x16, 0x44, 0x66, 0x55, 0x44,
            0x00, 0x00,
        ];
        assert!(looks_like_binary_uuid(&bytes));
        assert_eq!(
            decode_byte_string(&bytes),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn all_zero_sixteen_bytes_stay_text() {
        let bytes = [0u8; 16];
        assert!(!looks_like_binary_uuid(&bytes));
        assert_eq!(decode_byte_string(&bytes), "\0".repeat(16));
    }

    #[test]
    fn mostly_printable_sixteen_bytes_stay_text() {
        // 13 printable + 3 control bytes
        let mut bytes = *b"ABCDEFGHIJKLM\x01\x02\x03";
        assert!(!looks_like_binary_uuid(&bytes));

        // exactly 12 printable tips it over to UUID
        bytes[12] = 0x04;
        assert!(looks_like_binary_uuid(&bytes));
        assert_eq!(
            decode_byte_string(&bytes),
            "41424344-4546-4748-494a-4b4c04010203"
        );
    }

    #[test]
    fn plain_sixteen_char_text_stays_text() {
        assert_eq!(decode_byte_string(b"order-0000000042"), "order-0000000042");
    }

    #[test]
    fn other_lengths_are_text() {
        assert_eq!(decode_byte_string(b"hello"), "hello");
        let seventeen = [0xffu8; 17];
        assert!(!looks_like_binary_uuid(&seventeen));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let decoded = decode_byte_string(&[b'o', b'k', 0xff]);
        assert_eq!(decoded, "ok\u{fffd}");
    }

    #[test]
    fn values_serialize_as_plain_json() {
        let row = vec![
            Value::Int(1),
            Value::UInt(u64::MAX),
            Value::Null,
            Value::from("x"),
            Value::Bool(true),
            Value::Json(serde_json::json!({"a": 1})),
        ];
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"[1,18446744073709551615,null,"x",true,{"a":1}]"#
        );
    }
}
