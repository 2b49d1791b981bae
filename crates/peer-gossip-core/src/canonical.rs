//! Canonical CBOR encoding for clocks, deltas and snapshots.
//!
//! Encoding follows RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! The same frame therefore produces identical bytes on every peer, which
//! keeps golden vectors stable. Decoding is lenient about key order and
//! integer width, and goes through `ciborium`.

use ciborium::value::{Integer, Value};

use crate::clock::VectorClock;
use crate::delta::{DeltaEntry, StateSnapshot};
use crate::error::CoreError;
use crate::types::ActorId;

/// Encode a CBOR value to canonical bytes.
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Decode exactly one CBOR value from `bytes`.
///
/// Input left over after the value is an error: every frame is a single
/// value.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CoreError> {
    let mut cursor = std::io::Cursor::new(bytes);
    let value = ciborium::from_reader(&mut cursor)
        .map_err(|e| CoreError::DecodingError(e.to_string()))?;
    if cursor.position() != bytes.len() as u64 {
        return Err(CoreError::DecodingError("trailing bytes".into()));
    }
    Ok(value)
}

/// Clock as a map of text actor keys to unsigned counters.
pub fn clock_to_value(clock: &VectorClock) -> Value {
    Value::Map(
        clock
            .iter()
            .map(|(actor, counter)| {
                (
                    Value::Text(actor.as_str().to_owned()),
                    Value::Integer(counter.into()),
                )
            })
            .collect(),
    )
}

/// Parse a clock map.
pub fn clock_from_value(value: &Value) -> Result<VectorClock, CoreError> {
    let entries = value
        .as_map()
        .ok_or_else(|| CoreError::MalformedClock("expected map".into()))?;

    let mut pairs = Vec::with_capacity(entries.len());
    for (key, counter) in entries {
        let actor = key
            .as_text()
            .ok_or_else(|| CoreError::MalformedClock("actor key must be text".into()))?;
        let counter = counter
            .as_integer()
            .and_then(|i| u64::try_from(i).ok())
            .ok_or_else(|| {
                CoreError::MalformedClock(format!("counter for {actor} is not an unsigned integer"))
            })?;
        pairs.push((ActorId::from(actor), counter));
    }
    Ok(VectorClock::from_entries(pairs))
}

/// Delta as `[previous_clock, author, payload]`.
pub fn delta_to_value(entry: &DeltaEntry) -> Value {
    Value::Array(vec![
        clock_to_value(&entry.previous_clock),
        Value::Text(entry.author.as_str().to_owned()),
        Value::Bytes(entry.payload.to_vec()),
    ])
}

/// Parse a `[previous_clock, author, payload]` triple.
pub fn delta_from_value(value: &Value) -> Result<DeltaEntry, CoreError> {
    let items = match value.as_array() {
        Some(items) if items.len() == 3 => items,
        _ => return Err(CoreError::MalformedDelta("expected 3-element array".into())),
    };
    let previous_clock = clock_from_value(&items[0])?;
    let author = items[1]
        .as_text()
        .ok_or_else(|| CoreError::MalformedDelta("author must be text".into()))?;
    let payload = items[2]
        .as_bytes()
        .ok_or_else(|| CoreError::MalformedDelta("payload must be a byte string".into()))?;

    let entry = DeltaEntry::new(previous_clock, author, payload.clone());
    entry
        .checked_resulting_clock()
        .map_err(|e| CoreError::MalformedDelta(e.to_string()))?;
    Ok(entry)
}

/// Snapshot as `[clock, state]`.
pub fn snapshot_to_value(snapshot: &StateSnapshot) -> Value {
    Value::Array(vec![
        clock_to_value(&snapshot.clock),
        Value::Bytes(snapshot.state.to_vec()),
    ])
}

/// Parse a `[clock, state]` pair.
pub fn snapshot_from_value(value: &Value) -> Result<StateSnapshot, CoreError> {
    let items = match value.as_array() {
        Some(items) if items.len() == 2 => items,
        _ => {
            return Err(CoreError::MalformedSnapshot(
                "expected 2-element array".into(),
            ))
        }
    };
    let clock = clock_from_value(&items[0])?;
    let state = items[1]
        .as_bytes()
        .ok_or_else(|| CoreError::MalformedSnapshot("state must be a byte string".into()))?;
    Ok(StateSnapshot::new(clock, state.clone()))
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => {
            return Err(CoreError::EncodingError(
                "unsupported CBOR value type".into(),
            ))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 0x1_0000_0000);
        assert_eq!(buf, vec![0x1b, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_clock_encoding_is_canonical() {
        // "BB" sorts after "C" by encoded bytes (length prefix first).
        let clock = VectorClock::from_entries([("BB", 1), ("C", 2)]);
        let bytes = encode_canonical(&clock_to_value(&clock)).unwrap();
        assert_eq!(bytes, vec![0xa2, 0x61, b'C', 0x02, 0x62, b'B', b'B', 0x01]);
    }

    #[test]
    fn test_clock_decoding_accepts_any_key_order() {
        let value = Value::Map(vec![
            (Value::Text("B".into()), Value::Integer(2.into())),
            (Value::Text("A".into()), Value::Integer(1.into())),
        ]);
        let clock = clock_from_value(&value).unwrap();
        assert_eq!(clock, VectorClock::from_entries([("A", 1), ("B", 2)]));
    }

    #[test]
    fn test_clock_rejects_negative_counter() {
        let value = Value::Map(vec![(Value::Text("A".into()), Value::Integer((-1).into()))]);
        assert!(matches!(
            clock_from_value(&value),
            Err(CoreError::MalformedClock(_))
        ));
    }

    #[test]
    fn test_clock_rejects_non_text_key() {
        let value = Value::Map(vec![(Value::Integer(1.into()), Value::Integer(1.into()))]);
        assert!(clock_from_value(&value).is_err());
    }

    #[test]
    fn test_delta_value_shape() {
        let entry = DeltaEntry::new(VectorClock::new(), "A", vec![0xff]);
        let bytes = encode_canonical(&delta_to_value(&entry)).unwrap();
        assert_eq!(bytes, vec![0x83, 0xa0, 0x61, b'A', 0x41, 0xff]);

        let decoded = delta_from_value(&decode_value(&bytes).unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_delta_rejects_wrong_arity() {
        let value = Value::Array(vec![Value::Map(vec![]), Value::Text("A".into())]);
        assert!(matches!(
            delta_from_value(&value),
            Err(CoreError::MalformedDelta(_))
        ));
    }

    #[test]
    fn test_floats_rejected() {
        assert!(encode_canonical(&Value::Float(1.5)).is_err());
    }

    #[test]
    fn test_delta_rejects_exhausted_author_counter() {
        let entry = DeltaEntry::new(VectorClock::from_entries([("A", u64::MAX)]), "A", vec![1]);
        let value = delta_to_value(&entry);
        assert!(matches!(
            delta_from_value(&value),
            Err(CoreError::MalformedDelta(_))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        assert!(decode_value(&[0xa0]).is_ok());
        assert!(matches!(
            decode_value(&[0xa0, 0x00]),
            Err(CoreError::DecodingError(msg)) if msg == "trailing bytes"
        ));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_value(&[0xff, 0x00]),
            Err(CoreError::DecodingError(_))
        ));
    }
}
