//! Wire codec for push protocol frames.
//!
//! Frames are CBOR arrays (canonical encoding from the core crate):
//!
//! ```text
//! Presentation  [clock | null, start_lazy, start_eager]
//! Deltas        [[previous_clock, author, payload], ...]
//! Snapshot      [null, [clock, state]]
//! ClockOnly     [null, [clock]]
//! ```
//!
//! Missing or null Presentation flags decode as `false`.

use ciborium::value::Value;

use peer_gossip_core::canonical::{
    clock_from_value, clock_to_value, delta_from_value, delta_to_value, snapshot_from_value,
    snapshot_to_value,
};
use peer_gossip_core::{decode_value, encode_canonical};

use crate::error::{Result, SyncError};
use crate::messages::{OutboundFrame, Presentation};

/// Encode a Presentation frame.
pub fn encode_presentation(presentation: &Presentation) -> Result<Vec<u8>> {
    let clock = match &presentation.remote_clock {
        Some(clock) => clock_to_value(clock),
        None => Value::Null,
    };
    let value = Value::Array(vec![
        clock,
        Value::Bool(presentation.start_lazy),
        Value::Bool(presentation.start_eager),
    ]);
    Ok(encode_canonical(&value)?)
}

/// Decode a Presentation frame and check its limits.
pub fn decode_presentation(bytes: &[u8]) -> Result<Presentation> {
    let value = decode_value(bytes)?;
    let items = match value.as_array() {
        Some(items) if !items.is_empty() && items.len() <= 3 => items,
        _ => {
            return Err(SyncError::Decode(
                "presentation must be an array of 1 to 3 items".into(),
            ))
        }
    };

    let remote_clock = match &items[0] {
        Value::Null => None,
        other => Some(clock_from_value(other)?),
    };

    let presentation = Presentation {
        remote_clock,
        start_lazy: flag(items.get(1), "start_lazy")?,
        start_eager: flag(items.get(2), "start_eager")?,
    };
    presentation
        .validate_limits()
        .map_err(|reason| SyncError::InvalidMessage(reason.into()))?;
    Ok(presentation)
}

/// Encode an outbound frame.
pub fn encode_frame(frame: &OutboundFrame) -> Result<Vec<u8>> {
    let value = match frame {
        OutboundFrame::Deltas(deltas) => Value::Array(deltas.iter().map(delta_to_value).collect()),
        OutboundFrame::Snapshot(snapshot) => {
            Value::Array(vec![Value::Null, snapshot_to_value(snapshot)])
        }
        OutboundFrame::ClockOnly(clock) => Value::Array(vec![
            Value::Null,
            Value::Array(vec![clock_to_value(clock)]),
        ]),
    };
    Ok(encode_canonical(&value)?)
}

/// Decode an outbound frame, as the receiving peer does.
pub fn decode_frame(bytes: &[u8]) -> Result<OutboundFrame> {
    let value = decode_value(bytes)?;
    let items = value
        .as_array()
        .ok_or_else(|| SyncError::Decode("frame must be an array".into()))?;

    let frame = match items.first() {
        Some(Value::Null) => {
            let body = match items.get(1).and_then(Value::as_array) {
                Some(body) if items.len() == 2 => body,
                _ => return Err(SyncError::Decode("malformed clock frame".into())),
            };
            match body.len() {
                1 => OutboundFrame::ClockOnly(clock_from_value(&body[0])?),
                2 => OutboundFrame::Snapshot(snapshot_from_value(&items[1])?),
                n => {
                    return Err(SyncError::Decode(format!(
                        "clock frame body has {n} items"
                    )))
                }
            }
        }
        _ => OutboundFrame::Deltas(
            items
                .iter()
                .map(delta_from_value)
                .collect::<std::result::Result<Vec<_>, _>>()?,
        ),
    };

    frame
        .validate_limits()
        .map_err(|reason| SyncError::InvalidMessage(reason.into()))?;
    Ok(frame)
}

fn flag(value: Option<&Value>, name: &str) -> Result<bool> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(SyncError::Decode(format!("{name} must be a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peer_gossip_core::{DeltaEntry, StateSnapshot, VectorClock};

    #[test]
    fn test_clock_only_bytes() {
        let frame = OutboundFrame::ClockOnly(VectorClock::from_entries([("A", 1)]));
        let bytes = encode_frame(&frame).unwrap();
        assert_eq!(bytes, vec![0x82, 0xf6, 0x81, 0xa1, 0x61, b'A', 0x01]);
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_snapshot_and_clock_only_are_distinguished() {
        let clock = VectorClock::from_entries([("A", 2)]);
        let snapshot = OutboundFrame::Snapshot(StateSnapshot::new(clock.clone(), vec![9, 9]));
        let decoded = decode_frame(&encode_frame(&snapshot).unwrap()).unwrap();
        assert_eq!(decoded, snapshot);

        let announce = OutboundFrame::ClockOnly(clock);
        let decoded = decode_frame(&encode_frame(&announce).unwrap()).unwrap();
        assert_eq!(decoded, announce);
    }

    #[test]
    fn test_empty_deltas_frame() {
        let bytes = encode_frame(&OutboundFrame::Deltas(vec![])).unwrap();
        assert_eq!(bytes, vec![0x80]);
        assert_eq!(decode_frame(&bytes).unwrap(), OutboundFrame::Deltas(vec![]));
    }

    #[test]
    fn test_deltas_frame_batches() {
        let prev = VectorClock::from_entries([("A", 1)]);
        let frame = OutboundFrame::Deltas(vec![
            DeltaEntry::new(VectorClock::new(), "A", vec![1]),
            DeltaEntry::new(prev, "A", vec![2]),
        ]);
        assert_eq!(decode_frame(&encode_frame(&frame).unwrap()).unwrap(), frame);
    }

    #[test]
    fn test_presentation_bytes() {
        let bytes = encode_presentation(&Presentation::default()).unwrap();
        assert_eq!(bytes, vec![0x83, 0xf6, 0xf4, 0xf4]);

        let lazy = Presentation::lazy(Some(VectorClock::from_entries([("B", 1)])));
        let bytes = encode_presentation(&lazy).unwrap();
        assert_eq!(
            bytes,
            vec![0x83, 0xa1, 0x61, b'B', 0x01, 0xf5, 0xf4]
        );
        assert_eq!(decode_presentation(&bytes).unwrap(), lazy);
    }

    #[test]
    fn test_presentation_missing_flags_default_to_false() {
        // [ {"A": 1} ]
        let bytes = [0x81, 0xa1, 0x61, b'A', 0x01];
        let presentation = decode_presentation(&bytes).unwrap();
        assert_eq!(
            presentation,
            Presentation::clock(VectorClock::from_entries([("A", 1)]))
        );

        // [null, null, true]
        let bytes = [0x83, 0xf6, 0xf6, 0xf5];
        assert_eq!(
            decode_presentation(&bytes).unwrap(),
            Presentation::eager(None)
        );
    }

    #[test]
    fn test_presentation_rejects_malformed() {
        // not an array
        assert!(matches!(
            decode_presentation(&[0x01]),
            Err(SyncError::Decode(_))
        ));
        // flag is a string
        assert!(matches!(
            decode_presentation(&[0x82, 0xf6, 0x61, b'x']),
            Err(SyncError::Decode(_))
        ));
        // truncated input
        assert!(decode_presentation(&[0x83, 0xf6]).is_err());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let lazy = Presentation::lazy(Some(VectorClock::from_entries([("A", 1)])));
        let mut bytes = encode_presentation(&lazy).unwrap();
        bytes.extend_from_slice(&[0xff, 0xff, 0x00, 0x13]);
        assert!(matches!(
            decode_presentation(&bytes),
            Err(SyncError::Decode(_))
        ));

        let announce = OutboundFrame::ClockOnly(VectorClock::from_entries([("A", 1)]));
        let mut bytes = encode_frame(&announce).unwrap();
        bytes.push(0xff);
        assert!(matches!(decode_frame(&bytes), Err(SyncError::Decode(_))));
    }

    #[test]
    fn test_delta_with_exhausted_counter_is_rejected() {
        let entry = DeltaEntry::new(VectorClock::from_entries([("A", u64::MAX)]), "A", vec![1]);
        let bytes = encode_frame(&OutboundFrame::delta(entry)).unwrap();
        assert!(matches!(decode_frame(&bytes), Err(SyncError::Decode(_))));
    }

    #[test]
    fn test_frame_rejects_bad_clock_body() {
        // [null, [{"A": 1}, h'00', h'00']]
        let bytes = [0x82, 0xf6, 0x83, 0xa1, 0x61, b'A', 0x01, 0x41, 0x00, 0x41, 0x00];
        assert!(matches!(decode_frame(&bytes), Err(SyncError::Decode(_))));
    }
}
