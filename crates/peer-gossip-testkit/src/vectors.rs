//! Golden test vectors for the wire codec.
//!
//! These vectors pin the exact bytes of every frame shape, so that other
//! implementations of the protocol can check themselves against this one.

use bytes::Bytes;

use peer_gossip_core::{DeltaEntry, StateSnapshot, VectorClock};
use peer_gossip_sync::{codec, OutboundFrame, Presentation};

/// A frame with its expected encoding.
#[derive(Debug, Clone)]
pub enum VectorFrame {
    Outbound(OutboundFrame),
    Presentation(Presentation),
}

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct FrameVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub frame: VectorFrame,
    /// Expected canonical CBOR (hex).
    pub expected_hex: &'static str,
}

impl FrameVector {
    /// Encode the frame with the reference codec.
    pub fn encode(&self) -> peer_gossip_sync::Result<Vec<u8>> {
        match &self.frame {
            VectorFrame::Outbound(frame) => codec::encode_frame(frame),
            VectorFrame::Presentation(p) => codec::encode_presentation(p),
        }
    }
}

fn a1() -> VectorClock {
    VectorClock::from_entries([("A", 1)])
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<FrameVector> {
    vec![
        FrameVector {
            name: "clock announcement",
            frame: VectorFrame::Outbound(OutboundFrame::ClockOnly(a1())),
            expected_hex: "82f681a1614101",
        },
        FrameVector {
            name: "snapshot with empty state",
            frame: VectorFrame::Outbound(OutboundFrame::Snapshot(StateSnapshot::new(
                a1(),
                Bytes::new(),
            ))),
            expected_hex: "82f682a161410140",
        },
        FrameVector {
            name: "single first delta",
            frame: VectorFrame::Outbound(OutboundFrame::delta(DeltaEntry::new(
                VectorClock::new(),
                "A",
                Bytes::from_static(&[0xff]),
            ))),
            expected_hex: "8183a0614141ff",
        },
        FrameVector {
            name: "empty delta batch",
            frame: VectorFrame::Outbound(OutboundFrame::Deltas(vec![])),
            expected_hex: "80",
        },
        FrameVector {
            name: "bare presentation",
            frame: VectorFrame::Presentation(Presentation::default()),
            expected_hex: "83f6f4f4",
        },
        FrameVector {
            name: "lazy presentation with clock",
            frame: VectorFrame::Presentation(Presentation::lazy(Some(
                VectorClock::from_entries([("B", 1)]),
            ))),
            expected_hex: "83a1614201f5f4",
        },
        FrameVector {
            name: "eager presentation without clock",
            frame: VectorFrame::Presentation(Presentation::eager(None)),
            expected_hex: "83f6f4f5",
        },
    ]
}

/// Encode every vector and compare with the expected bytes.
///
/// Returns `(name, matches, actual_hex)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = match v.encode() {
                Ok(bytes) => hex::encode(bytes),
                Err(e) => format!("<{e}>"),
            };
            (v.name.to_string(), hex == v.expected_hex, hex)
        })
        .collect()
}
