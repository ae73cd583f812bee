use bytes::{BufMut, Bytes, BytesMut};

use crate::accumulator::Accumulator;
use crate::decoder::{DecodedUnit, FrameConfig, UnitDecoder};
use crate::error::{FrameError, Result};
use crate::kind::{EVENT, IMAGE, INFO};

/// Frame header: start marker (2) + type (1) + length (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Start marker: 0xFF 0x00.
pub const START_MARKER: [u8; 2] = [0xFF, 0x00];

/// Optional end marker: 0xFF 0xFF.
pub const END_MARKER: [u8; 2] = [0xFF, 0xFF];

/// Which TLV type code carries JSON metadata on a given channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvProfile {
    /// `shooting/liveview/flipdetail`: image + `0x01` info.
    FlipDetail,
    /// `event/monitoring`: `0x02` events.
    EventMonitoring,
}

impl TlvProfile {
    /// The type code decoded as JSON on this channel.
    pub fn metadata_kind(self) -> u8 {
        match self {
            TlvProfile::FlipDetail => INFO,
            TlvProfile::EventMonitoring => EVENT,
        }
    }
}

/// Encode a frame into the wire format, end marker included.
///
/// Wire format:
/// ```text
/// ┌──────────────┬────────┬───────────┬─────────────────┬──────────────┐
/// │ Start (2B)   │ Type   │ Length    │ Payload          │ End (2B)     │
/// │ 0xFF 0x00    │ (1B)   │ (4B BE)   │ (Length bytes)   │ 0xFF 0xFF    │
/// │              │        │           │                  │ (optional)   │
/// └──────────────┴────────┴───────────┴─────────────────┴──────────────┘
/// ```
pub fn encode_frame(kind: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len() + END_MARKER.len());
    dst.put_slice(&START_MARKER);
    dst.put_u8(kind);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    dst.put_slice(&END_MARKER);
    Ok(())
}

/// Decodes `FF 00 <type> <len> <payload> [FF FF]` frames.
///
/// Bytes that do not start a frame are skipped one marker search at a time.
/// An incomplete frame is left in the accumulator untouched, so decoding
/// resumes from its start once more bytes arrive.
#[derive(Debug)]
pub struct TlvDecoder {
    profile: TlvProfile,
    config: FrameConfig,
    // A frame just ended; its optional end marker may still be in flight.
    after_frame: bool,
    frames: u64,
    malformed: u64,
    noise_bytes: u64,
}

impl TlvDecoder {
    pub fn new(profile: TlvProfile) -> Self {
        Self::with_config(profile, FrameConfig::default())
    }

    pub fn with_config(profile: TlvProfile, config: FrameConfig) -> Self {
        Self {
            profile,
            config,
            after_frame: false,
            frames: 0,
            malformed: 0,
            noise_bytes: 0,
        }
    }

    pub fn profile(&self) -> TlvProfile {
        self.profile
    }

    /// Complete frames consumed so far, including dropped malformed ones.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Metadata frames dropped because their payload was not valid JSON.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Bytes skipped while resynchronizing on the start marker.
    pub fn noise_bytes(&self) -> u64 {
        self.noise_bytes
    }

    // Returns false when the buffer cannot yet tell whether an end marker follows.
    fn skip_end_marker(&mut self, acc: &mut Accumulator) -> bool {
        let has_end_marker = match &acc[..] {
            [] | [0xFF] => return false,
            [0xFF, 0xFF, ..] => true,
            _ => false,
        };
        if has_end_marker {
            acc.consume(END_MARKER.len());
        }
        self.after_frame = false;
        true
    }

    fn interpret(&mut self, kind: u8, payload: Bytes) -> Option<DecodedUnit> {
        if kind == IMAGE {
            return Some(DecodedUnit::Image(payload));
        }
        if kind != self.profile.metadata_kind() {
            return Some(DecodedUnit::Unknown { kind, payload });
        }
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(DecodedUnit::Metadata { kind, value }),
            Err(err) => {
                self.malformed += 1;
                tracing::warn!(kind, len = payload.len(), error = %err, "dropping metadata frame with invalid JSON");
                None
            }
        }
    }
}

impl UnitDecoder for TlvDecoder {
    fn name(&self) -> &'static str {
        "tlv"
    }

    fn decode_unit(&mut self, acc: &mut Accumulator) -> Option<DecodedUnit> {
        loop {
            if self.after_frame && !self.skip_end_marker(acc) {
                return None;
            }

            let Some(start) = acc.find(&START_MARKER, 0) else {
                self.noise_bytes += acc.discard_keeping_last(START_MARKER[0]) as u64;
                return None;
            };
            if start > 0 {
                tracing::trace!(skipped = start, "resynchronizing on start marker");
                self.noise_bytes += start as u64;
                acc.consume(start);
            }

            if acc.len() < HEADER_SIZE {
                return None;
            }

            let kind = acc[2];
            let len = u32::from_be_bytes([acc[3], acc[4], acc[5], acc[6]]) as usize;

            if len > self.config.max_payload_size {
                tracing::warn!(
                    kind,
                    len,
                    max = self.config.max_payload_size,
                    "frame length exceeds limit, skipping marker"
                );
                self.noise_bytes += START_MARKER.len() as u64;
                acc.consume(START_MARKER.len());
                continue;
            }

            if acc.len() < HEADER_SIZE + len {
                // Roll back: the partial frame stays buffered from its start.
                return None;
            }

            acc.consume(HEADER_SIZE);
            let payload = acc.split_to(len);
            self.frames += 1;
            self.after_frame = true;

            if let Some(unit) = self.interpret(kind, payload) {
                return Some(unit);
            }
        }
    }

    fn finish(&mut self, acc: &mut Accumulator) -> usize {
        self.after_frame = false;
        let dropped = acc.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding partial frame at end of stream");
        }
        dropped
    }
}
