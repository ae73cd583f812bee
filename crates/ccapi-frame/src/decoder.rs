use bytes::Bytes;

use crate::accumulator::Accumulator;
use crate::kind::{kind_name, IMAGE};

/// Default maximum payload (or buffered image) size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration shared by the decoders.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest payload a decoder will buffer. Frames declaring more are
    /// skipped and the decoder resynchronizes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// One complete application-level unit extracted from a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedUnit {
    /// Image bytes, sliced by framing rules only (never decoded).
    Image(Bytes),
    /// Parsed JSON metadata and the type code that carried it.
    Metadata {
        kind: u8,
        value: serde_json::Value,
    },
    /// A TLV frame with a type code the channel does not interpret.
    Unknown { kind: u8, payload: Bytes },
}

impl DecodedUnit {
    /// The wire type code of this unit.
    pub fn kind(&self) -> u8 {
        match self {
            DecodedUnit::Image(_) => IMAGE,
            DecodedUnit::Metadata { kind, .. } | DecodedUnit::Unknown { kind, .. } => *kind,
        }
    }

    /// Human-readable name of the unit's type.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DecodedUnit::Unknown { .. } => "UNKNOWN",
            other => kind_name(other.kind()),
        }
    }

    /// Image bytes, if this unit is an image.
    pub fn as_image(&self) -> Option<&Bytes> {
        match self {
            DecodedUnit::Image(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Metadata value, if this unit is metadata.
    pub fn as_metadata(&self) -> Option<&serde_json::Value> {
        match self {
            DecodedUnit::Metadata { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// A framing discipline that extracts units from an [`Accumulator`].
///
/// Implementations consume exactly the bytes of every unit they return
/// (plus any noise they skip) and leave an incomplete trailing unit
/// untouched for the next call.
pub trait UnitDecoder {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extract the next complete unit, or `None` when more bytes are needed.
    fn decode_unit(&mut self, acc: &mut Accumulator) -> Option<DecodedUnit>;

    /// Extract every unit currently available, in stream order.
    fn decode_available(&mut self, acc: &mut Accumulator) -> Vec<DecodedUnit> {
        let mut units = Vec::new();
        while let Some(unit) = self.decode_unit(acc) {
            units.push(unit);
        }
        units
    }

    /// The stream ended: discard any partial unit. Returns bytes dropped.
    ///
    /// A producer closing mid-frame is an expected race, not an error.
    fn finish(&mut self, acc: &mut Accumulator) -> usize {
        let dropped = acc.clear();
        if dropped > 0 {
            tracing::debug!(decoder = self.name(), dropped, "discarding partial unit at end of stream");
        }
        dropped
    }
}

impl<D: UnitDecoder + ?Sized> UnitDecoder for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn decode_unit(&mut self, acc: &mut Accumulator) -> Option<DecodedUnit> {
        (**self).decode_unit(acc)
    }

    fn finish(&mut self, acc: &mut Accumulator) -> usize {
        (**self).finish(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{EVENT, INFO};

    #[test]
    fn unit_kind_accessors() {
        let image = DecodedUnit::Image(Bytes::from_static(&[0xFF, 0xD8]));
        assert_eq!(image.kind(), IMAGE);
        assert_eq!(image.kind_name(), "IMAGE");
        assert!(image.as_image().is_some());
        assert!(image.as_metadata().is_none());

        let info = DecodedUnit::Metadata {
            kind: INFO,
            value: serde_json::json!({"a": 1}),
        };
        assert_eq!(info.kind(), INFO);
        assert_eq!(info.kind_name(), "INFO");
        assert_eq!(info.as_metadata(), Some(&serde_json::json!({"a": 1})));

        let unknown = DecodedUnit::Unknown {
            kind: EVENT,
            payload: Bytes::from_static(b"{}"),
        };
        assert_eq!(unknown.kind(), EVENT);
        assert_eq!(unknown.kind_name(), "UNKNOWN");
    }

    #[test]
    fn default_config_uses_default_max_payload() {
        assert_eq!(FrameConfig::default().max_payload_size, DEFAULT_MAX_PAYLOAD);
    }
}
