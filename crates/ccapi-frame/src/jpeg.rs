use crate::accumulator::Accumulator;
use crate::decoder::{DecodedUnit, FrameConfig, UnitDecoder};

/// JPEG start-of-image marker.
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Extracts back-to-back JPEGs from a stream without length prefixes.
///
/// Used for the live view scroll channel. Only SOI/EOI are inspected; the
/// image content is never decoded. Bytes before an SOI are noise.
#[derive(Debug)]
pub struct JpegScanner {
    config: FrameConfig,
    // Offset to resume the EOI search from; 0 means no SOI is anchored yet.
    scan_from: usize,
    images: u64,
    dropped: u64,
}

impl JpegScanner {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            scan_from: 0,
            images: 0,
            dropped: 0,
        }
    }

    /// Images emitted so far.
    pub fn images(&self) -> u64 {
        self.images
    }

    /// Images abandoned because they grew past the size limit.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for JpegScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitDecoder for JpegScanner {
    fn name(&self) -> &'static str {
        "jpeg"
    }

    fn decode_unit(&mut self, acc: &mut Accumulator) -> Option<DecodedUnit> {
        loop {
            if self.scan_from == 0 {
                let Some(start) = acc.find(&SOI, 0) else {
                    acc.discard_keeping_last(SOI[0]);
                    return None;
                };
                acc.consume(start);
                self.scan_from = SOI.len();
            }

            if let Some(end) = acc.find(&EOI, self.scan_from) {
                self.scan_from = 0;
                self.images += 1;
                return Some(DecodedUnit::Image(acc.split_to(end + EOI.len())));
            }

            if acc.len() > self.config.max_payload_size {
                tracing::warn!(
                    buffered = acc.len(),
                    max = self.config.max_payload_size,
                    "no end of image within limit, resynchronizing"
                );
                self.dropped += 1;
                self.scan_from = 0;
                acc.discard_keeping_last(SOI[0]);
                continue;
            }

            // An EOI may straddle the chunk boundary: re-check the last byte.
            self.scan_from = acc.len().saturating_sub(1).max(SOI.len());
            return None;
        }
    }

    fn finish(&mut self, acc: &mut Accumulator) -> usize {
        self.scan_from = 0;
        let dropped = acc.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding partial image at end of stream");
        }
        dropped
    }
}
