use bytes::{BufMut, BytesMut};

use crate::accumulator::Accumulator;
use crate::decoder::{DecodedUnit, FrameConfig, UnitDecoder};
use crate::error::{FrameError, Result};

/// Boundary delimiter used by the live view relay (`boundary=frame`).
pub const DEFAULT_BOUNDARY: &str = "--frame";

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";
const IMAGE_START: u8 = 0xFF;

/// Extract the part delimiter from a multipart `Content-Type` header.
///
/// `multipart/x-mixed-replace; boundary=frame` yields `--frame`. Values that
/// already start with `--` are used as-is, as many MJPEG servers declare them
/// that way.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            None
        } else if value.starts_with("--") {
            Some(value.to_string())
        } else {
            Some(format!("--{value}"))
        }
    })
}

/// Write one part: delimiter, headers, blank line, body, CRLF.
pub fn encode_part(boundary: &str, content_type: &str, body: &[u8], dst: &mut BytesMut) {
    let head = format!(
        "{boundary}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    dst.reserve(head.len() + body.len() + 2);
    dst.put_slice(head.as_bytes());
    dst.put_slice(body);
    dst.put_slice(b"\r\n");
}

/// Decodes a `multipart/x-mixed-replace` body into images.
///
/// Every lookup (boundary, header separator, image start) is a byte-pattern
/// search; only the header block is read as text. A part is emitted once its
/// declared `Content-Length` bytes are buffered. Each search resumes where
/// the previous call stopped, so a large part arriving in small chunks is
/// scanned once.
#[derive(Debug)]
pub struct MultipartDecoder {
    boundary: Vec<u8>,
    config: FrameConfig,
    state: PartState,
    parts: u64,
    skipped: u64,
}

// Offsets are relative to the front of the accumulator, where the current
// part's delimiter sits in every state but `Seeking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    Seeking,
    Headers {
        scanned: usize,
    },
    BodyStart {
        body_from: usize,
        length: usize,
        scanned: usize,
    },
    Body {
        body_start: usize,
        length: usize,
    },
    Skipping {
        reason: &'static str,
        scanned: usize,
    },
}

impl MultipartDecoder {
    /// Create a decoder for a delimiter such as `--frame`.
    pub fn new(boundary: &str) -> Result<Self> {
        Self::with_config(boundary, FrameConfig::default())
    }

    pub fn with_config(boundary: &str, config: FrameConfig) -> Result<Self> {
        if boundary.trim().is_empty() || boundary.contains(['\r', '\n']) {
            return Err(FrameError::InvalidBoundary(boundary.to_string()));
        }
        Ok(Self {
            boundary: boundary.as_bytes().to_vec(),
            config,
            state: PartState::Seeking,
            parts: 0,
            skipped: 0,
        })
    }

    /// Parts emitted so far.
    pub fn parts(&self) -> u64 {
        self.parts
    }

    /// Parts skipped because their header block was unusable or their
    /// declared length exceeded the limit.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn skip_part(&mut self, acc: &mut Accumulator, next_boundary: usize, reason: &'static str) {
        tracing::warn!(reason, "skipping multipart part");
        self.skipped += 1;
        self.state = PartState::Seeking;
        acc.consume(next_boundary);
    }

    /// Next delimiter at or after `scanned`, never inside the current one.
    fn next_boundary(&self, acc: &Accumulator, scanned: usize) -> Option<usize> {
        acc.find(
            &self.boundary,
            resume(scanned, self.boundary.len(), self.boundary.len()),
        )
    }
}

impl UnitDecoder for MultipartDecoder {
    fn name(&self) -> &'static str {
        "multipart"
    }

    fn decode_unit(&mut self, acc: &mut Accumulator) -> Option<DecodedUnit> {
        loop {
            match self.state {
                PartState::Seeking => {
                    let Some(start) = acc.find(&self.boundary, 0) else {
                        // Keep a tail that may be the beginning of a split boundary.
                        let keep = acc.len().min(self.boundary.len() - 1);
                        acc.consume(acc.len() - keep);
                        return None;
                    };
                    acc.consume(start);
                    self.state = PartState::Headers {
                        scanned: self.boundary.len(),
                    };
                }
                PartState::Headers { scanned } => {
                    let headers_from = self.boundary.len();
                    let next = self.next_boundary(acc, scanned);
                    let separator = acc.find(
                        HEADER_SEPARATOR,
                        resume(scanned, HEADER_SEPARATOR.len(), headers_from),
                    );
                    let separator = match separator {
                        Some(pos) if next.is_none_or(|next| pos < next) => pos,
                        _ => match next {
                            Some(next) => {
                                let reason = "no header separator before next boundary";
                                self.skip_part(acc, next, reason);
                                continue;
                            }
                            None => {
                                self.state = PartState::Headers { scanned: acc.len() };
                                return None;
                            }
                        },
                    };

                    let Some(length) = content_length(&acc[headers_from..separator]) else {
                        let reason = "missing Content-Length";
                        match next {
                            Some(next) => {
                                self.skip_part(acc, next, reason);
                                continue;
                            }
                            None => {
                                self.state = PartState::Skipping {
                                    reason,
                                    scanned: acc.len(),
                                };
                                return None;
                            }
                        }
                    };

                    if length > self.config.max_payload_size {
                        tracing::warn!(
                            length,
                            max = self.config.max_payload_size,
                            "part length exceeds limit, skipping boundary"
                        );
                        self.skipped += 1;
                        self.state = PartState::Seeking;
                        acc.consume(self.boundary.len());
                        continue;
                    }

                    let body_from = separator + HEADER_SEPARATOR.len();
                    self.state = PartState::BodyStart {
                        body_from,
                        length,
                        scanned: body_from,
                    };
                }
                PartState::BodyStart {
                    body_from,
                    length,
                    scanned,
                } => {
                    let offset = acc
                        .get(scanned..)
                        .and_then(|rest| rest.iter().position(|&b| b == IMAGE_START));
                    if let Some(offset) = offset {
                        self.state = PartState::Body {
                            body_start: scanned + offset,
                            length,
                        };
                        continue;
                    }
                    match self.next_boundary(acc, scanned.max(body_from)) {
                        Some(next) => self.skip_part(acc, next, "no image data in part"),
                        None => {
                            self.state = PartState::BodyStart {
                                body_from,
                                length,
                                scanned: acc.len().max(body_from),
                            };
                            return None;
                        }
                    }
                }
                PartState::Body { body_start, length } => {
                    if acc.len() < body_start + length {
                        return None;
                    }
                    acc.consume(body_start);
                    self.state = PartState::Seeking;
                    self.parts += 1;
                    return Some(DecodedUnit::Image(acc.split_to(length)));
                }
                PartState::Skipping { reason, scanned } => match self.next_boundary(acc, scanned) {
                    Some(next) => self.skip_part(acc, next, reason),
                    None => {
                        self.state = PartState::Skipping {
                            reason,
                            scanned: acc.len(),
                        };
                        return None;
                    }
                },
            }
        }
    }

    fn finish(&mut self, acc: &mut Accumulator) -> usize {
        self.state = PartState::Seeking;
        let dropped = acc.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding partial part at end of stream");
        }
        dropped
    }
}

/// Where to resume a search for a `pattern_len`-byte pattern once
/// `scanned` bytes have been searched without a match.
fn resume(scanned: usize, pattern_len: usize, floor: usize) -> usize {
    scanned.saturating_sub(pattern_len.saturating_sub(1)).max(floor)
}

fn content_length(headers: &[u8]) -> Option<usize> {
    headers
        .split(|&b| b == b'\n')
        .filter_map(|line| std::str::from_utf8(line).ok())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse().ok()
            } else {
                None
            }
        })
}
