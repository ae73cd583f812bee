use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::accumulator::Accumulator;
use crate::decoder::{DecodedUnit, UnitDecoder};
use crate::error::Result;

/// Counters describing one finished dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Chunks fed to the decoder.
    pub chunks: u64,
    /// Bytes fed to the decoder.
    pub bytes: u64,
    /// Units delivered to the callback.
    pub units: u64,
    /// Bytes never decoded: a chunk read after cancellation, or a partial
    /// unit left at end of stream.
    pub discarded_bytes: u64,
    /// Whether the dispatch stopped because of cancellation.
    pub cancelled: bool,
}

/// Drives exactly one decoder against a byte source.
///
/// Units are delivered synchronously: the next chunk is not requested until
/// the callback has returned for every unit of the current one.
pub struct Dispatcher<D> {
    decoder: D,
    acc: Accumulator,
}

impl<D: UnitDecoder> Dispatcher<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            acc: Accumulator::new(),
        }
    }

    /// Borrow the decoder, e.g. to read its counters.
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Consume the dispatcher and return the decoder.
    pub fn into_decoder(self) -> D {
        self.decoder
    }

    /// Run until the source ends, fails, or `cancel` is observed.
    ///
    /// Cancellation is checked before each chunk request and again when the
    /// request completes; a chunk that arrives after cancellation is dropped
    /// undecoded. A source error ends the run with
    /// [`FrameError::Transport`](crate::FrameError::Transport).
    pub async fn run<S, F>(
        &mut self,
        mut source: S,
        cancel: &CancellationToken,
        mut on_unit: F,
    ) -> Result<DispatchSummary>
    where
        S: Stream<Item = ccapi_transport::Result<Bytes>> + Unpin,
        F: FnMut(DecodedUnit),
    {
        let mut summary = DispatchSummary::default();
        tracing::debug!(decoder = self.decoder.name(), "dispatch started");

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let Some(chunk) = source.next().await else {
                break;
            };
            let chunk = chunk?;

            if cancel.is_cancelled() {
                summary.cancelled = true;
                summary.discarded_bytes += chunk.len() as u64;
                break;
            }

            tracing::trace!(len = chunk.len(), buffered = self.acc.len(), "chunk received");
            summary.chunks += 1;
            summary.bytes += chunk.len() as u64;
            self.acc.append(&chunk);

            while let Some(unit) = self.decoder.decode_unit(&mut self.acc) {
                summary.units += 1;
                on_unit(unit);
            }
        }

        summary.discarded_bytes += self.decoder.finish(&mut self.acc) as u64;
        tracing::debug!(
            decoder = self.decoder.name(),
            chunks = summary.chunks,
            units = summary.units,
            cancelled = summary.cancelled,
            "dispatch finished"
        );
        Ok(summary)
    }
}

/// Run `decoder` over `source` once; see [`Dispatcher::run`].
pub async fn dispatch<D, S, F>(
    decoder: D,
    source: S,
    cancel: &CancellationToken,
    on_unit: F,
) -> Result<DispatchSummary>
where
    D: UnitDecoder,
    S: Stream<Item = ccapi_transport::Result<Bytes>> + Unpin,
    F: FnMut(DecodedUnit),
{
    Dispatcher::new(decoder).run(source, cancel, on_unit).await
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::BytesMut;
    use ccapi_transport::{ByteStream, TransportError};

    use super::*;
    use crate::error::FrameError;
    use crate::jpeg::JpegScanner;
    use crate::kind::{IMAGE, INFO};
    use crate::tlv::{encode_frame, TlvDecoder, TlvProfile};

    fn tlv_wire() -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(IMAGE, &[0xFF, 0xD8, 0x00, 0xFF, 0xD9], &mut buf).unwrap();
        encode_frame(INFO, br#"{"frame":1}"#, &mut buf).unwrap();
        encode_frame(IMAGE, &[0xFF, 0xD8, 0x01, 0xFF, 0xD9], &mut buf).unwrap();
        encode_frame(INFO, br#"{"frame":2}"#, &mut buf).unwrap();
        buf.to_vec()
    }

    async fn collect(wire: &[u8], splits: &[usize]) -> Vec<DecodedUnit> {
        let mut chunks = Vec::new();
        let mut last = 0;
        for &at in splits {
            chunks.push(Bytes::copy_from_slice(&wire[last..at]));
            last = at;
        }
        chunks.push(Bytes::copy_from_slice(&wire[last..]));

        let mut units = Vec::new();
        dispatch(
            TlvDecoder::new(TlvProfile::FlipDetail),
            ByteStream::from_chunks(chunks),
            &CancellationToken::new(),
            |unit| units.push(unit),
        )
        .await
        .unwrap();
        units
    }

    #[tokio::test]
    async fn boundary_independence_for_tlv_frames() {
        let wire = tlv_wire();
        let whole = collect(&wire, &[]).await;
        assert_eq!(whole.len(), 4);

        let split_sets: Vec<Vec<usize>> = vec![
            vec![1],
            vec![7],
            vec![3, 9, 10, 11],
            (1..wire.len()).collect(),
            vec![wire.len() / 2, wire.len() - 1],
        ];
        for splits in split_sets {
            assert_eq!(collect(&wire, &splits).await, whole, "splits {splits:?}");
        }
    }

    #[tokio::test]
    async fn summary_counts_chunks_units_and_partial_tail() {
        let mut wire = tlv_wire();
        wire.extend([0xFF, 0x00, IMAGE, 0x00, 0x00, 0x01]);

        let source = ByteStream::from_chunks(wire.chunks(10).map(Bytes::copy_from_slice).collect::<Vec<_>>());
        let mut dispatcher = Dispatcher::new(TlvDecoder::new(TlvProfile::FlipDetail));
        let summary = dispatcher
            .run(source, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(summary.units, 4);
        assert_eq!(summary.bytes, wire.len() as u64);
        assert_eq!(summary.chunks, wire.len().div_ceil(10) as u64);
        assert_eq!(summary.discarded_bytes, 6);
        assert!(!summary.cancelled);
        assert_eq!(dispatcher.decoder().frames(), 4);
    }

    #[tokio::test]
    async fn cancel_before_start_reads_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut seen = 0;
        let summary = dispatch(
            JpegScanner::new(),
            ByteStream::from_chunks([vec![0xFF, 0xD8, 0xFF, 0xD9]]),
            &cancel,
            |_| seen += 1,
        )
        .await
        .unwrap();

        assert_eq!(seen, 0);
        assert_eq!(summary.chunks, 0);
        assert!(summary.cancelled);
    }

    #[tokio::test]
    async fn cancel_from_callback_stops_after_current_chunk() {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let image = [0xFF, 0xD8, 0x42, 0xFF, 0xD9];
        let first_chunk = [image, image].concat();

        let mut seen = 0;
        let summary = dispatch(
            JpegScanner::new(),
            ByteStream::from_chunks([first_chunk, image.to_vec(), image.to_vec()]),
            &cancel,
            |_| {
                seen += 1;
                stop.cancel();
            },
        )
        .await
        .unwrap();

        // Both units of the chunk in hand are delivered; nothing after.
        assert_eq!(seen, 2);
        assert_eq!(summary.chunks, 1);
        assert!(summary.cancelled);
    }

    struct CancelOnRead {
        inner: ByteStream,
        cancel: CancellationToken,
        reads: usize,
        cancel_on: usize,
    }

    impl Stream for CancelOnRead {
        type Item = ccapi_transport::Result<Bytes>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.reads += 1;
            if self.reads == self.cancel_on {
                self.cancel.cancel();
            }
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    #[tokio::test]
    async fn in_flight_chunk_after_cancel_is_discarded() {
        let cancel = CancellationToken::new();
        let image = vec![0xFF, 0xD8, 0x42, 0xFF, 0xD9];
        let source = CancelOnRead {
            inner: ByteStream::from_chunks([image.clone(), image.clone()]),
            cancel: cancel.clone(),
            reads: 0,
            cancel_on: 2,
        };

        let mut seen = 0;
        let summary = dispatch(JpegScanner::new(), source, &cancel, |_| seen += 1)
            .await
            .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(summary.discarded_bytes, image.len() as u64);
        assert!(summary.cancelled);
    }

    #[tokio::test]
    async fn source_error_is_fatal() {
        let source = ByteStream::from_items([
            Ok(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9])),
            Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))),
        ]);

        let mut seen = 0;
        let err = dispatch(JpegScanner::new(), source, &CancellationToken::new(), |_| seen += 1)
            .await
            .unwrap_err();

        assert_eq!(seen, 1);
        assert!(matches!(err, FrameError::Transport(TransportError::Io(_))));
    }
}
