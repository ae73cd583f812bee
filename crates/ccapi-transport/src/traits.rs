use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;

use crate::error::{Result, TransportError};

type HttpBody = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// An asynchronous source of byte chunks, consumed as a `Stream`.
///
/// This is the fundamental input type handed to the streaming dispatcher.
/// Chunk boundaries carry no meaning: a frame may be split anywhere.
pub struct ByteStream {
    inner: ByteStreamInner,
    content_type: Option<String>,
}

enum ByteStreamInner {
    Http(HttpBody),
    Memory(VecDeque<Result<Bytes>>),
}

impl Stream for ByteStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.inner {
            ByteStreamInner::Http(body) => body
                .as_mut()
                .poll_next(cx)
                .map(|item| item.map(|chunk| chunk.map_err(TransportError::from))),
            ByteStreamInner::Memory(chunks) => Poll::Ready(chunks.pop_front()),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            ByteStreamInner::Http(body) => body.size_hint(),
            ByteStreamInner::Memory(chunks) => (chunks.len(), Some(chunks.len())),
        }
    }
}

impl ByteStream {
    /// Wrap a live HTTP response body.
    pub(crate) fn from_http(body: HttpBody, content_type: Option<String>) -> Self {
        Self {
            inner: ByteStreamInner::Http(body),
            content_type,
        }
    }

    /// Create a stream that yields the given chunks in order, then ends.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self::from_items(chunks.into_iter().map(|chunk| Ok(chunk.into())))
    }

    /// Create a stream from explicit chunk results, e.g. to inject a read failure.
    pub fn from_items(items: impl IntoIterator<Item = Result<Bytes>>) -> Self {
        Self {
            inner: ByteStreamInner::Memory(items.into_iter().collect()),
            content_type: None,
        }
    }

    /// Attach a content type, as a response header would.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The `Content-Type` the source declared, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            ByteStreamInner::Http(_) => "http",
            ByteStreamInner::Memory(_) => "memory",
        };
        f.debug_struct("ByteStream")
            .field("type", &kind)
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn memory_stream_yields_chunks_in_order() {
        let mut stream = ByteStream::from_chunks([&b"ab"[..], &b"cd"[..], &b"e"[..]]);

        assert_eq!(stream.size_hint(), (3, Some(3)));
        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"ab");
        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"cd");
        assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), b"e");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn injected_error_is_surfaced() {
        let mut stream = ByteStream::from_items([
            Ok(Bytes::from_static(b"ok")),
            Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))),
        ]);

        assert!(stream.next().await.unwrap().is_ok());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset));
    }

    #[test]
    fn content_type_is_attached() {
        let stream = ByteStream::from_chunks(Vec::<Bytes>::new())
            .with_content_type("multipart/x-mixed-replace; boundary=frame");
        assert_eq!(
            stream.content_type(),
            Some("multipart/x-mixed-replace; boundary=frame")
        );
        assert!(format!("{stream:?}").contains("memory"));
    }
}
