use bytes::Bytes;
use ccapi_frame::{
    boundary_from_content_type, dispatch, DecodedUnit, DispatchSummary, JpegScanner,
    MultipartDecoder, TlvDecoder, TlvProfile, DEFAULT_BOUNDARY,
};
use ccapi_transport::ByteStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::endpoint::HttpMethod;
use crate::error::{Result, SessionError};
use crate::session::Session;

/// What the flip detail channel is asked to send (`?kind=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDetailKind {
    Info,
    Image,
    Both,
}

impl FlipDetailKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlipDetailKind::Info => "info",
            FlipDetailKind::Image => "image",
            FlipDetailKind::Both => "both",
        }
    }

    fn wants_image(self) -> bool {
        matches!(self, FlipDetailKind::Image | FlipDetailKind::Both)
    }

    fn wants_info(self) -> bool {
        matches!(self, FlipDetailKind::Info | FlipDetailKind::Both)
    }
}

/// One on-demand flip detail result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlipDetail {
    pub image: Option<Bytes>,
    pub info: Option<Value>,
}

impl FlipDetail {
    fn satisfies(&self, kind: FlipDetailKind) -> bool {
        (!kind.wants_image() || self.image.is_some()) && (!kind.wants_info() || self.info.is_some())
    }
}

impl Session {
    /// Open a streaming GET on a named endpoint.
    ///
    /// A device rejection (busy, mode not supported) is reported here as
    /// [`SessionError::Device`].
    pub async fn open(&self, name: &str, query: &[(&str, &str)]) -> Result<ByteStream> {
        let endpoint = self.endpoint_for(name, HttpMethod::Get)?;
        self.transport()
            .open_stream(&endpoint.path, query)
            .await
            .map_err(SessionError::from_transport)
    }

    /// Stream live view scroll JPEGs until the body ends or `cancel` fires.
    pub async fn stream_scroll<F>(&self, cancel: &CancellationToken, mut on_image: F) -> Result<DispatchSummary>
    where
        F: FnMut(Bytes),
    {
        let source = self.open("shooting/liveview/scroll", &[]).await?;
        let decoder = JpegScanner::with_config(self.config().frame.clone());
        let summary = dispatch(decoder, source, cancel, |unit| {
            if let DecodedUnit::Image(image) = unit {
                on_image(image);
            }
        })
        .await?;
        Ok(summary)
    }

    /// Stream flip detail units (images and info metadata).
    pub async fn stream_flip_detail<F>(
        &self,
        kind: FlipDetailKind,
        cancel: &CancellationToken,
        on_unit: F,
    ) -> Result<DispatchSummary>
    where
        F: FnMut(DecodedUnit),
    {
        let source = self
            .open("shooting/liveview/flipdetail", &[("kind", kind.as_str())])
            .await?;
        let decoder = TlvDecoder::with_config(TlvProfile::FlipDetail, self.config().frame.clone());
        Ok(dispatch(decoder, source, cancel, on_unit).await?)
    }

    /// Fetch a single flip detail result and close the stream.
    ///
    /// Returns [`SessionError::Incomplete`] if the body ends before the
    /// requested parts arrived.
    pub async fn flip_detail_once(&self, kind: FlipDetailKind) -> Result<FlipDetail> {
        let cancel = CancellationToken::new();
        let mut detail = FlipDetail::default();

        self.stream_flip_detail(kind, &cancel, |unit| {
            match unit {
                DecodedUnit::Image(image) if kind.wants_image() && detail.image.is_none() => {
                    detail.image = Some(image);
                }
                DecodedUnit::Metadata { value, .. } if kind.wants_info() && detail.info.is_none() => {
                    detail.info = Some(value);
                }
                other => tracing::trace!(kind = other.kind_name(), "ignoring flip detail unit"),
            }
            if detail.satisfies(kind) {
                cancel.cancel();
            }
        })
        .await?;

        if detail.satisfies(kind) {
            Ok(detail)
        } else {
            Err(SessionError::Incomplete(kind.as_str()))
        }
    }

    /// Stream event monitoring metadata until the body ends or `cancel`
    /// fires. Frames with malformed JSON are dropped by the decoder.
    pub async fn monitor_events<F>(&self, cancel: &CancellationToken, mut on_event: F) -> Result<DispatchSummary>
    where
        F: FnMut(Value),
    {
        let source = self.open("event/monitoring", &[]).await?;
        let decoder = TlvDecoder::with_config(TlvProfile::EventMonitoring, self.config().frame.clone());
        let summary = dispatch(decoder, source, cancel, |unit| match unit {
            DecodedUnit::Metadata { value, .. } => on_event(value),
            other => tracing::trace!(kind = other.kind(), "ignoring event monitoring unit"),
        })
        .await?;
        Ok(summary)
    }

    /// Decode a `multipart/x-mixed-replace` MJPEG body at `url`.
    ///
    /// `url` is not a device endpoint: it may be any absolute URL, or a path
    /// on the device. The boundary comes from the response `Content-Type`,
    /// falling back to `--frame`.
    pub async fn stream_multipart<F>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        mut on_image: F,
    ) -> Result<DispatchSummary>
    where
        F: FnMut(Bytes),
    {
        let source = self
            .transport()
            .open_stream(url, &[])
            .await
            .map_err(SessionError::from_transport)?;
        let boundary = source
            .content_type()
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());
        tracing::debug!(%boundary, "multipart boundary");

        let decoder = MultipartDecoder::with_config(&boundary, self.config().frame.clone())?;
        let summary = dispatch(decoder, source, cancel, |unit| {
            if let DecodedUnit::Image(image) = unit {
                on_image(image);
            }
        })
        .await?;
        Ok(summary)
    }
}
