use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bytes::{Bytes, BytesMut};
use ccapi_frame::{encode_part, DEFAULT_BOUNDARY};
use futures_util::Stream;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::cmd::scroll::stop_scroll;
use crate::cmd::{cancel_on_ctrl_c, log_summary, start_live_view, DeviceArgs, RelayArgs};
use crate::exit::{io_error, session_error, CliResult, SUCCESS};

/// Response type of `/mjpeg`; its boundary is [`DEFAULT_BOUNDARY`].
pub const RELAY_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Response type of `/fps`.
pub const FPS_CONTENT_TYPE: &str = "text/event-stream";

// Slow viewers skip images rather than hold up the camera stream.
const CHANNEL_CAPACITY: usize = 4;

const FPS_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct RelayState {
    images: broadcast::Sender<Bytes>,
    fps: watch::Receiver<f64>,
    cancel: CancellationToken,
}

pub async fn run(args: RelayArgs, device: &DeviceArgs) -> CliResult<i32> {
    let session = device.connect().await?;
    start_live_view(&session, args.liveview).await?;

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .map_err(|err| io_error(&format!("bind {} failed", args.listen), err))?;

    let cancel = cancel_on_ctrl_c();
    let (images, _) = broadcast::channel(CHANNEL_CAPACITY);
    let (fps_tx, fps) = watch::channel(0.0);
    let frames = Arc::new(AtomicU64::new(0));
    let app = router(RelayState {
        images: images.clone(),
        fps,
        cancel: cancel.clone(),
    });
    tracing::info!(listen = %args.listen, "relaying live view at /mjpeg, frame rate at /fps");

    let server = async {
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .await
    };
    let scroll = async {
        let result = session
            .stream_scroll(&cancel, |image| {
                frames.fetch_add(1, Ordering::Relaxed);
                // No viewers is not an error.
                let _ = images.send(image);
            })
            .await;
        cancel.cancel();
        result
    };
    let meter = measure_fps(Arc::clone(&frames), fps_tx, cancel.clone());

    let (served, streamed, ()) = tokio::join!(server, scroll, meter);
    stop_scroll(&session).await;

    served.map_err(|err| io_error("relay server failed", err))?;
    let summary = streamed.map_err(|err| session_error("scroll failed", err))?;
    log_summary("scroll", &summary);
    Ok(SUCCESS)
}

fn router(state: RelayState) -> Router {
    Router::new()
        .route("/mjpeg", get(mjpeg))
        .route("/fps", get(fps))
        .with_state(state)
}

async fn mjpeg(State(state): State<RelayState>) -> impl IntoResponse {
    tracing::info!("relay viewer connected");
    let body = Body::from_stream(mjpeg_parts(state.images.subscribe(), state.cancel));
    (
        [
            (header::CONTENT_TYPE, RELAY_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
}

async fn fps(State(state): State<RelayState>) -> impl IntoResponse {
    let body = Body::from_stream(fps_events(state.fps, state.cancel));
    (
        [
            (header::CONTENT_TYPE, FPS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
}

/// Publish frames per second once every [`FPS_PERIOD`] until cancelled.
async fn measure_fps(frames: Arc<AtomicU64>, fps: watch::Sender<f64>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(FPS_PERIOD);
    ticker.tick().await;
    let mut last = tokio::time::Instant::now();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(last).as_secs_f64();
        last = now;
        let count = frames.swap(0, Ordering::Relaxed);
        if elapsed > 0.0 {
            fps.send_replace(count as f64 / elapsed);
        }
    }
}

fn fps_event(fps: f64) -> Bytes {
    Bytes::from(format!("data: {fps:.2}\n\n"))
}

/// The current rate at once, then one event per measurement.
fn fps_events(
    fps: watch::Receiver<f64>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures_util::stream::unfold((fps, cancel, true), |(mut fps, cancel, first)| async move {
        if !first {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                changed = fps.changed() => changed.ok()?,
            }
        }
        let value = *fps.borrow_and_update();
        Some((Ok(fps_event(value)), (fps, cancel, false)))
    })
}

/// One multipart part per broadcast image, until the relay stops.
fn mjpeg_parts(
    images: broadcast::Receiver<Bytes>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures_util::stream::unfold((images, cancel), |(mut images, cancel)| async move {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return None,
                received = images.recv() => received,
            };
            match received {
                Ok(image) => {
                    let mut part = BytesMut::with_capacity(image.len() + 96);
                    encode_part(DEFAULT_BOUNDARY, "image/jpeg", &image, &mut part);
                    return Some((Ok(part.freeze()), (images, cancel)));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "relay viewer lagging, skipping images");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use ccapi_frame::{boundary_from_content_type, Accumulator, MultipartDecoder, UnitDecoder};
    use futures_util::StreamExt;

    use super::*;

    fn jpeg(fill: u8) -> Bytes {
        Bytes::from(vec![0xFF, 0xD8, fill, 0xFF, 0xD9])
    }

    #[test]
    fn content_type_declares_default_boundary() {
        assert_eq!(
            boundary_from_content_type(RELAY_CONTENT_TYPE).as_deref(),
            Some(DEFAULT_BOUNDARY)
        );
    }

    #[tokio::test]
    async fn relayed_parts_decode_back_to_images() {
        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        tx.send(jpeg(1)).unwrap();
        tx.send(jpeg(2)).unwrap();
        drop(tx);

        let parts: Vec<Bytes> = mjpeg_parts(rx, CancellationToken::new())
            .map(|part| match part {
                Ok(part) => part,
                Err(never) => match never {},
            })
            .collect()
            .await;
        assert_eq!(parts.len(), 2);

        let mut decoder = MultipartDecoder::new(DEFAULT_BOUNDARY).unwrap();
        let mut acc = Accumulator::new();
        for part in &parts {
            acc.append(part);
        }
        let images: Vec<Bytes> = decoder
            .decode_available(&mut acc)
            .into_iter()
            .filter_map(|unit| unit.as_image().cloned())
            .collect();
        assert_eq!(images, vec![jpeg(1), jpeg(2)]);
    }

    #[tokio::test]
    async fn fps_stream_sends_current_rate_then_updates() {
        let (tx, rx) = watch::channel(0.0);
        let cancel = CancellationToken::new();
        let mut events = Box::pin(fps_events(rx, cancel.clone()));

        let first = events.next().await.expect("initial event");
        assert_eq!(first.ok(), Some(Bytes::from_static(b"data: 0.00\n\n")));

        tx.send_replace(12.5);
        let next = events.next().await.expect("update event");
        assert_eq!(next.ok(), Some(Bytes::from_static(b"data: 12.50\n\n")));

        cancel.cancel();
        assert!(events.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fps_counts_frames_per_period() {
        let frames = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = watch::channel(0.0);
        let cancel = CancellationToken::new();
        let meter = tokio::spawn(measure_fps(Arc::clone(&frames), tx, cancel.clone()));

        frames.fetch_add(12, Ordering::Relaxed);
        rx.changed().await.unwrap();
        assert!((*rx.borrow_and_update() - 12.0).abs() < 1e-9);
        assert_eq!(frames.load(Ordering::Relaxed), 0);

        cancel.cancel();
        meter.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_ends_viewer_stream() {
        let (tx, rx) = broadcast::channel::<Bytes>(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let parts: Vec<_> = mjpeg_parts(rx, cancel).collect().await;
        assert!(parts.is_empty());
        drop(tx);
    }
}
