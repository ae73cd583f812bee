use ccapi_session::{EndpointMap, Session};
use ccapi_transport::HttpTransport;

use crate::cmd::{cancel_on_ctrl_c, ensure_dir, log_summary, save_image, DeviceArgs, WatchArgs};
use crate::exit::{session_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_image, OutputFormat};

/// Decode any MJPEG URL. No capability map is fetched: the source need not
/// be a camera.
pub async fn run(args: WatchArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    ensure_dir(args.out.as_deref())?;
    let config = device.session_config()?;
    let transport = HttpTransport::new(args.url.as_str(), &config.transport)
        .map_err(|err| transport_error("client setup failed", err))?;
    let session = Session::from_parts(transport, EndpointMap::default(), config);

    let cancel = cancel_on_ctrl_c();
    let mut index = 0u64;
    let mut save_error = None;

    let summary = session
        .stream_multipart(&args.url, &cancel, |image| {
            if cancel.is_cancelled() {
                return;
            }
            index += 1;
            let saved = match args.out.as_deref() {
                Some(dir) => match save_image(dir, "watch", index, &image) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        save_error = Some(err);
                        cancel.cancel();
                        return;
                    }
                },
                None => None,
            };
            print_image(index, image.len(), saved.as_deref(), format);
            if args.count.is_some_and(|count| index >= count) {
                cancel.cancel();
            }
        })
        .await
        .map_err(|err| session_error(&format!("watch {} failed", args.url), err))?;

    log_summary("multipart", &summary);
    if let Some(err) = save_error {
        return Err(err);
    }
    Ok(SUCCESS)
}
