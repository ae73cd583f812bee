use ccapi_session::{HttpMethod, Session};

use crate::cmd::{
    cancel_on_ctrl_c, ensure_dir, log_summary, save_image, start_live_view, DeviceArgs, ScrollArgs,
};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_image, OutputFormat};

pub async fn run(args: ScrollArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    ensure_dir(args.out.as_deref())?;
    let session = device.connect().await?;
    start_live_view(&session, args.liveview).await?;

    let cancel = cancel_on_ctrl_c();
    let mut index = 0u64;
    let mut save_error = None;

    let result = session
        .stream_scroll(&cancel, |image| {
            if cancel.is_cancelled() {
                return;
            }
            index += 1;
            let saved = match args.out.as_deref() {
                Some(dir) => match save_image(dir, "scroll", index, &image) {
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
        .await;

    stop_scroll(&session).await;
    let summary = result.map_err(|err| session_error("scroll failed", err))?;
    log_summary("scroll", &summary);
    if let Some(err) = save_error {
        return Err(err);
    }
    Ok(SUCCESS)
}

// The device keeps the scroll session open until told otherwise.
pub(crate) async fn stop_scroll(session: &Session) {
    if session
        .endpoint_for("shooting/liveview/scroll", HttpMethod::Delete)
        .is_err()
    {
        return;
    }
    if let Err(err) = session.stop_live_view_scroll().await {
        tracing::warn!(error = %err, "stopping scroll failed");
    }
}
