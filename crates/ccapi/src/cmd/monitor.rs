use ccapi_session::{HttpMethod, Session};

use crate::cmd::{cancel_on_ctrl_c, log_summary, DeviceArgs, MonitorArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub async fn run(args: MonitorArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = device.connect().await?;
    let cancel = cancel_on_ctrl_c();
    let mut printed = 0u64;

    let result = session
        .monitor_events(&cancel, |event| {
            if cancel.is_cancelled() {
                return;
            }
            print_event(&event, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                cancel.cancel();
            }
        })
        .await;

    stop_monitoring(&session).await;
    let summary = result.map_err(|err| session_error("event monitoring failed", err))?;
    log_summary("event/monitoring", &summary);
    Ok(SUCCESS)
}

async fn stop_monitoring(session: &Session) {
    if session
        .endpoint_for("event/monitoring", HttpMethod::Delete)
        .is_err()
    {
        return;
    }
    if let Err(err) = session.stop_event_monitoring().await {
        tracing::warn!(error = %err, "stopping event monitoring failed");
    }
}
