use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ccapi_session::{PollLoop, SessionError};

use crate::cmd::{parse_duration, DeviceArgs, IntervalArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_poll_summary, print_shot, OutputFormat};

pub async fn run(args: IntervalArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let every = parse_duration(&args.every)?;
    let session = device.connect().await?;
    let af = args.af;

    let poll = PollLoop::new();
    let shots = Arc::new(AtomicU64::new(0));
    let run = poll.start(
        {
            let session = session.clone();
            let shots = Arc::clone(&shots);
            move || {
                let session = session.clone();
                let shots = Arc::clone(&shots);
                async move {
                    session.shutter_button(af).await?;
                    let shot = shots.fetch_add(1, Ordering::SeqCst) + 1;
                    print_shot(shot, format);
                    Ok::<(), SessionError>(())
                }
            }
        },
        every,
        args.count,
    );

    let stopper = poll.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping after the current shot");
            stopper.cancel();
        }
    });

    let result = run.await;
    ctrl_c.abort();

    let summary = result.map_err(|err| session_error("shutter failed", err))?;
    print_poll_summary(&summary, format);
    Ok(SUCCESS)
}
