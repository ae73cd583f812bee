use crate::cmd::{DeviceArgs, FlipDetailArgs};
use crate::exit::{io_error, session_error, CliResult, SUCCESS};
use crate::output::{print_flip_detail, OutputFormat};

pub async fn run(args: FlipDetailArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = device.connect().await?;
    let detail = session
        .flip_detail_once(args.kind.into())
        .await
        .map_err(|err| session_error("flip detail failed", err))?;

    let saved = match (&args.out, &detail.image) {
        (Some(path), Some(image)) => {
            std::fs::write(path, image)
                .map_err(|err| io_error(&format!("write {} failed", path.display()), err))?;
            Some(path.as_path())
        }
        _ => None,
    };

    print_flip_detail(&detail, saved, format);
    Ok(SUCCESS)
}
