use crate::cmd::{DeviceArgs, InfoArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_device_info, OutputFormat};

pub async fn run(_args: InfoArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = device.connect().await?;
    let info = session
        .device_information()
        .await
        .map_err(|err| session_error("device information failed", err))?;
    print_device_info(&info, format);
    Ok(SUCCESS)
}
