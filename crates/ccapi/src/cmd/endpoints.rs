use crate::cmd::{DeviceArgs, EndpointsArgs};
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::{print_endpoints, OutputFormat};

pub async fn run(_args: EndpointsArgs, device: &DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let session = device.connect().await?;
    let endpoints = session.endpoints();
    if endpoints.is_empty() {
        tracing::warn!("device advertised no endpoints");
        return Ok(FAILURE);
    }
    print_endpoints(endpoints, format);
    Ok(SUCCESS)
}
