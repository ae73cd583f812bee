use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ccapi_frame::DispatchSummary;
use ccapi_session::{FlipDetailKind, Session, SessionConfig};
use ccapi_transport::TransportConfig;
use clap::{Args, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use crate::exit::{io_error, session_error, CliError, CliResult, INTERRUPTED, USAGE};
use crate::output::OutputFormat;

pub mod endpoints;
pub mod flipdetail;
pub mod info;
pub mod interval;
pub mod monitor;
pub mod relay;
pub mod scroll;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the endpoints the camera advertises.
    Endpoints(EndpointsArgs),
    /// Show device information.
    Info(InfoArgs),
    /// Stream live view scroll images.
    Scroll(ScrollArgs),
    /// Fetch one flip detail image and/or info block.
    Flipdetail(FlipDetailArgs),
    /// Print event monitoring notifications.
    Monitor(MonitorArgs),
    /// Decode a multipart MJPEG stream from any URL.
    Watch(WatchArgs),
    /// Re-serve live view scroll images as an MJPEG stream.
    Relay(RelayArgs),
    /// Press the shutter at a fixed interval.
    Interval(IntervalArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, device: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Endpoints(args) => endpoints::run(args, &device, format).await,
        Command::Info(args) => info::run(args, &device, format).await,
        Command::Scroll(args) => scroll::run(args, &device, format).await,
        Command::Flipdetail(args) => flipdetail::run(args, &device, format).await,
        Command::Monitor(args) => monitor::run(args, &device, format).await,
        Command::Watch(args) => watch::run(args, &device, format).await,
        Command::Relay(args) => relay::run(args, &device).await,
        Command::Interval(args) => interval::run(args, &device, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Connection settings shared by every device command.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Camera address.
    #[arg(long, env = "CANON_IP", global = true)]
    pub host: Option<String>,
    /// Camera control API port.
    #[arg(long, env = "CANON_PORT", default_value_t = 8080, global = true)]
    pub port: u16,
    /// Talk HTTPS instead of HTTP.
    #[arg(long, env = "CANON_HTTPS", global = true)]
    pub https: bool,
    /// Deadline for control calls (e.g. 10s, 500ms). Streams are unbounded.
    #[arg(long, default_value = "10s", global = true)]
    pub timeout: String,
    /// Accept self-signed device certificates.
    #[arg(long, global = true)]
    pub accept_invalid_certs: bool,
}

impl DeviceArgs {
    pub fn base_url(&self) -> CliResult<String> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| CliError::new(USAGE, "no camera address: pass --host or set CANON_IP"))?;
        let scheme = if self.https { "https" } else { "http" };
        Ok(format!("{scheme}://{host}:{}", self.port))
    }

    pub fn session_config(&self) -> CliResult<SessionConfig> {
        Ok(SessionConfig {
            transport: TransportConfig {
                accept_invalid_certs: self.accept_invalid_certs,
                ..TransportConfig::default()
            },
            request_timeout: parse_duration(&self.timeout)?,
            ..SessionConfig::default()
        })
    }

    pub async fn connect(&self) -> CliResult<Session> {
        let base_url = self.base_url()?;
        Session::connect(base_url.as_str(), self.session_config()?)
            .await
            .map_err(|err| session_error(&format!("connect to {base_url} failed"), err))
    }
}

#[derive(Args, Debug, Default)]
pub struct EndpointsArgs {}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct ScrollArgs {
    /// Exit after N images.
    #[arg(long)]
    pub count: Option<u64>,
    /// Directory to save images into.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
    /// Start live view at this size before streaming.
    #[arg(long, value_name = "SIZE")]
    pub liveview: Option<LiveViewSize>,
}

#[derive(Args, Debug)]
pub struct FlipDetailArgs {
    /// What to fetch.
    #[arg(long, value_enum, default_value = "both")]
    pub kind: FlipKindArg,
    /// File to save the image into.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Exit after N events.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// MJPEG URL (`multipart/x-mixed-replace`).
    pub url: String,
    /// Exit after N images.
    #[arg(long)]
    pub count: Option<u64>,
    /// Directory to save images into.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Address to serve `/mjpeg` on.
    #[arg(long, default_value = "127.0.0.1:8081")]
    pub listen: SocketAddr,
    /// Start live view at this size before relaying.
    #[arg(long, value_name = "SIZE")]
    pub liveview: Option<LiveViewSize>,
}

#[derive(Args, Debug)]
pub struct IntervalArgs {
    /// Time between shots (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub every: String,
    /// Number of shots. Default: until interrupted.
    #[arg(long)]
    pub count: Option<u32>,
    /// Autofocus before each shot.
    #[arg(long)]
    pub af: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LiveViewSize {
    Small,
    Medium,
}

impl LiveViewSize {
    pub fn as_str(self) -> &'static str {
        match self {
            LiveViewSize::Small => "small",
            LiveViewSize::Medium => "medium",
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum FlipKindArg {
    Info,
    Image,
    Both,
}

impl From<FlipKindArg> for FlipDetailKind {
    fn from(kind: FlipKindArg) -> Self {
        match kind {
            FlipKindArg::Info => FlipDetailKind::Info,
            FlipKindArg::Image => FlipDetailKind::Image,
            FlipKindArg::Both => FlipDetailKind::Both,
        }
    }
}

/// Token cancelled by the first Ctrl-C. A second Ctrl-C exits at once.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("interrupted, stopping after the current chunk");
        token.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(INTERRUPTED);
        }
    });
    cancel
}

pub fn log_summary(stream: &str, summary: &DispatchSummary) {
    tracing::info!(
        stream,
        units = summary.units,
        chunks = summary.chunks,
        bytes = summary.bytes,
        discarded_bytes = summary.discarded_bytes,
        cancelled = summary.cancelled,
        "stream ended"
    );
}

/// Start live view if asked to; a device that is already streaming answers
/// busy, which is reported and ignored.
pub async fn start_live_view(session: &Session, size: Option<LiveViewSize>) -> CliResult<()> {
    let Some(size) = size else {
        return Ok(());
    };
    match session.start_live_view(size.as_str(), "keep").await {
        Ok(_) => Ok(()),
        Err(err) if err.is_busy() => {
            tracing::warn!(error = %err, "live view start rejected, continuing");
            Ok(())
        }
        Err(err) => Err(session_error("live view start failed", err)),
    }
}

/// Write `data` to `dir/<prefix>-<index>.jpg` and return the path.
pub fn save_image(dir: &Path, prefix: &str, index: u64, data: &[u8]) -> CliResult<PathBuf> {
    let path = dir.join(format!("{prefix}-{index:05}.jpg"));
    std::fs::write(&path, data)
        .map_err(|err| io_error(&format!("write {} failed", path.display()), err))?;
    Ok(path)
}

pub fn ensure_dir(dir: Option<&Path>) -> CliResult<()> {
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)
            .map_err(|err| io_error(&format!("create {} failed", dir.display()), err))?;
    }
    Ok(())
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
