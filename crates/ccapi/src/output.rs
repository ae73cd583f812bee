use std::io::IsTerminal;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use ccapi_session::{DeviceInformation, EndpointMap, FlipDetail, PollSummary};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

#[derive(Serialize)]
struct EndpointOutput<'a> {
    name: &'a str,
    version: &'a str,
    methods: Vec<String>,
    path: &'a str,
}

pub fn print_endpoints(endpoints: &EndpointMap, format: OutputFormat) {
    let rows: Vec<EndpointOutput<'_>> = endpoints
        .iter()
        .map(|endpoint| EndpointOutput {
            name: &endpoint.name,
            version: &endpoint.version,
            methods: endpoint.methods.iter().map(ToString::to_string).collect(),
            path: &endpoint.path,
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut out = table(vec!["NAME", "VERSION", "METHODS", "PATH"]);
            for row in &rows {
                out.add_row(vec![
                    row.name.to_string(),
                    row.version.to_string(),
                    row.methods.join(","),
                    row.path.to_string(),
                ]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!(
                    "{:<40} {:<7} {}",
                    row.name,
                    row.version,
                    row.methods.join(",")
                );
            }
        }
    }
}

pub fn print_device_info(info: &DeviceInformation, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(info),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Device Info:");
            println!("  Manufacturer:     {}", info.manufacturer);
            println!("  Product:          {}", info.productname);
            println!("  Serial number:    {}", info.serialnumber);
            println!("  Firmware:         {}", info.firmwareversion);
            println!("  MAC address:      {}", info.macaddress);
        }
    }
}

#[derive(Serialize)]
struct ImageOutput<'a> {
    index: u64,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_to: Option<&'a Path>,
    timestamp: String,
}

/// Images print one line each, whatever the format.
pub fn print_image(index: u64, size: usize, saved_to: Option<&Path>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ImageOutput {
            index,
            size,
            saved_to,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => match saved_to {
            Some(path) => println!("image #{index} size={size} saved={}", path.display()),
            None => println!("image #{index} size={size}"),
        },
    }
}

pub fn print_event(event: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(event),
        OutputFormat::Table => {
            let mut out = table(vec!["FIELD", "VALUE"]);
            if let Value::Object(fields) = event {
                for (key, value) in fields {
                    out.add_row(vec![key.clone(), value.to_string()]);
                }
            } else {
                out.add_row(vec!["-".to_string(), event.to_string()]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(event).unwrap_or_else(|_| event.to_string())
            );
        }
    }
}

#[derive(Serialize)]
struct FlipDetailOutput<'a> {
    image_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_to: Option<&'a Path>,
    info: Option<&'a Value>,
}

pub fn print_flip_detail(detail: &FlipDetail, saved_to: Option<&Path>, format: OutputFormat) {
    let out = FlipDetailOutput {
        image_size: detail.image.as_ref().map(|image| image.len()),
        saved_to,
        info: detail.info.as_ref(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            match (out.image_size, saved_to) {
                (Some(size), Some(path)) => println!("image: {size} bytes -> {}", path.display()),
                (Some(size), None) => println!("image: {size} bytes"),
                (None, _) => println!("image: not requested"),
            }
            match out.info {
                Some(info) => println!(
                    "info: {}",
                    serde_json::to_string_pretty(info).unwrap_or_else(|_| info.to_string())
                ),
                None => println!("info: not requested"),
            }
        }
    }
}

#[derive(Serialize)]
struct ShotOutput {
    shot: u64,
    timestamp: String,
}

pub fn print_shot(shot: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ShotOutput {
            shot,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table | OutputFormat::Pretty => println!("shot #{shot}"),
    }
}

pub fn print_poll_summary(summary: &PollSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "shots": summary.iterations,
            "cancelled": summary.cancelled,
        })),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "shots={} cancelled={}",
            summary.iterations, summary.cancelled
        ),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
