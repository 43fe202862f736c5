//! overlay_infer - Upload one image and overlay the detections.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use overlay_client::{run_single_shot, ClientConfig, ProcessingMode};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Send one image to the detection backend and save the annotated result"
)]
struct Args {
    /// Image to upload (PNG or JPEG).
    image: PathBuf,

    /// Processing core: cpu or fpga.
    #[arg(long)]
    mode: Option<String>,

    /// Backend base URL (http(s)://host:port, or stub:// for the offline backend).
    #[arg(long)]
    backend_url: Option<String>,

    /// Where to write the annotated image.
    #[arg(long, env = "OVERLAY_OUTPUT")]
    output: Option<PathBuf>,

    /// TrueType/OpenType font for label captions.
    #[arg(long, env = "OVERLAY_FONT")]
    font: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ClientConfig::load()?;
    if let Some(url) = args.backend_url {
        config.backend_url = url;
    }
    if let Some(mode) = args.mode.as_deref() {
        config.mode = ProcessingMode::parse(mode)
            .ok_or_else(|| anyhow!("unknown processing mode '{}'; expected cpu or fpga", mode))?;
    }
    if let Some(font) = args.font {
        config.overlay.font_path = Some(font);
    }
    config.validate()?;

    let report = run_single_shot(&config, &args.image, config.mode)?;
    for line in &report.log {
        println!("{}", line);
    }
    for det in &report.result.detections {
        println!(
            "{} at ({:.0}, {:.0}, {:.0}x{:.0})",
            det.caption(),
            det.bbox.x,
            det.bbox.y,
            det.bbox.width,
            det.bbox.height
        );
    }
    let telemetry = &report.result.telemetry;
    println!(
        "latency {:.1} ms | mode {} | device {} | fps {} | power {}",
        report.result.reported_latency_ms,
        telemetry.mode.as_deref().unwrap_or("-"),
        telemetry.device.as_deref().unwrap_or("-"),
        telemetry
            .fps
            .map(|fps| format!("{:.1}", fps))
            .unwrap_or_else(|| "-".to_string()),
        telemetry.power_usage.as_deref().unwrap_or("-")
    );

    let output = args
        .output
        .or(config.overlay.output)
        .unwrap_or_else(|| args.image.with_extension("overlay.png"));
    report
        .surface
        .save(&output)
        .with_context(|| format!("write annotated image {}", output.display()))?;
    log::info!("annotated image written to {}", output.display());
    Ok(())
}
