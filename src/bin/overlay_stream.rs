//! overlay_stream - Live detection overlay loop.
//!
//! This binary:
//! 1. Opens a live source (`stub://`, a local image, or an http(s) camera)
//! 2. Posts paced frames to the backend's frame endpoint, one at a time
//! 3. Paints returned detections over the frame and writes the latest overlay
//! 4. Stops on Ctrl-C or after `--duration-secs`

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use overlay_client::{
    dispatcher_for, source_for, ClientConfig, FileSink, OverlayRenderer, OverlayStyle,
    StreamRuntime,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream a live source through a remote detector and overlay the results"
)]
struct Args {
    /// Source identifier: stub://name, an image path, or an http(s) camera URL.
    #[arg(long)]
    source: Option<String>,

    /// Backend base URL (http(s)://host:port, or stub:// for the offline backend).
    #[arg(long)]
    backend_url: Option<String>,

    /// Delay between handling one result and capturing the next frame.
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Stop after this many seconds (runs until Ctrl-C when unset).
    #[arg(long, env = "OVERLAY_DURATION_SECS")]
    duration_secs: Option<u64>,

    /// Write the latest overlay to this image file.
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
    if let Some(source) = args.source {
        config.stream.source = source;
    }
    if let Some(url) = args.backend_url {
        config.backend_url = url;
    }
    if let Some(ms) = args.pacing_ms {
        config.stream.pacing = Duration::from_millis(ms);
    }
    if let Some(output) = args.output {
        config.overlay.output = Some(output);
    }
    if let Some(font) = args.font {
        config.overlay.font_path = Some(font);
    }
    config.validate()?;

    let dispatcher = dispatcher_for(&config.backend_url, config.stream.timeout)?;
    let mut renderer = OverlayRenderer::new(OverlayStyle::default());
    if let Some(path) = config.overlay.font_path.as_deref() {
        renderer = renderer.with_font(OverlayRenderer::load_font(path)?);
    } else {
        log::info!("no font configured; label chips are drawn without text");
    }

    let mut runtime = StreamRuntime::new(config.controller_config(), renderer);
    if let Some(path) = config.overlay.output.clone() {
        log::info!("writing overlay to {}", path.display());
        runtime = runtime.with_sink(Box::new(FileSink::new(path)));
    }
    let handle = runtime.spawn(dispatcher)?;

    handle.select_source(source_for(&config.stream.source)?)?;
    if !handle.start()? {
        let status = handle.status()?;
        for line in &status.log {
            eprintln!("{}", line);
        }
        handle.shutdown()?;
        return Err(anyhow!("could not start streaming from {}", config.stream.source));
    }
    log::info!(
        "overlay_stream running: {} -> {} (pacing {} ms)",
        config.stream.source,
        config.backend_url,
        config.stream.pacing.as_millis()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    log::info!("duration elapsed, stopping stream...");
                    break;
                }
                remaining.min(STATUS_INTERVAL)
            }
            None => STATUS_INTERVAL,
        };
        match rx.recv_timeout(wait) {
            Ok(()) => {
                log::info!("shutdown signal received, stopping stream...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                let status = handle.status()?;
                match status.metrics {
                    Some(metrics) => log::info!(
                        "{:?}: {:.1} fps, hardware latency {:.1} ms, {} rendered, {} failed",
                        status.state,
                        metrics.observed_fps,
                        metrics.hardware_latency_ms,
                        status.stats.rendered,
                        status.stats.failures
                    ),
                    None => log::info!(
                        "{:?}: waiting for first result ({} failed)",
                        status.state,
                        status.stats.failures
                    ),
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    handle.stop()?;
    let status = handle.status()?;
    for line in &status.log {
        println!("{}", line);
    }
    log::info!(
        "stream finished: {} dispatched, {} rendered, {} failed, {} stale",
        status.stats.dispatched,
        status.stats.rendered,
        status.stats.failures,
        status.stats.stale_discarded
    );
    handle.shutdown()?;
    Ok(())
}
