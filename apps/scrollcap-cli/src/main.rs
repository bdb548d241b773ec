use std::env;

use anyhow::Result;
use clap::Parser;
use scrollcap_delivery::{DiskDelivery, EventSink, LocalFeed};
use scrollcap_ops::{ensure_artifact_dir, init_tracing, SessionJournal};
use scrollcap_orchestrator::{CaptureCommand, CommandOutcome, Orchestrator, SessionController};
use scrollcap_types::{
    config::{
        CaptureConfig, OpsConfig, OutputConfig, ScrollCapConfig, ViewportConfig,
    },
    geometry::PointerPoint,
    output::OutputFormat,
};
use scrollcap_viewport::SyntheticPage;
use tracing::info;

mod ui;

/// Capture a scrolling region of a synthetic page and stitch it into one
/// image. Real integrations swap the synthetic page for a live viewport
/// driver; everything downstream stays the same.
#[derive(Debug, Parser)]
#[command(name = "scrollcap")]
struct Args {
    /// Path to a TOML config file; defaults to $SCROLLCAP_CONFIG, then
    /// configs/dev.toml.
    #[arg(long)]
    config: Option<String>,
    /// Output format override: png, jpeg, or pdf.
    #[arg(long)]
    format: Option<String>,
    /// Output directory override.
    #[arg(long)]
    output_dir: Option<String>,
    /// Capture extent override in document pixels (defaults to the whole
    /// synthetic document).
    #[arg(long)]
    height: Option<u32>,
    /// Show a live event viewer while capturing.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref());
    if let Some(format) = &args.format {
        config.output.format = format
            .parse::<OutputFormat>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(dir) = &args.output_dir {
        config.output.output_dir = dir.clone();
    }

    if !args.watch {
        // The event viewer owns the terminal in watch mode.
        init_tracing(&config.ops)?;
    }
    ensure_artifact_dir(&config.ops.artifact_dir)?;

    let page = SyntheticPage::gradient(
        config.viewport.width,
        config.viewport.height,
        config.viewport.document_height,
        config.viewport.device_pixel_ratio,
    )?;
    let delivery = DiskDelivery::new(&config.output.output_dir);
    let feed = LocalFeed::new(256);
    let journal = SessionJournal::new();
    let orchestrator = Orchestrator::new(
        config.capture.clone(),
        config.output.clone(),
        page,
        delivery,
        feed.clone(),
        journal.clone(),
    );
    let controller = SessionController::new(orchestrator);

    let extent = args
        .height
        .unwrap_or(config.viewport.document_height)
        .min(config.viewport.document_height);
    let width = config.viewport.width;
    // Simulated drag over the page, top-left to bottom-right. The selection
    // height is the vertical extent the capture loop will cover.
    let gesture = [
        CaptureCommand::PointerDown(PointerPoint::new(0, 0)),
        CaptureCommand::PointerMove(PointerPoint::new(width as i32 / 2, extent as i32 / 2)),
        CaptureCommand::PointerUp(PointerPoint::new(width as i32, extent as i32)),
    ];

    let summary = format!(
        "{}x{} viewport, {}px document, {:?} output, settle {}ms",
        config.viewport.width,
        config.viewport.height,
        config.viewport.document_height,
        config.output.format,
        config.capture.settle_delay_ms
    );

    let outcome = if args.watch {
        run_with_ui(controller, feed, gesture, summary).await?
    } else {
        run_headless(controller, gesture).await?
    };

    match outcome {
        CommandOutcome::Delivered(receipt) => {
            println!("capture saved to {} ({} bytes)", receipt.location, receipt.bytes);
        }
        CommandOutcome::Cancelled => println!("capture cancelled"),
        _ => {}
    }

    for session in journal.snapshot_sessions().await {
        info!(
            frames = session.frames,
            duration_ms = session.duration_ms,
            cancelled = session.cancelled,
            "session summary"
        );
    }
    Ok(())
}

type DemoController = SessionController<SyntheticPage, DiskDelivery, LocalFeed>;

async fn run_headless(
    mut controller: DemoController,
    gesture: [CaptureCommand; 3],
) -> Result<CommandOutcome> {
    let mut outcome = CommandOutcome::Ignored;
    for command in gesture {
        outcome = controller.handle(command).await?;
    }
    Ok(outcome)
}

async fn run_with_ui(
    mut controller: DemoController,
    feed: LocalFeed,
    gesture: [CaptureCommand; 3],
    summary: String,
) -> Result<CommandOutcome> {
    use futures::StreamExt;

    let (tx, rx) = std::sync::mpsc::channel();
    let event_tx = tx.clone();
    let mut events = feed.subscribe();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event_tx.send(ui::UiMessage::Event(event)).is_err() {
                break;
            }
        }
    });

    let pipeline = tokio::spawn(async move {
        let mut outcome = Ok(CommandOutcome::Ignored);
        for command in gesture {
            outcome = controller.handle(command).await;
            if outcome.is_err() {
                break;
            }
        }
        outcome
    });
    let viewer = tokio::task::spawn_blocking(move || ui::run(rx, summary));

    let outcome = pipeline.await?;
    let _ = tx.send(ui::UiMessage::Shutdown);
    drop(tx);
    // The orchestrator outlives the pipeline, so the event stream never ends
    // on its own; stop forwarding explicitly to disconnect the viewer.
    forwarder.abort();
    viewer.await??;

    Ok(outcome?)
}

fn load_config(cli_path: Option<&str>) -> ScrollCapConfig {
    let from_env = env::var("SCROLLCAP_CONFIG").ok();
    let path = cli_path
        .map(str::to_owned)
        .or(from_env)
        .unwrap_or_else(|| "configs/dev.toml".into());
    match ScrollCapConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            default_config()
        }
    }
}

fn default_config() -> ScrollCapConfig {
    let config = ScrollCapConfig {
        viewport: ViewportConfig {
            width: 1280,
            height: 1000,
            document_height: 3200,
            device_pixel_ratio: 1.0,
        },
        capture: CaptureConfig {
            settle_delay_ms: 350,
            capture_timeout_ms: 5000,
        },
        output: OutputConfig {
            format: OutputFormat::Png,
            jpeg_quality: 0.9,
            output_dir: "captures".into(),
        },
        ops: OpsConfig {
            log_level: "info".into(),
            artifact_dir: "artifacts".into(),
        },
    };
    debug_assert!(config.validate().is_ok());
    config
}
