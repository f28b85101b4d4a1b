use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spinloop", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, serve, launch the render host and record one seamless revolution.
    Record(RecordArgs),
    /// Run the render host (launched by `record`; speaks JSON lines on stdin/stdout).
    Host(HostArgs),
    /// Render a single frame of the turntable scene as a PNG.
    Frame(FrameArgs),
    /// Print the resolved session timing and check that the loop closes.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
struct RecordArgs {
    /// Configuration JSON (defaults apply when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write an H.264 MP4 next to the primary artifact.
    #[arg(long)]
    transcode: bool,

    /// Output directory for the artifact.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct HostArgs {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame clock override.
    #[arg(long, value_enum)]
    clock: Option<spinloop::ClockMode>,

    /// Render backend override (`gpu` needs the `gpu` feature).
    #[arg(long, value_enum)]
    backend: Option<spinloop::BackendKind>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Turntable angle in degrees.
    #[arg(long, allow_negative_numbers = true)]
    angle_deg: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, value_enum, default_value_t = spinloop::BackendKind::Cpu)]
    backend: spinloop::BackendKind,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Record(args) => cmd_record(args),
        Command::Host(args) => cmd_host(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Plan(args) => cmd_plan(args),
    }
}

/// Logs always go to stderr; the host uses stdout for protocol messages.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spinloop=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<spinloop::SpinloopConfig> {
    let cfg = spinloop::SpinloopConfig::load(path)?;
    Ok(cfg)
}

fn cmd_record(args: RecordArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(args.config.as_deref())?;
    if args.transcode {
        cfg.orchestrator.output.transcode.enabled = true;
    }
    if let Some(out) = args.out {
        if cfg.scene.delivery == spinloop::DeliveryMode::DirectSave {
            anyhow::bail!(
                "--out has no effect with direct-save delivery; set scene.save_path instead"
            );
        }
        cfg.orchestrator.output.dir = out;
    }
    cfg.validate()?;

    let report = spinloop::Orchestrator::from_config(cfg)?
        .run()
        .context("recording run failed")?;

    eprintln!(
        "wrote {} ({} bytes, {})",
        report.artifact_path.display(),
        report.size,
        report.mime_type
    );
    if let Some(mp4) = &report.transcoded {
        eprintln!("wrote {}", mp4.display());
    }
    Ok(())
}

fn cmd_host(args: HostArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let clock = args.clock.unwrap_or(cfg.scene.clock);
    let backend = args
        .backend
        .unwrap_or(cfg.orchestrator.render_host.backend);
    spinloop::run_host(&cfg, clock, backend)?;
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    cfg.scene.validate()?;

    let asset_dir = std::fs::canonicalize(&cfg.orchestrator.asset_dir).with_context(|| {
        format!(
            "open asset directory '{}'",
            cfg.orchestrator.asset_dir.display()
        )
    })?;
    let page = spinloop::PageUrl::local(&asset_dir, &cfg.orchestrator.route);
    let frame = spinloop::render_still(
        &cfg.scene,
        &page,
        args.angle_deg.to_radians(),
        args.backend,
    )?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_deref())?;
    let plan = cfg.scene.plan();
    println!("{}", serde_json::to_string_pretty(&plan)?);
    if !plan.loop_closes {
        anyhow::bail!(
            "loop does not close: {} frames at {} fps is {:+.2} frames off one revolution",
            plan.target_frame_count,
            plan.fps,
            plan.closure_error_frames
        );
    }
    cfg.validate()?;
    Ok(())
}
