use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "livery", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore a saved configuration and write one PNG per textured slot.
    Render(RenderArgs),
    /// List the slots and their canonical raster sizes.
    Slots(SlotsArgs),
    /// Rasterize a single gradient to a PNG.
    Gradient(GradientArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Engine config JSON (defaults to the bicycle preset).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Saved configuration JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Asset root URLs are resolved against (defaults to the saved configuration's directory).
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Output directory; files are named `<SLOT>.png`.
    #[arg(long)]
    out_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct SlotsArgs {
    /// Engine config JSON (defaults to the bicycle preset).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct GradientArgs {
    /// Gradient settings JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output width.
    #[arg(long, default_value_t = 1024)]
    width: u32,

    /// Output height.
    #[arg(long, default_value_t = 1024)]
    height: u32,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Slots(args) => cmd_slots(args),
        Command::Gradient(args) => cmd_gradient(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<livery::EngineConfig> {
    Ok(match path {
        Some(p) => livery::EngineConfig::from_json_file(p)?,
        None => livery::EngineConfig::default(),
    })
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.assets_root = match args.assets {
        Some(dir) => dir,
        None => args
            .in_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
    };

    let saved = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read saved configuration '{}'", args.in_path.display()))?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;

    rt.block_on(async {
        let engine = livery::Engine::new(config)?;
        engine.load_configuration(&saved)?;

        let mut failed = 0usize;
        for (slot, outcome) in engine.settle_all().await {
            if let Err(e) = outcome {
                eprintln!("{slot}: {e}");
                failed += 1;
                continue;
            }
            let out = args.out_dir.join(format!("{slot}.png"));
            if engine.export_png(&slot, &out).await? {
                eprintln!("wrote {}", out.display());
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} slot(s) failed to composite");
        }
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_slots(args: SlotsArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    for def in config.slots.iter() {
        let size = livery::CanvasSize::for_aspect(config.base_size, def.aspect_ratio)?;
        let gradient = if def.gradient { " gradient" } else { "" };
        println!("{}\t{}x{}{gradient}", def.name, size.width, size.height);
    }
    Ok(())
}

fn cmd_gradient(args: GradientArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read gradient '{}'", args.in_path.display()))?;
    let gradient: livery::GradientSettings =
        serde_json::from_str(&text).with_context(|| "parse gradient JSON")?;
    let size = livery::CanvasSize::new(args.width, args.height)?;
    let bitmap = livery::rasterize_gradient(&gradient, size)?;
    let png = livery::encode_png(&bitmap)?;

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
