use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context as _, bail};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wallswitch::slideshow::{self, Slideshow};
use wallswitch::{
    Decoders, Rgba, ScaleMode, SessionController, TransitionKind, TransitionSpec,
    WallpaperRequest, WallpaperTargetMonitor, WaylandCompositor,
};

static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser, Debug)]
#[command(name = "wallswitch", version, about)]
struct Cli {
    /// Wallpaper files or directories to scan.
    paths: Vec<PathBuf>,

    /// Output to draw on: connector name, model, index or `all`.
    #[arg(short, long, default_value = "all")]
    output: WallpaperTargetMonitor,

    /// How images are fitted: fit, fill, stretch, center or tile.
    #[arg(short, long, default_value_t = ScaleMode::Fit)]
    mode: ScaleMode,

    /// Solid color (#RRGGBB[AA]). Without paths it becomes the wallpaper,
    /// otherwise the letterbox background.
    #[arg(short, long)]
    color: Option<Rgba>,

    /// Loop animations.
    #[arg(short, long)]
    r#loop: bool,

    /// Rotate through every given file.
    #[arg(short = 'S', long)]
    slideshow: bool,

    /// Slideshow interval in seconds.
    #[arg(short, long, default_value_t = 300)]
    interval: u64,

    /// Random order.
    #[arg(short, long)]
    random: bool,

    /// Playlist file, one path per line.
    #[arg(short, long)]
    playlist: Option<PathBuf>,

    /// Scan directories recursively.
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Print the available outputs and exit.
    #[arg(short = 'L', long)]
    list_outputs: bool,

    /// Transition between wallpapers.
    #[arg(short, long, default_value_t = TransitionKind::None)]
    transition: TransitionKind,

    /// Transition duration in seconds.
    #[arg(short = 'd', long, default_value_t = 1.0)]
    transition_duration: f32,

    /// Transition frame rate cap; 0 follows the display.
    #[arg(long, default_value_t = 0)]
    transition_fps: u32,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    install_signal_handlers();

    let compositor = WaylandCompositor::connect().context("failed to connect to Wayland")?;
    let mut session = SessionController::initialize(compositor, Decoders::default())
        .context("failed to initialize")?;

    if cli.list_outputs {
        for info in session.list_outputs() {
            println!("{info}");
        }
        return Ok(());
    }

    let files = collect_files(&cli)?;
    let transition = TransitionSpec::new(cli.transition, cli.transition_duration)
        .with_fps(cli.transition_fps);

    let Some(first) = files.first() else {
        let Some(color) = cli.color else {
            bail!("no file or color specified");
        };
        let request = WallpaperRequest::solid_color(color)
            .target(cli.output)
            .transition(transition);
        session
            .set_wallpaper_blocking(&request, &RUNNING)
            .context("failed to set wallpaper")?;
        session.teardown();
        return Ok(());
    };

    let template = WallpaperRequest::file(first)
        .scale_mode(cli.mode)
        .background(cli.color.unwrap_or(Rgba::BLACK))
        .target(cli.output.clone())
        .looping(cli.r#loop)
        .transition(transition);

    if cli.slideshow {
        let mut show = Slideshow::new(
            files,
            Duration::from_secs(cli.interval),
            cli.random,
            StdRng::from_rng(&mut rand::rng()),
        )?;
        slideshow::run_slideshow(&mut session, &mut show, &template, &RUNNING)
            .context("slideshow failed")?;
    } else {
        let path = if cli.random {
            files.choose(&mut rand::rng()).unwrap_or(first)
        } else {
            first
        };
        info!("Setting wallpaper: {}", path.display());
        session
            .set_wallpaper_blocking(&template.with_file(path), &RUNNING)
            .with_context(|| format!("failed to set wallpaper {}", path.display()))?;
    }

    session.teardown();
    Ok(())
}

/// Positional paths and the playlist, with directories expanded.
fn collect_files(cli: &Cli) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in &cli.paths {
        if path.is_dir() {
            files.extend(
                slideshow::scan_directory(path, cli.recursive)
                    .with_context(|| format!("failed to scan {}", path.display()))?,
            );
        } else {
            files.push(path.clone());
        }
    }
    if let Some(playlist) = &cli.playlist {
        files.extend(slideshow::load_playlist(playlist)?);
    }
    Ok(files)
}

extern "C" fn request_shutdown(_signal: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let handler = request_shutdown as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}
