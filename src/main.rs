use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use image::{Rgba, RgbaImage, imageops};
use log::{debug, info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use rasterview::raster::{JobSpec, LETTER, SyntheticRasterizer};
use rasterview::script::{Gesture, parse_script};
use rasterview::settings::{self, get_settings};
use rasterview::view::{DualViewCoordinator, OverlayRect, ViewEvent, ViewRole};
use rasterview::{ViewError, panic_handler};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);
const OVERLAY_COLOR: Rgba<u8> = Rgba([220, 30, 30, 255]);

/// Drive an overview + zoomed view pair over a synthetic document and write
/// what both windows show as PNG snapshots
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of pages in the synthetic document
    #[arg(long, default_value = "3")]
    pages: u32,

    /// Page size in inches, `WIDTHxHEIGHT`
    #[arg(long, value_parser = parse_page_size, default_value = "8.5x11")]
    page_size: (f64, f64),

    /// Gesture script, one gesture per line
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Directory for the PNG snapshots
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Settings file instead of the one in the user's config directory
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "rasterview.log")]
    log_file: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn parse_page_size(value: &str) -> Result<(f64, f64), String> {
    if value.eq_ignore_ascii_case("letter") {
        return Ok(LETTER);
    }
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let parse = |side: &str| {
        side.trim()
            .parse::<f64>()
            .ok()
            .filter(|inches| inches.is_finite() && *inches > 0.0)
            .ok_or_else(|| format!("`{side}` is not a positive size"))
    };
    Ok((parse(width)?, parse(height)?))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(level, Config::default(), File::create(&args.log_file)?)?;
    panic_handler::initialize_panic_handler();

    info!("Starting rasterview");

    match &args.config {
        Some(path) => settings::load_settings_from_path(path),
        None => settings::load_settings(),
    }
    let settings = get_settings();
    debug!("Using settings {settings:?}");

    let gestures = match &args.script {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading script {}", path.display()))?;
            parse_script(&text).with_context(|| format!("parsing script {}", path.display()))?
        }
        None => Vec::new(),
    };

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;

    let spec = JobSpec::new(format!("synthetic:{}pages", args.pages));
    let mut coordinator = DualViewCoordinator::new(
        &spec,
        Box::new(SyntheticRasterizer::new(args.pages, args.page_size)),
        Box::new(SyntheticRasterizer::new(args.pages, args.page_size)),
        &settings,
    )?;

    coordinator.start()?;
    settle(&mut coordinator)?;
    let mut snapshot = 0;
    write_snapshot(&coordinator, &args.out, snapshot)?;

    for gesture in gestures {
        debug!("Gesture {gesture:?}");
        match apply(&mut coordinator, gesture) {
            Ok(()) => {}
            Err(e @ (ViewError::InvalidParameter { .. } | ViewError::NotReady)) => {
                warn!("Gesture {gesture:?} ignored: {e}");
            }
            Err(e) => return Err(e.into()),
        }
        if gesture == Gesture::Wait {
            settle(&mut coordinator)?;
            snapshot += 1;
            write_snapshot(&coordinator, &args.out, snapshot)?;
        } else {
            log_events(&coordinator.pump());
        }
    }

    settle(&mut coordinator)?;
    snapshot += 1;
    write_snapshot(&coordinator, &args.out, snapshot)?;

    info!("Shutting down rasterview after {} snapshots", snapshot + 1);
    Ok(())
}

fn apply(coordinator: &mut DualViewCoordinator, gesture: Gesture) -> Result<(), ViewError> {
    match gesture {
        Gesture::Pan { dx, dy } => coordinator.pan(dx, dy).map(drop),
        Gesture::ZoomIn { x, y } => coordinator.zoom_in(x, y).map(drop),
        Gesture::ZoomOut { x, y } => coordinator.zoom_out(x, y).map(drop),
        Gesture::ZoomToRes { resolution } => coordinator.zoom_to_res(resolution),
        Gesture::NextPage => coordinator.next_page(),
        Gesture::PrevPage => coordinator.prev_page(),
        Gesture::Wait => Ok(()),
    }
}

/// Pump until neither view has work left
fn settle(coordinator: &mut DualViewCoordinator) -> Result<()> {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        log_events(&coordinator.wait_events(Duration::from_millis(50)));
        if !coordinator.overview().is_busy()
            && !coordinator.detail().is_busy()
            && !coordinator.has_pending_refresh()
        {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("views still busy after {SETTLE_TIMEOUT:?}: {coordinator:?}");
        }
    }
}

fn log_events(events: &[ViewEvent]) {
    for event in events {
        match event {
            ViewEvent::ProductionAborted { view, error } => {
                warn!("{} production aborted: {error}", view.name());
            }
            ViewEvent::ProductionFailed { view, error } => {
                warn!("{} production failed: {error}", view.name());
            }
            other => debug!("{other:?}"),
        }
    }
}

fn write_snapshot(coordinator: &DualViewCoordinator, dir: &Path, index: usize) -> Result<()> {
    let page = coordinator.page();

    if let Some(frame) = coordinator.frame(ViewRole::Overview) {
        let mut image = frame
            .image
            .to_rgba_image()
            .context("overview raster does not convert to RGBA")?;
        if let Some(overlay) = frame.overlay {
            draw_outline(&mut image, &overlay);
        }
        let path = dir.join(format!("{index:03}-p{page}-overview.png"));
        image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    if let Some(frame) = coordinator.frame(ViewRole::Detail) {
        let image = frame
            .image
            .to_rgba_image()
            .context("detail raster does not convert to RGBA")?;
        let (width, height) = coordinator.detail_viewport();
        let x = clamp_to(frame.origin.x, image.width());
        let y = clamp_to(frame.origin.y, image.height());
        let visible = imageops::crop_imm(&image, x, y, width, height).to_image();
        let path = dir.join(format!("{index:03}-p{page}-detail.png"));
        visible
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn clamp_to(value: f64, limit: u32) -> u32 {
    value.round().clamp(0.0, f64::from(limit)) as u32
}

/// One pixel wide rectangle, clipped to the image
fn draw_outline(image: &mut RgbaImage, rect: &OverlayRect) {
    if rect.is_degenerate() || image.width() == 0 || image.height() == 0 {
        return;
    }
    let max_x = i64::from(image.width()) - 1;
    let max_y = i64::from(image.height()) - 1;
    let left = rect.x.round() as i64;
    let top = rect.y.round() as i64;
    let right = (rect.x + rect.width).round() as i64 - 1;
    let bottom = (rect.y + rect.height).round() as i64 - 1;

    let mut put = |x: i64, y: i64| {
        if (0..=max_x).contains(&x) && (0..=max_y).contains(&y) {
            image.put_pixel(x as u32, y as u32, OVERLAY_COLOR);
        }
    };
    for x in left.max(0)..=right.min(max_x) {
        put(x, top);
        put(x, bottom);
    }
    for y in top.max(0)..=bottom.min(max_y) {
        put(left, y);
        put(right, y);
    }
}
