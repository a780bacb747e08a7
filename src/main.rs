use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use atlasfeed::decode::ExtensionDecoder;
use atlasfeed::discovery::{self, DEFAULT_PATTERN};
use atlasfeed::{AtlasPage, ResourceStreamCoordinator, StreamConfig, StreamError};
use atlasfeed_gpu::dev::GpuHandle;
use atlasfeed_gpu::UploadDevice;
use clap::Parser;
use regex::Regex;
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(
    name = "atlasfeed",
    about = "Stream a directory of images into texture atlas pages"
)]
struct Cli {
    /// Directory to scan for resources.
    dir: PathBuf,
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Root that `data/` identities resolve under.
    #[arg(long)]
    data_root: Option<PathBuf>,
    /// Square page size, overriding the configuration.
    #[arg(long)]
    page_size: Option<u32>,
    /// File name pattern; the first two groups are the world position.
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pattern: String,
    /// Write every page to this directory as PNG once streaming finishes.
    #[arg(long)]
    export: Option<PathBuf>,
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };
    if let Some(size) = cli.page_size {
        config = config.with_page_size(size, size);
    }
    if cli.data_root.is_some() {
        config.data_root = cli.data_root.clone();
    }
    config.validate()?;

    let pattern = Regex::new(&cli.pattern)?;
    let gpu = futures::executor::block_on(GpuHandle::new())?;
    let limit = gpu.max_page_dimension();
    if config.page_width > limit || config.page_height > limit {
        return Err(format!(
            "{}x{} pages exceed the device limit of {limit}",
            config.page_width, config.page_height
        )
        .into());
    }
    let mut coordinator = ResourceStreamCoordinator::new(
        config,
        gpu.dispatch().clone(),
        Arc::new(ExtensionDecoder),
    )?;

    let found = discovery::discover(&cli.dir, &pattern)?;
    let rejected = found
        .iter()
        .filter(|path| {
            coordinator
                .admit(discovery::request_from_path(path, &pattern))
                .is_err()
        })
        .count();
    log::info!(
        "Found {} resources in {} ({rejected} rejected)",
        found.len(),
        cli.dir.display()
    );

    // The runtime thread is the owning thread: every tick runs here.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(stream(&mut coordinator, Duration::from_millis(cli.tick_ms)))?;

    for (page, count) in coordinator.instances_per_page().iter().enumerate() {
        println!("page {page}: {count} instances");
    }
    for diagnostic in coordinator.diagnostics() {
        println!("skipped {}: {}", diagnostic.identity, diagnostic.error);
    }

    if let Some(dir) = &cli.export {
        export_pages(coordinator.pages(), dir)?;
    }
    Ok(())
}

async fn stream<D: UploadDevice>(
    coordinator: &mut ResourceStreamCoordinator<D>,
    period: Duration,
) -> Result<(), StreamError> {
    let mut limiter = tokio::time::interval(period);
    limiter.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let stats = coordinator.stats();
    let mut reported = 0;

    loop {
        limiter.tick().await;
        coordinator.update()?;

        let snapshot = stats.read().clone();
        if snapshot.completed() != reported {
            reported = snapshot.completed();
            log::info!("loaded {reported} / {}", snapshot.total);
        }
        if coordinator.is_idle() {
            log::info!(
                "Done: {} instances on {} pages",
                snapshot.instances,
                snapshot.pages
            );
            return Ok(());
        }
    }
}

fn export_pages<T>(pages: &[AtlasPage<T>], dir: &Path) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(dir)?;
    for page in pages {
        let image = image::RgbaImage::from_raw(page.width(), page.height(), page.pixels().to_vec())
            .ok_or("page backing buffer does not match its dimensions")?;
        let path = dir.join(format!("page_{}.png", page.index()));
        image.save(&path)?;
        log::info!("Exported {}", path.display());
    }
    Ok(())
}
