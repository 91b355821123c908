use crate::classifier::{Classifier, HttpClassifier};
use crate::config::{load_config, save_config, Config};
use crate::controller;
use crate::frame::{
    CameraSource, DirectorySource, EncodedFrame, FrameSampler, FrameSource, StillSource,
};
use crate::gesture::SceneHandle;
use crate::positions::layout;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gesture-poller",
    version,
    about = "Hand gesture poll loop for a remote vision classifier"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the poll loop and print scene updates
    Run {
        /// Replay images from a directory instead of the camera
        #[arg(short, long)]
        frames: Option<PathBuf>,
        /// Override the classifier endpoint
        #[arg(short, long)]
        endpoint: Option<String>,
        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Classify a single image and print the result
    Classify {
        image: PathBuf,
        /// Override the classifier endpoint
        #[arg(short, long)]
        endpoint: Option<String>,
    },
    /// Inspect or change the stored configuration
    Config {
        #[command(subcommand)]
        action: ConfigSubcommand,
    },
    /// Print the object placement table
    Layout {
        #[arg(short, long, default_value_t = 200)]
        count: usize,
    },
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the current configuration
    Show,
    /// Set the classifier endpoint
    Endpoint { url: String },
    /// Set the poll delays in milliseconds
    Delays {
        #[arg(long)]
        success: Option<u64>,
        #[arg(long)]
        backoff: Option<u64>,
        #[arg(long)]
        idle: Option<u64>,
    },
}

pub fn run_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    execute(cli);
}

pub fn execute(cli: Cli) {
    match cli.command {
        Commands::Run {
            frames,
            endpoint,
            duration,
        } => run(frames, endpoint, duration.map(Duration::from_secs)),
        Commands::Classify { image, endpoint } => classify_image(&image, endpoint),
        Commands::Config { action } => match action {
            ConfigSubcommand::Show => show_config(),
            ConfigSubcommand::Endpoint { url } => set_endpoint(url),
            ConfigSubcommand::Delays {
                success,
                backoff,
                idle,
            } => set_delays(success, backoff, idle),
        },
        Commands::Layout { count } => print_layout(count),
    }
}

fn classifier_for(cfg: &Config, endpoint: Option<String>) -> HttpClassifier {
    HttpClassifier::new(
        endpoint.unwrap_or_else(|| cfg.endpoint.clone()),
        cfg.api_key(),
        cfg.request_timeout(),
    )
}

fn run(frames: Option<PathBuf>, endpoint: Option<String>, duration: Option<Duration>) {
    let cfg = load_config();
    let classifier = classifier_for(&cfg, endpoint);
    info!(endpoint = classifier.endpoint(), "starting gesture poll loop");
    let scene = SceneHandle::new();
    let sample = (cfg.sample_width, cfg.sample_height);

    let handle = match frames {
        Some(dir) => controller::start(
            move || DirectorySource::new(&dir),
            sample,
            cfg.jpeg_quality,
            classifier,
            scene.clone(),
            cfg.poll_policy(),
        ),
        None => {
            let (index, w, h) = (cfg.camera_index, cfg.camera_width, cfg.camera_height);
            controller::start(
                move || CameraSource::new(index, w, h),
                sample,
                cfg.jpeg_quality,
                classifier,
                scene.clone(),
                cfg.poll_policy(),
            )
        }
    };

    render_until(&scene, duration);
    handle.stop();
    handle.join();
}

/// Console stand-in for a renderer: prints each scene update once.
fn render_until(scene: &SceneHandle, duration: Option<Duration>) {
    let deadline = duration.map(|d| Instant::now() + d);
    let mut seen = scene.snapshot().version;
    loop {
        let wait = match deadline {
            Some(d) => match d.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => left,
                _ => break,
            },
            None => Duration::from_secs(1),
        };
        if let Some(snap) = scene.wait_for_update(seen, wait) {
            seen = snap.version;
            println!(
                "[{:?}] hand=({:+.2}, {:+.2}) {} {}",
                snap.state, snap.hand.x, snap.hand.y, snap.status, snap.debug
            );
        }
    }
}

fn classify_image(path: &Path, endpoint: Option<String>) {
    let cfg = load_config();
    let img = match image::open(path) {
        Ok(i) => i,
        Err(e) => {
            error!("failed to read {}: {e}", path.display());
            return;
        }
    };
    let Some(frame) = sample_once(StillSource(Some(img)), &cfg) else {
        error!("failed to sample {}", path.display());
        return;
    };
    let mut classifier = classifier_for(&cfg, endpoint);
    match classifier.classify(&frame) {
        Ok(res) => match serde_json::to_string_pretty(&res) {
            Ok(s) => println!("{s}"),
            Err(e) => error!("failed to encode result: {e}"),
        },
        Err(e) => error!("classification failed: {e}"),
    }
}

fn show_config() {
    match serde_json::to_string_pretty(&load_config().redacted()) {
        Ok(s) => println!("{s}"),
        Err(e) => error!("failed to encode config: {e}"),
    }
}

fn set_endpoint(url: String) {
    let mut cfg = load_config();
    cfg.endpoint = url;
    if let Err(e) = save_config(&cfg) {
        error!("{e}");
        return;
    }
    info!(endpoint = %cfg.endpoint, "classifier endpoint updated");
}

fn set_delays(success: Option<u64>, backoff: Option<u64>, idle: Option<u64>) {
    let mut cfg = load_config();
    if let Some(v) = success {
        cfg.success_delay_ms = v;
    }
    if let Some(v) = backoff {
        cfg.backoff_delay_ms = v;
    }
    if let Some(v) = idle {
        cfg.idle_delay_ms = v;
    }
    if let Err(e) = save_config(&cfg) {
        error!("{e}");
        return;
    }
    info!(
        success_ms = cfg.success_delay_ms,
        backoff_ms = cfg.backoff_delay_ms,
        idle_ms = cfg.idle_delay_ms,
        "poll delays updated"
    );
}

fn print_layout(count: usize) {
    match serde_json::to_string(&layout(count)) {
        Ok(s) => println!("{s}"),
        Err(e) => error!("failed to encode layout: {e}"),
    }
}

/// Samples one image from `source` the way the poll loop would.
pub fn sample_once<S: FrameSource>(source: S, cfg: &Config) -> Option<EncodedFrame> {
    FrameSampler::new(source, cfg.sample_width, cfg.sample_height, cfg.jpeg_quality).capture()
}
