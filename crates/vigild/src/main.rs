use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vigil_core::{AuthPipeline, BoundingBox, Detection, QualityConfig, QualityGate};
use vigil_hw::Camera;

mod config;
mod dashboard;
mod runtime;
mod store;
mod synthetic;

use config::Config;
use store::IdentityStore;

#[derive(Parser)]
#[command(name = "vigild", version, about = "Continuous face authentication daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the authentication loop with the terminal dashboard
    Run {
        /// Use the built-in rendered scene instead of a camera
        #[arg(long)]
        synthetic: bool,
    },
    /// Inspect or edit the enrolled identity gallery
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
    /// Grab one frame from the camera and report its quality metrics
    CameraTest {
        /// Write the captured frame to this path (format from extension)
        #[arg(long)]
        save: Option<String>,
    },
}

#[derive(Subcommand)]
enum UsersAction {
    /// List enrolled identities
    List,
    /// Remove an identity by id
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Run { synthetic } => run(&config, synthetic).await,
        Command::Users { action } => users(&config, action),
        Command::CameraTest { save } => camera_test(&config, save.as_deref()),
    }
}

async fn run(config: &Config, synthetic: bool) -> Result<()> {
    if !synthetic {
        bail!(
            "camera mode needs detection and recognition backends wired in; \
             run with --synthetic for the self-contained demo"
        );
    }

    tracing::info!("starting in synthetic mode");

    // The demo never touches the on-disk gallery; enrollments live for
    // the session only.
    let store = IdentityStore::open(Path::new(":memory:"))?;
    let gallery = store.load_all()?;
    let pipeline = AuthPipeline::new(
        synthetic::SyntheticDetector,
        synthetic::SyntheticEncoder,
        synthetic::SyntheticAnalyzer,
        config.pipeline(),
        gallery,
    );
    let camera = synthetic::SyntheticCamera::new(config.camera_width, config.camera_height);
    let runtime = runtime::spawn_pipeline(camera, pipeline, store, "synthetic");
    dashboard::run(runtime).await
}

fn users(config: &Config, action: UsersAction) -> Result<()> {
    let store = IdentityStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;

    match action {
        UsersAction::List => {
            let infos = store.list()?;
            if infos.is_empty() {
                println!("no enrolled identities");
                return Ok(());
            }
            for info in infos {
                println!(
                    "{}  {}  ({}, {})",
                    info.id, info.name, info.model_version, info.created_at
                );
            }
            println!("{} enrolled", store.count()?);
        }
        UsersAction::Remove { id } => {
            if store.remove(&id)? {
                println!("removed {id}");
            } else {
                bail!("no identity with id {id}");
            }
        }
    }
    Ok(())
}

fn camera_test(config: &Config, save: Option<&str>) -> Result<()> {
    let mut camera = Camera::open(
        &config.camera_device,
        config.camera_width,
        config.camera_height,
        config.camera_fps,
        config.warmup_frames,
    )?;
    let frame = camera.capture_rgb()?;
    println!(
        "captured {}x{} from {}",
        frame.width,
        frame.height,
        camera.device()
    );

    let gate = QualityGate::new(QualityConfig::default());
    let whole = Detection::from_bbox(
        BoundingBox::new(0, 0, frame.width as i32, frame.height as i32),
        1.0,
    );
    let verdict = gate.evaluate(&frame, &whole);
    println!("blur score  {:.1}", verdict.blur_score);
    println!("brightness  {:.1}", verdict.brightness);
    println!("quality     {}", if verdict.pass { "pass" } else { "fail" });
    if !verdict.pass {
        let reasons: Vec<String> = verdict.reasons().iter().map(|r| r.to_string()).collect();
        println!("reasons     {}", reasons.join(", "));
    }

    if let Some(path) = save {
        let image = image::RgbImage::from_raw(frame.width, frame.height, frame.data.clone())
            .context("frame buffer did not match its dimensions")?;
        image.save(path).with_context(|| format!("saving {path}"))?;
        println!("saved {path}");
    }
    Ok(())
}
