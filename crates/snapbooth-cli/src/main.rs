use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use snapbooth_hw::{compose_print, Camera, PrintStyle};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snapbooth", about = "snapbooth photo booth CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon status
    Status,
    /// Leave the result screen and get ready for the next photo
    TakeAnother,
    /// Capture one print straight from the camera (bypasses the daemon)
    Snapshot {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Output JPEG path
        #[arg(short, long, default_value = "snapshot.jpg")]
        out: PathBuf,
        /// Frames to discard while exposure settles
        #[arg(long, default_value_t = 5)]
        warmup: usize,
    },
    /// List V4L2 capture devices
    Devices,
}

#[zbus::proxy(
    interface = "org.snapbooth.Booth1",
    default_service = "org.snapbooth.Booth1",
    default_path = "/org/snapbooth/Booth1"
)]
trait Booth {
    async fn take_another(&self) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

async fn booth() -> Result<BoothProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("cannot reach the session bus")?;
    BoothProxy::new(&connection)
        .await
        .context("snapboothd is not running")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let raw = booth().await?.status().await?;
            let status: serde_json::Value =
                serde_json::from_str(&raw).context("daemon returned malformed status")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::TakeAnother => {
            if booth().await?.take_another().await? {
                println!("Result dismissed; ready for the next photo.");
            } else {
                println!("No result is showing.");
            }
        }
        Commands::Snapshot {
            device,
            out,
            warmup,
        } => {
            let camera = Camera::open(&device, 1280, 720)?;
            println!(
                "Capturing from {} ({}x{})...",
                camera.device_path, camera.width, camera.height
            );
            let frame = camera.capture_frame(warmup)?;
            if frame.is_dark() {
                bail!(
                    "frame is too dark (mean luma {:.1}); is the lens covered?",
                    frame.mean_luma()
                );
            }
            let jpeg = compose_print(&frame, &PrintStyle::default())?;
            std::fs::write(&out, &jpeg)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Wrote {} ({} bytes)", out.display(), jpeg.len());
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found.");
            }
            for d in devices {
                println!("{}  {} [{}] {}", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}
