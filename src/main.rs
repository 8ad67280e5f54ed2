//! MJPEG HTTP streamer entry point

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use mjpeg_httpd::capture::{CaptureConfig, PatternSource};
use mjpeg_httpd::config::{Config, SourceKind};
use mjpeg_httpd::server;
use mjpeg_httpd::stream::SessionCamera;
use mjpeg_httpd::wifi::{LinkOutcome, NmcliDriver, WifiManager};

#[derive(Parser, Debug)]
#[command(name = "mjpeg-httpd")]
#[command(about = "Single-client MJPEG-over-HTTP camera streamer")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    info!(version = env!("CARGO_PKG_VERSION"), "mjpeg-httpd starting");

    let config = if std::path::Path::new(&cli.config).exists() {
        info!(config_path = %cli.config, "Loading configuration");
        Config::load(&cli.config).with_context(|| format!("loading {}", cli.config))?
    } else {
        info!(config_path = %cli.config, "Config file not found, using defaults");
        Config::default()
    };

    // Camera first: without frames there is nothing to serve.
    let camera = build_camera(&config).context("initializing frame source")?;

    // Bring the wireless link up before exposing the stream.
    if config.wifi.enabled {
        let driver = NmcliDriver::new(
            &config.wifi.ssid,
            &config.wifi.passphrase,
            &config.wifi.interface,
        );
        let mut wifi = WifiManager::start(driver, &config.wifi)
            .await
            .context("initializing wireless link")?;

        match wifi
            .wait_for_outcome()
            .await
            .context("waiting for link outcome")?
        {
            LinkOutcome::Connected => {
                info!(ssid = %config.wifi.ssid, state = %wifi.state(), "Wireless link up");
            }
            LinkOutcome::Failed => {
                // Serve anyway: the box may be reachable over another
                // interface, and the supervisor keeps watching the
                // link.
                warn!(ssid = %config.wifi.ssid, "Wireless link failed, serving anyway");
            }
        }
    }

    server::run_server(&config, camera).await
}

fn build_camera(config: &Config) -> Result<Box<dyn SessionCamera>> {
    let capture = CaptureConfig::from(&config.camera);

    match config.camera.source {
        SourceKind::Pattern => Ok(Box::new(PatternSource::new(&capture)?)),

        #[cfg(feature = "gst")]
        SourceKind::Gst => Ok(Box::new(mjpeg_httpd::capture::GstSource::new(&capture)?)),

        #[cfg(not(feature = "gst"))]
        SourceKind::Gst => {
            anyhow::bail!("camera.source = \"gst\" requires building with the `gst` feature")
        }
    }
}
