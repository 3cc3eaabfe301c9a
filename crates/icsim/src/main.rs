//! Instrument Cluster Simulator
//!
//! Listens on a CAN interface for door, turn-signal and speed frames and
//! answers UDS SecurityAccess requests that unlock the simulated vehicle.
//!
//! # Usage
//!
//! Stock layout:
//! ```bash
//! ./icsim vcan0
//! ```
//!
//! Randomized identifiers (seed is written to /tmp/icsim_seed.txt):
//! ```bash
//! ./icsim -r vcan0
//! ./icsim -s 1700000000 vcan0   # replay a given seed
//! ./icsim --replay vcan0         # replay the seed in the seed file
//! ```
//!
//! With config file:
//! ```bash
//! ./icsim --config config/icsim.toml
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use icsim_core::config::read_seed_record;
use icsim_core::transport::open_socketcan;
use icsim_core::{
    BusListener, ConfigError, LogDashboard, PresentationDriver, ResolvedConfig, SimConfig,
    VehicleStore,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when the CAN interface cannot be opened
const EXIT_TRANSPORT: i32 = 6;

#[derive(Parser, Debug)]
#[command(name = "icsim")]
#[command(about = "Instrument cluster simulator for CAN bus training")]
struct Args {
    /// CAN interface name (overrides the config file)
    interface: Option<String>,

    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Randomize CAN identifiers and byte offsets
    #[arg(short, long)]
    randomize: bool,

    /// Seed for a reproducible randomized layout
    #[arg(short, long)]
    seed: Option<u64>,

    /// Vehicle model (e.g. bmw)
    #[arg(short, long)]
    model: Option<String>,

    /// Where to record the layout seed
    #[arg(long)]
    seed_file: Option<PathBuf>,

    /// Reuse the seed recorded in the seed file
    #[arg(long, conflicts_with_all = ["seed", "randomize"])]
    replay: bool,

    /// Enable debug output
    #[arg(short = 'd', long = "debug", alias = "verbose")]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "icsim=debug,icsim_core=debug"
    } else {
        "icsim=info,icsim_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match load_config(&args).and_then(|config| config.resolve()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    if let Some(seed) = config.layout_seed {
        info!(seed, "Randomized layout");
        if let Err(e) = config.record_seed() {
            warn!(%e, "Failed to record layout seed");
        }
    } else if let Some(model) = config.model {
        info!(?model, "Using model layout");
    }

    info!(interface = %config.interface, "Starting instrument cluster simulator");

    let transport = match open_socketcan(&config.interface) {
        Ok(transport) => transport,
        Err(e) => {
            error!(%e, interface = %config.interface, "Couldn't open CAN interface");
            std::process::exit(EXIT_TRANSPORT);
        }
    };

    run(config, transport).await?;

    info!("Instrument cluster simulator stopped");
    Ok(())
}

/// Config file first, then command-line overrides
fn load_config(args: &Args) -> Result<SimConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            SimConfig::load(path)?
        }
        None => SimConfig::default(),
    };

    if let Some(interface) = &args.interface {
        config.transport.interface = interface.clone();
    }
    if args.randomize {
        config.layout.randomize = true;
    }
    if args.seed.is_some() {
        config.layout.seed = args.seed;
    }
    if args.model.is_some() {
        config.layout.model = args.model.clone();
    }
    if let Some(path) = &args.seed_file {
        config.layout.seed_file = path.clone();
    }
    if args.replay {
        let seed = read_seed_record(&config.layout.seed_file)?;
        info!(seed, path = %config.layout.seed_file.display(), "Replaying recorded seed");
        config.layout.seed = Some(seed);
        config.layout.randomize = false;
    }

    Ok(config)
}

fn exit_with(e: &ConfigError) -> ! {
    error!(%e, "Invalid configuration");
    std::process::exit(e.exit_code());
}

async fn run(
    config: ResolvedConfig,
    transport: Arc<dyn icsim_core::CanTransport>,
) -> Result<()> {
    let store = Arc::new(VehicleStore::with_auto_relock(
        config.security_access(),
        config.auto_relock,
    ));
    let running = Arc::new(AtomicBool::new(true));

    let listener = BusListener::new(
        transport,
        store.clone(),
        config.layout,
        config.speed_model,
    )
    .response_id(config.diag_response_id)
    .poll_timeout(config.poll_timeout);

    // Blocking receive loop on its own thread
    let running_for_listener = running.clone();
    let listener_handle: JoinHandle<()> =
        tokio::task::spawn_blocking(move || listener.run(&running_for_listener));

    let driver = PresentationDriver::new(store, LogDashboard);
    let driver_handle = tokio::spawn(driver.run(running.clone(), config.fps));

    info!("Simulator ready - waiting for frames");
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    running.store(false, Ordering::SeqCst);

    let _ = tokio::time::timeout(Duration::from_secs(2), listener_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), driver_handle).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const FILE_CONFIG: &str = r#"
[transport]
interface = "can0"

[layout]
model = "audi"
seed_file = "/var/tmp/from_file.txt"

[display]
fps = 30
"#;

    #[test]
    fn test_file_values_without_flags() {
        let file = config_file(FILE_CONFIG);
        let path = file.path().to_str().unwrap();
        let args = Args::parse_from(["icsim", "--config", path]);

        let config = load_config(&args).unwrap();
        assert_eq!(config.transport.interface, "can0");
        assert_eq!(config.layout.model.as_deref(), Some("audi"));
        assert_eq!(config.layout.seed, None);
        assert!(!config.layout.randomize);
        assert_eq!(config.display.fps, 30);
    }

    #[test]
    fn test_flags_override_file() {
        let file = config_file(FILE_CONFIG);
        let path = file.path().to_str().unwrap();
        let args = Args::parse_from([
            "icsim",
            "--config",
            path,
            "-s",
            "42",
            "-m",
            "bmw",
            "--seed-file",
            "/tmp/other_seed.txt",
            "vcan1",
        ]);

        let config = load_config(&args).unwrap();
        assert_eq!(config.transport.interface, "vcan1");
        assert_eq!(config.layout.seed, Some(42));
        assert_eq!(config.layout.model.as_deref(), Some("bmw"));
        assert_eq!(config.layout.seed_file, PathBuf::from("/tmp/other_seed.txt"));
        // Untouched by flags
        assert_eq!(config.display.fps, 30);

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.layout_seed, Some(42));
    }

    #[test]
    fn test_randomize_flag_conflicts_with_file_seed() {
        let file = config_file("[layout]\nseed = 7\n");
        let path = file.path().to_str().unwrap();
        let args = Args::parse_from(["icsim", "--config", path, "-r"]);

        let config = load_config(&args).unwrap();
        assert!(config.layout.randomize);

        let err = config.resolve().unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_replay_reads_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let seed_file = dir.path().join("icsim_seed.txt");
        icsim_core::config::write_seed_record(&seed_file, 1_700_000_000).unwrap();

        let args = Args::parse_from([
            "icsim",
            "--replay",
            "--seed-file",
            seed_file.to_str().unwrap(),
        ]);
        let resolved = load_config(&args).unwrap().resolve().unwrap();

        assert_eq!(resolved.layout_seed, Some(1_700_000_000));
        assert_eq!(
            resolved.layout,
            icsim_core::FieldLayout::randomized(1_700_000_000)
        );
    }

    #[test]
    fn test_replay_without_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let seed_file = dir.path().join("missing.txt");

        let args = Args::parse_from([
            "icsim",
            "--replay",
            "--seed-file",
            seed_file.to_str().unwrap(),
        ]);
        let err = load_config(&args).unwrap_err();
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn test_replay_conflicts_with_seed_flag() {
        let result = Args::try_parse_from(["icsim", "--replay", "-s", "3"]);
        assert!(result.is_err());
    }
}
