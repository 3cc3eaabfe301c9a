//! Simulator configuration
//!
//! Every field has a default, so an empty file (or no file) runs the stock
//! cluster on `vcan0`. Command-line flags are layered on top by the binary
//! before [`SimConfig::resolve`] validates the whole thing.
//!
//! ```toml
//! [transport]
//! interface = "vcan0"
//! diag_request_id = "0x7DF"
//! diag_response_id = "0x7E8"
//!
//! [layout]
//! model = "bmw"
//!
//! [security]
//! timeout_ms = 10000
//! auto_relock_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::layout::{FieldLayout, SpeedModel, VehicleModel};
use crate::presentation::MAX_FPS;
use crate::security::SecurityAccess;
use crate::transport::parse_can_id;

/// Complete simulator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

impl SimConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Validate and pick the single active layout.
    ///
    /// A seed (given, or taken from the clock when `randomize` is set)
    /// selects a randomized layout; otherwise a named model's overrides
    /// apply; otherwise the compiled default. The model's speed decoder is
    /// kept even when the layout is randomized.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let layout_cfg = &self.layout;

        if layout_cfg.randomize && layout_cfg.seed.is_some() {
            return Err(ConfigError::ConflictingSeed);
        }

        let model = layout_cfg
            .model
            .as_deref()
            .map(|name| {
                VehicleModel::from_name(name).ok_or_else(|| ConfigError::UnknownModel {
                    name: name.to_string(),
                })
            })
            .transpose()?;

        let fps = self.display.fps;
        if fps == 0 || fps > MAX_FPS {
            return Err(ConfigError::InvalidFps { fps, max: MAX_FPS });
        }

        let diag_request_id = parse_id(&self.transport.diag_request_id)?;
        let diag_response_id = parse_id(&self.transport.diag_response_id)?;

        let seed = if layout_cfg.randomize {
            Some(unix_seconds())
        } else {
            layout_cfg.seed
        };

        let layout = match (seed, model) {
            (Some(seed), _) => FieldLayout::randomized(seed),
            (None, Some(model)) => FieldLayout::for_model(model),
            (None, None) => FieldLayout::default(),
        }
        .with_diagnostic_id(diag_request_id);

        Ok(ResolvedConfig {
            interface: self.transport.interface.clone(),
            layout,
            speed_model: model.map(VehicleModel::speed_model).unwrap_or_default(),
            model,
            layout_seed: seed,
            seed_file: layout_cfg.seed_file.clone(),
            diag_response_id,
            poll_timeout: Duration::from_millis(self.transport.receive_timeout_ms),
            key_timeout: Duration::from_millis(self.security.timeout_ms),
            auto_relock: Duration::from_secs(self.security.auto_relock_secs),
            reset_on_invalid_key: self.security.reset_on_invalid_key,
            fps,
        })
    }
}

fn parse_id(value: &str) -> Result<u32, ConfigError> {
    parse_can_id(value).map_err(|e| ConfigError::InvalidCanId {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// =============================================================================
// Transport Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// CAN interface
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Identifier SecurityAccess requests arrive on
    #[serde(default = "default_diag_request_id")]
    pub diag_request_id: String,

    /// Identifier responses are sent from
    #[serde(default = "default_diag_response_id")]
    pub diag_response_id: String,

    /// Receive poll period; bounds shutdown latency
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
}

fn default_interface() -> String {
    "vcan0".to_string()
}

fn default_diag_request_id() -> String {
    "0x7DF".to_string()
}

fn default_diag_response_id() -> String {
    "0x7E8".to_string()
}

fn default_receive_timeout_ms() -> u64 {
    100
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            diag_request_id: default_diag_request_id(),
            diag_response_id: default_diag_response_id(),
            receive_timeout_ms: default_receive_timeout_ms(),
        }
    }
}

// =============================================================================
// Layout Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Randomize identifiers and offsets with a clock-derived seed
    #[serde(default)]
    pub randomize: bool,

    /// Randomize identifiers and offsets from this seed
    #[serde(default)]
    pub seed: Option<u64>,

    /// Named vehicle model (e.g. "bmw")
    #[serde(default)]
    pub model: Option<String>,

    /// Where the layout seed is recorded for reproduction
    #[serde(default = "default_seed_file")]
    pub seed_file: PathBuf,
}

fn default_seed_file() -> PathBuf {
    PathBuf::from("/tmp/icsim_seed.txt")
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            randomize: false,
            seed: None,
            model: None,
            seed_file: default_seed_file(),
        }
    }
}

// =============================================================================
// Security Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Seed-to-key window in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Seconds before a released central lock re-engages
    #[serde(default = "default_auto_relock_secs")]
    pub auto_relock_secs: u64,

    /// Close the handshake after a wrong key instead of allowing retries
    /// against the same seed
    #[serde(default)]
    pub reset_on_invalid_key: bool,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_auto_relock_secs() -> u64 {
    30
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            auto_relock_secs: default_auto_relock_secs(),
            reset_on_invalid_key: false,
        }
    }
}

// =============================================================================
// Display Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_fps() -> u32 {
    crate::presentation::DEFAULT_FPS
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Validated configuration handed to the simulator at startup
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub interface: String,
    pub layout: FieldLayout,
    pub speed_model: SpeedModel,
    pub model: Option<VehicleModel>,
    /// Seed the layout was sampled from, when randomized
    pub layout_seed: Option<u64>,
    pub seed_file: PathBuf,
    pub diag_response_id: u32,
    pub poll_timeout: Duration,
    pub key_timeout: Duration,
    pub auto_relock: Duration,
    pub reset_on_invalid_key: bool,
    pub fps: u32,
}

impl ResolvedConfig {
    /// Security machine for this run.
    ///
    /// A layout seed also seeds the challenge generator, so replaying a
    /// recorded seed reproduces the challenge sequence as well.
    pub fn security_access(&self) -> SecurityAccess {
        let security = match self.layout_seed {
            Some(seed) => SecurityAccess::with_seed(seed),
            None => SecurityAccess::default(),
        };
        security
            .timeout(self.key_timeout)
            .reset_on_invalid_key(self.reset_on_invalid_key)
    }

    /// Record the layout seed, if any, so the run can be reproduced
    pub fn record_seed(&self) -> Result<Option<u64>, ConfigError> {
        let Some(seed) = self.layout_seed else {
            return Ok(None);
        };
        write_seed_record(&self.seed_file, seed)?;
        info!(seed, path = %self.seed_file.display(), "Recorded layout seed");
        Ok(Some(seed))
    }
}

/// Write `seed` as a single decimal line
pub fn write_seed_record(path: &Path, seed: u64) -> Result<(), ConfigError> {
    std::fs::write(path, format!("{}\n", seed)).map_err(|source| ConfigError::SeedRecord {
        path: path.display().to_string(),
        source,
    })
}

/// Read a seed written by [`write_seed_record`]
pub fn read_seed_record(path: &Path) -> Result<u64, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SeedRecord {
        path: path.display().to_string(),
        source,
    })?;
    content
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| ConfigError::SeedRecord {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
}
