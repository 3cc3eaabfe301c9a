//! Startup configuration errors

use thiserror::Error;

/// Configuration problems detected before the simulator starts
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `seed` and `randomize` were both given
    #[error("Cannot specify a seed value and randomize the seed at the same time")]
    ConflictingSeed,

    #[error("Unknown model '{name}'. Acceptable models: {}", crate::layout::VehicleModel::NAMES.join(", "))]
    UnknownModel { name: String },

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid CAN ID '{value}': {reason}")]
    InvalidCanId { value: String, reason: String },

    #[error("Invalid display rate {fps} fps (expected 1..={max})")]
    InvalidFps { fps: u32, max: u32 },

    #[error("Seed record {path}: {source}")]
    SeedRecord {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Process exit status for this condition
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::ConflictingSeed => 1,
            ConfigError::UnknownModel { .. } => 3,
            ConfigError::Read { .. } | ConfigError::Parse { .. } => 4,
            ConfigError::InvalidCanId { .. } => 5,
            ConfigError::SeedRecord { .. } => 7,
            ConfigError::InvalidFps { .. } => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            ConfigError::ConflictingSeed,
            ConfigError::UnknownModel {
                name: "audi".to_string(),
            },
            ConfigError::InvalidCanId {
                value: "0xZZ".to_string(),
                reason: "invalid digit".to_string(),
            },
            ConfigError::InvalidFps { fps: 0, max: 1000 },
        ];
        let codes: Vec<i32> = errors.iter().map(ConfigError::exit_code).collect();
        assert_eq!(codes, vec![1, 3, 5, 8]);
    }

    #[test]
    fn test_unknown_model_lists_choices() {
        let err = ConfigError::UnknownModel {
            name: "audi".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown model 'audi'. Acceptable models: bmw"
        );
    }
}
