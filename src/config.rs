//! Runtime configuration (§4.8, new): file plus environment overrides via
//! the `config` crate, in the spirit of the teacher's hand-rolled
//! `Config::load` (`src/config.rs`) — file source first, environment
//! overrides layered on top, both merged into one typed struct.

use serde::Deserialize;
use uuid::Uuid;

use crate::terrain::{DEFAULT_TRAVEL_DURATION_MS, MAX_BUDGET_LOCATIONS};

/// World-core runtime configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Anchor used when an `AreaGeneration` request doesn't name one
    /// explicitly (§4.3).
    pub starter_location_id: Option<Uuid>,
    /// Upper bound applied to any caller-supplied `batchLocations`/`batchSize`
    /// (§4.3, §9). Never raised above [`MAX_BUDGET_LOCATIONS`] regardless of
    /// what the file/environment says.
    pub max_budget_locations: u32,
    /// Exit travel duration assumed when a producer doesn't specify one
    /// (§3, §9).
    pub default_travel_duration_ms: u64,
    /// Bound on the processor's in-memory idempotency cache (§4.2 tier 1).
    pub idempotency_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            starter_location_id: None,
            max_budget_locations: MAX_BUDGET_LOCATIONS,
            default_travel_duration_ms: DEFAULT_TRAVEL_DURATION_MS,
            idempotency_cache_capacity: crate::processor::idempotency_cache::DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Clamp to [`MAX_BUDGET_LOCATIONS`] regardless of source (§9).
    pub fn clamped_max_budget_locations(&self) -> u32 {
        self.max_budget_locations.min(MAX_BUDGET_LOCATIONS)
    }

    /// Load from `WORLD_CONFIG` (a YAML file, if present) with `WORLD_*`
    /// environment variables layered on top — e.g. `WORLD_MAX_BUDGET_LOCATIONS`,
    /// `WORLD_STARTER_LOCATION_ID`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("WORLD_CONFIG").unwrap_or_else(|_| "world-core.yaml".to_string());

        let mut builder = ::config::Config::builder();

        if std::path::Path::new(&config_path).exists() {
            builder = builder.add_source(::config::File::with_name(&config_path));
        }

        let built = builder
            .add_source(::config::Environment::with_prefix("WORLD").separator("_"))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        built.try_deserialize().map_err(|e| ConfigError::Load(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),
}
