//! Configuration for router databases and contraction runs
//!
//! All structs deserialize from JSON with every field optional; missing
//! fields take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributesIndexMode;
use crate::error::{Error, Result};
use crate::network::DEFAULT_MAX_EDGE_DISTANCE;
use crate::restrictions::DEFAULT_HASH_COUNT;

/// Tuning knobs for the hierarchy builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractionConfig {
    /// Weight of (shortcuts added - edges removed)
    pub difference_factor: i64,
    /// Weight of the hierarchy depth of a vertex
    pub depth_factor: i64,
    /// Weight of the number of already contracted neighbours
    pub contracted_factor: i64,
    /// Maximum vertices settled per witness search; `None` = unbounded
    pub witness_max_settles: Option<usize>,
    /// Override for the inner sequence cap; `None` = longest restriction
    pub max_sequence_len: Option<usize>,
    /// Log progress every N contracted vertices
    pub progress_interval: usize,
}

impl Default for ContractionConfig {
    fn default() -> Self {
        Self {
            difference_factor: 5,
            depth_factor: 5,
            contracted_factor: 8,
            witness_max_settles: None,
            max_sequence_len: None,
            progress_interval: 10_000,
        }
    }
}

impl ContractionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.witness_max_settles == Some(0) {
            return Err(Error::invalid_argument(
                "witness_max_settles must be at least 1",
            ));
        }
        if self.progress_interval == 0 {
            return Err(Error::invalid_argument("progress_interval must be at least 1"));
        }
        Ok(())
    }
}

/// Router database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterDbConfig {
    pub contraction: ContractionConfig,
    /// Number of hash buckets in each restrictions db
    pub restriction_hash_count: usize,
    /// Longest edge the network accepts, in meters
    pub max_edge_distance: f32,
    /// Edge profile ids are stored as u16, so ids must stay dense
    pub edge_profiles_mode: AttributesIndexMode,
    pub edge_meta_mode: AttributesIndexMode,
}

impl Default for RouterDbConfig {
    fn default() -> Self {
        Self {
            contraction: ContractionConfig::default(),
            restriction_hash_count: DEFAULT_HASH_COUNT,
            max_edge_distance: DEFAULT_MAX_EDGE_DISTANCE,
            edge_profiles_mode: AttributesIndexMode::INCREASE_ONE_REVERSE_ALL,
            edge_meta_mode: AttributesIndexMode::default(),
        }
    }
}

impl RouterDbConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.contraction.validate()?;
        if self.restriction_hash_count == 0 || self.restriction_hash_count > i32::MAX as usize / 2 {
            return Err(Error::invalid_argument(format!(
                "restriction_hash_count out of range: {}",
                self.restriction_hash_count
            )));
        }
        if !(self.max_edge_distance > 0.0) {
            return Err(Error::invalid_argument(format!(
                "max_edge_distance must be positive, got {}",
                self.max_edge_distance
            )));
        }
        self.edge_profiles_mode.validate()?;
        self.edge_meta_mode.validate()?;
        Ok(())
    }
}
