//! Render settings loaded from JSON and overridden from the command line.

use anyhow::{Context, Result};
use ivar_renderer::{EngineConfig, IntegratorConfig, DEFAULT_TILE_SIZE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Everything a render needs besides the scene. Missing JSON fields take
/// their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    /// Samples per pixel along each axis
    pub sample_rate: u32,
    pub max_depth: u32,
    /// Worker count; all cores when absent
    pub threads: Option<usize>,
    pub tile_size: u32,
    /// Fixed seed for reproducible noise
    pub seed: Option<u64>,
    pub roulette_start_depth: u32,
    pub survival_probability: f64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        let integrator = IntegratorConfig::default();
        Self {
            width: 640,
            height: 480,
            sample_rate: 4,
            max_depth: 8,
            threads: None,
            tile_size: DEFAULT_TILE_SIZE,
            seed: None,
            roulette_start_depth: integrator.roulette_start_depth,
            survival_probability: integrator.survival_probability,
        }
    }
}

impl RenderSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn engine_config(&self) -> EngineConfig {
        let integrator = IntegratorConfig::default()
            .with_roulette(self.roulette_start_depth, self.survival_probability);
        EngineConfig {
            threads: self.threads,
            tile_size: self.tile_size,
            seed: self.seed,
            integrator,
        }
    }
}
