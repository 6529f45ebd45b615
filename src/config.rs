// ============================================================================
// config.rs — flockd
// Flock constants, live-tunable simulation parameters, and runtime
// configuration (JSON-loadable).
// ============================================================================

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{FlockError, FlockResult};

// ======================== Constants ========================

/// Side of the agent grid. Population is `GRID_WIDTH * GRID_WIDTH`.
pub const GRID_WIDTH: u32 = 32;
/// Largest accepted grid side. 2048² agents at 16 bytes each keep one field
/// within the 128 MiB default storage binding limit.
pub const MAX_GRID_WIDTH: u32 = 2048;
/// Edge length of the simulated cube.
pub const BOUNDS: f32 = 800.0;
pub const BOUNDS_HALF: f32 = BOUNDS / 2.0;
/// Upper bound on the per-frame timestep, in seconds.
pub const MAX_DELTA: f32 = 1.0;
/// Analytics cadence (4 Hz).
pub const ANALYTICS_INTERVAL_MS: f64 = 250.0;
/// Where idle predators are parked.
pub const PARKED_PREDATOR: Vec3 = Vec3::new(0.0, -100.0, -300.0);
/// Distribution reported before the first analytics sample.
pub const INITIAL_DISTRIBUTION: f32 = 0.5;

// ======================== Simulation Parameters ========================

/// Live-tunable flocking parameters, read by the velocity kernel each frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub separation_distance: f32,
    pub alignment_distance: f32,
    pub cohesion_distance: f32,
    /// 0 = full flock conformity, 1 = every agent drifts on its own.
    pub freedom_factor: f32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            separation_distance: 20.0,
            alignment_distance: 20.0,
            cohesion_distance: 20.0,
            freedom_factor: 0.75,
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> FlockResult<()> {
        for (name, value) in [
            ("separation_distance", self.separation_distance),
            ("alignment_distance", self.alignment_distance),
            ("cohesion_distance", self.cohesion_distance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(FlockError::invalid(format!(
                    "{name} must be a finite value >= 0, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.freedom_factor) {
            return Err(FlockError::invalid(format!(
                "freedom_factor must lie in [0, 1], got {}",
                self.freedom_factor
            )));
        }
        Ok(())
    }
}

// ======================== Force Tuning ========================

/// Gains and limits of the velocity kernel. Not exposed to the tuning UI.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceTuning {
    pub max_speed: f32,
    /// Extra speed allowed while a predator is within range.
    pub predator_speed_boost: f32,
    pub predator_radius: f32,
    pub predator_gain: f32,
    /// Width of the soft-wall band inside each face of the cube.
    pub wall_margin: f32,
    pub wall_gain: f32,
    pub separation_gain: f32,
    pub alignment_gain: f32,
    pub cohesion_gain: f32,
}

impl Default for ForceTuning {
    fn default() -> Self {
        Self {
            max_speed: 135.0,
            predator_speed_boost: 75.0,
            predator_radius: 150.0,
            predator_gain: 1500.0,
            wall_margin: 40.0,
            wall_gain: 75.0,
            separation_gain: 600.0,
            alignment_gain: 3.0,
            cohesion_gain: 1.5,
        }
    }
}

impl ForceTuning {
    pub fn validate(&self) -> FlockResult<()> {
        let fields = [
            ("max_speed", self.max_speed),
            ("predator_speed_boost", self.predator_speed_boost),
            ("predator_radius", self.predator_radius),
            ("predator_gain", self.predator_gain),
            ("wall_margin", self.wall_margin),
            ("wall_gain", self.wall_gain),
            ("separation_gain", self.separation_gain),
            ("alignment_gain", self.alignment_gain),
            ("cohesion_gain", self.cohesion_gain),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(FlockError::Config(format!(
                    "tuning.{name} must be a finite value >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ======================== Backend Selection ========================

/// Which compute substrate evaluates the kernels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Gpu,
    Cpu,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Gpu => "gpu",
            BackendKind::Cpu => "cpu",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(BackendKind::Gpu),
            "cpu" => Ok(BackendKind::Cpu),
            other => Err(format!("unknown backend '{other}' (expected gpu or cpu)")),
        }
    }
}

// ======================== Flock Config ========================

/// Startup configuration. Every field has a default so partial JSON works.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockConfig {
    pub grid_width: u32,
    pub bounds: f32,
    pub seed: Option<u64>,
    pub backend: BackendKind,
    pub analytics_interval_ms: f64,
    pub max_delta: f32,
    pub params: SimulationParams,
    pub tuning: ForceTuning,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            grid_width: GRID_WIDTH,
            bounds: BOUNDS,
            seed: None,
            backend: BackendKind::default(),
            analytics_interval_ms: ANALYTICS_INTERVAL_MS,
            max_delta: MAX_DELTA,
            params: SimulationParams::default(),
            tuning: ForceTuning::default(),
        }
    }
}

impl FlockConfig {
    /// Load a config from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> FlockResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: FlockConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded flock config from {}", path.display());
        Ok(config)
    }

    pub fn agent_count(&self) -> usize {
        let w = self.grid_width as usize;
        w.saturating_mul(w)
    }

    pub fn half_bounds(&self) -> f32 {
        self.bounds / 2.0
    }

    pub fn validate(&self) -> FlockResult<()> {
        if self.grid_width == 0 || self.grid_width > MAX_GRID_WIDTH {
            return Err(FlockError::Config(format!(
                "grid_width must be in 1..={MAX_GRID_WIDTH}, got {}",
                self.grid_width
            )));
        }
        if !self.bounds.is_finite() || self.bounds <= 0.0 {
            return Err(FlockError::Config(format!(
                "bounds must be finite and > 0, got {}",
                self.bounds
            )));
        }
        if !self.analytics_interval_ms.is_finite() || self.analytics_interval_ms < 0.0 {
            return Err(FlockError::Config(format!(
                "analytics_interval_ms must be >= 0, got {}",
                self.analytics_interval_ms
            )));
        }
        if !self.max_delta.is_finite() || self.max_delta <= 0.0 {
            return Err(FlockError::Config(format!(
                "max_delta must be > 0, got {}",
                self.max_delta
            )));
        }
        self.params
            .validate()
            .map_err(|e| FlockError::Config(e.to_string()))?;
        self.tuning.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_flock_constants() {
        let config = FlockConfig::default();
        assert_eq!(config.agent_count(), 1024);
        assert_eq!(config.half_bounds(), 400.0);
        assert_eq!(config.params.separation_distance, 20.0);
        assert_eq!(config.params.freedom_factor, 0.75);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_params_reject_out_of_range() {
        let mut params = SimulationParams::default();
        params.freedom_factor = 1.5;
        assert!(matches!(params.validate(), Err(FlockError::InvalidArgument(_))));

        let mut params = SimulationParams::default();
        params.cohesion_distance = -1.0;
        assert!(params.validate().is_err());

        let mut params = SimulationParams::default();
        params.alignment_distance = f32::NAN;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "backend": "cpu", "seed": 7, "params": { "freedom_factor": 1.0 } }"#;
        let config: FlockConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.backend, BackendKind::Cpu);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.params.freedom_factor, 1.0);
        assert_eq!(config.params.cohesion_distance, 20.0);
        assert_eq!(config.grid_width, GRID_WIDTH);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("GPU".parse::<BackendKind>(), Ok(BackendKind::Gpu));
        assert_eq!("cpu".parse::<BackendKind>(), Ok(BackendKind::Cpu));
        assert!("vulkan".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_zero_grid_rejected() {
        let config = FlockConfig {
            grid_width: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FlockError::Config(_))));
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let config = FlockConfig {
            grid_width: 70_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FlockError::Config(_))));
        assert!(config.agent_count() > MAX_GRID_WIDTH as usize * MAX_GRID_WIDTH as usize);

        let largest = FlockConfig {
            grid_width: MAX_GRID_WIDTH,
            ..Default::default()
        };
        assert!(largest.validate().is_ok());
    }
}
