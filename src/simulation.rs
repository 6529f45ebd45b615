// ============================================================================
// simulation.rs — flockd
// Frame orchestrator: per-frame kernel sequencing, predator resolution,
// centroid readback, and the 4 Hz analytics sampler.
// ============================================================================

use glam::{Vec3, Vec4};

use crate::backend::{create_backend, ComputeBackend, RenderInputs};
use crate::config::{FlockConfig, SimulationParams, INITIAL_DISTRIBUTION};
use crate::error::{FlockError, FlockResult};
use crate::interaction::{cursor_from_pose, GrabEvent, IndicatorChange, InteractionController};
use crate::kernels::{PositionUniforms, VelocityUniforms};
use crate::metrics::{classify_distribution, DistributionCount, FlockDiagnostics};
use crate::state_io::FlockState;
use crate::store::{AgentSample, FlockSeeder, Snapshot};
use crate::viewer::{Pose, ViewerState};

// ======================== Frame I/O ========================

/// What the rendering collaborator receives once per frame.
pub struct FrameView<'a> {
    pub frame: u64,
    pub now_ms: f64,
    pub delta: f32,
    pub centroid: Vec3,
    pub fields: RenderInputs<'a>,
}

/// Consumer of the finished frame (typically the renderer).
pub trait FrameSink {
    fn present(&mut self, view: &FrameView<'_>);
}

/// Result of one analytics sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyticsSample {
    pub sampled_at_ms: f64,
    /// Metric after the sample; the previous value when classification failed.
    pub distribution: f32,
    pub counts: Option<DistributionCount>,
    pub diagnostics: FlockDiagnostics,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOutput {
    pub frame: u64,
    pub delta: f32,
    pub predators: [Vec3; 2],
    pub centroid: Vec3,
    pub sample: Option<AnalyticsSample>,
}

// ======================== FlockSimulation ========================

pub struct FlockSimulation {
    config: FlockConfig,
    params: SimulationParams,
    backend: Box<dyn ComputeBackend>,
    interaction: InteractionController,
    viewer: ViewerState,
    sink: Option<Box<dyn FrameSink>>,

    frame: u64,
    last_frame_ms: Option<f64>,
    last_sample_ms: f64,

    predators: [Vec3; 2],
    centroid: Vec3,
    distribution: f32,
    snapshot: Snapshot,
    diagnostics: Option<FlockDiagnostics>,
}

impl FlockSimulation {
    /// Seed a fresh flock and start the configured backend.
    pub fn from_config(config: FlockConfig) -> FlockResult<Self> {
        config.validate()?;
        let mut seeder = FlockSeeder::new(config.bounds, config.seed);
        let (positions, velocities) = seeder.seed_fields(config.agent_count());
        let backend = create_backend(&config, &positions, &velocities)?;
        Self::new(config, backend)
    }

    /// Wrap an already-initialised backend.
    pub fn new(config: FlockConfig, backend: Box<dyn ComputeBackend>) -> FlockResult<Self> {
        config.validate()?;
        let n = config.agent_count();
        if backend.agent_count() != n {
            return Err(FlockError::Config(format!(
                "backend holds {} agents, config expects {n}",
                backend.agent_count()
            )));
        }
        log::info!(
            "Flock ready: {n} agents ({}x{}), bounds {}, backend {}",
            config.grid_width,
            config.grid_width,
            config.bounds,
            backend.name()
        );

        Ok(Self {
            params: config.params,
            config,
            backend,
            interaction: InteractionController::new(),
            viewer: ViewerState::default(),
            sink: None,
            frame: 0,
            last_frame_ms: None,
            last_sample_ms: 0.0,
            predators: InteractionController::new().resolve_predators(),
            centroid: Vec3::ZERO,
            distribution: INITIAL_DISTRIBUTION,
            snapshot: Snapshot::zeroed(n),
            diagnostics: None,
        })
    }

    // ---- Inbound ----

    /// Replace the live parameters; the next frame picks them up.
    pub fn set_parameters(&mut self, params: SimulationParams) -> FlockResult<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn set_controller_event(&mut self, id: u32, event: GrabEvent) -> FlockResult<Option<IndicatorChange>> {
        self.interaction.handle_event(id, event)
    }

    pub fn set_controller_world_position(&mut self, id: u32, position: Vec3) -> FlockResult<()> {
        self.interaction.set_world_position(id, position)
    }

    /// Place a controller's cursor from its tracked pose.
    pub fn set_controller_pose(&mut self, id: u32, pose: &Pose) -> FlockResult<()> {
        let viewer = match self.viewer.resolve() {
            Ok(v) => v.position,
            Err(_) => self.viewer.camera.position,
        };
        self.interaction.set_world_position(id, cursor_from_pose(pose, viewer))
    }

    pub fn set_presenting(&mut self, presenting: bool) {
        self.viewer.presenting = presenting;
    }

    pub fn set_headset_pose(&mut self, pose: Option<Pose>) {
        self.viewer.headset = pose;
    }

    pub fn set_camera_pose(&mut self, pose: Pose) {
        self.viewer.camera = pose;
    }

    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    /// Overwrite both current fields, e.g. when restoring a saved state.
    pub fn load_state(&mut self, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()> {
        self.backend.load_state(positions, velocities)
    }

    // ---- Frame ----

    /// Advance one frame at wall-clock time `now_ms`.
    pub fn frame_tick(&mut self, now_ms: f64) -> FlockResult<FrameOutput> {
        if !now_ms.is_finite() {
            return Err(FlockError::invalid(format!("frame time must be finite, got {now_ms}")));
        }
        let delta = match self.last_frame_ms {
            Some(last) => ((now_ms - last) / 1000.0).clamp(0.0, self.config.max_delta as f64) as f32,
            None => 0.0,
        };
        self.last_frame_ms = Some(now_ms);

        self.predators = self.interaction.resolve_predators();

        let n = self.backend.agent_count() as u32;
        let bounds = self.config.bounds;
        let velocity = VelocityUniforms::new(&self.params, &self.config.tuning, self.predators, delta, bounds, n);
        self.backend.run_velocity_kernel(&velocity)?;
        self.backend
            .run_position_kernel(&PositionUniforms::new(delta, bounds, n))?;

        match self.backend.reduce_centroid() {
            Ok(c) => self.centroid = c,
            Err(e) => log::warn!("Frame {}: centroid readback failed, keeping previous: {e}", self.frame),
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.present(&FrameView {
                frame: self.frame,
                now_ms,
                delta,
                centroid: self.centroid,
                fields: self.backend.render_inputs(),
            });
        }

        let sample = if now_ms - self.last_sample_ms >= self.config.analytics_interval_ms {
            // Advances even if the sample fails; the next one runs on schedule.
            self.last_sample_ms = now_ms;
            self.sample_analytics(now_ms)
        } else {
            None
        };

        let output = FrameOutput {
            frame: self.frame,
            delta,
            predators: self.predators,
            centroid: self.centroid,
            sample,
        };
        self.frame += 1;
        Ok(output)
    }

    fn sample_analytics(&mut self, now_ms: f64) -> Option<AnalyticsSample> {
        if let Err(e) = self.backend.read_fields(&mut self.snapshot) {
            log::warn!("Analytics at {now_ms:.0}ms: snapshot readback failed: {e}");
            return None;
        }
        self.snapshot.sampled_at_ms = Some(now_ms);

        let diagnostics = FlockDiagnostics::from_snapshot(&self.snapshot);
        diagnostics.log(now_ms, self.diagnostics.as_ref());
        self.diagnostics = Some(diagnostics);

        let counts = match self.viewer.resolve() {
            Ok(pose) => {
                let counts = classify_distribution(&self.snapshot, &pose);
                self.distribution = counts.metric();
                Some(counts)
            }
            Err(e) => {
                log::warn!("Analytics at {now_ms:.0}ms: keeping distribution {:.3}: {e}", self.distribution);
                None
            }
        };

        Some(AnalyticsSample {
            sampled_at_ms: now_ms,
            distribution: self.distribution,
            counts,
            diagnostics,
        })
    }

    // ---- Outbound ----

    pub fn current_fields(&self) -> RenderInputs<'_> {
        self.backend.render_inputs()
    }

    pub fn current_centroid(&self) -> Vec3 {
        self.centroid
    }

    pub fn current_distribution_metric(&self) -> f32 {
        self.distribution
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn diagnostics(&self) -> Option<&FlockDiagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn predators(&self) -> [Vec3; 2] {
        self.predators
    }

    pub fn indicator_visible(&self, id: u32) -> FlockResult<bool> {
        self.interaction.indicator_visible(id)
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Agent `index` as of the last analytics sample.
    pub fn agent(&self, index: usize) -> FlockResult<AgentSample> {
        self.snapshot.agent(index)
    }

    /// Agent at grid coordinate `(col, row)` as of the last analytics sample.
    pub fn agent_at(&self, col: u32, row: u32) -> FlockResult<AgentSample> {
        let w = self.config.grid_width;
        if col >= w || row >= w {
            return Err(FlockError::invalid(format!(
                "grid coordinate ({col}, {row}) outside {w}x{w}"
            )));
        }
        self.snapshot.agent((row * w + col) as usize)
    }

    /// Fresh full copy of both fields (bypasses the snapshot cadence).
    pub fn read_state(&mut self) -> FlockResult<FlockState> {
        self.backend.read_state()
    }
}
