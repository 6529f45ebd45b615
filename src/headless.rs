// ============================================================================
// headless.rs — flockd
// Headless runner: drives the flock with a synthetic 60 Hz clock and a
// scripted two-controller session, logging progress and exporting a run.
// ============================================================================

use std::path::PathBuf;
use std::time::Instant;

use glam::Vec3;

use crate::config::{BackendKind, FlockConfig};
use crate::error::{FlockError, FlockResult};
use crate::interaction::{GrabEvent, LEFT_CONTROLLER, RIGHT_CONTROLLER};
use crate::recorder::{Recorder, RunSummary};
use crate::simulation::FlockSimulation;
use crate::state_io;

pub const FRAME_INTERVAL_MS: f64 = 1000.0 / 60.0;

#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub frames: u32,
    pub frame_interval_ms: f64,
    pub progress_interval: u32,
    /// Run the scripted grab session; otherwise predators stay parked.
    pub scripted_input: bool,
    pub export_dir: Option<PathBuf>,
    pub load_state_path: Option<PathBuf>,
    pub save_state_path: Option<PathBuf>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frames: 3_600,
            frame_interval_ms: FRAME_INTERVAL_MS,
            progress_interval: 600,
            scripted_input: true,
            export_dir: None,
            load_state_path: None,
            save_state_path: None,
        }
    }
}

// ======================== Scripted Session ========================

/// Periodic grabs on both controllers with cursors orbiting the flock's
/// spawn region. Over one period the session passes through every
/// combination of active controllers.
#[derive(Clone, Copy, Debug)]
pub struct ScriptedSession {
    pub period: u64,
    pub orbit_center: Vec3,
    pub orbit_radius: f32,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self {
            period: 600,
            orbit_center: Vec3::new(50.0, 50.0, -200.0),
            orbit_radius: 150.0,
        }
    }
}

impl ScriptedSession {
    /// Whether `(right, left)` controllers hold their grab at `frame`.
    pub fn grabs(&self, frame: u64) -> (bool, bool) {
        let phase = frame % self.period;
        let right = phase >= self.period / 6 && phase < self.period * 4 / 6;
        let left = phase >= self.period * 3 / 6 && phase < self.period * 5 / 6;
        (right, left)
    }

    pub fn cursor(&self, controller: u32, frame: u64) -> Vec3 {
        let turn = std::f32::consts::TAU * (frame % self.period) as f32 / self.period as f32;
        let angle = if controller == RIGHT_CONTROLLER { turn } else { -turn + std::f32::consts::PI };
        self.orbit_center + Vec3::new(angle.cos(), 0.25 * angle.sin(), angle.sin()) * self.orbit_radius
    }

    /// Push this frame's controller input into the simulation.
    pub fn drive(
        &self,
        sim: &mut FlockSimulation,
        recorder: &mut Recorder,
        frame: u64,
        now_ms: f64,
    ) -> FlockResult<()> {
        let (right, left) = self.grabs(frame);
        for (id, held) in [(RIGHT_CONTROLLER, right), (LEFT_CONTROLLER, left)] {
            sim.set_controller_world_position(id, self.cursor(id, frame))?;
            let Some(event) = self.edge(id, frame, held) else {
                continue;
            };
            if let Some(change) = sim.set_controller_event(id, event)? {
                let kind = if change.visible { "GRAB_START" } else { "GRAB_END" };
                recorder.log_event(frame, now_ms, kind, &format!("controller {id}"));
            }
        }
        Ok(())
    }

    /// The grab event for `controller` at `frame`, if its hold changed since
    /// the previous frame. Both controllers start released.
    pub fn edge(&self, controller: u32, frame: u64, held: bool) -> Option<GrabEvent> {
        let was_held = match frame.checked_sub(1) {
            Some(prev) => {
                let (right, left) = self.grabs(prev);
                if controller == RIGHT_CONTROLLER { right } else { left }
            }
            None => false,
        };
        match (was_held, held) {
            (false, true) => Some(GrabEvent::GrabStart),
            (true, false) => Some(GrabEvent::GrabEnd),
            _ => None,
        }
    }
}

// ======================== Runner ========================

/// Build the simulation, falling back to the CPU backend when no usable
/// GPU is present.
fn start_simulation(flock: FlockConfig) -> FlockResult<FlockSimulation> {
    match FlockSimulation::from_config(flock.clone()) {
        Err(e @ (FlockError::NoAdapter | FlockError::UnsupportedAdapter(_)))
            if flock.backend == BackendKind::Gpu =>
        {
            log::warn!("{e}; falling back to CPU backend");
            FlockSimulation::from_config(FlockConfig {
                backend: BackendKind::Cpu,
                ..flock
            })
        }
        other => other,
    }
}

pub fn run_headless(flock: FlockConfig, config: &HeadlessConfig) -> FlockResult<RunSummary> {
    let mut sim = start_simulation(flock)?;

    if let Some(path) = &config.load_state_path {
        let state = state_io::load_state(path, sim.config().agent_count())?;
        sim.load_state(&state.positions, &state.velocities)?;
        log::info!("Loaded flock state from {}", path.display());
    }

    let export_root = config
        .export_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("runs"));
    let mut recorder = Recorder::new(export_root);
    let session = ScriptedSession::default();

    log::info!(
        "Headless run started: {} frames at {:.1} ms/frame on {} ({} agents)",
        config.frames,
        config.frame_interval_ms,
        sim.backend_name(),
        sim.config().agent_count()
    );

    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut last_report_frame = 0u32;

    for step in 0..config.frames {
        let frame = step as u64;
        let now_ms = frame as f64 * config.frame_interval_ms;
        if config.scripted_input {
            session.drive(&mut sim, &mut recorder, frame, now_ms)?;
        }

        let output = sim.frame_tick(now_ms)?;
        recorder.record(&output);

        if config.progress_interval > 0 && (step + 1) % config.progress_interval == 0 {
            let done = step + 1;
            let total_elapsed = started.elapsed().as_secs_f64().max(1e-6);
            let total_fps = done as f64 / total_elapsed;

            let window_elapsed = last_report.elapsed().as_secs_f64().max(1e-6);
            let window_frames = done - last_report_frame;
            let window_fps = window_frames as f64 / window_elapsed;

            let remaining = config.frames.saturating_sub(done);
            let eta_secs = if total_fps > 1e-6 {
                remaining as f64 / total_fps
            } else {
                0.0
            };

            let c = output.centroid;
            log::info!(
                "Headless progress: {}/{} | fps={:.0} (window {:.0}) | ETA={:.1} s | centroid=({:.1}, {:.1}, {:.1}) | distribution={:.3}",
                done,
                config.frames,
                total_fps,
                window_fps,
                eta_secs,
                c.x,
                c.y,
                c.z,
                sim.current_distribution_metric(),
            );

            last_report = Instant::now();
            last_report_frame = done;
        }
    }

    if let Some(path) = &config.save_state_path {
        let state = sim.read_state()?;
        state_io::save_state(path, &state)?;
        log::info!("Saved final state to {}", path.display());
    }

    let summary = recorder.summary(sim.config(), sim.backend_name(), sim.frame_count());
    if config.export_dir.is_some() {
        recorder.export(&summary)?;
    }

    log::info!(
        "Headless run finished: {} frames, {} samples, mean distribution {:.3} in {:.1}s",
        summary.total_frames,
        summary.sample_count,
        summary.mean_distribution,
        started.elapsed().as_secs_f64()
    );
    Ok(summary)
}
