// ============================================================================
// backend/mod.rs — flockd
// Compute substrates. The frame orchestrator only talks to `ComputeBackend`;
// `CpuBackend` runs the kernels with rayon, `GpuBackend` dispatches the WGSL
// shaders through wgpu.
// ============================================================================

mod cpu;
mod gpu;

pub use cpu::CpuBackend;
pub use gpu::GpuBackend;

use glam::{Vec3, Vec4};

use crate::config::{BackendKind, FlockConfig};
use crate::error::FlockResult;
use crate::kernels::{PositionUniforms, VelocityUniforms};
use crate::state_io::FlockState;
use crate::store::Snapshot;

/// Current fields as handed to the rendering collaborator.
#[derive(Clone, Copy, Debug)]
pub enum RenderInputs<'a> {
    Host {
        positions: &'a [Vec4],
        velocities: &'a [Vec4],
    },
    Device {
        positions: &'a wgpu::Buffer,
        velocities: &'a wgpu::Buffer,
    },
}

/// A parallel substrate able to run the three flock kernels.
///
/// Each kernel call reads only the current buffers, writes only the next
/// buffer of its output field, and swaps that field before returning.
pub trait ComputeBackend {
    fn name(&self) -> &'static str;

    fn agent_count(&self) -> usize;

    /// Overwrite both current fields.
    fn load_state(&mut self, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()>;

    fn run_velocity_kernel(&mut self, uniforms: &VelocityUniforms) -> FlockResult<()>;

    fn run_position_kernel(&mut self, uniforms: &PositionUniforms) -> FlockResult<()>;

    /// Mean of the current positions. Completes all work issued so far.
    fn reduce_centroid(&mut self) -> FlockResult<Vec3>;

    /// Full copy of both current fields.
    fn read_state(&mut self) -> FlockResult<FlockState>;

    fn render_inputs(&self) -> RenderInputs<'_>;

    /// Refresh the CPU snapshot wholesale from the current fields.
    fn read_fields(&mut self, snapshot: &mut Snapshot) -> FlockResult<()> {
        let state = self.read_state()?;
        snapshot.fill_from(&state.positions, &state.velocities)
    }
}

/// Build the substrate selected by `config`, seeded with the given fields.
pub fn create_backend(
    config: &FlockConfig,
    positions: &[Vec4],
    velocities: &[Vec4],
) -> FlockResult<Box<dyn ComputeBackend>> {
    let backend: Box<dyn ComputeBackend> = match config.backend {
        BackendKind::Cpu => Box::new(CpuBackend::new(positions, velocities)?),
        BackendKind::Gpu => Box::new(GpuBackend::new(positions, velocities)?),
    };
    log::info!(
        "Compute backend: {} ({} agents)",
        backend.name(),
        backend.agent_count()
    );
    Ok(backend)
}
