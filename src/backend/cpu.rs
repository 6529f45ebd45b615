// ============================================================================
// backend/cpu.rs — flockd
// Runs the flock kernels on the host with rayon. Used when no GPU is
// available and as the reference substrate in tests.
// ============================================================================

use glam::{Vec3, Vec4};
use rayon::prelude::*;

use crate::error::{FlockError, FlockResult};
use crate::kernels::{self, PositionUniforms, VelocityUniforms};
use crate::state_io::FlockState;
use crate::store::{check_state_len, AgentStore, Field};

use super::{ComputeBackend, RenderInputs};

/// CPU compute backend using Rayon
pub struct CpuBackend {
    store: AgentStore,
}

impl CpuBackend {
    pub fn new(positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<Self> {
        check_state_len(positions.len(), positions, velocities)?;
        let store = AgentStore::initialize(positions.len(), |i| positions[i], |i| velocities[i]);
        Ok(Self { store })
    }

    pub fn store(&self) -> &AgentStore {
        &self.store
    }

    fn check_count(&self, agent_count: u32) -> FlockResult<()> {
        if agent_count as usize != self.store.agent_count() {
            return Err(FlockError::invalid(format!(
                "uniforms cover {agent_count} agents, store holds {}",
                self.store.agent_count()
            )));
        }
        Ok(())
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn agent_count(&self) -> usize {
        self.store.agent_count()
    }

    fn load_state(&mut self, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()> {
        self.store.load(positions, velocities)
    }

    fn run_velocity_kernel(&mut self, uniforms: &VelocityUniforms) -> FlockResult<()> {
        self.check_count(uniforms.agent_count)?;
        let (positions, velocities, next) = self.store.velocity_pass();
        next.par_iter_mut().enumerate().for_each(|(i, out)| {
            *out = kernels::velocity_step(i, positions, velocities, uniforms);
        });
        self.store.swap(Field::Velocity);
        Ok(())
    }

    fn run_position_kernel(&mut self, uniforms: &PositionUniforms) -> FlockResult<()> {
        self.check_count(uniforms.agent_count)?;
        let (positions, velocities, next) = self.store.position_pass();
        next.par_iter_mut()
            .zip(positions.par_iter().zip(velocities.par_iter()))
            .for_each(|(out, (p, v))| {
                *out = kernels::position_step(*p, *v, uniforms);
            });
        self.store.swap(Field::Position);
        Ok(())
    }

    fn reduce_centroid(&mut self) -> FlockResult<Vec3> {
        Ok(kernels::centroid(self.store.current_position()))
    }

    fn read_state(&mut self) -> FlockResult<FlockState> {
        Ok(FlockState {
            positions: self.store.current_position().to_vec(),
            velocities: self.store.current_velocity().to_vec(),
        })
    }

    fn render_inputs(&self) -> RenderInputs<'_> {
        RenderInputs::Host {
            positions: self.store.current_position(),
            velocities: self.store.current_velocity(),
        }
    }
}
