// ============================================================================
// store.rs — flockd
// Agent State Store: the two double-buffered simulation fields (position,
// velocity), the seeding policy used to fill them at startup, and the
// host-side snapshot the analytics sampler reads.
// ============================================================================

use glam::{Vec3, Vec4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{FlockError, FlockResult};

/// The two simulation fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Position,
    Velocity,
}

// ======================== Ping-pong index ========================

/// Index of the readable half of a double buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PingPong {
    current: usize,
}

impl PingPong {
    /// Index of the current (read) buffer
    pub fn cur(&self) -> usize {
        self.current
    }

    /// Index of the next (write) buffer
    pub fn next(&self) -> usize {
        1 - self.current
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }
}

// ======================== DoubleBuffer ========================

/// One field stored twice; readers see `current`, the producing kernel
/// writes `next`.
#[derive(Clone, Debug)]
pub struct DoubleBuffer<T> {
    buffers: [Vec<T>; 2],
    index: PingPong,
}

impl<T: Copy + Default> DoubleBuffer<T> {
    pub fn new(initial: Vec<T>) -> Self {
        let len = initial.len();
        Self {
            buffers: [initial, vec![T::default(); len]],
            index: PingPong::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current(&self) -> &[T] {
        &self.buffers[self.index.cur()]
    }

    /// Current buffer for reading together with the next buffer for writing.
    pub fn read_write(&mut self) -> (&[T], &mut [T]) {
        let (first, second) = self.buffers.split_at_mut(1);
        if self.index.cur() == 0 {
            (first[0].as_slice(), second[0].as_mut_slice())
        } else {
            (second[0].as_slice(), first[0].as_mut_slice())
        }
    }

    pub fn swap(&mut self) {
        self.index.swap();
    }

    pub fn index(&self) -> PingPong {
        self.index
    }

    /// Overwrite the current buffer wholesale.
    pub fn overwrite_current(&mut self, data: &[T]) {
        let cur = self.index.cur();
        self.buffers[cur].copy_from_slice(data);
    }
}

// ======================== AgentStore ========================

/// Host-resident agent state used by the CPU substrate.
#[derive(Clone, Debug)]
pub struct AgentStore {
    position: DoubleBuffer<Vec4>,
    velocity: DoubleBuffer<Vec4>,
}

impl AgentStore {
    /// Fill both fields' initial buffers once.
    pub fn initialize(
        count: usize,
        mut seed_position: impl FnMut(usize) -> Vec4,
        mut seed_velocity: impl FnMut(usize) -> Vec4,
    ) -> Self {
        let positions = (0..count).map(&mut seed_position).collect();
        let velocities = (0..count).map(&mut seed_velocity).collect();
        Self {
            position: DoubleBuffer::new(positions),
            velocity: DoubleBuffer::new(velocities),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.position.len()
    }

    pub fn current_position(&self) -> &[Vec4] {
        self.position.current()
    }

    pub fn current_velocity(&self) -> &[Vec4] {
        self.velocity.current()
    }

    pub fn swap(&mut self, field: Field) {
        match field {
            Field::Position => self.position.swap(),
            Field::Velocity => self.velocity.swap(),
        }
    }

    pub fn index(&self, field: Field) -> PingPong {
        match field {
            Field::Position => self.position.index(),
            Field::Velocity => self.velocity.index(),
        }
    }

    /// Borrows for the velocity kernel: current positions, current
    /// velocities, and the velocity next-buffer.
    pub fn velocity_pass(&mut self) -> (&[Vec4], &[Vec4], &mut [Vec4]) {
        let (vel_cur, vel_next) = self.velocity.read_write();
        (self.position.current(), vel_cur, vel_next)
    }

    /// Borrows for the position kernel: current positions, current
    /// (already advanced) velocities, and the position next-buffer.
    pub fn position_pass(&mut self) -> (&[Vec4], &[Vec4], &mut [Vec4]) {
        let (pos_cur, pos_next) = self.position.read_write();
        (pos_cur, self.velocity.current(), pos_next)
    }

    /// Overwrite both current buffers.
    pub fn load(&mut self, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()> {
        check_state_len(self.agent_count(), positions, velocities)?;
        self.position.overwrite_current(positions);
        self.velocity.overwrite_current(velocities);
        Ok(())
    }
}

pub(crate) fn check_state_len(n: usize, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()> {
    if positions.len() != n || velocities.len() != n {
        return Err(FlockError::invalid(format!(
            "state must hold {n} agents, got {} positions and {} velocities",
            positions.len(),
            velocities.len()
        )));
    }
    Ok(())
}

// ======================== Seeding ========================

/// Initial flock layout: a biased sub-volume for positions and small random
/// velocities.
pub struct FlockSeeder {
    rng: StdRng,
    bounds: f32,
}

impl FlockSeeder {
    pub fn new(bounds: f32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng, bounds }
    }

    /// `x, y ∈ [0, B/4]`, `z ∈ [-B/2, -B/2 + B/8]`.
    pub fn position(&mut self) -> Vec4 {
        let b = self.bounds;
        let x = self.rng.gen::<f32>() * b / 4.0;
        let y = self.rng.gen::<f32>() * b / 4.0;
        let z = self.rng.gen::<f32>() * b / 8.0 - b / 2.0;
        Vec4::new(x, y, z, 1.0)
    }

    /// Each axis `(U[0,1) - 0.5) * 10`.
    pub fn velocity(&mut self) -> Vec4 {
        let x = self.rng.gen::<f32>() - 0.5;
        let y = self.rng.gen::<f32>() - 0.5;
        let z = self.rng.gen::<f32>() - 0.5;
        Vec4::new(x * 10.0, y * 10.0, z * 10.0, 1.0)
    }

    /// Seed `count` positions followed by `count` velocities.
    pub fn seed_fields(&mut self, count: usize) -> (Vec<Vec4>, Vec<Vec4>) {
        let positions = (0..count).map(|_| self.position()).collect();
        let velocities = (0..count).map(|_| self.velocity()).collect();
        (positions, velocities)
    }
}

/// Grid coordinate `(col, row)` of an agent index.
pub fn grid_coord(index: usize, width: u32) -> (u32, u32) {
    let w = width as usize;
    ((index % w) as u32, (index / w) as u32)
}

// ======================== Snapshot ========================

/// One agent as seen in the last snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentSample {
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Host copy of both fields, three floats per agent. Refreshed wholesale by
/// the analytics sampler and stale in between.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub positions: Vec<f32>,
    pub velocities: Vec<f32>,
    pub sampled_at_ms: Option<f64>,
}

impl Snapshot {
    pub fn zeroed(agent_count: usize) -> Self {
        Self {
            positions: vec![0.0; agent_count * 3],
            velocities: vec![0.0; agent_count * 3],
            sampled_at_ms: None,
        }
    }

    pub fn agent_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Overwrite from 4-component fields, dropping `w`.
    pub fn fill_from(&mut self, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()> {
        check_state_len(self.agent_count(), positions, velocities)?;
        for (i, (p, v)) in positions.iter().zip(velocities).enumerate() {
            self.positions[i * 3..i * 3 + 3].copy_from_slice(&p.truncate().to_array());
            self.velocities[i * 3..i * 3 + 3].copy_from_slice(&v.truncate().to_array());
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> FlockResult<std::ops::Range<usize>> {
        if index >= self.agent_count() {
            return Err(FlockError::invalid(format!(
                "agent index {index} out of range (population {})",
                self.agent_count()
            )));
        }
        Ok(index * 3..index * 3 + 3)
    }

    pub fn position(&self, index: usize) -> FlockResult<Vec3> {
        let range = self.check_index(index)?;
        Ok(Vec3::from_slice(&self.positions[range]))
    }

    pub fn velocity(&self, index: usize) -> FlockResult<Vec3> {
        let range = self.check_index(index)?;
        Ok(Vec3::from_slice(&self.velocities[range]))
    }

    pub fn agent(&self, index: usize) -> FlockResult<AgentSample> {
        Ok(AgentSample {
            position: self.position(index)?,
            velocity: self.velocity(index)?,
        })
    }

    pub fn positions_iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions.chunks_exact(3).map(Vec3::from_slice)
    }

    pub fn velocities_iter(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.velocities.chunks_exact(3).map(Vec3::from_slice)
    }
}
