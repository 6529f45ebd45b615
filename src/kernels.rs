// ============================================================================
// kernels.rs — flockd
// Substrate-agnostic flock kernels: velocity update, position integration and
// centroid reduction, plus the uniform blocks shared with the WGSL shaders.
// The CPU backend runs these directly; shaders/*.wgsl mirror them line by line.
// ============================================================================

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::config::{ForceTuning, SimulationParams};

/// Neighbours (and predators) closer than this are ignored. Keeps `1/d`
/// terms inside half-float range.
pub const MIN_DISTANCE: f32 = 0.01;

// ======================== Uniform Structs ========================

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct VelocityUniforms {
    pub predator1: [f32; 4],
    pub predator2: [f32; 4],
    pub separation_distance: f32,
    pub alignment_distance: f32,
    pub cohesion_distance: f32,
    pub freedom_factor: f32,
    pub delta: f32,
    pub bounds: f32,
    pub max_speed: f32,
    pub predator_speed_boost: f32,
    pub predator_radius: f32,
    pub predator_gain: f32,
    pub wall_margin: f32,
    pub wall_gain: f32,
    pub separation_gain: f32,
    pub alignment_gain: f32,
    pub cohesion_gain: f32,
    pub agent_count: u32,
}

impl VelocityUniforms {
    pub fn new(
        params: &SimulationParams,
        tuning: &ForceTuning,
        predators: [Vec3; 2],
        delta: f32,
        bounds: f32,
        agent_count: u32,
    ) -> Self {
        Self {
            predator1: predators[0].extend(0.0).to_array(),
            predator2: predators[1].extend(0.0).to_array(),
            separation_distance: params.separation_distance,
            alignment_distance: params.alignment_distance,
            cohesion_distance: params.cohesion_distance,
            freedom_factor: params.freedom_factor,
            delta,
            bounds,
            max_speed: tuning.max_speed,
            predator_speed_boost: tuning.predator_speed_boost,
            predator_radius: tuning.predator_radius,
            predator_gain: tuning.predator_gain,
            wall_margin: tuning.wall_margin,
            wall_gain: tuning.wall_gain,
            separation_gain: tuning.separation_gain,
            alignment_gain: tuning.alignment_gain,
            cohesion_gain: tuning.cohesion_gain,
            agent_count,
        }
    }

    pub fn predators(&self) -> [Vec3; 2] {
        [
            Vec4::from_array(self.predator1).truncate(),
            Vec4::from_array(self.predator2).truncate(),
        ]
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct PositionUniforms {
    pub delta: f32,
    pub bounds: f32,
    pub agent_count: u32,
    pub _pad: u32,
}

impl PositionUniforms {
    pub fn new(delta: f32, bounds: f32, agent_count: u32) -> Self {
        Self {
            delta,
            bounds,
            agent_count,
            _pad: 0,
        }
    }
}

// ======================== Toroidal helpers ========================

/// Shortest offset from `from` to `to` in a cube of edge `bounds` whose
/// faces wrap around.
pub fn wrapped_offset(from: Vec3, to: Vec3, bounds: f32) -> Vec3 {
    let d = to - from;
    d - (d / bounds + 0.5).floor() * bounds
}

/// Wrap a point into `[-bounds/2, bounds/2]` on every axis.
pub fn wrap_position(p: Vec3, bounds: f32) -> Vec3 {
    let half = bounds * 0.5;
    p - ((p + half) / bounds).floor() * bounds
}

// ======================== Velocity Kernel ========================

/// Next velocity of agent `index` given the current fields.
pub fn velocity_step(
    index: usize,
    positions: &[Vec4],
    velocities: &[Vec4],
    u: &VelocityUniforms,
) -> Vec4 {
    let self_position = positions[index].truncate();
    let self_velocity = velocities[index].truncate();
    let mut velocity = self_velocity;
    let mut limit = u.max_speed;

    // ---- Predators ----
    let radius_sq = u.predator_radius * u.predator_radius;
    let mut threatened = false;
    for predator in u.predators() {
        let dir = wrapped_offset(self_position, predator, u.bounds);
        let dist = dir.length();
        if dist < u.predator_radius && dist > MIN_DISTANCE {
            // (d²/R² - 1) is negative inside the radius: pushes away from
            // the predator, hardest when it is closest.
            let f = (dist * dist / radius_sq - 1.0) * u.delta * u.predator_gain;
            velocity += dir / dist * f;
            threatened = true;
        }
    }
    if threatened {
        limit += u.predator_speed_boost;
    }

    // ---- Soft walls ----
    let inner = (u.bounds * 0.5 - u.wall_margin).max(0.0);
    for axis in 0..3 {
        let c = self_position[axis];
        if c > inner {
            velocity[axis] -= u.wall_gain * u.delta;
        } else if c < -inner {
            velocity[axis] += u.wall_gain * u.delta;
        }
    }

    // ---- Flocking ----
    let reach = u
        .separation_distance
        .max(u.alignment_distance)
        .max(u.cohesion_distance);
    if reach > 0.0 {
        let mut separation = Vec3::ZERO;
        let mut alignment = Vec3::ZERO;
        let mut cohesion = Vec3::ZERO;
        let (mut n_sep, mut n_ali, mut n_coh) = (0u32, 0u32, 0u32);

        for (j, (other_p, other_v)) in positions.iter().zip(velocities).enumerate() {
            if j == index {
                continue;
            }
            let offset = wrapped_offset(self_position, other_p.truncate(), u.bounds);
            let dist = offset.length();
            if dist < MIN_DISTANCE || dist >= reach {
                continue;
            }
            if dist < u.separation_distance {
                // -d̂ / d
                separation -= offset / (dist * dist);
                n_sep += 1;
            }
            if dist < u.alignment_distance {
                alignment += other_v.truncate();
                n_ali += 1;
            }
            if dist < u.cohesion_distance {
                cohesion += offset;
                n_coh += 1;
            }
        }

        let mut steer = Vec3::ZERO;
        if n_sep > 0 {
            steer += separation / n_sep as f32 * u.separation_gain;
        }
        if n_ali > 0 {
            steer += (alignment / n_ali as f32 - self_velocity) * u.alignment_gain;
        }
        if n_coh > 0 {
            steer += cohesion / n_coh as f32 * u.cohesion_gain;
        }
        velocity += steer * u.delta * (1.0 - u.freedom_factor);
    }

    // ---- Speed limit ----
    let speed = velocity.length();
    if speed > limit {
        velocity *= limit / speed;
    }

    velocity.extend(velocities[index].w)
}

// ======================== Position Kernel ========================

/// `position += velocity * delta`, wrapped back into the cube.
pub fn position_step(position: Vec4, velocity: Vec4, u: &PositionUniforms) -> Vec4 {
    let moved = position.truncate() + velocity.truncate() * u.delta;
    wrap_position(moved, u.bounds).extend(position.w)
}

// ======================== Centroid ========================

/// Mean position, summed in index order.
pub fn centroid(positions: &[Vec4]) -> Vec3 {
    if positions.is_empty() {
        return Vec3::ZERO;
    }
    let mut sum = [0.0f64; 3];
    for p in positions {
        sum[0] += p.x as f64;
        sum[1] += p.y as f64;
        sum[2] += p.z as f64;
    }
    let n = positions.len() as f64;
    Vec3::new((sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PARKED_PREDATOR, BOUNDS, BOUNDS_HALF};

    fn uniforms(params: SimulationParams, predators: [Vec3; 2], delta: f32, n: u32) -> VelocityUniforms {
        VelocityUniforms::new(&params, &ForceTuning::default(), predators, delta, BOUNDS, n)
    }

    fn still_params() -> SimulationParams {
        SimulationParams {
            separation_distance: 0.0,
            alignment_distance: 0.0,
            cohesion_distance: 0.0,
            freedom_factor: 1.0,
        }
    }

    #[test]
    fn test_uniform_layout_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<VelocityUniforms>(), 96);
        assert_eq!(std::mem::size_of::<PositionUniforms>(), 16);
    }

    #[test]
    fn test_wrapped_offset_crosses_faces() {
        let a = Vec3::new(395.0, 0.0, 0.0);
        let b = Vec3::new(-395.0, 0.0, 0.0);
        let d = wrapped_offset(a, b, BOUNDS);
        assert!((d.x - 10.0).abs() < 1e-4);
        assert_eq!(wrapped_offset(Vec3::ZERO, Vec3::new(0.0, 30.0, 0.0), BOUNDS).y, 30.0);
    }

    #[test]
    fn test_wrap_position_stays_in_bounds() {
        for c in [-1234.5f32, -401.0, -400.0, 0.0, 399.9, 400.0, 401.0, 5000.0] {
            let w = wrap_position(Vec3::splat(c), BOUNDS);
            for axis in 0..3 {
                assert!(w[axis] >= -BOUNDS_HALF && w[axis] <= BOUNDS_HALF, "{c} -> {}", w[axis]);
            }
        }
        assert_eq!(wrap_position(Vec3::new(401.0, 0.0, 0.0), BOUNDS).x, -399.0);
    }

    #[test]
    fn test_position_step_exact() {
        let u = PositionUniforms::new(0.5, BOUNDS, 1);
        let next = position_step(Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(1.0, 2.0, 3.0, 1.0), &u);
        assert_eq!(next, Vec4::new(0.5, 1.0, 1.5, 1.0));
    }

    #[test]
    fn test_no_forces_keeps_velocity() {
        let positions = vec![Vec4::new(10.0, 0.0, 0.0, 1.0), Vec4::new(12.0, 0.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(1.0, -2.0, 3.0, 1.0), Vec4::new(0.0, 0.0, 0.0, 1.0)];
        let u = uniforms(still_params(), [PARKED_PREDATOR; 2], 0.016, 2);
        assert_eq!(velocity_step(0, &positions, &velocities, &u), velocities[0]);
    }

    #[test]
    fn test_predator_repels() {
        let positions = vec![Vec4::new(50.0, 0.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(0.0, 0.0, 0.0, 1.0)];
        let u = uniforms(still_params(), [Vec3::ZERO; 2], 0.016, 1);
        let v = velocity_step(0, &positions, &velocities, &u);
        assert!(v.x > 0.0, "agent should flee along +x, got {v:?}");
        assert_eq!(v.y, 0.0);
    }

    #[test]
    fn test_closer_predator_dominates() {
        let positions = vec![Vec4::new(20.0, 0.0, 0.0, 1.0), Vec4::new(120.0, 0.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(0.0, 0.0, 0.0, 1.0); 2];
        let u = uniforms(still_params(), [Vec3::ZERO, Vec3::ZERO], 0.016, 2);
        let near = velocity_step(0, &positions, &velocities, &u);
        let far = velocity_step(1, &positions, &velocities, &u);
        assert!(near.x > far.x);
    }

    #[test]
    fn test_separation_pushes_apart() {
        let positions = vec![Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(5.0, 0.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(0.0, 0.0, 0.0, 1.0); 2];
        let params = SimulationParams {
            separation_distance: 20.0,
            alignment_distance: 0.0,
            cohesion_distance: 0.0,
            freedom_factor: 0.0,
        };
        let u = uniforms(params, [PARKED_PREDATOR; 2], 0.016, 2);
        assert!(velocity_step(0, &positions, &velocities, &u).x < 0.0);
        assert!(velocity_step(1, &positions, &velocities, &u).x > 0.0);
    }

    #[test]
    fn test_cohesion_across_wrapped_face() {
        let positions = vec![Vec4::new(-395.0, 0.0, 0.0, 1.0), Vec4::new(395.0, 0.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(0.0, 0.0, 0.0, 1.0); 2];
        let params = SimulationParams {
            separation_distance: 0.0,
            alignment_distance: 0.0,
            cohesion_distance: 30.0,
            freedom_factor: 0.0,
        };
        let mut u = uniforms(params, [PARKED_PREDATOR; 2], 0.016, 2);
        u.wall_margin = 0.0;
        // The neighbour at +395 is 10 units away through the -x face.
        assert!(velocity_step(0, &positions, &velocities, &u).x < 0.0);
    }

    #[test]
    fn test_alignment_steers_toward_neighbours() {
        let positions = vec![Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 10.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 0.0, 8.0, 1.0)];
        let params = SimulationParams {
            separation_distance: 0.0,
            alignment_distance: 20.0,
            cohesion_distance: 0.0,
            freedom_factor: 0.5,
        };
        let u = uniforms(params, [PARKED_PREDATOR; 2], 0.1, 2);
        let v = velocity_step(0, &positions, &velocities, &u);
        assert!(v.z > 0.0);
    }

    #[test]
    fn test_freedom_one_disables_flocking() {
        let positions = vec![Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(5.0, 0.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(1.0, 1.0, 1.0, 1.0); 2];
        let params = SimulationParams {
            freedom_factor: 1.0,
            ..SimulationParams::default()
        };
        let u = uniforms(params, [PARKED_PREDATOR; 2], 0.016, 2);
        assert_eq!(velocity_step(0, &positions, &velocities, &u), velocities[0]);
    }

    #[test]
    fn test_soft_wall_steers_inward() {
        let positions = vec![Vec4::new(390.0, -390.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(0.0, 0.0, 0.0, 1.0)];
        let u = uniforms(still_params(), [PARKED_PREDATOR; 2], 0.1, 1);
        let v = velocity_step(0, &positions, &velocities, &u);
        assert!(v.x < 0.0 && v.y > 0.0);
        assert_eq!(v.z, 0.0);
    }

    #[test]
    fn test_speed_is_clamped() {
        let positions = vec![Vec4::new(0.0, 0.0, 0.0, 1.0)];
        let velocities = vec![Vec4::new(1000.0, 0.0, 0.0, 1.0)];
        let u = uniforms(still_params(), [PARKED_PREDATOR; 2], 0.016, 1);
        let v = velocity_step(0, &positions, &velocities, &u);
        assert!((v.truncate().length() - ForceTuning::default().max_speed).abs() < 1e-3);
    }

    #[test]
    fn test_centroid_is_mean() {
        let positions = vec![
            Vec4::new(1.0, 2.0, 3.0, 1.0),
            Vec4::new(3.0, 4.0, 5.0, 1.0),
        ];
        assert_eq!(centroid(&positions), Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(centroid(&[]), Vec3::ZERO);
    }
}
