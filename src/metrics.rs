// ============================================================================
// metrics.rs — flockd
// Snapshot analytics: viewer-relative left/right distribution and flock
// diagnostics (speed, spread, polarization).
// ============================================================================

use glam::Vec3;

use crate::store::Snapshot;
use crate::viewer::ViewerPose;

// ======================== Distribution ========================

/// Agents on each side of the viewer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistributionCount {
    pub left: usize,
    pub right: usize,
}

impl DistributionCount {
    pub fn total(&self) -> usize {
        self.left + self.right
    }

    /// Fraction on the right, `0.5` for an empty flock.
    pub fn metric(&self) -> f32 {
        match self.total() {
            0 => 0.5,
            n => self.right as f32 / n as f32,
        }
    }
}

/// Classify every snapshot agent: right when the vertical component of
/// `forward × (agent - viewer)` is positive, left otherwise.
pub fn classify_distribution(snapshot: &Snapshot, viewer: &ViewerPose) -> DistributionCount {
    let mut count = DistributionCount::default();
    for position in snapshot.positions_iter() {
        let to_agent = position - viewer.position;
        if viewer.direction.cross(to_agent).y > 0.0 {
            count.right += 1;
        } else {
            count.left += 1;
        }
    }
    count
}

// ======================== Diagnostics ========================

/// Summary statistics of one snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlockDiagnostics {
    pub centroid: Vec3,
    pub mean_speed: f32,
    pub max_speed: f32,
    /// RMS distance from the snapshot centroid.
    pub spread: f32,
    /// Length of the mean unit heading: 1 = everyone flies the same way.
    pub polarization: f32,
}

impl FlockDiagnostics {
    pub fn from_snapshot(snap: &Snapshot) -> Self {
        let n = snap.agent_count();
        if n == 0 {
            return Self {
                centroid: Vec3::ZERO,
                mean_speed: 0.0,
                max_speed: 0.0,
                spread: 0.0,
                polarization: 0.0,
            };
        }

        // ---- Positions ----
        let mut sum = [0.0f64; 3];
        for p in snap.positions_iter() {
            sum[0] += p.x as f64;
            sum[1] += p.y as f64;
            sum[2] += p.z as f64;
        }
        let centroid = Vec3::new(
            (sum[0] / n as f64) as f32,
            (sum[1] / n as f64) as f32,
            (sum[2] / n as f64) as f32,
        );
        let var: f64 = snap
            .positions_iter()
            .map(|p| p.distance_squared(centroid) as f64)
            .sum();
        let spread = (var / n as f64).sqrt() as f32;

        // ---- Velocities ----
        let mut speed_sum = 0.0f64;
        let mut max_speed = 0.0f32;
        let mut heading = Vec3::ZERO;
        for v in snap.velocities_iter() {
            let speed = v.length();
            speed_sum += speed as f64;
            max_speed = max_speed.max(speed);
            heading += v.normalize_or_zero();
        }

        FlockDiagnostics {
            centroid,
            mean_speed: (speed_sum / n as f64) as f32,
            max_speed,
            spread,
            polarization: heading.length() / n as f32,
        }
    }

    /// Log at DEBUG level, with deltas against the previous sample if any.
    pub fn log(&self, sampled_at_ms: f64, prev: Option<&FlockDiagnostics>) {
        log::debug!(
            "FLOCK @{:.0}ms: centroid=({:.1}, {:.1}, {:.1}) | speed avg={:.2} max={:.2} | spread={:.1} | polarization={:.3}",
            sampled_at_ms,
            self.centroid.x,
            self.centroid.y,
            self.centroid.z,
            self.mean_speed,
            self.max_speed,
            self.spread,
            self.polarization,
        );
        if let Some(p) = prev {
            log::debug!(
                "TRENDS: Δspeed={:+.2} | Δspread={:+.1} | Δpolarization={:+.3}",
                self.mean_speed - p.mean_speed,
                self.spread - p.spread,
                self.polarization - p.polarization,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn snapshot(positions: &[Vec3], velocities: &[Vec3]) -> Snapshot {
        let mut snap = Snapshot::zeroed(positions.len());
        let p: Vec<Vec4> = positions.iter().map(|v| v.extend(1.0)).collect();
        let v: Vec<Vec4> = velocities.iter().map(|v| v.extend(1.0)).collect();
        snap.fill_from(&p, &v).unwrap();
        snap
    }

    fn desktop_viewer() -> ViewerPose {
        ViewerPose {
            position: Vec3::new(0.0, 0.0, 350.0),
            direction: Vec3::NEG_Z,
        }
    }

    #[test]
    fn test_sign_convention() {
        // Looking down -z: forward × (+x) has y = -1 and forward × (-x) has y = +1.
        let snap = snapshot(
            &[Vec3::new(100.0, 0.0, 0.0), Vec3::new(-100.0, 0.0, 0.0), Vec3::new(-5.0, 0.0, 0.0)],
            &[Vec3::ZERO; 3],
        );
        let count = classify_distribution(&snap, &desktop_viewer());
        assert_eq!(count, DistributionCount { left: 1, right: 2 });
        assert!((count.metric() - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_on_axis_counts_left() {
        let snap = snapshot(&[Vec3::new(0.0, 50.0, -100.0)], &[Vec3::ZERO]);
        let count = classify_distribution(&snap, &desktop_viewer());
        assert_eq!(count, DistributionCount { left: 1, right: 0 });
    }

    #[test]
    fn test_counts_sum_to_population() {
        let positions: Vec<Vec3> = (0..200)
            .map(|i| {
                let a = i as f32 * 0.37;
                Vec3::new(a.cos() * 300.0, (a * 1.3).sin() * 200.0, a.sin() * 300.0)
            })
            .collect();
        let snap = snapshot(&positions, &vec![Vec3::ZERO; 200]);
        let viewer = ViewerPose {
            position: Vec3::new(10.0, 1.6, -20.0),
            direction: Vec3::new(1.0, 0.0, 1.0).normalize(),
        };
        let count = classify_distribution(&snap, &viewer);
        assert_eq!(count.total(), 200);
        assert!((0.0..=1.0).contains(&count.metric()));
    }

    #[test]
    fn test_diagnostics() {
        let snap = snapshot(
            &[Vec3::new(-10.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)],
            &[Vec3::new(3.0, 4.0, 0.0), Vec3::new(0.0, 0.0, 1.0)],
        );
        let d = FlockDiagnostics::from_snapshot(&snap);
        assert_eq!(d.centroid, Vec3::ZERO);
        assert!((d.spread - 10.0).abs() < 1e-5);
        assert!((d.mean_speed - 3.0).abs() < 1e-6);
        assert_eq!(d.max_speed, 5.0);
        assert!(d.polarization > 0.0 && d.polarization < 1.0);
    }

    #[test]
    fn test_aligned_flock_is_fully_polarized() {
        let snap = snapshot(&[Vec3::ZERO, Vec3::ONE], &[Vec3::X * 2.0, Vec3::X * 7.0]);
        assert!((FlockDiagnostics::from_snapshot(&snap).polarization - 1.0).abs() < 1e-6);
    }
}
