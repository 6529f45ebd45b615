//! End-to-end flock scenarios on the CPU backend.

use flockd::backend::CpuBackend;
use flockd::config::{BackendKind, FlockConfig, SimulationParams, PARKED_PREDATOR};
use flockd::interaction::{GrabEvent, LEFT_CONTROLLER, RIGHT_CONTROLLER};
use flockd::state_io;
use flockd::store::FlockSeeder;
use flockd::{FlockSimulation, RenderInputs};
use glam::{Vec3, Vec4};

fn still_params() -> SimulationParams {
    SimulationParams {
        separation_distance: 0.0,
        alignment_distance: 0.0,
        cohesion_distance: 0.0,
        freedom_factor: 1.0,
    }
}

fn cpu_sim(config: FlockConfig, positions: &[Vec4], velocities: &[Vec4]) -> FlockSimulation {
    let backend = CpuBackend::new(positions, velocities).unwrap();
    FlockSimulation::new(config, Box::new(backend)).unwrap()
}

fn host_positions(sim: &FlockSimulation) -> Vec<Vec4> {
    match sim.current_fields() {
        RenderInputs::Host { positions, .. } => positions.to_vec(),
        RenderInputs::Device { .. } => panic!("CPU backend exposes host fields"),
    }
}

#[test]
fn origin_flock_stays_at_origin() {
    let config = FlockConfig {
        backend: BackendKind::Cpu,
        params: still_params(),
        ..Default::default()
    };
    let n = config.agent_count();
    assert_eq!(n, 1024);
    let origin = vec![Vec4::new(0.0, 0.0, 0.0, 1.0); n];
    let still = vec![Vec4::new(0.0, 0.0, 0.0, 1.0); n];
    let mut sim = cpu_sim(config, &origin, &still);

    sim.frame_tick(0.0).unwrap();
    let out = sim.frame_tick(16.0).unwrap();

    assert_eq!(out.predators, [PARKED_PREDATOR; 2]);
    assert_eq!(host_positions(&sim), origin);
    assert_eq!(sim.current_centroid(), Vec3::ZERO);
}

#[test]
fn single_step_is_exact() {
    let config = FlockConfig {
        grid_width: 1,
        backend: BackendKind::Cpu,
        params: still_params(),
        ..Default::default()
    };
    let mut sim = cpu_sim(
        config,
        &[Vec4::new(0.0, 0.0, 0.0, 1.0)],
        &[Vec4::new(1.0, 2.0, 3.0, 1.0)],
    );

    sim.frame_tick(0.0).unwrap();
    let before = host_positions(&sim);
    let out = sim.frame_tick(500.0).unwrap();

    assert_eq!(out.delta, 0.5);
    let after = host_positions(&sim);
    assert_ne!(before, after);
    assert_eq!(after, vec![Vec4::new(0.5, 1.0, 1.5, 1.0)]);
    assert_eq!(sim.current_centroid(), Vec3::new(0.5, 1.0, 1.5));
}

#[test]
fn positions_stay_wrapped() {
    let config = FlockConfig {
        grid_width: 16,
        seed: Some(2024),
        backend: BackendKind::Cpu,
        ..Default::default()
    };
    let (positions, _) = FlockSeeder::new(config.bounds, config.seed).seed_fields(config.agent_count());
    // Fast enough to cross faces every few frames.
    let fast: Vec<Vec4> = (0..config.agent_count())
        .map(|i| Vec4::new(130.0, -90.0 + i as f32 * 0.1, 60.0, 1.0))
        .collect();
    let half = config.half_bounds();
    let mut sim = cpu_sim(config, &positions, &fast);

    sim.set_controller_world_position(RIGHT_CONTROLLER, Vec3::new(50.0, 50.0, -350.0)).unwrap();
    sim.set_controller_event(RIGHT_CONTROLLER, GrabEvent::GrabStart).unwrap();

    for frame in 0..90 {
        sim.frame_tick(frame as f64 * 1000.0 / 30.0).unwrap();
        for p in host_positions(&sim) {
            for c in p.truncate().to_array() {
                assert!((-half..=half).contains(&c), "frame {frame}: {p:?}");
            }
        }
    }
}

#[test]
fn predator_table_through_simulation() {
    let config = FlockConfig {
        grid_width: 2,
        seed: Some(1),
        backend: BackendKind::Cpu,
        ..Default::default()
    };
    let (p, v) = FlockSeeder::new(config.bounds, config.seed).seed_fields(config.agent_count());
    let mut sim = cpu_sim(config, &p, &v);

    let left = Vec3::new(1.0, 0.0, 0.0);
    let right = Vec3::new(-1.0, 0.0, 0.0);
    sim.set_controller_world_position(LEFT_CONTROLLER, left).unwrap();
    sim.set_controller_world_position(RIGHT_CONTROLLER, right).unwrap();

    let mut t = 0.0;
    let mut tick = |sim: &mut FlockSimulation| {
        t += 16.0;
        sim.frame_tick(t).unwrap().predators
    };

    assert_eq!(tick(&mut sim), [PARKED_PREDATOR, PARKED_PREDATOR]);

    sim.set_controller_event(RIGHT_CONTROLLER, GrabEvent::GrabStart).unwrap();
    assert_eq!(tick(&mut sim), [right, right]);

    sim.set_controller_event(LEFT_CONTROLLER, GrabEvent::GrabStart).unwrap();
    assert_eq!(tick(&mut sim), [left, right]);

    sim.set_controller_event(RIGHT_CONTROLLER, GrabEvent::GrabEnd).unwrap();
    assert_eq!(tick(&mut sim), [left, left]);

    sim.set_controller_event(LEFT_CONTROLLER, GrabEvent::GrabEnd).unwrap();
    assert_eq!(tick(&mut sim), [PARKED_PREDATOR, PARKED_PREDATOR]);
}

#[test]
fn distribution_counts_whole_flock() {
    let config = FlockConfig {
        grid_width: 8,
        seed: Some(77),
        backend: BackendKind::Cpu,
        ..Default::default()
    };
    let n = config.agent_count();
    let mut sim = FlockSimulation::from_config(config).unwrap();

    let mut samples = 0;
    for frame in 0..120 {
        let out = sim.frame_tick(frame as f64 * 1000.0 / 60.0).unwrap();
        if let Some(sample) = out.sample {
            let counts = sample.counts.unwrap();
            assert_eq!(counts.left + counts.right, n);
            assert!((0.0..=1.0).contains(&sample.distribution));
            assert_eq!(sample.distribution, sim.current_distribution_metric());
            samples += 1;
        }
    }
    assert!(samples > 0);
    assert_eq!(sim.snapshot().agent_count(), n);
}

#[test]
fn saved_state_restores_flock() {
    let config = FlockConfig {
        grid_width: 4,
        seed: Some(9),
        backend: BackendKind::Cpu,
        ..Default::default()
    };
    let mut sim = FlockSimulation::from_config(config.clone()).unwrap();
    for frame in 0..10 {
        sim.frame_tick(frame as f64 * 16.0).unwrap();
    }
    let state = sim.read_state().unwrap();

    let path = std::env::temp_dir().join(format!("flockd_scenario_{}.bin", std::process::id()));
    state_io::save_state(&path, &state).unwrap();
    let loaded = state_io::load_state(&path, config.agent_count()).unwrap();
    std::fs::remove_file(&path).ok();

    let mut restored = FlockSimulation::from_config(FlockConfig {
        seed: Some(1234),
        ..config
    })
    .unwrap();
    restored.load_state(&loaded.positions, &loaded.velocities).unwrap();
    assert_eq!(restored.read_state().unwrap(), state);
}
