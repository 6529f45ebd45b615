// ============================================================================
// backend/gpu.rs — flockd
// Dispatches the WGSL flock kernels through wgpu. The velocity and position
// passes of a frame are recorded into one command encoder, which is
// submitted together with the centroid pass when the centroid is read back.
// ============================================================================

use glam::{Vec3, Vec4};

use crate::error::{FlockError, FlockResult};
use crate::kernels::{PositionUniforms, VelocityUniforms};
use crate::pipeline::{create_pipelines, Pipelines};
use crate::state_io::FlockState;
use crate::store::Field;
use crate::world::{decode_centroid, decode_vec4s, read_staging, FlockBuffers, CENTROID_BYTES};

use super::{ComputeBackend, RenderInputs};

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: FlockBuffers,
    pipelines: Pipelines,
    adapter_name: String,
    /// Passes recorded since the last submit.
    pending: Option<wgpu::CommandEncoder>,
    position_recorded: bool,
}

impl GpuBackend {
    /// Acquire an adapter and device and upload the initial fields.
    pub fn new(positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(FlockError::NoAdapter)?;

        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(FlockError::UnsupportedAdapter(format!(
                "{} ({:?}) has no compute shader support",
                info.name, info.backend
            )));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("flockd_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let buffers = FlockBuffers::new(&device, positions, velocities)?;
        let pipelines = create_pipelines(&device, &buffers);

        log::info!("GPU adapter: {} ({:?})", info.name, info.backend);

        Ok(Self {
            device,
            queue,
            buffers,
            pipelines,
            adapter_name: info.name,
            pending: None,
            position_recorded: false,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Submit everything recorded so far.
    fn flush(&mut self) {
        if let Some(encoder) = self.pending.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.position_recorded = false;
    }

    fn check_count(&self, agent_count: u32) -> FlockResult<()> {
        if agent_count != self.buffers.agent_count {
            return Err(FlockError::invalid(format!(
                "uniforms cover {agent_count} agents, buffers hold {}",
                self.buffers.agent_count
            )));
        }
        Ok(())
    }
}

/// The encoder collecting this frame's passes, created on first use.
fn frame_encoder<'a>(
    device: &wgpu::Device,
    pending: &'a mut Option<wgpu::CommandEncoder>,
) -> &'a mut wgpu::CommandEncoder {
    pending.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("flock_frame_encoder"),
        })
    })
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn agent_count(&self) -> usize {
        self.buffers.agent_count as usize
    }

    fn load_state(&mut self, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()> {
        self.flush();
        self.buffers.load_state(&self.queue, positions, velocities)
    }

    fn run_velocity_kernel(&mut self, uniforms: &VelocityUniforms) -> FlockResult<()> {
        self.check_count(uniforms.agent_count)?;
        // Queue writes land before the next submit, so earlier frames must
        // not still be waiting in the encoder.
        self.flush();
        self.buffers.upload_velocity_uniforms(&self.queue, uniforms);

        let p = self.buffers.position_index.cur();
        let v = self.buffers.velocity_index.cur();
        let dispatch = self.buffers.dispatch_count();
        let pipelines = &self.pipelines;
        let encoder = frame_encoder(&self.device, &mut self.pending);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("velocity_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipelines.velocity_pipeline);
            pass.set_bind_group(0, &pipelines.velocity_bind_groups[p][v], &[]);
            pass.dispatch_workgroups(dispatch, 1, 1);
        }
        self.buffers.swap(Field::Velocity);
        Ok(())
    }

    fn run_position_kernel(&mut self, uniforms: &PositionUniforms) -> FlockResult<()> {
        self.check_count(uniforms.agent_count)?;
        if self.position_recorded {
            self.flush();
        }
        self.buffers.upload_position_uniforms(&self.queue, uniforms);

        let p = self.buffers.position_index.cur();
        let v = self.buffers.velocity_index.cur();
        let dispatch = self.buffers.dispatch_count();
        let pipelines = &self.pipelines;
        let encoder = frame_encoder(&self.device, &mut self.pending);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("position_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipelines.position_pipeline);
            pass.set_bind_group(0, &pipelines.position_bind_groups[p][v], &[]);
            pass.dispatch_workgroups(dispatch, 1, 1);
        }
        self.buffers.swap(Field::Position);
        self.position_recorded = true;
        Ok(())
    }

    fn reduce_centroid(&mut self) -> FlockResult<Vec3> {
        let p = self.buffers.position_index.cur();
        let pipelines = &self.pipelines;
        let buffers = &self.buffers;
        let encoder = frame_encoder(&self.device, &mut self.pending);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("centroid_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipelines.centroid_pipeline);
            pass.set_bind_group(0, &pipelines.centroid_bind_groups[p], &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
        encoder.copy_buffer_to_buffer(&buffers.centroid, 0, &buffers.centroid_staging, 0, CENTROID_BYTES);
        self.flush();

        let bytes = read_staging(&self.device, &self.buffers.centroid_staging, CENTROID_BYTES)?;
        decode_centroid(&bytes, self.buffers.agent_count)
    }

    fn read_state(&mut self) -> FlockResult<FlockState> {
        let size = self.buffers.field_bytes();
        let buffers = &self.buffers;
        let encoder = frame_encoder(&self.device, &mut self.pending);
        encoder.copy_buffer_to_buffer(buffers.current_positions(), 0, &buffers.position_staging, 0, size);
        encoder.copy_buffer_to_buffer(buffers.current_velocities(), 0, &buffers.velocity_staging, 0, size);
        self.flush();

        let positions = decode_vec4s(&read_staging(&self.device, &self.buffers.position_staging, size)?)?;
        let velocities = decode_vec4s(&read_staging(&self.device, &self.buffers.velocity_staging, size)?)?;
        Ok(FlockState { positions, velocities })
    }

    fn render_inputs(&self) -> RenderInputs<'_> {
        RenderInputs::Device {
            positions: self.buffers.current_positions(),
            velocities: self.buffers.current_velocities(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::config::{ForceTuning, SimulationParams, BOUNDS, PARKED_PREDATOR};
    use crate::store::FlockSeeder;

    fn gpu_or_skip(positions: &[Vec4], velocities: &[Vec4]) -> Option<GpuBackend> {
        match GpuBackend::new(positions, velocities) {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    #[test]
    fn test_gpu_matches_cpu_reference() {
        let (positions, velocities) = FlockSeeder::new(BOUNDS, Some(3)).seed_fields(256);
        let Some(mut gpu) = gpu_or_skip(&positions, &velocities) else {
            return;
        };
        let mut cpu = CpuBackend::new(&positions, &velocities).unwrap();

        let n = positions.len() as u32;
        for _ in 0..3 {
            let vu = VelocityUniforms::new(
                &SimulationParams::default(),
                &ForceTuning::default(),
                [Vec3::new(50.0, 50.0, -350.0), PARKED_PREDATOR],
                1.0 / 60.0,
                BOUNDS,
                n,
            );
            let pu = PositionUniforms::new(1.0 / 60.0, BOUNDS, n);
            for backend in [&mut gpu as &mut dyn ComputeBackend, &mut cpu] {
                backend.run_velocity_kernel(&vu).unwrap();
                backend.run_position_kernel(&pu).unwrap();
            }
        }

        let gpu_centroid = gpu.reduce_centroid().unwrap();
        let cpu_centroid = cpu.reduce_centroid().unwrap();
        assert!((gpu_centroid - cpu_centroid).length() < 1e-2);

        let gpu_state = gpu.read_state().unwrap();
        let cpu_state = cpu.read_state().unwrap();
        for (g, c) in gpu_state.positions.iter().zip(&cpu_state.positions) {
            assert!((*g - *c).length() < 1e-2, "{g:?} vs {c:?}");
        }
    }

    #[test]
    fn test_gpu_load_state_round_trip() {
        let (positions, velocities) = FlockSeeder::new(BOUNDS, Some(5)).seed_fields(64);
        let Some(mut gpu) = gpu_or_skip(&positions, &velocities) else {
            return;
        };
        let moved: Vec<Vec4> = positions.iter().map(|p| *p + Vec4::new(1.0, 0.0, 0.0, 0.0)).collect();
        gpu.load_state(&moved, &velocities).unwrap();
        assert_eq!(gpu.read_state().unwrap().positions, moved);
    }

    #[test]
    fn test_abandoned_map_leaves_staging_reusable() {
        let (positions, velocities) = FlockSeeder::new(BOUNDS, Some(8)).seed_fields(64);
        let Some(mut gpu) = gpu_or_skip(&positions, &velocities) else {
            return;
        };
        // Left pending with no device poll, as after a timed-out readback.
        gpu.buffers
            .centroid_staging
            .slice(..CENTROID_BYTES)
            .map_async(wgpu::MapMode::Read, |_| {});
        crate::world::abandon_map(&gpu.buffers.centroid_staging);

        let reference = CpuBackend::new(&positions, &velocities).unwrap().reduce_centroid().unwrap();
        for _ in 0..2 {
            let centroid = gpu.reduce_centroid().unwrap();
            assert!((centroid - reference).length() < 1e-2);
        }
    }
}
