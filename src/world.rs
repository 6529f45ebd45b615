// ============================================================================
// world.rs — flockd
// GPU-resident agent state: the ping-pong position/velocity buffer pairs,
// kernel uniform buffers, and the staging buffers used for readback.
// ============================================================================

use std::sync::mpsc;

use glam::{Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::error::{FlockError, FlockResult};
use crate::kernels::{PositionUniforms, VelocityUniforms};
use crate::store::{check_state_len, Field, PingPong};

// ======================== Constants ========================

pub const WORKGROUP_SIZE: u32 = 64;
/// Bytes per agent per field (vec4<f32>).
pub const AGENT_STRIDE: u64 = 16;
pub const CENTROID_BYTES: u64 = 16;

// ======================== FlockBuffers ========================

pub struct FlockBuffers {
    pub agent_count: u32,

    // Ping-pong pairs
    pub positions: [wgpu::Buffer; 2],
    pub velocities: [wgpu::Buffer; 2],
    pub position_index: PingPong,
    pub velocity_index: PingPong,

    // Uniform buffers
    pub velocity_params_buffer: wgpu::Buffer,
    pub position_params_buffer: wgpu::Buffer,

    // Reduction output and host-visible staging
    pub centroid: wgpu::Buffer,
    pub centroid_staging: wgpu::Buffer,
    pub position_staging: wgpu::Buffer,
    pub velocity_staging: wgpu::Buffer,
}

impl FlockBuffers {
    pub fn new(device: &wgpu::Device, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<Self> {
        check_state_len(positions.len(), positions, velocities)?;
        if positions.is_empty() {
            return Err(FlockError::invalid("flock must contain at least one agent"));
        }
        let agent_count = positions.len() as u32;
        let field_bytes = agent_count as u64 * AGENT_STRIDE;

        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;

        let create_field = |label: &str, data: &[Vec4]| -> wgpu::Buffer {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage,
            })
        };
        let zeros = vec![Vec4::ZERO; positions.len()];

        let positions = [
            create_field("positions_0", positions),
            create_field("positions_1", &zeros),
        ];
        let velocities = [
            create_field("velocities_0", velocities),
            create_field("velocities_1", &zeros),
        ];

        let velocity_params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("velocity_params"),
            contents: bytemuck::bytes_of(&VelocityUniforms::zeroed_for(agent_count)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let position_params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("position_params"),
            contents: bytemuck::bytes_of(&PositionUniforms::new(0.0, 1.0, agent_count)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let centroid = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("centroid"),
            size: CENTROID_BYTES,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging = |label: &str, size: u64| -> wgpu::Buffer {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Ok(FlockBuffers {
            agent_count,
            positions,
            velocities,
            position_index: PingPong::default(),
            velocity_index: PingPong::default(),
            velocity_params_buffer,
            position_params_buffer,
            centroid,
            centroid_staging: staging("centroid_staging", CENTROID_BYTES),
            position_staging: staging("position_staging", field_bytes),
            velocity_staging: staging("velocity_staging", field_bytes),
        })
    }

    pub fn field_bytes(&self) -> u64 {
        self.agent_count as u64 * AGENT_STRIDE
    }

    /// Workgroups needed to cover every agent.
    pub fn dispatch_count(&self) -> u32 {
        self.agent_count.div_ceil(WORKGROUP_SIZE)
    }

    pub fn swap(&mut self, field: Field) {
        match field {
            Field::Position => self.position_index.swap(),
            Field::Velocity => self.velocity_index.swap(),
        }
    }

    pub fn current_positions(&self) -> &wgpu::Buffer {
        &self.positions[self.position_index.cur()]
    }

    pub fn current_velocities(&self) -> &wgpu::Buffer {
        &self.velocities[self.velocity_index.cur()]
    }

    pub fn upload_velocity_uniforms(&self, queue: &wgpu::Queue, uniforms: &VelocityUniforms) {
        queue.write_buffer(&self.velocity_params_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    pub fn upload_position_uniforms(&self, queue: &wgpu::Queue, uniforms: &PositionUniforms) {
        queue.write_buffer(&self.position_params_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Overwrite both current buffers (applied at the next submit).
    pub fn load_state(&self, queue: &wgpu::Queue, positions: &[Vec4], velocities: &[Vec4]) -> FlockResult<()> {
        check_state_len(self.agent_count as usize, positions, velocities)?;
        queue.write_buffer(self.current_positions(), 0, bytemuck::cast_slice(positions));
        queue.write_buffer(self.current_velocities(), 0, bytemuck::cast_slice(velocities));
        Ok(())
    }
}

impl VelocityUniforms {
    fn zeroed_for(agent_count: u32) -> Self {
        VelocityUniforms {
            bounds: 1.0,
            agent_count,
            ..bytemuck::Zeroable::zeroed()
        }
    }
}

// ======================== Readback ========================

/// Map `size` bytes of a staging buffer and copy them out. Blocks on a
/// device poll; a map that has not completed afterwards is an error, and the
/// pending map is abandoned so the buffer can be copied into next frame.
pub fn read_staging(device: &wgpu::Device, buffer: &wgpu::Buffer, size: u64) -> FlockResult<Vec<u8>> {
    let slice = buffer.slice(..size);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);

    match rx.try_recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            abandon_map(buffer);
            return Err(FlockError::Readback(format!("buffer map failed: {e}")));
        }
        Err(_) => {
            abandon_map(buffer);
            return Err(FlockError::Readback(String::from(
                "buffer map did not complete after device poll",
            )));
        }
    }

    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}

/// Drop a pending or failed map. Unmapping an idle buffer is a no-op.
pub fn abandon_map(buffer: &wgpu::Buffer) {
    buffer.unmap();
}

/// Decode little-endian vec4<f32> records.
pub fn decode_vec4s(bytes: &[u8]) -> FlockResult<Vec<Vec4>> {
    if bytes.len() % AGENT_STRIDE as usize != 0 {
        return Err(FlockError::Readback(format!(
            "readback of {} bytes is not a whole number of vec4s",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(AGENT_STRIDE as usize)
        .map(|chunk| {
            let f = |i: usize| f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]]);
            Vec4::new(f(0), f(4), f(8), f(12))
        })
        .collect())
}

/// Parse the centroid reduction output; rejects non-finite values and a
/// reduced count that does not match the flock.
pub fn decode_centroid(bytes: &[u8], agent_count: u32) -> FlockResult<Vec3> {
    let values = decode_vec4s(bytes)?;
    let raw = values
        .first()
        .copied()
        .ok_or_else(|| FlockError::Readback(String::from("empty centroid readback")))?;
    if !raw.is_finite() {
        return Err(FlockError::Readback(format!("non-finite centroid {raw:?}")));
    }
    if raw.w as u32 != agent_count {
        return Err(FlockError::Readback(format!(
            "centroid reduced {} agents, expected {agent_count}",
            raw.w
        )));
    }
    Ok(raw.truncate())
}
