// ============================================================================
// pipeline.rs — flockd
// GPU compute pipeline creation (velocity, position, centroid) and
// bind-group-layout helpers.
// ============================================================================

use crate::world::FlockBuffers;

pub const VELOCITY_WGSL: &str = include_str!("shaders/velocity.wgsl");
pub const POSITION_WGSL: &str = include_str!("shaders/position.wgsl");
pub const CENTROID_WGSL: &str = include_str!("shaders/centroid.wgsl");

// ======================== Pipelines ========================

/// All compute pipelines and their bind groups.
///
/// The velocity and position groups are indexed `[position_cur][velocity_cur]`
/// so every combination of ping-pong states has a ready-made group; the
/// centroid groups are indexed by `position_cur` alone.
pub struct Pipelines {
    pub velocity_pipeline: wgpu::ComputePipeline,
    pub velocity_bind_groups: [[wgpu::BindGroup; 2]; 2],

    pub position_pipeline: wgpu::ComputePipeline,
    pub position_bind_groups: [[wgpu::BindGroup; 2]; 2],

    pub centroid_pipeline: wgpu::ComputePipeline,
    pub centroid_bind_groups: [wgpu::BindGroup; 2],
}

// ======================== Pipeline Creation ========================

pub fn create_pipelines(device: &wgpu::Device, buffers: &FlockBuffers) -> Pipelines {
    // ---- Load shaders ----
    let velocity_shader = load_shader(device, "velocity", VELOCITY_WGSL);
    let position_shader = load_shader(device, "position", POSITION_WGSL);
    let centroid_shader = load_shader(device, "centroid", CENTROID_WGSL);

    // ================================================================
    // VELOCITY PIPELINE
    // ================================================================
    let velocity_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("velocity_bgl"),
        entries: &[
            bgl_uniform(0),
            bgl_storage_ro(1),
            bgl_storage_ro(2),
            bgl_storage_rw(3),
        ],
    });

    let velocity_pipeline = create_compute_pipeline(device, "velocity", &velocity_bgl, &velocity_shader, "main");

    // read positions[p], velocities[v]; write velocities[1 - v]
    let velocity_bind_groups = [0usize, 1].map(|p| {
        [0usize, 1].map(|v| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("velocity_bg_p{p}_v{v}")),
                layout: &velocity_bgl,
                entries: &[
                    bg_buffer(0, &buffers.velocity_params_buffer),
                    bg_buffer(1, &buffers.positions[p]),
                    bg_buffer(2, &buffers.velocities[v]),
                    bg_buffer(3, &buffers.velocities[1 - v]),
                ],
            })
        })
    });

    // ================================================================
    // POSITION PIPELINE
    // ================================================================
    let position_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("position_bgl"),
        entries: &[
            bgl_uniform(0),
            bgl_storage_ro(1),
            bgl_storage_ro(2),
            bgl_storage_rw(3),
        ],
    });

    let position_pipeline = create_compute_pipeline(device, "position", &position_bgl, &position_shader, "main");

    // read positions[p], velocities[v]; write positions[1 - p]
    let position_bind_groups = [0usize, 1].map(|p| {
        [0usize, 1].map(|v| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("position_bg_p{p}_v{v}")),
                layout: &position_bgl,
                entries: &[
                    bg_buffer(0, &buffers.position_params_buffer),
                    bg_buffer(1, &buffers.positions[p]),
                    bg_buffer(2, &buffers.velocities[v]),
                    bg_buffer(3, &buffers.positions[1 - p]),
                ],
            })
        })
    });

    // ================================================================
    // CENTROID PIPELINE
    // ================================================================
    let centroid_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("centroid_bgl"),
        entries: &[bgl_storage_ro(0), bgl_storage_rw(1)],
    });

    let centroid_pipeline = create_compute_pipeline(device, "centroid", &centroid_bgl, &centroid_shader, "main");

    let centroid_bind_groups = [0usize, 1].map(|p| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("centroid_bg_p{p}")),
            layout: &centroid_bgl,
            entries: &[
                bg_buffer(0, &buffers.positions[p]),
                bg_buffer(1, &buffers.centroid),
            ],
        })
    });

    log::debug!("Created velocity, position and centroid pipelines");

    Pipelines {
        velocity_pipeline,
        velocity_bind_groups,
        position_pipeline,
        position_bind_groups,
        centroid_pipeline,
        centroid_bind_groups,
    }
}

// ======================== Helpers ========================

fn load_shader(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn create_compute_pipeline(
    device: &wgpu::Device,
    name: &str,
    bgl: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{name}_pipeline_layout")),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{name}_pipeline")),
        layout: Some(&layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bg_buffer(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}
