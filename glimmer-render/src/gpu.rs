//! GPU upload of a loaded [`Scene`].
//!
//! Vertex, index and parameter blocks go into wgpu buffers once per scene.
//! Per-instance and per-material blocks share one buffer each and are
//! selected with dynamic offsets at draw time.
//!
//! Bind group layout consumed by the shading stage:
//! - group 0: binding 0 camera block, binding 1 light block
//! - group 1: binding 0 material block (dynamic offset)
//! - group 2: binding 0 instance block (dynamic offset)
//!
//! Vertex buffers: slot 0 positions (`Float32x3`), slot 1 normals (`Float32x3`).

use std::mem::size_of;

use glimmer_gpu_shared::uniforms::{
    aligned_stride, pack_blocks, CameraUniforms, InstanceUniforms, LightUniforms, MaterialUniforms,
};
use wgpu::util::DeviceExt;

use crate::scene::Scene;

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const NORMAL_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];

/// Vertex buffer layouts matching [`GpuScene::draw`].
pub fn vertex_buffer_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    [
        wgpu::VertexBufferLayout {
            array_stride: 12,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &POSITION_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: 12,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &NORMAL_ATTRIBUTES,
        },
    ]
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, dynamic: bool, size: usize) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

/// Bind group layouts shared by every uploaded scene and the pipeline.
pub struct SceneLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
    pub instance: wgpu::BindGroupLayout,
}

impl SceneLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let both = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Frame Bind Group Layout"),
            entries: &[
                uniform_entry(0, both, false, size_of::<CameraUniforms>()),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT, false, size_of::<LightUniforms>()),
            ],
        });
        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Material Bind Group Layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::FRAGMENT, true, size_of::<MaterialUniforms>())],
        });
        let instance = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Instance Bind Group Layout"),
            entries: &[uniform_entry(0, both, true, size_of::<InstanceUniforms>())],
        });
        Self { frame, material, instance }
    }

    /// In group order, for `PipelineLayoutDescriptor::bind_group_layouts`.
    pub fn as_array(&self) -> [&wgpu::BindGroupLayout; 3] {
        [&self.frame, &self.material, &self.instance]
    }
}

/// GPU-resident mesh.
pub struct GpuMesh {
    pub position_buffer: wgpu::Buffer,
    pub normal_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// Which mesh to draw with which dynamic offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub mesh: usize,
    pub material_offset: u32,
    pub instance_offset: u32,
}

/// One draw per instance, with offsets at the given block strides.
///
/// Dynamic offsets are 32-bit, so at a 256-byte stride at most 2^24 instances
/// are addressable. Instances whose offsets do not fit are left out with a
/// warning.
pub fn draw_calls(scene: &Scene, material_stride: u64, instance_stride: u64) -> Vec<DrawCall> {
    let offset = |index: usize, stride: u64| {
        u64::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(stride))
            .and_then(|o| u32::try_from(o).ok())
    };
    let mut draws = Vec::with_capacity(scene.instances().len());
    let mut skipped = 0usize;
    for (i, instance) in scene.instances().iter().enumerate() {
        match (offset(instance.material, material_stride), offset(i, instance_stride)) {
            (Some(material_offset), Some(instance_offset)) => {
                draws.push(DrawCall { mesh: instance.mesh, material_offset, instance_offset });
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("skipping {skipped} instances past the 32-bit dynamic offset range");
    }
    draws
}

/// Packed blocks, never empty so the buffer can always be bound.
fn packed_or_zeroed<T: bytemuck::Pod>(blocks: &[T], alignment: u64) -> Vec<u8> {
    if blocks.is_empty() {
        pack_blocks(&[T::zeroed()], alignment)
    } else {
        pack_blocks(blocks, alignment)
    }
}

/// Everything a scene needs on the GPU.
pub struct GpuScene {
    pub meshes: Vec<GpuMesh>,
    pub camera_buffer: wgpu::Buffer,
    pub light_buffer: wgpu::Buffer,
    pub material_buffer: wgpu::Buffer,
    pub instance_buffer: wgpu::Buffer,
    pub frame_bind_group: wgpu::BindGroup,
    pub material_bind_group: wgpu::BindGroup,
    pub instance_bind_group: wgpu::BindGroup,
    pub draws: Vec<DrawCall>,
}

impl GpuScene {
    /// Allocate and fill every buffer `scene` needs.
    pub fn upload(device: &wgpu::Device, layouts: &SceneLayouts, scene: &Scene) -> Self {
        let alignment = (device.limits().min_uniform_buffer_offset_alignment as u64)
            .max(scene.uniform_alignment())
            .next_power_of_two();

        let meshes = scene
            .meshes()
            .iter()
            .enumerate()
            .map(|(i, mesh)| {
                let positions = scene.positions(i).unwrap_or_default();
                let zero_normals;
                let normals = match scene.normals(i) {
                    Some(normals) => normals,
                    None => {
                        zero_normals = vec![0u8; positions.len()];
                        zero_normals.as_slice()
                    }
                };
                let indices = scene.index_bytes(i).unwrap_or_default();
                let label = mesh.name.as_deref().unwrap_or("Mesh");
                GpuMesh {
                    position_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(format!("{label} Positions").as_str()),
                        contents: positions,
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    normal_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(format!("{label} Normals").as_str()),
                        contents: normals,
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(format!("{label} Indices").as_str()),
                        contents: indices,
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    index_count: mesh.attributes.index_count() as u32,
                }
            })
            .collect();

        let uniform_usage = wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST;
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Camera Uniforms"),
            contents: bytemuck::bytes_of(scene.camera()),
            usage: uniform_usage,
        });
        let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Light Uniforms"),
            contents: bytemuck::bytes_of(&scene.light_uniforms()),
            usage: uniform_usage,
        });
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Material Uniforms"),
            contents: &packed_or_zeroed(scene.materials(), alignment),
            usage: uniform_usage,
        });
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Instance Uniforms"),
            contents: &packed_or_zeroed(&scene.instance_blocks(), alignment),
            usage: uniform_usage,
        });

        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Frame Bind Group"),
            layout: &layouts.frame,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: camera_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: light_buffer.as_entire_binding() },
            ],
        });
        let material_bind_group = dynamic_bind_group(
            device,
            "Scene Material Bind Group",
            &layouts.material,
            &material_buffer,
            size_of::<MaterialUniforms>(),
        );
        let instance_bind_group = dynamic_bind_group(
            device,
            "Scene Instance Bind Group",
            &layouts.instance,
            &instance_buffer,
            size_of::<InstanceUniforms>(),
        );

        let draws = draw_calls(
            scene,
            aligned_stride(size_of::<MaterialUniforms>() as u64, alignment),
            aligned_stride(size_of::<InstanceUniforms>() as u64, alignment),
        );
        log::debug!("uploaded scene: {} meshes, {} draws", scene.meshes().len(), draws.len());

        Self {
            meshes,
            camera_buffer,
            light_buffer,
            material_buffer,
            instance_buffer,
            frame_bind_group,
            material_bind_group,
            instance_bind_group,
            draws,
        }
    }

    /// Record one indexed draw per instance. The pipeline must already be set.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_bind_group(0, &self.frame_bind_group, &[]);
        for call in &self.draws {
            let Some(mesh) = self.meshes.get(call.mesh) else {
                continue;
            };
            pass.set_bind_group(1, &self.material_bind_group, &[call.material_offset]);
            pass.set_bind_group(2, &self.instance_bind_group, &[call.instance_offset]);
            pass.set_vertex_buffer(0, mesh.position_buffer.slice(..));
            pass.set_vertex_buffer(1, mesh.normal_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

fn dynamic_bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    block_size: usize,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: wgpu::BufferSize::new(block_size as u64),
            }),
        }],
    })
}
