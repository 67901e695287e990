use bytemuck::{Pod, Zeroable};

/// WebGPU's default `minUniformBufferOffsetAlignment`.
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

/// Camera block, bound at group 0, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    /// xyz = world-space eye, w = padding.
    pub eye: [f32; 4],
}

/// Per-instance block: model matrix and normal matrix.
///
/// The normal matrix is the inverse-transpose of the model's upper 3x3,
/// widened to a 4x4 with an identity fourth row and column.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceUniforms {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
}

/// Material block, one per material and shared by every instance using it.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 3],
    pub roughness: f32,
}

/// Point light block. All zeros means "no light".
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightUniforms {
    pub position: [f32; 3],
    pub intensity: f32,
}

/// Round `size` up to the next multiple of `alignment` (a power of two).
pub fn aligned_stride(size: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}

/// Lay out blocks back to back at an aligned stride for dynamic-offset binding.
///
/// Block `i` starts at `i * aligned_stride(size_of::<T>(), alignment)`; the
/// gap after each block is zero-filled.
pub fn pack_blocks<T: Pod>(blocks: &[T], alignment: u64) -> Vec<u8> {
    let size = std::mem::size_of::<T>();
    let stride = aligned_stride(size as u64, alignment) as usize;
    let mut out = vec![0u8; stride * blocks.len()];
    for (slot, block) in out.chunks_exact_mut(stride).zip(blocks) {
        slot[..size].copy_from_slice(bytemuck::bytes_of(block));
    }
    out
}
