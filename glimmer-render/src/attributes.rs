//! Attribute extraction.
//!
//! Resolves a primitive's POSITION, NORMAL and index references to byte
//! ranges inside the binary payload. Nothing is copied; the ranges are
//! sliced out of the payload when the data is consumed.

use glimmer_gpu_shared::document::{Document, COMPONENT_FLOAT, COMPONENT_UNSIGNED_SHORT};
use glimmer_gpu_shared::{Result, SceneError};

/// Offset and length of a typed array inside the binary payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: usize,
    pub length: usize,
}

impl ByteRange {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Slice this range out of `payload`. The range must have been checked
    /// against a payload of the same length.
    pub fn slice<'a>(&self, payload: &'a [u8]) -> &'a [u8] {
        &payload[self.offset..self.end()]
    }
}

/// Byte ranges of one mesh's vertex and index data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshAttributes {
    pub positions: ByteRange,
    /// `None` only when normals are not required and the primitive has none.
    pub normals: Option<ByteRange>,
    pub indices: ByteRange,
}

impl MeshAttributes {
    /// Number of 16-bit indices.
    pub fn index_count(&self) -> usize {
        index_count(self.indices.length)
    }

    /// Number of vertices, assuming tightly packed `f32x3` positions.
    pub fn vertex_count(&self) -> usize {
        self.positions.length / 12
    }
}

/// Number of 16-bit indices in an index buffer of `byte_length` bytes.
pub fn index_count(byte_length: usize) -> usize {
    byte_length / 2
}

/// Decode little-endian 16-bit indices.
pub fn decode_indices(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Element layout an attribute must have.
struct Layout {
    attribute: &'static str,
    component_type: u32,
    kind: &'static str,
    element: usize,
}

const POSITION: Layout = Layout { attribute: "POSITION", component_type: COMPONENT_FLOAT, kind: "VEC3", element: 12 };
const NORMAL: Layout = Layout { attribute: "NORMAL", component_type: COMPONENT_FLOAT, kind: "VEC3", element: 12 };
const INDICES: Layout = Layout {
    attribute: "indices",
    component_type: COMPONENT_UNSIGNED_SHORT,
    kind: "SCALAR",
    element: 2,
};

/// Resolve one attribute reference to a payload range.
///
/// With an `accessors` table the reference is an accessor index; without one
/// it names a buffer view directly. Either way the data must be tightly
/// packed elements of `layout`.
fn resolve(
    doc: &Document,
    payload_len: usize,
    mesh: usize,
    layout: &Layout,
    reference: usize,
) -> Result<ByteRange> {
    let attribute = layout.attribute;
    let missing = || SceneError::MissingAttribute { mesh, attribute };

    let (view_index, range) = if doc.accessors.is_empty() {
        let view = doc.buffer_views.get(reference).ok_or_else(missing)?;
        (reference, ByteRange { offset: view.byte_offset, length: view.byte_length })
    } else {
        let accessor = doc.accessors.get(reference).ok_or_else(missing)?;
        let view_index = accessor.buffer_view.ok_or_else(missing)?;
        if accessor.component_type != layout.component_type || accessor.kind != layout.kind {
            return Err(SceneError::MalformedMetadata(format!(
                "mesh {mesh} {attribute} is {} of component type {}, expected {} of {}",
                accessor.kind, accessor.component_type, layout.kind, layout.component_type
            )));
        }
        let view = doc.buffer_views.get(view_index).ok_or_else(missing)?;
        let length = accessor.count.checked_mul(layout.element);
        let inside_view = length
            .and_then(|l| accessor.byte_offset.checked_add(l))
            .is_some_and(|end| end <= view.byte_length);
        if !inside_view {
            return Err(SceneError::CorruptBufferView {
                view: view_index,
                offset: view.byte_offset.saturating_add(accessor.byte_offset),
                length: length.unwrap_or(usize::MAX),
                payload_len,
            });
        }
        let range = ByteRange {
            offset: view.byte_offset + accessor.byte_offset,
            length: length.unwrap_or(0),
        };
        (view_index, range)
    };

    let view = &doc.buffer_views[view_index];
    if view.buffer != 0 {
        return Err(SceneError::MalformedMetadata(format!(
            "buffer view {view_index} points outside the embedded payload"
        )));
    }
    if view.byte_stride.is_some_and(|stride| stride != layout.element) {
        return Err(SceneError::MalformedMetadata(format!(
            "mesh {mesh} {attribute} is interleaved; only tightly packed views are supported"
        )));
    }
    let corrupt = || SceneError::CorruptBufferView {
        view: view_index,
        offset: range.offset,
        length: range.length,
        payload_len,
    };
    let fits = range.offset.checked_add(range.length).is_some_and(|end| end <= payload_len);
    if !fits || range.length % layout.element != 0 {
        return Err(corrupt());
    }
    Ok(range)
}

/// Locate the vertex and index data of `mesh`'s sole primitive.
///
/// Normals, when present, must cover exactly the positions, and every index
/// must name an existing vertex.
pub fn extract(doc: &Document, payload: &[u8], mesh: usize, require_normals: bool) -> Result<MeshAttributes> {
    let primitive = doc
        .meshes
        .get(mesh)
        .and_then(|m| m.primitive())
        .ok_or_else(|| SceneError::MalformedMetadata(format!("mesh {mesh} has no primitive")))?;
    let payload_len = payload.len();

    let position = primitive
        .attributes
        .position
        .ok_or(SceneError::MissingAttribute { mesh, attribute: "POSITION" })?;
    let positions = resolve(doc, payload_len, mesh, &POSITION, position)?;

    let normals = match primitive.attributes.normal {
        Some(normal) => Some(resolve(doc, payload_len, mesh, &NORMAL, normal)?),
        None if require_normals => {
            return Err(SceneError::MissingAttribute { mesh, attribute: "NORMAL" });
        }
        None => None,
    };
    if let Some(normals) = normals.filter(|n| n.length != positions.length) {
        return Err(SceneError::MalformedMetadata(format!(
            "mesh {mesh} has {} bytes of normals for {} bytes of positions",
            normals.length, positions.length
        )));
    }

    let index = primitive
        .indices
        .ok_or(SceneError::MissingAttribute { mesh, attribute: "indices" })?;
    let indices = resolve(doc, payload_len, mesh, &INDICES, index)?;

    let attributes = MeshAttributes { positions, normals, indices };
    let vertex_count = attributes.vertex_count();
    if let Some(bad) = decode_indices(indices.slice(payload))
        .into_iter()
        .find(|&i| usize::from(i) >= vertex_count)
    {
        return Err(SceneError::MalformedMetadata(format!(
            "mesh {mesh} index {bad} is past its {vertex_count} vertices"
        )));
    }

    Ok(attributes)
}
