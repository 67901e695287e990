//! Scene graph flattening.
//!
//! Walks the active scene from its roots with an explicit work list,
//! composing `world = parent_world * local` on the way down, and emits one
//! pending instance per mesh-bearing node along with the scene's camera and
//! point light. No graph is kept afterwards.

use glam::{Mat4, Quat, Vec3};
use glimmer_gpu_shared::document::{Document, Node};
use glimmer_gpu_shared::{Result, SceneError};

/// A mesh-bearing node resolved to its world transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingInstance {
    pub node: usize,
    pub mesh: usize,
    pub material: Option<usize>,
    pub world: Mat4,
}

/// The camera node chosen for the scene.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSpec {
    pub node: usize,
    pub camera: usize,
    pub world: Mat4,
}

/// The scene's single point light, in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightSpec {
    pub node: usize,
    pub position: Vec3,
    pub intensity: f32,
}

#[derive(Clone, Debug, Default)]
pub struct Flattened {
    pub instances: Vec<PendingInstance>,
    pub camera: Option<CameraSpec>,
    pub light: Option<LightSpec>,
}

/// Node visits [`flatten`] allows before giving up on a scene.
///
/// Shared children are visited once per path, so a small document can
/// describe an exponential number of visits.
pub const DEFAULT_MAX_NODE_VISITS: usize = 1 << 20;

struct WorkItem {
    node: usize,
    parent_world: Mat4,
    /// Number of ancestors between this node and its root.
    depth: usize,
}

/// Local transform of a node, `T * R * S` unless an explicit matrix is given.
pub fn local_transform(node: &Node) -> Mat4 {
    if let Some(m) = node.matrix {
        return Mat4::from_cols_array(&m);
    }
    let rotation = Quat::from_array(node.rotation);
    let rotation = if rotation.length_squared() > 0.0 {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    };
    Mat4::from_scale_rotation_translation(
        Vec3::from(node.scale),
        rotation,
        Vec3::from(node.translation),
    )
}

fn node_at(doc: &Document, index: usize) -> Result<&Node> {
    doc.nodes
        .get(index)
        .ok_or_else(|| SceneError::MalformedMetadata(format!("node index {index} out of range")))
}

/// Flatten the active scene into instances, camera and light.
///
/// Siblings are visited in document order. When several camera nodes exist
/// the last one visited wins; only the first qualifying point light is kept.
pub fn flatten(doc: &Document, point_light_prefix: &str) -> Result<Flattened> {
    flatten_bounded(doc, point_light_prefix, DEFAULT_MAX_NODE_VISITS)
}

/// [`flatten`], failing with `MalformedMetadata` once more than
/// `max_visits` nodes have been visited.
pub fn flatten_bounded(doc: &Document, point_light_prefix: &str, max_visits: usize) -> Result<Flattened> {
    let scene = doc.active_scene()?;
    let mut out = Flattened::default();

    let mut stack: Vec<WorkItem> = scene
        .nodes
        .iter()
        .rev()
        .map(|&node| WorkItem { node, parent_world: Mat4::IDENTITY, depth: 0 })
        .collect();
    let mut path: Vec<usize> = Vec::new();
    let mut on_path = vec![false; doc.nodes.len()];
    let mut visits = 0usize;

    while let Some(item) = stack.pop() {
        visits += 1;
        if visits > max_visits {
            return Err(SceneError::MalformedMetadata(format!(
                "scene graph expands past {max_visits} node visits"
            )));
        }
        while path.len() > item.depth {
            if let Some(left) = path.pop() {
                on_path[left] = false;
            }
        }

        let node = node_at(doc, item.node)?;
        if on_path[item.node] {
            return Err(SceneError::CyclicSceneGraph { node: item.node });
        }
        on_path[item.node] = true;
        path.push(item.node);

        let world = item.parent_world * local_transform(node);

        if let Some(camera) = node.camera {
            record_camera(doc, &mut out, item.node, camera, world);
        }

        if let Some(light) = node.light() {
            record_light(doc, &mut out, item.node, node, light, world, point_light_prefix)?;
        }

        if let Some(mesh) = node.mesh {
            let material = doc
                .meshes
                .get(mesh)
                .ok_or_else(|| {
                    SceneError::MalformedMetadata(format!("node {} mesh index {mesh} out of range", item.node))
                })?
                .primitive()
                .and_then(|p| p.material);
            out.instances.push(PendingInstance { node: item.node, mesh, material, world });
        }

        for &child in node.children.iter().rev() {
            stack.push(WorkItem { node: child, parent_world: world, depth: item.depth + 1 });
        }
    }

    Ok(out)
}

fn record_camera(doc: &Document, out: &mut Flattened, node: usize, camera: usize, world: Mat4) {
    match doc.cameras.get(camera) {
        Some(def) if def.perspective.is_some() => {
            if let Some(previous) = out.camera {
                log::debug!("camera node {node} replaces camera node {}", previous.node);
            }
            out.camera = Some(CameraSpec { node, camera, world });
        }
        Some(def) => log::warn!("ignoring {} camera on node {node}", def.kind),
        None => log::warn!("node {node} references missing camera {camera}"),
    }
}

fn record_light(
    doc: &Document,
    out: &mut Flattened,
    index: usize,
    node: &Node,
    light: usize,
    world: Mat4,
    prefix: &str,
) -> Result<()> {
    let def = doc.lights().get(light).ok_or_else(|| {
        SceneError::MalformedMetadata(format!("node {index} light index {light} out of range"))
    })?;
    let named = node.name.as_deref().is_some_and(|n| n.starts_with(prefix));
    if !def.is_point() || !named {
        log::debug!("node {index} light does not qualify as the point light");
        return Ok(());
    }
    if let Some(kept) = out.light {
        log::warn!("dropping point light on node {index}; node {} already provides it", kept.node);
        return Ok(());
    }
    out.light = Some(LightSpec {
        node: index,
        position: world.transform_point3(Vec3::ZERO),
        intensity: def.intensity,
    });
    Ok(())
}
