//! The scene load pipeline.
//!
//! Bytes go through a fixed sequence of stages, each consuming the complete
//! output of the one before it. A failing stage ends the load; there is no
//! partially loaded scene.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use glimmer_gpu_shared::container::parse_container;
use glimmer_gpu_shared::document::{Document, Material};
use glimmer_gpu_shared::uniforms::{CameraUniforms, MaterialUniforms};
use glimmer_gpu_shared::Result;

use crate::attributes;
use crate::flatten::{self, Flattened};
use crate::options::{CameraSettings, LoadOptions};
use crate::params;
use crate::scene::{LoadWarning, RenderInstance, Scene, SceneMesh};

/// Pipeline stages in the order a load passes through them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    Unparsed,
    ContainerValidated,
    MetadataParsed,
    Flattened,
    AttributesExtracted,
    ParameterBlocksBuilt,
    Ready,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unparsed => "unparsed",
            Self::ContainerValidated => "container validated",
            Self::MetadataParsed => "metadata parsed",
            Self::Flattened => "flattened",
            Self::AttributesExtracted => "attributes extracted",
            Self::ParameterBlocksBuilt => "parameter blocks built",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

fn enter(stage: LoadStage) {
    log::debug!("scene load: {stage}");
}

/// Read a container file and load it.
pub fn load_scene_from_path(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Scene> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    log::debug!("read {} bytes from {}", bytes.len(), path.display());
    load_scene(bytes, options)
}

/// Load a scene from the bytes of a binary container.
///
/// The returned scene keeps `bytes` alive and serves vertex and index data
/// straight out of it.
pub fn load_scene(bytes: impl Into<Arc<[u8]>>, options: &LoadOptions) -> Result<Scene> {
    let source: Arc<[u8]> = bytes.into();
    enter(LoadStage::Unparsed);

    let container = parse_container(&source)?;
    let payload_range = container.bin_range();
    enter(LoadStage::ContainerValidated);

    let doc = container.document()?;
    let payload = container.bin;
    enter(LoadStage::MetadataParsed);

    let mut warnings = Vec::new();
    let flat = flatten::flatten_bounded(&doc, &options.point_light_prefix, options.max_node_visits)?;
    enter(LoadStage::Flattened);

    // Extract each referenced mesh once; instances share it.
    let mut meshes = Vec::new();
    let mut mesh_slots: HashMap<usize, usize> = HashMap::new();
    for pending in &flat.instances {
        if mesh_slots.contains_key(&pending.mesh) {
            continue;
        }
        let attributes = attributes::extract(&doc, payload, pending.mesh, options.require_normals)?;
        mesh_slots.insert(pending.mesh, meshes.len());
        meshes.push(SceneMesh {
            source: pending.mesh,
            name: doc.meshes[pending.mesh].name.clone(),
            attributes,
        });
    }
    enter(LoadStage::AttributesExtracted);

    let (materials, default_material) = build_materials(&doc, &flat);
    let instances = build_instances(&flat, &mesh_slots, default_material, &mut warnings)?;
    let camera = build_camera(&doc, &flat, options, &mut warnings);
    let light = flat.light.as_ref().map(|l| params::light_uniforms(Some(l)));
    enter(LoadStage::ParameterBlocksBuilt);

    let scene = Scene {
        payload: payload_range,
        source: Arc::clone(&source),
        meshes,
        instances,
        materials,
        camera,
        light,
        warnings,
        uniform_alignment: options.uniform_alignment,
    };
    enter(LoadStage::Ready);
    log::info!(
        "loaded scene: {} instances, {} meshes, {} materials, light: {}, {} warnings",
        scene.instances.len(),
        scene.meshes.len(),
        scene.materials.len(),
        if scene.light.is_some() { "yes" } else { "no" },
        scene.warnings.len()
    );
    Ok(scene)
}

/// One block per document material, plus a default block when some
/// instance has no material. Returns the table and the default's index.
fn build_materials(doc: &Document, flat: &Flattened) -> (Vec<MaterialUniforms>, usize) {
    let mut materials: Vec<_> = doc.materials.iter().map(params::material_uniforms).collect();
    let default_index = materials.len();
    if flat.instances.iter().any(|i| i.material.is_none()) {
        materials.push(params::material_uniforms(&Material::default()));
    }
    (materials, default_index)
}

fn build_instances(
    flat: &Flattened,
    mesh_slots: &HashMap<usize, usize>,
    default_material: usize,
    warnings: &mut Vec<LoadWarning>,
) -> Result<Vec<RenderInstance>> {
    let mut instances = Vec::with_capacity(flat.instances.len());
    for pending in &flat.instances {
        let uniforms = match params::instance_uniforms(pending.world, pending.node) {
            Ok(uniforms) => uniforms,
            Err(e) if e.is_recoverable() => {
                log::warn!("skipping instance: {e}");
                warnings.push(LoadWarning {
                    node: Some(pending.node),
                    message: format!("skipped instance: {e}"),
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(&mesh) = mesh_slots.get(&pending.mesh) else {
            continue;
        };
        instances.push(RenderInstance {
            node: pending.node,
            mesh,
            material: pending.material.unwrap_or(default_material),
            world: pending.world,
            uniforms,
        });
    }
    Ok(instances)
}

/// Camera block for the chosen camera, or the fallback camera when the scene
/// has no perspective camera or its pose is degenerate.
fn build_camera(
    doc: &Document,
    flat: &Flattened,
    options: &LoadOptions,
    warnings: &mut Vec<LoadWarning>,
) -> CameraUniforms {
    let fallback = || params::fallback_camera_uniforms(&options.fallback_camera, options.viewport_aspect);
    let chosen = flat.camera.as_ref().and_then(|found| {
        let perspective = doc.cameras.get(found.camera)?.perspective?;
        Some((found.node, CameraSettings::from(perspective), found.world))
    });
    let Some((node, settings, world)) = chosen else {
        log::warn!("scene has no perspective camera; using the fallback camera");
        warnings.push(LoadWarning {
            node: None,
            message: "no perspective camera; using the fallback camera".to_string(),
        });
        return fallback();
    };
    match params::camera_uniforms(&settings, world, options.viewport_aspect) {
        Some(block) => block,
        None => {
            log::warn!("camera node {node} has a degenerate world transform; using the fallback camera");
            warnings.push(LoadWarning {
                node: Some(node),
                message: "degenerate camera transform; using the fallback camera".to_string(),
            });
            fallback()
        }
    }
}
