use approx::assert_relative_eq;
use glam::{Mat4, Vec3, Vec4};
use glimmer_gpu_shared::container::{write_container, CHUNK_BIN, CHUNK_JSON, CONTAINER_MAGIC};
use glimmer_gpu_shared::uniforms::LightUniforms;
use glimmer_render::{load_scene, LoadOptions, SceneError, SceneSlot};
use serde_json::{json, Value};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A quad: four positions, four normals, six indices, then four more
/// indices so the index view is 20 bytes long.
fn quad_payload() -> Vec<u8> {
    let mut bin = Vec::new();
    for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
        for c in v {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for _ in 0..4 {
        for c in [0.0f32, 0.0, 1.0] {
            bin.extend_from_slice(&c.to_le_bytes());
        }
    }
    for i in [0u16, 1, 2, 0, 2, 3, 0, 1, 2, 3] {
        bin.extend_from_slice(&i.to_le_bytes());
    }
    bin
}

/// Buffer views for [`quad_payload`]: positions, normals, indices.
fn quad_views() -> Value {
    json!([
        { "byteOffset": 0, "byteLength": 48 },
        { "byteOffset": 48, "byteLength": 48 },
        { "byteOffset": 96, "byteLength": 20 }
    ])
}

fn quad_mesh() -> Value {
    json!({ "name": "Quad", "primitives": [{ "attributes": { "POSITION": 0, "NORMAL": 1 }, "indices": 2, "material": 0 }] })
}

fn glb(doc: &Value) -> Vec<u8> {
    write_container(doc.to_string().as_bytes(), &quad_payload())
}

fn lights_extension(intensities: &[f32]) -> Value {
    let lights: Vec<Value> = intensities
        .iter()
        .map(|i| json!({ "type": "point", "intensity": i }))
        .collect();
    json!({ "KHR_lights_punctual": { "lights": lights } })
}

fn light_node(name: &str, light: usize, translation: [f32; 3]) -> Value {
    json!({ "name": name, "translation": translation, "extensions": { "KHR_lights_punctual": { "light": light } } })
}

fn full_scene() -> Value {
    json!({
        "scene": 0,
        "scenes": [{ "nodes": [0, 1, 2] }],
        "nodes": [
            { "name": "Camera", "translation": [0.0, 0.0, 5.0], "camera": 0 },
            light_node("Point", 0, [2.0, 3.0, 4.0]),
            { "name": "Root", "translation": [1.0, 0.0, 0.0], "children": [3] },
            { "name": "Child", "translation": [1.0, 0.0, 0.0], "scale": [2.0, 2.0, 2.0], "mesh": 0 }
        ],
        "meshes": [quad_mesh()],
        "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [0.8, 0.1, 0.1, 1.0], "roughnessFactor": 0.4 } }],
        "cameras": [{ "type": "perspective", "perspective": { "yfov": 0.8, "aspectRatio": 1.5, "znear": 0.1, "zfar": 100.0 } }],
        "bufferViews": quad_views(),
        "extensions": lights_extension(&[30.0])
    })
}

#[test]
fn test_full_load() {
    init();
    let scene = load_scene(glb(&full_scene()), &LoadOptions::default()).unwrap();

    assert_eq!(scene.meshes().len(), 1);
    assert_eq!(scene.meshes()[0].name.as_deref(), Some("Quad"));
    assert_eq!(scene.instances().len(), 1);
    assert!(scene.warnings().is_empty());

    let instance = &scene.instances()[0];
    assert_eq!(instance.node, 3);
    let expected = Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::splat(2.0));
    assert_relative_eq!(instance.world, expected);
    assert_relative_eq!(
        Mat4::from_cols_array_2d(&instance.uniforms.normal_matrix),
        Mat4::from_scale(Vec3::splat(0.5)),
        epsilon = 1e-6
    );

    assert_eq!(scene.camera().eye, [0.0, 0.0, 5.0, 1.0]);
    assert_relative_eq!(
        Mat4::from_cols_array_2d(&scene.camera().projection),
        Mat4::perspective_rh(0.8, 1.5, 0.1, 100.0)
    );

    assert_eq!(
        scene.light_uniforms(),
        LightUniforms { position: [2.0, 3.0, 4.0], intensity: 30.0 }
    );

    assert_eq!(scene.materials().len(), 1);
    assert_eq!(scene.materials()[0].base_color, [0.8, 0.1, 0.1]);
    assert_eq!(scene.materials()[0].roughness, 0.4);

    assert_eq!(scene.positions(0).unwrap().len(), 48);
    assert_eq!(scene.normals(0).unwrap().len(), 48);
}

#[test]
fn test_twenty_index_bytes_give_ten_indices() {
    init();
    let scene = load_scene(glb(&full_scene()), &LoadOptions::default()).unwrap();
    assert_eq!(scene.index_bytes(0).unwrap().len(), 20);
    assert_eq!(scene.meshes()[0].attributes.index_count(), 10);
    assert_eq!(scene.indices(0).unwrap(), vec![0, 1, 2, 0, 2, 3, 0, 1, 2, 3]);
}

#[test]
fn test_corrupted_magic_fails() {
    init();
    let mut bytes = glb(&full_scene());
    bytes[0] ^= 0xFF;
    let err = load_scene(bytes, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::InvalidContainer(_)), "{err}");
}

#[test]
fn test_swapped_chunks_are_unsupported() {
    init();
    let json = full_scene().to_string().into_bytes();
    let json_len = (json.len() + 3) & !3;
    let mut padded = json.clone();
    padded.resize(json_len, b' ');
    let bin = quad_payload();

    let total = 12 + 8 + bin.len() + 8 + json_len;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&CONTAINER_MAGIC.to_le_bytes());
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&(total as u32).to_le_bytes());
    bytes.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    bytes.extend_from_slice(&bin);
    bytes.extend_from_slice(&(json_len as u32).to_le_bytes());
    bytes.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    bytes.extend_from_slice(&padded);

    let err = load_scene(bytes, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::UnsupportedContainer(_)), "{err}");
}

#[test]
fn test_missing_normal_aborts_whole_load() {
    init();
    let mut doc = full_scene();
    doc["meshes"] = json!([
        quad_mesh(),
        { "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 2 }] }
    ]);
    doc["nodes"].as_array_mut().unwrap().push(json!({ "mesh": 1 }));
    doc["scenes"][0]["nodes"] = json!([0, 1, 2, 4]);

    let err = load_scene(glb(&doc), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::MissingAttribute { mesh: 1, attribute: "NORMAL" }), "{err}");
}

#[test]
fn test_missing_normal_tolerated_when_not_required() {
    init();
    let mut doc = full_scene();
    doc["meshes"][0]["primitives"][0]["attributes"] = json!({ "POSITION": 0 });
    let scene = load_scene(glb(&doc), &LoadOptions::default().with_require_normals(false)).unwrap();
    assert!(scene.normals(0).is_none());
    assert_eq!(scene.instances().len(), 1);
}

#[test]
fn test_buffer_view_past_payload_is_corrupt() {
    init();
    let mut doc = full_scene();
    doc["bufferViews"][2] = json!({ "byteOffset": 100, "byteLength": 40 });
    let err = load_scene(glb(&doc), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::CorruptBufferView { view: 2, .. }), "{err}");
}

#[test]
fn test_only_first_point_light_is_used() {
    init();
    let mut doc = full_scene();
    doc["nodes"].as_array_mut().unwrap().push(light_node("PointB", 1, [-5.0, 0.0, 0.0]));
    doc["scenes"][0]["nodes"] = json!([0, 1, 2, 4]);
    doc["extensions"] = lights_extension(&[30.0, 99.0]);

    let scene = load_scene(glb(&doc), &LoadOptions::default()).unwrap();
    assert_eq!(
        scene.light_uniforms(),
        LightUniforms { position: [2.0, 3.0, 4.0], intensity: 30.0 }
    );
    assert!(scene.warnings().is_empty());
}

#[test]
fn test_light_prefix_is_configurable() {
    init();
    let mut doc = full_scene();
    doc["nodes"][1]["name"] = json!("Lamp");
    let scene = load_scene(glb(&doc), &LoadOptions::default()).unwrap();
    assert!(scene.light().is_none());

    let scene = load_scene(glb(&doc), &LoadOptions::default().with_point_light_prefix("Lamp")).unwrap();
    assert_eq!(scene.light_uniforms().intensity, 30.0);
}

#[test]
fn test_no_light_binds_zero_block() {
    init();
    let mut doc = full_scene();
    doc["scenes"][0]["nodes"] = json!([0, 2]);
    let scene = load_scene(glb(&doc), &LoadOptions::default()).unwrap();
    assert!(scene.light().is_none());
    assert_eq!(scene.light_uniforms(), LightUniforms::default());
}

#[test]
fn test_viewport_aspect_overrides_camera_aspect() {
    init();
    let options = LoadOptions::default().with_viewport_aspect(2.0);
    let scene = load_scene(glb(&full_scene()), &options).unwrap();
    assert_relative_eq!(
        Mat4::from_cols_array_2d(&scene.camera().projection),
        Mat4::perspective_rh(0.8, 2.0, 0.1, 100.0)
    );
}

#[test]
fn test_camera_view_looks_from_node() {
    init();
    let scene = load_scene(glb(&full_scene()), &LoadOptions::default()).unwrap();
    let view = Mat4::from_cols_array_2d(&scene.camera().view);
    // The world origin sits five units in front of the camera.
    assert_relative_eq!(view * Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::new(0.0, 0.0, -5.0, 1.0), epsilon = 1e-6);
}

#[test]
fn test_singular_instance_is_skipped() {
    init();
    let mut doc = full_scene();
    doc["nodes"].as_array_mut().unwrap().push(json!({ "name": "Flat", "scale": [1.0, 0.0, 1.0], "mesh": 0 }));
    doc["scenes"][0]["nodes"] = json!([0, 1, 2, 4]);

    let scene = load_scene(glb(&doc), &LoadOptions::default()).unwrap();
    assert_eq!(scene.instances().len(), 1);
    assert_eq!(scene.warnings().len(), 1);
    assert_eq!(scene.warnings()[0].node, Some(4));
}

#[test]
fn test_cyclic_graph_fails() {
    init();
    let mut doc = full_scene();
    doc["nodes"][3]["children"] = json!([2]);
    let err = load_scene(glb(&doc), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::CyclicSceneGraph { node: 2 }), "{err}");
}

#[test]
fn test_doubling_shared_children_fail_instead_of_exhausting_memory() {
    init();
    let levels = 40;
    let mut doc = full_scene();
    let mut nodes: Vec<Value> = (0..levels).map(|i| json!({ "children": [i + 1, i + 1] })).collect();
    nodes.push(json!({ "mesh": 0 }));
    doc["nodes"] = Value::Array(nodes);
    doc["scenes"][0]["nodes"] = json!([0]);

    let err = load_scene(glb(&doc), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::MalformedMetadata(ref m) if m.contains("node visits")), "{err}");

    let err = load_scene(glb(&doc), &LoadOptions::default().with_max_node_visits(64)).unwrap_err();
    assert!(matches!(err, SceneError::MalformedMetadata(ref m) if m.contains("64")), "{err}");
}

#[test]
fn test_two_component_positions_are_malformed() {
    init();
    let mut doc = full_scene();
    doc["accessors"] = json!([
        { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC2" },
        { "bufferView": 1, "componentType": 5126, "count": 4, "type": "VEC3" },
        { "bufferView": 2, "componentType": 5123, "count": 3, "type": "SCALAR" }
    ]);
    let err = load_scene(glb(&doc), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::MalformedMetadata(ref m) if m.contains("VEC2")), "{err}");
}

#[test]
fn test_index_past_vertex_buffer_is_malformed() {
    init();
    let mut doc = full_scene();
    // Three vertices, but the quad indices reach vertex 3.
    doc["bufferViews"][0] = json!({ "byteOffset": 0, "byteLength": 36 });
    doc["bufferViews"][1] = json!({ "byteOffset": 48, "byteLength": 36 });
    let err = load_scene(glb(&doc), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::MalformedMetadata(ref m) if m.contains("index 3")), "{err}");
}

#[test]
fn test_zero_scale_camera_falls_back_with_warning() {
    init();
    let mut doc = full_scene();
    doc["nodes"][0]["scale"] = json!([0.0, 0.0, 0.0]);
    let options = LoadOptions::default().with_viewport_aspect(2.0);
    let scene = load_scene(glb(&doc), &options).unwrap();

    let view = Mat4::from_cols_array_2d(&scene.camera().view);
    assert!(view.is_finite());
    assert_eq!(view, Mat4::IDENTITY);
    assert_relative_eq!(
        Mat4::from_cols_array_2d(&scene.camera().projection),
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 2.0, 0.1, 100.0)
    );
    assert_eq!(scene.warnings().len(), 1);
    assert_eq!(scene.warnings()[0].node, Some(0));
    assert_eq!(scene.instances().len(), 1);
}

#[test]
fn test_missing_required_field_is_malformed() {
    init();
    let mut doc = full_scene();
    doc["bufferViews"][0] = json!({ "byteOffset": 0 });
    let err = load_scene(glb(&doc), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SceneError::MalformedMetadata(_)), "{err}");
}

#[test]
fn test_failed_load_leaves_slot_untouched() {
    init();
    let slot = SceneSlot::new();
    let first = slot.load(glb(&full_scene()), &LoadOptions::default()).unwrap().unwrap();

    let mut broken = glb(&full_scene());
    broken[0] = 0;
    assert!(slot.load(broken, &LoadOptions::default()).is_err());

    let current = slot.current().unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &current));
    assert_eq!(current.instances().len(), 1);
}

#[test]
fn test_instance_blocks_pack_at_alignment() {
    init();
    let mut doc = full_scene();
    doc["nodes"].as_array_mut().unwrap().push(json!({ "translation": [0.0, 9.0, 0.0], "mesh": 0 }));
    doc["scenes"][0]["nodes"] = json!([0, 1, 2, 4]);
    let scene = load_scene(glb(&doc), &LoadOptions::default()).unwrap();

    let bytes = scene.instance_block_bytes(256);
    assert_eq!(bytes.len(), 512);
    // Second model matrix, column 3, component y.
    let offset = 256 + 3 * 16 + 4;
    assert_eq!(&bytes[offset..offset + 4], &9.0f32.to_le_bytes());
}
