//! Parameter block builder.
//!
//! Turns flattened camera, instance, material and light data into the
//! fixed-layout records the shading stage binds.

use glam::{Mat3, Mat4, Vec3};
use glimmer_gpu_shared::document::Material;
use glimmer_gpu_shared::uniforms::{CameraUniforms, InstanceUniforms, LightUniforms, MaterialUniforms};
use glimmer_gpu_shared::{Result, SceneError};

use crate::flatten::LightSpec;
use crate::options::CameraSettings;

/// Camera block for a camera placed by `world`, or `None` when `world`
/// leaves no usable view direction (zero scale, non-finite entries, or an
/// up axis collapsed onto the view axis).
///
/// The eye is the world-space origin of the node, the target lies one unit
/// down its local -Z and up is its local +Y. `viewport_aspect` overrides the
/// camera's own aspect ratio.
pub fn camera_uniforms(settings: &CameraSettings, world: Mat4, viewport_aspect: Option<f32>) -> Option<CameraUniforms> {
    let eye = world.transform_point3(Vec3::ZERO);
    let target = world.transform_point3(Vec3::NEG_Z);
    if !eye.is_finite() || (target - eye).try_normalize().is_none() {
        return None;
    }
    let up = world.transform_vector3(Vec3::Y).try_normalize().unwrap_or(Vec3::Y);
    let view = Mat4::look_at_rh(eye, target, up);
    if !view.is_finite() {
        return None;
    }

    Some(CameraUniforms {
        projection: projection(settings, viewport_aspect).to_cols_array_2d(),
        view: view.to_cols_array_2d(),
        eye: eye.extend(1.0).to_array(),
    })
}

/// Camera block for a camera at the origin looking down -Z.
pub fn fallback_camera_uniforms(settings: &CameraSettings, viewport_aspect: Option<f32>) -> CameraUniforms {
    CameraUniforms {
        projection: projection(settings, viewport_aspect).to_cols_array_2d(),
        view: Mat4::IDENTITY.to_cols_array_2d(),
        eye: [0.0, 0.0, 0.0, 1.0],
    }
}

fn projection(settings: &CameraSettings, viewport_aspect: Option<f32>) -> Mat4 {
    let aspect = viewport_aspect
        .or(settings.aspect_ratio)
        .filter(|a| a.is_finite() && *a > 0.0)
        .unwrap_or(1.0);
    match settings.zfar {
        Some(far) => Mat4::perspective_rh(settings.yfov, aspect, settings.znear, far),
        None => Mat4::perspective_infinite_rh(settings.yfov, aspect, settings.znear),
    }
}

/// Inverse-transpose of the upper 3x3 of `world`, or `None` when singular.
pub fn normal_matrix(world: Mat4) -> Option<Mat3> {
    let upper = Mat3::from_mat4(world);
    let det = upper.determinant();
    if !det.is_finite() || det.abs() < f32::MIN_POSITIVE {
        return None;
    }
    let normal = upper.inverse().transpose();
    normal.is_finite().then_some(normal)
}

/// Instance block for the instance of `node` placed by `world`.
pub fn instance_uniforms(world: Mat4, node: usize) -> Result<InstanceUniforms> {
    let normal = normal_matrix(world).ok_or(SceneError::SingularTransform { node })?;
    Ok(InstanceUniforms {
        model: world.to_cols_array_2d(),
        normal_matrix: Mat4::from_mat3(normal).to_cols_array_2d(),
    })
}

/// Material block; base color alpha is dropped and roughness clamped to [0, 1].
pub fn material_uniforms(material: &Material) -> MaterialUniforms {
    let pbr = &material.pbr_metallic_roughness;
    let [r, g, b, _] = pbr.base_color_factor;
    MaterialUniforms {
        base_color: [r, g, b],
        roughness: pbr.roughness_factor.clamp(0.0, 1.0),
    }
}

/// Light block; no light yields the all-zero block.
pub fn light_uniforms(light: Option<&LightSpec>) -> LightUniforms {
    light
        .map(|l| LightUniforms {
            position: l.position.to_array(),
            intensity: l.intensity.max(0.0),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Quat, Vec4};

    fn mat(cols: [[f32; 4]; 4]) -> Mat4 {
        Mat4::from_cols_array_2d(&cols)
    }

    #[test]
    fn test_camera_at_origin_looks_down_negative_z() {
        let block = camera_uniforms(&CameraSettings::default(), Mat4::IDENTITY, None).unwrap();
        assert_relative_eq!(mat(block.view), Mat4::IDENTITY, epsilon = 1e-6);
        assert_eq!(block.eye, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_camera_eye_follows_node_translation() {
        let world = Mat4::from_translation(Vec3::new(0.0, 2.0, 5.0));
        let block = camera_uniforms(&CameraSettings::default(), world, None).unwrap();
        assert_eq!(block.eye, [0.0, 2.0, 5.0, 1.0]);
        let eye_in_view = mat(block.view) * Vec4::new(0.0, 2.0, 5.0, 1.0);
        assert_relative_eq!(eye_in_view, Vec4::W, epsilon = 1e-6);
    }

    #[test]
    fn test_camera_rotation_turns_view() {
        let world = Mat4::from_quat(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let block = camera_uniforms(&CameraSettings::default(), world, None).unwrap();
        // Rotated +90 degrees about Y the camera faces -X.
        let ahead = mat(block.view) * Vec4::new(-1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(ahead, Vec4::new(0.0, 0.0, -1.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_projection_maps_near_and_far_to_unit_depth() {
        let settings = CameraSettings { yfov: 1.0, aspect_ratio: Some(1.5), znear: 0.5, zfar: Some(50.0) };
        let projection = mat(camera_uniforms(&settings, Mat4::IDENTITY, None).unwrap().projection);
        let near = projection * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = projection * Vec4::new(0.0, 0.0, -50.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
        assert_relative_eq!(projection, Mat4::perspective_rh(1.0, 1.5, 0.5, 50.0));
    }

    #[test]
    fn test_viewport_aspect_overrides_camera() {
        let settings = CameraSettings { yfov: 1.0, aspect_ratio: Some(1.0), znear: 0.1, zfar: Some(10.0) };
        let block = camera_uniforms(&settings, Mat4::IDENTITY, Some(2.0)).unwrap();
        assert_relative_eq!(mat(block.projection), Mat4::perspective_rh(1.0, 2.0, 0.1, 10.0));
    }

    #[test]
    fn test_missing_aspect_defaults_to_square() {
        let settings = CameraSettings { yfov: 1.0, aspect_ratio: None, znear: 0.1, zfar: Some(10.0) };
        let block = camera_uniforms(&settings, Mat4::IDENTITY, None).unwrap();
        assert_relative_eq!(mat(block.projection), Mat4::perspective_rh(1.0, 1.0, 0.1, 10.0));
    }

    #[test]
    fn test_infinite_far_plane() {
        let settings = CameraSettings { yfov: 1.0, aspect_ratio: Some(1.0), znear: 0.1, zfar: None };
        let block = camera_uniforms(&settings, Mat4::IDENTITY, None).unwrap();
        assert_relative_eq!(mat(block.projection), Mat4::perspective_infinite_rh(1.0, 1.0, 0.1));
    }

    #[test]
    fn test_degenerate_camera_pose_has_no_block() {
        let settings = CameraSettings::default();
        let flat = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)) * Mat4::from_scale(Vec3::ZERO);
        assert!(camera_uniforms(&settings, flat, None).is_none());
        let nan = Mat4::from_translation(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(camera_uniforms(&settings, nan, None).is_none());
        // Local +Y squashed onto the view axis.
        let collapsed = Mat4::from_cols(Vec4::X, Vec4::NEG_Z, Vec4::Z, Vec4::W);
        assert!(camera_uniforms(&settings, collapsed, None).is_none());
    }

    #[test]
    fn test_fallback_camera_block() {
        let settings = CameraSettings::default();
        let expected = camera_uniforms(&settings, Mat4::IDENTITY, Some(1.5)).unwrap();
        assert_eq!(fallback_camera_uniforms(&settings, Some(1.5)), expected);
    }

    #[test]
    fn test_normal_matrix_identity_for_rigid_motion() {
        let world = Mat4::from_rotation_translation(Quat::from_rotation_z(0.7), Vec3::new(4.0, 5.0, 6.0));
        let block = instance_uniforms(world, 0).unwrap();
        assert_relative_eq!(mat(block.model), world);
        // For a pure rotation the inverse-transpose is the rotation itself.
        assert_relative_eq!(
            mat(block.normal_matrix),
            Mat4::from_quat(Quat::from_rotation_z(0.7)),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_normal_matrix_inverts_non_uniform_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 4.0, 0.5));
        let block = instance_uniforms(world, 0).unwrap();
        let expected = Mat4::from_scale(Vec3::new(0.5, 0.25, 2.0));
        assert_relative_eq!(mat(block.normal_matrix), expected, epsilon = 1e-6);
        assert_eq!(block.normal_matrix[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_small_but_regular_scale_is_accepted() {
        let world = Mat4::from_scale(Vec3::splat(1e-3));
        assert!(instance_uniforms(world, 0).is_ok());
    }

    #[test]
    fn test_zero_scale_is_singular() {
        let world = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        let err = instance_uniforms(world, 7).unwrap_err();
        assert!(matches!(err, SceneError::SingularTransform { node: 7 }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_nan_transform_is_singular() {
        let world = Mat4::from_translation(Vec3::X) * Mat4::from_scale(Vec3::new(f32::NAN, 1.0, 1.0));
        assert!(normal_matrix(world).is_none());
    }

    #[test]
    fn test_material_block_drops_alpha_and_clamps_roughness() {
        let material: Material = serde_json::from_str(
            r#"{"pbrMetallicRoughness":{"baseColorFactor":[0.1,0.2,0.3,0.4],"roughnessFactor":1.5}}"#,
        )
        .unwrap();
        let block = material_uniforms(&material);
        assert_eq!(block.base_color, [0.1, 0.2, 0.3]);
        assert_eq!(block.roughness, 1.0);
    }

    #[test]
    fn test_default_material_block() {
        let block = material_uniforms(&Material::default());
        assert_eq!(block, MaterialUniforms { base_color: [1.0; 3], roughness: 1.0 });
    }

    #[test]
    fn test_light_block() {
        let light = LightSpec { node: 3, position: Vec3::new(1.0, 2.0, 3.0), intensity: 25.0 };
        assert_eq!(
            light_uniforms(Some(&light)),
            LightUniforms { position: [1.0, 2.0, 3.0], intensity: 25.0 }
        );
        assert_eq!(light_uniforms(None), LightUniforms::default());
    }
}
