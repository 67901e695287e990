//! Load-time settings.

use glimmer_gpu_shared::document::Perspective;
use glimmer_gpu_shared::uniforms::UNIFORM_OFFSET_ALIGNMENT;

use crate::flatten::DEFAULT_MAX_NODE_VISITS;

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraSettings {
    /// Vertical field of view in radians.
    pub yfov: f32,
    pub aspect_ratio: Option<f32>,
    pub znear: f32,
    /// `None` for an infinite far plane.
    pub zfar: Option<f32>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            yfov: std::f32::consts::FRAC_PI_4,
            aspect_ratio: None,
            znear: 0.1,
            zfar: Some(100.0),
        }
    }
}

impl From<Perspective> for CameraSettings {
    fn from(p: Perspective) -> Self {
        Self {
            yfov: p.yfov,
            aspect_ratio: p.aspect_ratio,
            znear: p.znear,
            zfar: p.zfar,
        }
    }
}

/// How a scene file is turned into a [`crate::Scene`].
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Replaces the camera's own aspect ratio (usually the canvas aspect).
    pub viewport_aspect: Option<f32>,
    /// Whether primitives without a NORMAL attribute fail the load.
    pub require_normals: bool,
    /// Node names starting with this qualify as the scene's point light.
    pub point_light_prefix: String,
    /// Stride alignment for packed per-instance and per-material blocks.
    pub uniform_alignment: u64,
    /// Camera used when the scene has no usable perspective camera node.
    pub fallback_camera: CameraSettings,
    /// Upper bound on node visits while flattening the scene graph.
    pub max_node_visits: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            viewport_aspect: None,
            require_normals: true,
            point_light_prefix: "Point".to_string(),
            uniform_alignment: UNIFORM_OFFSET_ALIGNMENT,
            fallback_camera: CameraSettings::default(),
            max_node_visits: DEFAULT_MAX_NODE_VISITS,
        }
    }
}

impl LoadOptions {
    pub fn with_viewport_aspect(mut self, aspect: f32) -> Self {
        self.viewport_aspect = Some(aspect);
        self
    }

    pub fn with_require_normals(mut self, required: bool) -> Self {
        self.require_normals = required;
        self
    }

    pub fn with_point_light_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.point_light_prefix = prefix.into();
        self
    }

    /// `alignment` must be a power of two.
    pub fn with_uniform_alignment(mut self, alignment: u64) -> Self {
        self.uniform_alignment = alignment;
        self
    }

    pub fn with_fallback_camera(mut self, camera: CameraSettings) -> Self {
        self.fallback_camera = camera;
        self
    }

    pub fn with_max_node_visits(mut self, visits: usize) -> Self {
        self.max_node_visits = visits;
        self
    }
}
