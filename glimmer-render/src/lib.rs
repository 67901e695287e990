//! Glimmer scene ingestion.
//!
//! Loads a binary scene container into a [`Scene`]: the node graph is
//! flattened into world-space instances, vertex data is located in the
//! binary payload without copying, and the camera, instance, material and
//! light parameter blocks are built for the shading stage.
//!
//! ```no_run
//! use glimmer_render::{load_scene_from_path, LoadOptions};
//!
//! let options = LoadOptions::default().with_viewport_aspect(16.0 / 9.0);
//! let scene = load_scene_from_path("scene.glb", &options)?;
//! for instance in scene.instances() {
//!     println!("node {} draws mesh {}", instance.node, instance.mesh);
//! }
//! # Ok::<(), glimmer_render::SceneError>(())
//! ```

pub mod attributes;
pub mod flatten;
pub mod gpu;
pub mod loader;
pub mod options;
pub mod params;
pub mod scene;
pub mod slot;

pub use glimmer_gpu_shared::{Result, SceneError};
pub use gpu::{GpuScene, SceneLayouts};
pub use loader::{load_scene, load_scene_from_path, LoadStage};
pub use options::{CameraSettings, LoadOptions};
pub use scene::{LoadWarning, RenderInstance, Scene, SceneMesh};
pub use slot::{LoadTicket, SceneSlot};
