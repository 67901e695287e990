//! Glimmer shared scene data.
//!
//! Everything both the loader and the GPU side need to agree on: the binary
//! container framing, the typed metadata model, the shading-stage parameter
//! block layouts and the load error taxonomy.

pub mod container;
pub mod document;
pub mod error;
pub mod uniforms;

pub use error::{Result, SceneError};
