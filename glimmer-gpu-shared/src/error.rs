//! Error taxonomy for scene loading.

use thiserror::Error;

/// Every way a scene load can fail.
///
/// All variants abort the load except [`SceneError::SingularTransform`],
/// which only drops the affected instance.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Bad magic, short header, or framing that runs past the end of the data.
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    /// Missing chunk, unexpected chunk tag, or chunks in the wrong order.
    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),

    /// The metadata chunk is not valid text or does not match the schema.
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// A primitive lacks a buffer view the pipeline requires.
    #[error("mesh {mesh} is missing its {attribute} attribute")]
    MissingAttribute { mesh: usize, attribute: &'static str },

    /// A buffer view does not fit inside the binary payload.
    #[error("buffer view {view} ({offset}+{length}) exceeds payload of {payload_len} bytes")]
    CorruptBufferView {
        view: usize,
        offset: usize,
        length: usize,
        payload_len: usize,
    },

    /// Traversal reached a node that is already on its own ancestor path.
    #[error("cyclic scene graph: node {node} is its own ancestor")]
    CyclicSceneGraph { node: usize },

    /// An instance's world transform has no inverse.
    #[error("world transform of node {node} is singular")]
    SingularTransform { node: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SceneError {
    /// Whether the load may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SingularTransform { .. })
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedMetadata(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SceneError>;
