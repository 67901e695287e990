//! The scene the renderer is currently drawing.
//!
//! Loads run independently and publish into a [`SceneSlot`]. A load that was
//! overtaken by a newer one is discarded instead of published, and a failed
//! load never touches the current scene.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glimmer_gpu_shared::Result;
use parking_lot::RwLock;

use crate::loader::load_scene;
use crate::options::LoadOptions;
use crate::scene::Scene;

/// Identifies one load started on a [`SceneSlot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Published {
    generation: u64,
    scene: Arc<Scene>,
}

/// Holds the active scene and swaps it atomically between frames.
#[derive(Default)]
pub struct SceneSlot {
    latest: AtomicU64,
    current: RwLock<Option<Published>>,
}

impl SceneSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load. Every earlier ticket becomes stale.
    pub fn begin_load(&self) -> LoadTicket {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("scene load {generation} started");
        LoadTicket { generation }
    }

    /// Whether no load has started since `ticket`.
    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.generation
    }

    /// Make `scene` the active scene unless a newer load has begun.
    ///
    /// Returns the installed scene, or `None` after dropping `scene` when the
    /// ticket is stale.
    pub fn publish(&self, ticket: LoadTicket, scene: Scene) -> Option<Arc<Scene>> {
        let mut current = self.current.write();
        let newer_published = current.as_ref().is_some_and(|p| p.generation >= ticket.generation);
        if !self.is_current(ticket) || newer_published {
            log::debug!("discarding superseded scene load {}", ticket.generation);
            return None;
        }
        let scene = Arc::new(scene);
        *current = Some(Published { generation: ticket.generation, scene: Arc::clone(&scene) });
        log::debug!("published scene load {}", ticket.generation);
        Some(scene)
    }

    /// The active scene, if any has been published.
    pub fn current(&self) -> Option<Arc<Scene>> {
        self.current.read().as_ref().map(|p| Arc::clone(&p.scene))
    }

    /// Load `bytes` and publish the result.
    ///
    /// `Ok(None)` means the load succeeded but was superseded. On error the
    /// active scene stays as it was.
    pub fn load(&self, bytes: impl Into<Arc<[u8]>>, options: &LoadOptions) -> Result<Option<Arc<Scene>>> {
        let ticket = self.begin_load();
        let scene = load_scene(bytes, options)?;
        Ok(self.publish(ticket, scene))
    }
}

impl std::fmt::Debug for SceneSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneSlot")
            .field("latest", &self.latest.load(Ordering::Relaxed))
            .field("published", &self.current.read().as_ref().map(|p| p.generation))
            .finish()
    }
}
