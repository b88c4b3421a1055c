//! Playlist service
//!
//! **Responsibilities:**
//! - [`PlaylistService`] factory creating one playlist per engine instance
//! - [`Playlist`] operations used by the lifecycle (targets, service
//!   discovery, autoplay) and by the primary IPC endpoint
//! - [`QueuePlaylist`], the default in-memory implementation

use crate::error::{EngineError, Result};
use crate::targets::{InsertMode, WorkItem};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Owner information passed to the playlist factory
#[derive(Debug, Clone)]
pub struct PlaylistContext {
    pub instance_id: Uuid,
    pub instance_name: String,
}

/// Creates the playlist owned by an engine instance
pub trait PlaylistService: Send + Sync {
    fn create(&self, ctx: &PlaylistContext) -> Result<Arc<dyn Playlist>>;
}

/// A playlist shared between the owning instance and the IPC endpoint
pub trait Playlist: Send + Sync {
    /// Start service discovery modules feeding the playlist
    fn add_service_discovery(&self, names: &[String]) -> Result<()>;

    fn add_target(&self, item: &WorkItem) -> Result<()>;

    fn play(&self) -> Result<()>;

    /// Stop the playlist; later calls fail with `InvalidState`
    fn destroy(&self);
}

/// Default [`PlaylistService`]
#[derive(Debug, Default)]
pub struct QueuePlaylistService;

impl PlaylistService for QueuePlaylistService {
    fn create(&self, ctx: &PlaylistContext) -> Result<Arc<dyn Playlist>> {
        debug!("Creating playlist for instance {}", ctx.instance_id);
        Ok(Arc::new(QueuePlaylist::new()))
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<WorkItem>,
    discovery: Vec<String>,
    playing: bool,
    destroyed: bool,
}

/// In-memory playlist
#[derive(Debug, Default)]
pub struct QueuePlaylist {
    inner: Mutex<QueueInner>,
}

impl QueuePlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items in playlist order
    pub fn items(&self) -> Vec<WorkItem> {
        self.inner.lock().items.iter().cloned().collect()
    }

    pub fn discovery(&self) -> Vec<String> {
        self.inner.lock().discovery.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }
}

fn destroyed() -> EngineError {
    EngineError::InvalidState("playlist destroyed".into())
}

impl Playlist for QueuePlaylist {
    fn add_service_discovery(&self, names: &[String]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(destroyed());
        }

        for name in names {
            if !inner.discovery.contains(name) {
                info!("Adding service discovery {}", name);
                inner.discovery.push(name.clone());
            }
        }
        Ok(())
    }

    fn add_target(&self, item: &WorkItem) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(destroyed());
        }

        debug!("Adding {} ({:?})", item.reference, item.mode);
        match item.mode {
            InsertMode::Insert => inner.items.push_front(item.clone()),
            InsertMode::Enqueue => inner.items.push_back(item.clone()),
            InsertMode::PlayNow => {
                inner.items.push_back(item.clone());
                inner.playing = true;
            }
        }
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(destroyed());
        }
        inner.playing = true;
        Ok(())
    }

    fn destroy(&self) {
        let mut inner = self.inner.lock();
        if !inner.destroyed {
            inner.items.clear();
            inner.playing = false;
            inner.destroyed = true;
            debug!("Playlist destroyed");
        }
    }
}
