//! Isolated engine fixture
//!
//! Every fixture owns its global runtime state, session bus and temporary
//! directories, so tests do not share anything except the tracing
//! subscriber.

use super::fakes::{
    CountingHooks, FakeDetacher, FakePlaylistService, PanicExit, RecordingRegistry,
    RecordingSupervisor,
};
use medley_common::{ConfigStore, PathResolver};
use medley_core::ipc::{LocalSessionBus, SessionBus};
use medley_core::{Collaborators, EngineInstance, ExitStatus, GlobalRuntimeState, Result};
use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_CHANNEL: &str = "org.medley.test";

pub struct EngineFixture {
    pub temp_dir: TempDir,
    pub hooks: Arc<CountingHooks>,
    pub global: Arc<GlobalRuntimeState>,
    pub registry: Arc<RecordingRegistry>,
    pub playlists: Arc<FakePlaylistService>,
    pub supervisor: Arc<RecordingSupervisor>,
    pub detacher: Arc<FakeDetacher>,
    pub bus: Arc<LocalSessionBus>,
}

impl EngineFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let plugin_dir = temp_dir.path().join("plugins");
        std::fs::create_dir_all(&plugin_dir).expect("Failed to create plugin dir");
        let cache = temp_dir.path().join("plugins.cache.json");

        let hooks = Arc::new(CountingHooks::default());
        let global = Arc::new(GlobalRuntimeState::with_hooks(hooks.clone()));

        Self {
            registry: Arc::new(RecordingRegistry::new(&plugin_dir, &cache)),
            temp_dir,
            hooks,
            global,
            playlists: Arc::new(FakePlaylistService::default()),
            supervisor: Arc::new(RecordingSupervisor::default()),
            detacher: Arc::new(FakeDetacher::default()),
            bus: Arc::new(LocalSessionBus::new()),
        }
    }

    pub fn home(&self) -> PathBuf {
        self.temp_dir.path().join("home")
    }

    pub fn config_file(&self) -> PathBuf {
        self.temp_dir.path().join("config").join("medley").join("medley.toml")
    }

    /// Fresh collaborators sharing this fixture's fakes
    ///
    /// Each call gets its own configuration store, as separate instances do.
    pub fn collaborators(&self) -> Collaborators {
        let bus: Arc<dyn SessionBus> = self.bus.clone();

        Collaborators::new()
            .with_config(Arc::new(ConfigStore::new("medley", "0.1.0-test")))
            .with_paths(PathResolver::with_dirs(
                Some(self.home()),
                Some(self.home()),
                Some(self.temp_dir.path().join("config")),
            ))
            .with_modules(self.registry.clone())
            .with_playlists(self.playlists.clone())
            .with_interfaces(self.supervisor.clone())
            .with_bus(bus)
            .with_detacher(self.detacher.clone())
            .with_exit(Arc::new(PanicExit))
            .with_channel_name(TEST_CHANNEL)
    }

    pub fn instance(&self) -> Result<EngineInstance> {
        EngineInstance::create(Arc::clone(&self.global), self.collaborators())
    }
}

impl Default for EngineFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an argv vector with the program name first
pub fn argv(args: &[&str]) -> Vec<OsString> {
    std::iter::once("medley")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

/// Run `f`, returning the status passed to the exit hook if it fired
pub fn catch_exit<T>(f: impl FnOnce() -> T) -> std::result::Result<T, ExitStatus> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| match payload.downcast::<ExitStatus>() {
        Ok(status) => *status,
        Err(other) => panic::resume_unwind(other),
    })
}
