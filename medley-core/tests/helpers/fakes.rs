//! Recording collaborator fakes
//!
//! Each fake records the calls the engine makes and can be told to fail at
//! a specific point.

use medley_core::cpu::CpuCapabilities;
use medley_core::daemon::Detacher;
use medley_core::interfaces::{InterfaceInfo, InterfaceRequest, InterfaceSupervisor};
use medley_core::ipc::{HandoffReply, HandoffRequest, RequestHandler};
use medley_core::modules::{ModuleBank, ModuleDescriptor, ModuleRegistry, StrategyHandle};
use medley_core::playlist::{Playlist, PlaylistContext, PlaylistService, QueuePlaylist};
use medley_core::{EngineError, ExitStatus, PlatformHooks, ProcessExit, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Global state hooks
// ============================================================================

/// Platform hooks counting one-time setup and teardown
#[derive(Default)]
pub struct CountingHooks {
    pub setups: AtomicUsize,
    pub teardowns: AtomicUsize,
}

impl CountingHooks {
    pub fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

impl PlatformHooks for CountingHooks {
    fn probe_cpu(&self) -> CpuCapabilities {
        self.setups.fetch_add(1, Ordering::SeqCst);
        CpuCapabilities::FPU | CpuCapabilities::MMX | CpuCapabilities::SSE | CpuCapabilities::SSE2
    }

    fn shutdown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Module registry
// ============================================================================

/// Where the registry fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryFailure {
    InitBank,
    LoadPlugins,
}

/// Module bank wrapper recording bank usage
pub struct RecordingRegistry {
    inner: ModuleBank,
    fail: Mutex<Option<RegistryFailure>>,
    pub init_calls: AtomicUsize,
    pub end_calls: AtomicUsize,
    pub needs: AtomicUsize,
    pub unneeds: AtomicUsize,
    pub cache_resets: AtomicUsize,
}

impl RecordingRegistry {
    pub fn new(plugin_dir: &Path, cache: &Path) -> Self {
        Self {
            inner: ModuleBank::with_paths(vec![plugin_dir.to_path_buf()], Some(cache.to_path_buf())),
            fail: Mutex::new(None),
            init_calls: AtomicUsize::new(0),
            end_calls: AtomicUsize::new(0),
            needs: AtomicUsize::new(0),
            unneeds: AtomicUsize::new(0),
            cache_resets: AtomicUsize::new(0),
        }
    }

    pub fn fail_at(&self, failure: RegistryFailure) {
        *self.fail.lock() = Some(failure);
    }

    /// Banks initialized but not yet ended
    pub fn open_users(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst) - self.end_calls.load(Ordering::SeqCst)
    }

    /// Strategies needed but not yet released
    pub fn open_needs(&self) -> usize {
        self.needs.load(Ordering::SeqCst) - self.unneeds.load(Ordering::SeqCst)
    }

    fn failing(&self, at: RegistryFailure) -> bool {
        *self.fail.lock() == Some(at)
    }
}

impl ModuleRegistry for RecordingRegistry {
    fn init_bank(&self) -> Result<()> {
        if self.failing(RegistryFailure::InitBank) {
            return Err(EngineError::ModuleLoad("injected init failure".into()));
        }
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.init_bank()
    }

    fn load_builtins(&self) -> Result<()> {
        self.inner.load_builtins()
    }

    fn load_plugins(&self) -> Result<()> {
        if self.failing(RegistryFailure::LoadPlugins) {
            return Err(EngineError::ModuleLoad("injected plugin failure".into()));
        }
        self.inner.load_plugins()
    }

    fn end_bank(&self) {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.end_bank();
    }

    fn need(
        &self,
        capability: &str,
        constraint: Option<&str>,
        cpu: CpuCapabilities,
    ) -> Option<StrategyHandle> {
        let handle = self.inner.need(capability, constraint, cpu);
        if handle.is_some() {
            self.needs.fetch_add(1, Ordering::SeqCst);
        }
        handle
    }

    fn unneed(&self, handle: &StrategyHandle) {
        self.unneeds.fetch_add(1, Ordering::SeqCst);
        self.inner.unneed(handle);
    }

    fn request_cache_reset(&self) {
        self.cache_resets.fetch_add(1, Ordering::SeqCst);
        self.inner.request_cache_reset();
    }

    fn add_search_path(&self, dir: &Path) {
        self.inner.add_search_path(dir);
    }

    fn modules(&self) -> Vec<ModuleDescriptor> {
        self.inner.modules()
    }
}

// ============================================================================
// Playlist
// ============================================================================

/// Playlist factory keeping every playlist it created
#[derive(Default)]
pub struct FakePlaylistService {
    fail: AtomicBool,
    created: Mutex<Vec<Arc<QueuePlaylist>>>,
}

impl FakePlaylistService {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<Arc<QueuePlaylist>> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl PlaylistService for FakePlaylistService {
    fn create(&self, _ctx: &PlaylistContext) -> Result<Arc<dyn Playlist>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::PlaylistInit("injected playlist failure".into()));
        }
        let playlist = Arc::new(QueuePlaylist::new());
        self.created.lock().push(Arc::clone(&playlist));
        Ok(playlist)
    }
}

// ============================================================================
// Interfaces
// ============================================================================

/// Supervisor recording start requests without running anything
#[derive(Default)]
pub struct RecordingSupervisor {
    started: Mutex<Vec<InterfaceRequest>>,
    running: Mutex<Vec<String>>,
    pub stop_calls: AtomicUsize,
}

impl RecordingSupervisor {
    /// Names of every interface started, in order
    pub fn started(&self) -> Vec<String> {
        self.started.lock().iter().map(|r| r.module.name.clone()).collect()
    }

    pub fn requests(&self) -> Vec<InterfaceRequest> {
        self.started.lock().clone()
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

impl InterfaceSupervisor for RecordingSupervisor {
    fn start(&self, request: InterfaceRequest) -> Result<InterfaceInfo> {
        let info = InterfaceInfo {
            name: request.module.name.clone(),
            handles_play: request.module.handles_play,
        };
        if !request.blocking {
            self.running.lock().push(info.name.clone());
        }
        self.started.lock().push(request);
        Ok(info)
    }

    fn stop_all(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.lock().clear();
    }

    fn running(&self) -> Vec<String> {
        self.running.lock().clone()
    }
}

// ============================================================================
// Process control
// ============================================================================

/// Detacher that never forks
#[derive(Default)]
pub struct FakeDetacher {
    fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeDetacher {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl Detacher for FakeDetacher {
    fn detach(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Daemonize("injected fork failure".into()));
        }
        Ok(())
    }
}

/// Exit hook unwinding with the exit status as payload
#[derive(Default)]
pub struct PanicExit;

impl ProcessExit for PanicExit {
    fn exit(&self, status: ExitStatus) -> ! {
        std::panic::resume_unwind(Box::new(status))
    }
}

// ============================================================================
// IPC
// ============================================================================

/// Primary-side handler recording every request
#[derive(Default)]
pub struct RecordingHolder {
    requests: Mutex<Vec<HandoffRequest>>,
    /// Reject `AddWorkItem` after this many accepted items
    reject_after: Mutex<Option<usize>>,
}

impl RecordingHolder {
    pub fn reject_after(&self, accepted: usize) {
        *self.reject_after.lock() = Some(accepted);
    }

    pub fn requests(&self) -> Vec<HandoffRequest> {
        self.requests.lock().clone()
    }

    /// `(reference, options, play)` of every `AddWorkItem` received
    pub fn added(&self) -> Vec<(String, Vec<String>, bool)> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                HandoffRequest::AddWorkItem {
                    reference,
                    options,
                    play,
                } => Some((reference.clone(), options.clone(), *play)),
                HandoffRequest::Probe => None,
            })
            .collect()
    }
}

impl RequestHandler for RecordingHolder {
    fn handle(&self, request: HandoffRequest) -> HandoffReply {
        let is_add = matches!(request, HandoffRequest::AddWorkItem { .. });
        self.requests.lock().push(request);

        if is_add {
            if let Some(limit) = *self.reject_after.lock() {
                if self.added().len() > limit {
                    return HandoffReply::Error("queue full".into());
                }
            }
        }
        HandoffReply::Ack
    }
}
