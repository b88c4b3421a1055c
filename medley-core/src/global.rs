//! Process-wide runtime state
//!
//! Reference-counted shared context for every engine instance in the
//! process. One-time setup runs on the 0→1 refcount transition, one-time
//! teardown on 1→0; both run under the state mutex.
//!
//! The capability mask is written during setup and read lock-free
//! afterwards.

use crate::cpu::CpuCapabilities;
use crate::modules::ModuleRegistry;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Platform setup/teardown invoked by [`GlobalRuntimeState`]
///
/// Hooks run while the state mutex is held and must not call back into the
/// state.
pub trait PlatformHooks: Send + Sync {
    /// Probe CPU capabilities during one-time setup
    fn probe_cpu(&self) -> CpuCapabilities {
        CpuCapabilities::detect()
    }

    /// Platform-specific shutdown during one-time teardown
    fn shutdown(&self) {}
}

/// Hooks for the host process
#[derive(Debug, Default)]
pub struct HostPlatform;

impl PlatformHooks for HostPlatform {
    fn shutdown(&self) {
        debug!("Platform shutdown complete");
    }
}

struct GlobalInner {
    refcount: usize,
    ready: bool,
    module_bank: Option<Arc<dyn ModuleRegistry>>,
    daemon: bool,
}

/// Shared state accessible by all engine instances in a process
pub struct GlobalRuntimeState {
    inner: Mutex<GlobalInner>,
    cpu: AtomicU32,
    hooks: Arc<dyn PlatformHooks>,
}

static PROCESS_STATE: Lazy<Arc<GlobalRuntimeState>> =
    Lazy::new(|| Arc::new(GlobalRuntimeState::new()));

impl GlobalRuntimeState {
    /// Create an independent state with host platform hooks
    pub fn new() -> Self {
        Self::with_hooks(Arc::new(HostPlatform))
    }

    /// Create an independent state with custom hooks
    pub fn with_hooks(hooks: Arc<dyn PlatformHooks>) -> Self {
        Self {
            inner: Mutex::new(GlobalInner {
                refcount: 0,
                ready: false,
                module_bank: None,
                daemon: false,
            }),
            cpu: AtomicU32::new(0),
            hooks,
        }
    }

    /// The state shared by every instance created through the default path
    pub fn process() -> Arc<Self> {
        Arc::clone(&PROCESS_STATE)
    }

    /// Take a reference; runs one-time setup on the first one
    ///
    /// Returns the refcount after the increment.
    pub fn acquire(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.refcount += 1;

        if inner.refcount == 1 {
            let caps = self.hooks.probe_cpu();
            self.cpu.store(caps.bits(), Ordering::Release);
            // The module bank is installed later by the first instance to load it
            inner.module_bank = None;
            inner.ready = true;
            debug!("Global runtime state ready, CPU: {}", caps.describe());
        }

        inner.refcount
    }

    /// Drop a reference; runs one-time teardown on the last one
    ///
    /// Releasing at refcount zero is a logged no-op. Returns the refcount
    /// after the decrement.
    pub fn release(&self) -> usize {
        let mut inner = self.inner.lock();

        if inner.refcount == 0 {
            warn!("Global runtime state released more often than acquired");
            return 0;
        }

        inner.refcount -= 1;

        if inner.refcount == 0 {
            self.hooks.shutdown();
            inner.module_bank = None;
            inner.ready = false;
            debug!("Global runtime state torn down");
        }

        inner.refcount
    }

    /// Acquire and wrap the reference in a guard that releases on drop
    pub fn lease(self: &Arc<Self>) -> GlobalLease {
        self.acquire();
        GlobalLease {
            state: Arc::clone(self),
        }
    }

    pub fn refcount(&self) -> usize {
        self.inner.lock().refcount
    }

    pub fn is_ready(&self) -> bool {
        self.inner.lock().ready
    }

    /// Capabilities probed at setup
    pub fn cpu_capabilities(&self) -> CpuCapabilities {
        CpuCapabilities::from_bits_truncate(self.cpu.load(Ordering::Acquire))
    }

    pub fn is_daemon(&self) -> bool {
        self.inner.lock().daemon
    }

    /// Record that the process detached from its controlling terminal
    pub fn set_daemon(&self) {
        self.inner.lock().daemon = true;
    }

    /// Module bank shared by the instances of this process, if loaded
    pub fn module_bank(&self) -> Option<Arc<dyn ModuleRegistry>> {
        self.inner.lock().module_bank.clone()
    }

    /// Install `bank` unless one is already installed; returns the bank in use
    pub fn attach_module_bank(&self, bank: Arc<dyn ModuleRegistry>) -> Arc<dyn ModuleRegistry> {
        let mut inner = self.inner.lock();
        Arc::clone(inner.module_bank.get_or_insert(bank))
    }
}

impl Default for GlobalRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

/// One counted reference on a [`GlobalRuntimeState`]
///
/// Dropping the lease releases the reference exactly once.
pub struct GlobalLease {
    state: Arc<GlobalRuntimeState>,
}

impl GlobalLease {
    pub fn state(&self) -> &Arc<GlobalRuntimeState> {
        &self.state
    }
}

impl Drop for GlobalLease {
    fn drop(&mut self) {
        self.state.release();
    }
}
