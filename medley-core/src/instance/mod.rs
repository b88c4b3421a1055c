//! Engine instance lifecycle
//!
//! **Responsibilities:**
//! - Create: take a reference on the global runtime state, set up identity
//!   and diagnostics
//! - Init: staged startup with rollback of every stage on failure (see
//!   `init.rs`)
//! - Cleanup and Destroy: ordered, idempotent release of everything the
//!   instance owns (see `teardown.rs`)
//!
//! **Lifecycle:** `Created → Live → CleanedUp → Destroyed`. A failed Init
//! leaves the instance in `Created`; Destroy is valid from every state.

mod init;
mod teardown;

use crate::coordinator::IpcClaim;
use crate::cpu::CpuCapabilities;
use crate::daemon::{Detacher, SystemDetacher};
use crate::diagnostics::{self, DiagnosticsHandle};
use crate::error::{EngineError, ExitStatus, Result};
use crate::global::{GlobalLease, GlobalRuntimeState};
use crate::hotkeys::{self, Hotkey};
use crate::interfaces::{InterfaceRequest, InterfaceSupervisor, TaskSupervisor};
use crate::ipc::{LocalSessionBus, SessionBus, CHANNEL_NAME};
use crate::modules::{ModuleBank, ModuleDescriptor, ModuleRegistry, CAP_INTERFACE};
use crate::outputs::{AnnounceHandler, OutputSink};
use crate::playlist::{Playlist, PlaylistService, QueuePlaylistService};
use crate::stats::StatsTimers;
use crate::strategy::CopyStrategy;
use medley_common::config::ConfigGate;
use medley_common::{ConfigStore, InstancePaths, PathResolver};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

pub use init::InitOutcome;

/// Identity used when argv[0] is missing or unusable
pub const DEFAULT_NAME: &str = "medley";

/// Process termination
pub trait ProcessExit: Send + Sync {
    /// Terminate the process with `status`; never returns
    fn exit(&self, status: ExitStatus) -> !;
}

/// Exits the real process
#[derive(Debug, Default)]
pub struct SystemExit;

impl ProcessExit for SystemExit {
    fn exit(&self, status: ExitStatus) -> ! {
        std::process::exit(status.code())
    }
}

/// External services an instance depends on
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigGate>,
    pub paths: PathResolver,
    pub modules: Arc<dyn ModuleRegistry>,
    pub playlists: Arc<dyn PlaylistService>,
    pub interfaces: Arc<dyn InterfaceSupervisor>,
    pub bus: Arc<dyn SessionBus>,
    pub detacher: Arc<dyn Detacher>,
    pub exit: Arc<dyn ProcessExit>,
    /// Well-known name claimed by the primary instance
    pub channel_name: String,
}

impl Collaborators {
    /// Default in-process collaborators
    pub fn new() -> Self {
        Self {
            config: Arc::new(ConfigStore::new(DEFAULT_NAME, env!("CARGO_PKG_VERSION"))),
            paths: PathResolver::new(),
            modules: Arc::new(ModuleBank::new()),
            playlists: Arc::new(QueuePlaylistService),
            interfaces: Arc::new(TaskSupervisor::new()),
            bus: LocalSessionBus::process(),
            detacher: Arc::new(SystemDetacher),
            exit: Arc::new(SystemExit),
            channel_name: CHANNEL_NAME.to_string(),
        }
    }

    pub fn with_config(mut self, config: Arc<dyn ConfigGate>) -> Self {
        self.config = config;
        self
    }

    pub fn with_paths(mut self, paths: PathResolver) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_modules(mut self, modules: Arc<dyn ModuleRegistry>) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_playlists(mut self, playlists: Arc<dyn PlaylistService>) -> Self {
        self.playlists = playlists;
        self
    }

    pub fn with_interfaces(mut self, interfaces: Arc<dyn InterfaceSupervisor>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn with_bus(mut self, bus: Arc<dyn SessionBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_detacher(mut self, detacher: Arc<dyn Detacher>) -> Self {
        self.detacher = detacher;
        self
    }

    pub fn with_exit(mut self, exit: Arc<dyn ProcessExit>) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_channel_name(mut self, name: &str) -> Self {
        self.channel_name = name.to_string();
        self
    }

    /// Check the set is usable before an instance takes ownership of it
    pub fn validate(&self) -> Result<()> {
        if self.channel_name.trim().is_empty() {
            return Err(EngineError::Resource("empty IPC channel name".into()));
        }
        Ok(())
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Live,
    CleanedUp,
    Destroyed,
}

/// One embeddable engine instance
pub struct EngineInstance {
    id: Uuid,
    name: String,
    global: Arc<GlobalRuntimeState>,
    lease: Option<GlobalLease>,
    collab: Collaborators,
    diagnostics: DiagnosticsHandle,
    /// Verbosity from the environment, read once at create
    env_verbosity: Option<i32>,
    state: LifecycleState,

    paths: Option<InstancePaths>,
    cpu: CpuCapabilities,
    hotkeys: Vec<Hotkey>,
    bank: Option<Arc<dyn ModuleRegistry>>,
    strategy: Option<CopyStrategy>,
    stats: Option<StatsTimers>,
    playlist: Option<Arc<dyn Playlist>>,
    claim: Option<IpcClaim>,
    outputs: Vec<Box<dyn OutputSink>>,
    announcers: Vec<Box<dyn AnnounceHandler>>,
}

/// Instance identity from argv[0]
pub fn identity_from(argv0: Option<&Path>) -> String {
    argv0
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_NAME.to_string())
}

impl EngineInstance {
    /// Create an instance on the process-wide runtime state
    pub fn create_default(collab: Collaborators) -> Result<Self> {
        Self::create(GlobalRuntimeState::process(), collab)
    }

    /// Create an instance
    ///
    /// Takes a reference on `global`; it is given back by [`destroy`]
    /// or immediately if creation fails.
    ///
    /// [`destroy`]: EngineInstance::destroy
    pub fn create(global: Arc<GlobalRuntimeState>, collab: Collaborators) -> Result<Self> {
        let lease = global.lease();

        if let Err(e) = collab.validate() {
            error!("Cannot create engine instance: {}", e);
            // Dropping the lease releases the global state
            drop(lease);
            return Err(e);
        }

        let env_verbosity = diagnostics::verbosity_from_env();
        let terminal = diagnostics::stderr_is_terminal();

        let diagnostics = match DiagnosticsHandle::install(env_verbosity.unwrap_or(0), terminal) {
            Ok(d) => d,
            Err(e) => {
                error!("Cannot install diagnostics: {}", e);
                drop(lease);
                return Err(e);
            }
        };

        collab.config.register_options(hotkeys::options());

        let id = Uuid::new_v4();
        debug!("Created engine instance {}", id);

        Ok(Self {
            id,
            name: DEFAULT_NAME.to_string(),
            cpu: global.cpu_capabilities(),
            global,
            lease: Some(lease),
            collab,
            diagnostics,
            env_verbosity,
            state: LifecycleState::Created,
            paths: None,
            hotkeys: Vec::new(),
            bank: None,
            strategy: None,
            stats: None,
            playlist: None,
            claim: None,
            outputs: Vec::new(),
            announcers: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Identity derived from argv[0]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == LifecycleState::Live
    }

    pub fn global(&self) -> &Arc<GlobalRuntimeState> {
        &self.global
    }

    pub fn config(&self) -> &Arc<dyn ConfigGate> {
        &self.collab.config
    }

    pub fn paths(&self) -> Option<&InstancePaths> {
        self.paths.as_ref()
    }

    /// CPU capabilities after the user's toggles
    pub fn cpu_capabilities(&self) -> CpuCapabilities {
        self.cpu
    }

    pub fn copy_strategy(&self) -> Option<&CopyStrategy> {
        self.strategy.as_ref()
    }

    pub fn hotkeys(&self) -> &[Hotkey] {
        &self.hotkeys
    }

    pub fn playlist(&self) -> Option<&Arc<dyn Playlist>> {
        self.playlist.as_ref()
    }

    pub fn stats(&self) -> Option<&StatsTimers> {
        self.stats.as_ref()
    }

    /// Whether this instance owns the IPC channel name
    pub fn is_primary(&self) -> bool {
        self.claim.is_some()
    }

    /// Whether diagnostics are colored
    pub fn color(&self) -> bool {
        self.diagnostics.color()
    }

    pub fn diagnostics(&self) -> &DiagnosticsHandle {
        &self.diagnostics
    }

    /// Change verbosity at runtime; see [`DiagnosticsHandle::set_verbosity`]
    pub fn set_verbosity(&self, level: i64) -> i32 {
        self.diagnostics.set_verbosity(level)
    }

    /// Hand a video or audio output to the instance
    pub fn attach_output(&mut self, sink: Box<dyn OutputSink>) {
        debug!("Attached {:?} output {}", sink.kind(), sink.name());
        self.outputs.push(sink);
    }

    pub fn attach_announcer(&mut self, handler: Box<dyn AnnounceHandler>) {
        debug!("Attached announce handler {}", handler.name());
        self.announcers.push(handler);
    }

    /// Start an interface module
    ///
    /// `name` defaults to the `intf` option, then to the best-scored
    /// interface. A daemon starting a blocking interface without a name
    /// prefers `dummy` unless `intf` is set. With `play`, playback starts
    /// first unless the interface does that itself.
    pub fn add_interface(
        &self,
        name: Option<&str>,
        blocking: bool,
        play: bool,
        options: &[String],
    ) -> Result<()> {
        if !self.is_live() {
            return Err(EngineError::InvalidState(format!(
                "cannot add an interface in state {:?}",
                self.state
            )));
        }

        let bank = self
            .bank
            .as_deref()
            .ok_or_else(|| EngineError::InvalidState("module bank not loaded".into()))?;

        let configured = self.collab.config.get_str("intf");
        let name = match name {
            Some(name) => Some(name.to_string()),
            None if self.global.is_daemon() && blocking && configured.is_none() => {
                Some("dummy".to_string())
            }
            None => configured,
        };

        let launch = InterfaceLaunch {
            name: name.as_deref(),
            blocking,
            play,
            options: options.to_vec(),
        };
        start_interface(
            bank,
            self.collab.interfaces.as_ref(),
            self.playlist.as_ref(),
            launch,
        )
    }
}

/// Parameters of one interface start
pub(crate) struct InterfaceLaunch<'a> {
    pub name: Option<&'a str>,
    pub blocking: bool,
    pub play: bool,
    pub options: Vec<String>,
}

fn resolve_interface(bank: &dyn ModuleRegistry, name: Option<&str>) -> Result<ModuleDescriptor> {
    let found = match name {
        Some(name) => bank.find(name).filter(|m| m.capability == CAP_INTERFACE),
        None => bank
            .modules()
            .into_iter()
            .filter(|m| m.capability == CAP_INTERFACE && m.score > 0)
            .max_by_key(|m| m.score),
    };

    found.ok_or_else(|| {
        EngineError::Interface(format!(
            "no interface module named '{}'",
            name.unwrap_or("<default>")
        ))
    })
}

pub(crate) fn start_interface(
    bank: &dyn ModuleRegistry,
    supervisor: &dyn InterfaceSupervisor,
    playlist: Option<&Arc<dyn Playlist>>,
    launch: InterfaceLaunch<'_>,
) -> Result<()> {
    let module = resolve_interface(bank, launch.name).map_err(|e| {
        error!("Interface initialization failed: {}", e);
        e
    })?;

    // The interface does not start playback itself
    if launch.play && !module.handles_play {
        if let Some(playlist) = playlist {
            playlist.play()?;
        }
    }

    let mut request = InterfaceRequest::new(module).blocking(launch.blocking);
    request.options = launch.options;
    let info = supervisor.start(request)?;
    debug!("Interface {} done", info.name);
    Ok(())
}

impl Drop for EngineInstance {
    fn drop(&mut self) {
        self.destroy();
    }
}
