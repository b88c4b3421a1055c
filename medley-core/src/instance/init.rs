//! Staged instance initialization
//!
//! Stages run in order; each resource is registered with a [`Rollback`] as
//! it is acquired, so a failure at any stage releases everything the earlier
//! stages of this call acquired. Resources move into the instance only once
//! every stage succeeded.
//!
//! 1. Lenient command line; `help` / `version` exit here
//! 2. Home, user and configuration paths
//! 3. Plugin cache reset and extra plugin directory
//! 4. Daemon mode
//! 5. Module bank; `module` / `longhelp` / `list`, `reset-config`,
//!    `save-config`
//! 6. Configuration file, then the command line again, strictly
//! 7. Single-instance coordination (may hand work over and exit)
//! 8. CPU capability masks and diagnostics options
//! 9. Copy strategy
//! 10. Stats timers, hotkeys, playlist and service discovery
//! 11. Interfaces
//! 12. Command-line targets

use super::{start_interface, EngineInstance, InterfaceLaunch, LifecycleState};
use crate::coordinator::{self, Coordination};
use crate::cpu::CpuCapabilities;
use crate::daemon::write_pid_file;
use crate::error::{EngineError, ExitStatus, Result};
use crate::hotkeys;
use crate::interfaces::InterfaceSupervisor;
use crate::modules::ModuleRegistry;
use crate::playlist::{Playlist, PlaylistContext};
use crate::report::InfoRequest;
use crate::rollback::Rollback;
use crate::stats::StatsTimers;
use crate::strategy::CopyStrategy;
use crate::targets::{parse_targets, PendingTargets};
use medley_common::config::options::CPU_TOGGLES;
use medley_common::config::{ConfigGate, ParseMode};
use medley_common::paths::expand_user_prefix;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Successful result of [`EngineInstance::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The instance is live
    Success,
    /// An informational request was served; nothing is left running
    CleanExitSuccess,
}

impl InitOutcome {
    pub fn exit_status(self) -> ExitStatus {
        match self {
            InitOutcome::Success => ExitStatus::Success,
            InitOutcome::CleanExitSuccess => ExitStatus::CleanExitSuccess,
        }
    }
}

/// Split a colon separated module list, dropping empty entries
fn split_list(raw: &str) -> Vec<String> {
    raw.split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn print_report(text: &str) {
    println!("{}", text.trim_end());
}

fn module_load(e: EngineError) -> EngineError {
    match e {
        EngineError::ModuleLoad(_) => e,
        other => EngineError::ModuleLoad(other.to_string()),
    }
}

fn playlist_init(e: EngineError) -> EngineError {
    match e {
        EngineError::PlaylistInit(_) => e,
        other => EngineError::PlaylistInit(other.to_string()),
    }
}

/// Re-read the command line after the option table or values changed
fn reapply_command_line(gate: &dyn ConfigGate, argv: &[OsString]) {
    if let Err(e) = gate.load_command_line(argv, ParseMode::Lenient) {
        warn!("Cannot re-apply command line: {}", e);
    }
}

fn save_config(gate: &dyn ConfigGate, path: &Path) {
    match gate.save(path) {
        Ok(()) => info!("Saved configuration to {}", path.display()),
        Err(e) => error!("Cannot save configuration to {}: {}", path.display(), e),
    }
}

/// Start a non-blocking interface; failures are logged only
fn start_logged(
    bank: &dyn ModuleRegistry,
    supervisor: &dyn InterfaceSupervisor,
    playlist: &Arc<dyn Playlist>,
    name: &str,
    options: &[&str],
) {
    let launch = InterfaceLaunch {
        name: Some(name),
        blocking: false,
        play: false,
        options: options.iter().map(|o| o.to_string()).collect(),
    };

    match start_interface(bank, supervisor, Some(playlist), launch) {
        Ok(()) => debug!("Started interface {}", name),
        Err(e) => warn!("Interface {} not started: {}", name, e),
    }
}

impl EngineInstance {
    /// Initialize the instance from a command line (program name first)
    ///
    /// On error every resource acquired by this call has been released and
    /// the instance is still `Created`; the caller is expected to destroy
    /// it. When another instance takes over the work this call does not
    /// return: the process exits through the configured [`ProcessExit`].
    ///
    /// [`ProcessExit`]: super::ProcessExit
    pub fn init(&mut self, argv: &[OsString]) -> Result<InitOutcome> {
        if self.state != LifecycleState::Created {
            return Err(EngineError::InvalidState(format!(
                "init called in state {:?}",
                self.state
            )));
        }

        let mut rollback = Rollback::new();
        match self.run_stages(argv, &mut rollback) {
            Ok(InitOutcome::Success) => {
                rollback.commit();
                info!("Engine instance {} ({}) is live", self.name, self.id);
                Ok(InitOutcome::Success)
            }
            Ok(InitOutcome::CleanExitSuccess) => {
                drop(rollback);
                Ok(InitOutcome::CleanExitSuccess)
            }
            Err(e) => {
                error!("Initialization failed: {}", e);
                drop(rollback);
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, argv: &[OsString], rollback: &mut Rollback) -> Result<InitOutcome> {
        let gate = Arc::clone(&self.collab.config);
        let gate = gate.as_ref();

        // Stage 1
        self.name = super::identity_from(argv.first().map(Path::new));
        gate.load_command_line(argv, ParseMode::Lenient)?;

        if let Some(request) = InfoRequest::early(gate) {
            print_report(&request.render(gate, &[]));
            return Ok(InitOutcome::CleanExitSuccess);
        }

        // Stage 2
        let paths = self.collab.paths.resolve(gate.get_str("config").as_deref());

        // Stage 3
        let bank = self
            .global
            .module_bank()
            .unwrap_or_else(|| Arc::clone(&self.collab.modules));
        if gate.get_bool("reset-plugins-cache") {
            bank.request_cache_reset();
        }
        if let Some(dir) = gate.get_str("plugin-path") {
            bank.add_search_path(&expand_user_prefix(&dir, &paths.user_dir));
        }

        // Stage 4
        if gate.get_bool("daemon") {
            self.collab.detacher.detach().map_err(|e| {
                error!("Unable to run as a daemon: {}", e);
                match e {
                    EngineError::Daemonize(_) => e,
                    other => EngineError::Daemonize(other.to_string()),
                }
            })?;
            self.global.set_daemon();

            if let Some(pidfile) = gate.get_str("pidfile") {
                write_pid_file(&expand_user_prefix(&pidfile, &paths.user_dir));
            }
        }

        // Stage 5
        let bank = self.global.attach_module_bank(bank);
        bank.init_bank().map_err(module_load)?;
        let held_bank = rollback.hold("module bank", Arc::clone(&bank), |b| b.end_bank());

        bank.load_builtins().map_err(module_load)?;
        bank.load_plugins().map_err(module_load)?;

        let modules = bank.modules();
        debug!("Module bank initialized, found {} module(s)", modules.len());
        gate.register_options(modules.iter().flat_map(|m| m.options.clone()).collect());

        let info_request = InfoRequest::with_bank(gate);
        if let Some(request) = &info_request {
            print_report(&request.render(gate, &modules));
        }

        if gate.get_bool("reset-config") {
            gate.reset_all();
            reapply_command_line(gate, argv);
            save_config(gate, &paths.config_file);
        }
        if gate.get_bool("save-config") {
            if let Err(e) = gate.load_config_file(&paths.config_file) {
                warn!("{}", e);
            }
            reapply_command_line(gate, argv);
            save_config(gate, &paths.config_file);
        }

        if info_request.is_some() {
            return Ok(InitOutcome::CleanExitSuccess);
        }

        // Stage 6
        if let Err(e) = gate.load_config_file(&paths.config_file) {
            warn!("Ignoring configuration file: {}", e);
        }
        let cmdline = gate.load_command_line(argv, ParseMode::Strict).map_err(|e| {
            error!("The command line options could not be loaded, check that they are valid");
            EngineError::from(e)
        })?;
        let pending = parse_targets(&cmdline.targets, gate.get_str("open").as_deref());

        // Stage 7
        let coordination = coordinator::coordinate(
            &self.collab.bus,
            &self.collab.channel_name,
            gate.get_bool("one-instance"),
        );
        debug!("Single-instance coordination: {}", coordination.label());

        let held_claim = match coordination {
            Coordination::Primary(claim) => {
                Some(rollback.hold("IPC claim", claim, |mut c| c.release()))
            }
            Coordination::Independent | Coordination::NoPeerControl => None,
            Coordination::Handoff => self.hand_off_and_exit(gate, &pending, rollback),
        };

        // Stage 8
        let mut cpu = self.global.cpu_capabilities();
        for toggle in CPU_TOGGLES {
            let disabled = gate.get(toggle).and_then(|v| v.as_bool()) == Some(false);
            if let Some(cap) = CpuCapabilities::from_toggle(toggle).filter(|_| disabled) {
                cpu.remove(cap);
            }
        }
        debug!("CPU capabilities: {}", cpu.describe());

        let verbosity = if gate.get_bool("quiet") {
            -1
        } else {
            match gate.get_int("verbose") {
                v if v > 0 => v,
                _ => self.env_verbosity.map(i64::from).unwrap_or(0),
            }
        };
        self.diagnostics.set_verbosity(verbosity);
        let color = self
            .diagnostics
            .set_color(gate.get("color").and_then(|v| v.as_bool()) != Some(false));
        debug!("Colored diagnostics: {}", color);

        // Stage 9
        let strategy = CopyStrategy::resolve(bank.as_ref(), gate.get_str("memcpy").as_deref(), cpu);
        if let Some(handle) = strategy.handle().cloned() {
            let bank = Arc::clone(&bank);
            rollback.push("copy strategy", move || bank.unneed(&handle));
        }

        // Stage 10
        let stats = StatsTimers::new(gate.get_bool("stats"));
        let hotkeys = hotkeys::snapshot(gate);

        let ctx = PlaylistContext {
            instance_id: self.id,
            instance_name: self.name.clone(),
        };
        let playlist = stats
            .time("playlist creation", || self.collab.playlists.create(&ctx))
            .map_err(|e| {
                error!("Playlist initialization failed: {}", e);
                playlist_init(e)
            })?;
        let held_playlist = rollback.hold("playlist", Arc::clone(&playlist), |p| p.destroy());

        if let Some(raw) = gate.get_str("services-discovery") {
            if let Err(e) = playlist.add_service_discovery(&split_list(&raw)) {
                warn!("Service discovery not started: {}", e);
            }
        }

        if let Some(claim) = &held_claim {
            claim.with(|c| c.endpoint().attach_playlist(Arc::clone(&playlist)));
        }

        // Stage 11
        let supervisor = Arc::clone(&self.collab.interfaces);
        let stopper = Arc::clone(&supervisor);
        rollback.push("interfaces", move || stopper.stop_all());

        let mut extra = split_list(&gate.get_str("extraintf").unwrap_or_default());
        for name in split_list(&gate.get_str("control").unwrap_or_default()) {
            if !extra.contains(&name) {
                extra.push(name);
            }
        }

        let start = |name: &str, options: &[&str]| {
            start_logged(bank.as_ref(), supervisor.as_ref(), &playlist, name, options)
        };

        for name in &extra {
            start(name, &[]);
        }
        start("hotkeys", &[]);
        if gate.get_bool("disable-screensaver") {
            start("screensaver", &[]);
        }
        if gate.get_bool("file-logging") {
            start("logger", &[]);
        }
        if gate.get_bool("syslog") {
            start("logger", &["logmode=syslog"]);
        }
        if gate.get_bool("show-intf") {
            start("showintf", &[]);
        }
        if gate.get_bool("network-synchronisation") {
            start("netsync", &[]);
        }

        // Stage 12
        for item in pending.submission_order() {
            if let Err(e) = playlist.add_target(item) {
                warn!("Cannot add {}: {}", item.reference, e);
            }
        }

        // Every stage succeeded; the instance takes ownership
        self.paths = Some(paths);
        self.cpu = cpu;
        self.hotkeys = hotkeys;
        self.strategy = Some(strategy);
        self.stats = Some(stats);
        self.bank = held_bank.take();
        self.playlist = held_playlist.take();
        self.claim = held_claim.and_then(|c| c.take());
        self.state = LifecycleState::Live;

        Ok(InitOutcome::Success)
    }

    /// Send pending work to the running instance, release everything and
    /// terminate the process
    fn hand_off_and_exit(
        &mut self,
        gate: &dyn ConfigGate,
        pending: &PendingTargets,
        rollback: &mut Rollback,
    ) -> ! {
        let play = !gate.get_bool("playlist-enqueue");
        let report = coordinator::hand_off(
            &self.collab.bus,
            &self.collab.channel_name,
            pending.handoff_order(),
            play,
        );

        let status = match &report.failure {
            None => {
                info!("Handed {} item(s) to the running instance", report.sent);
                ExitStatus::Success
            }
            Some(e) => {
                warn!(
                    "Handoff stopped after {} of {} item(s): {}",
                    report.sent,
                    pending.len(),
                    e
                );
                ExitStatus::Handoff
            }
        };

        rollback.unwind();
        self.destroy();
        self.diagnostics.flush();

        let exit = Arc::clone(&self.collab.exit);
        exit.exit(status)
    }
}
