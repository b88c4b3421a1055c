//! Interface workers
//!
//! **Responsibilities:**
//! - [`InterfaceSupervisor`] contract used by the lifecycle to start and stop
//!   interface modules
//! - [`TaskSupervisor`], the default implementation running each interface
//!   as a tokio task on a runtime it owns
//!
//! A blocking interface runs on the caller's thread until it is stopped or
//! the process receives Ctrl+C.

use crate::error::{EngineError, Result};
use crate::modules::ModuleDescriptor;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval between screensaver inhibition pings
const SCREENSAVER_PING: Duration = Duration::from_secs(30);

/// What to start
#[derive(Debug, Clone)]
pub struct InterfaceRequest {
    pub module: ModuleDescriptor,
    /// `key=value` options scoped to this interface
    pub options: Vec<String>,
    /// Run on the caller's thread until the interface exits
    pub blocking: bool,
}

impl InterfaceRequest {
    pub fn new(module: ModuleDescriptor) -> Self {
        Self {
            module,
            options: Vec::new(),
            blocking: false,
        }
    }

    pub fn with_option(mut self, option: &str) -> Self {
        self.options.push(option.to_string());
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Value of a `key=value` option
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.iter().find_map(|o| {
            o.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// A started interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub handles_play: bool,
}

/// Starts and stops the interfaces of one engine instance
pub trait InterfaceSupervisor: Send + Sync {
    /// Start an interface; blocking requests return once it has exited
    fn start(&self, request: InterfaceRequest) -> Result<InterfaceInfo>;

    /// Signal every interface to stop and wait for the workers
    fn stop_all(&self);

    /// Names of interfaces still running, in start order
    fn running(&self) -> Vec<String>;
}

struct Worker {
    name: String,
    stop: watch::Sender<bool>,
    /// `None` for a blocking interface running on a caller thread
    task: Option<JoinHandle<()>>,
}

impl Worker {
    fn is_running(&self) -> bool {
        match &self.task {
            Some(task) => !task.is_finished(),
            None => !*self.stop.borrow(),
        }
    }
}

/// Default [`InterfaceSupervisor`]
pub struct TaskSupervisor {
    runtime: Mutex<Option<Runtime>>,
    workers: Mutex<Vec<Worker>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            runtime: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn runtime_handle(&self) -> Result<tokio::runtime::Handle> {
        let mut runtime = self.runtime.lock();
        if let Some(rt) = runtime.as_ref() {
            return Ok(rt.handle().clone());
        }

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("medley-intf")
            .enable_all()
            .build()
            .map_err(|e| EngineError::Interface(format!("failed to build runtime: {}", e)))?;
        let handle = rt.handle().clone();
        *runtime = Some(rt);
        Ok(handle)
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_interface(request: InterfaceRequest, mut stop: watch::Receiver<bool>) {
    let name = request.module.name.as_str();
    info!("Interface {} started", name);

    match name {
        "screensaver" => {
            let mut ping = tokio::time::interval(SCREENSAVER_PING);
            loop {
                tokio::select! {
                    _ = ping.tick() => debug!("Screensaver inhibited"),
                    _ = stop.changed() => break,
                }
            }
        }
        "dummy" if request.blocking => {
            tokio::select! {
                _ = stop.changed() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => info!("Received Ctrl+C, stopping interface {}", name),
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                },
            }
        }
        _ => {
            if name == "logger" {
                match request.option("logmode") {
                    Some("syslog") => info!("Logging to syslog"),
                    _ => info!("Logging to file"),
                }
            }
            let _ = stop.changed().await;
        }
    }

    info!("Interface {} stopped", name);
}

impl InterfaceSupervisor for TaskSupervisor {
    fn start(&self, request: InterfaceRequest) -> Result<InterfaceInfo> {
        let handle = self.runtime_handle()?;
        let info = InterfaceInfo {
            name: request.module.name.clone(),
            handles_play: request.module.handles_play,
        };
        let (stop_tx, stop_rx) = watch::channel(false);

        if request.blocking {
            if tokio::runtime::Handle::try_current().is_ok() {
                return Err(EngineError::Interface(format!(
                    "blocking interface {} started from async context",
                    info.name
                )));
            }

            self.workers.lock().push(Worker {
                name: info.name.clone(),
                stop: stop_tx.clone(),
                task: None,
            });

            handle.block_on(run_interface(request, stop_rx));
            // Mark as stopped for `running()`
            let _ = stop_tx.send(true);
            return Ok(info);
        }

        let task = handle.spawn(run_interface(request, stop_rx));
        self.workers.lock().push(Worker {
            name: info.name.clone(),
            stop: stop_tx,
            task: Some(task),
        });
        Ok(info)
    }

    fn stop_all(&self) {
        let workers: Vec<Worker> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        for worker in &workers {
            debug!("Stopping interface {}", worker.name);
            let _ = worker.stop.send(true);
        }

        let runtime = self.runtime.lock();
        let in_async = tokio::runtime::Handle::try_current().is_ok();

        for worker in workers {
            let Some(task) = worker.task else { continue };
            match runtime.as_ref() {
                Some(rt) if !in_async => {
                    if let Err(e) = rt.block_on(task) {
                        warn!("Interface {} ended abnormally: {}", worker.name, e);
                    }
                }
                _ => task.abort(),
            }
        }
    }

    fn running(&self) -> Vec<String> {
        self.workers
            .lock()
            .iter()
            .filter(|w| w.is_running())
            .map(|w| w.name.clone())
            .collect()
    }
}

impl Drop for TaskSupervisor {
    fn drop(&mut self) {
        self.stop_all();
        if let Some(rt) = self.runtime.lock().take() {
            rt.shutdown_background();
        }
    }
}
