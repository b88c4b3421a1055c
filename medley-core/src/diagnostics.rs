//! Diagnostics output
//!
//! Installs the process tracing subscriber once (registry + reloadable
//! `EnvFilter` + reloadable fmt layer) and gives each engine instance a
//! handle that maps its verbosity level and color flag onto them.
//!
//! `RUST_LOG`, when set, wins over instance verbosity.

use crate::error::{EngineError, Result};
use once_cell::sync::OnceCell;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{debug, warn};
use tracing_subscriber::{
    fmt, layer::Layered, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
    Registry,
};

/// Lowest accepted verbosity (errors only)
pub const MIN_VERBOSITY: i32 = -1;

/// Highest effective verbosity; larger requests are clamped
pub const MAX_VERBOSITY: i32 = 2;

/// Environment variable read once at instance creation
pub const VERBOSE_ENV: &str = "MEDLEY_VERBOSE";

type FilterHandle = reload::Handle<EnvFilter, Registry>;
type Filtered = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type FmtHandle = reload::Handle<fmt::Layer<Filtered>, Filtered>;

/// Reload handles of the subscriber installed by this crate
struct Reloads {
    filter: FilterHandle,
    fmt: FmtHandle,
}

static RELOADS: OnceCell<Option<Reloads>> = OnceCell::new();

/// Filter directive for a verbosity level
pub fn level_directive(verbosity: i32) -> &'static str {
    match verbosity.clamp(MIN_VERBOSITY, MAX_VERBOSITY) {
        -1 => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Parse the verbosity environment override
pub fn verbosity_from_env() -> Option<i32> {
    let raw = std::env::var(VERBOSE_ENV).ok()?;
    match raw.trim().parse::<i32>() {
        Ok(level) => Some(level),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", VERBOSE_ENV, raw);
            None
        }
    }
}

fn rust_log_set() -> bool {
    std::env::var_os(EnvFilter::DEFAULT_ENV).is_some()
}

/// Install the process subscriber if no subscriber is installed yet
///
/// Returns the reload handles when this process's subscriber is ours.
fn install_subscriber(verbosity: i32, color: bool) -> Option<&'static Reloads> {
    RELOADS
        .get_or_init(|| {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level_directive(verbosity)));
            let (filter, filter_handle) = reload::Layer::new(filter);
            let (output, fmt_handle) = reload::Layer::new(fmt::layer().with_ansi(color));

            let installed = tracing_subscriber::registry()
                .with(filter)
                .with(output)
                .try_init();

            // Embedders and test harnesses may already own the global subscriber
            installed.ok().map(|_| Reloads {
                filter: filter_handle,
                fmt: fmt_handle,
            })
        })
        .as_ref()
}

/// Per-instance diagnostics state
#[derive(Debug)]
pub struct DiagnosticsHandle {
    verbosity: AtomicI32,
    /// Whether the output device can show colors at all
    color_capable: bool,
    color: AtomicBool,
}

impl DiagnosticsHandle {
    /// Install diagnostics at the given verbosity
    ///
    /// `color` is the capability of the output device; colors start enabled
    /// when it is set.
    pub fn install(verbosity: i32, color: bool) -> Result<Self> {
        let verbosity = verbosity.clamp(MIN_VERBOSITY, MAX_VERBOSITY);
        let handle = Self {
            verbosity: AtomicI32::new(verbosity),
            color_capable: color,
            color: AtomicBool::new(color),
        };

        if install_subscriber(verbosity, color).is_some() {
            handle.apply(verbosity)?;
        }

        Ok(handle)
    }

    pub fn verbosity(&self) -> i32 {
        self.verbosity.load(Ordering::Acquire)
    }

    /// Whether diagnostics are currently colored
    pub fn color(&self) -> bool {
        self.color.load(Ordering::Acquire)
    }

    pub fn color_capable(&self) -> bool {
        self.color_capable
    }

    /// Turn colored output on or off
    ///
    /// Colors are never enabled on a device that cannot show them. Returns
    /// the color state in effect afterwards.
    pub fn set_color(&self, requested: bool) -> bool {
        let color = requested && self.color_capable;
        self.color.store(color, Ordering::Release);

        if let Some(Some(reloads)) = RELOADS.get() {
            if let Err(e) = reloads.fmt.reload(fmt::layer().with_ansi(color)) {
                warn!("Failed to update log output: {}", e);
            }
        }

        color
    }

    /// Change verbosity
    ///
    /// Values below -1 are ignored and values above 2 are clamped. Returns
    /// the verbosity in effect afterwards.
    pub fn set_verbosity(&self, requested: i64) -> i32 {
        if requested < i64::from(MIN_VERBOSITY) {
            debug!("Ignoring verbosity {}", requested);
            return self.verbosity();
        }

        let level = requested.min(i64::from(MAX_VERBOSITY)) as i32;
        self.verbosity.store(level, Ordering::Release);

        if let Err(e) = self.apply(level) {
            warn!("Failed to update log filter: {}", e);
        }

        level
    }

    fn apply(&self, level: i32) -> Result<()> {
        if rust_log_set() {
            return Ok(());
        }

        if let Some(Some(reloads)) = RELOADS.get() {
            reloads
                .filter
                .reload(EnvFilter::new(level_directive(level)))
                .map_err(|e| EngineError::Resource(format!("log filter: {}", e)))?;
        }

        Ok(())
    }

    /// Flush pending diagnostic output
    pub fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

/// Whether stderr is attached to a terminal
pub fn stderr_is_terminal() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: isatty only inspects the descriptor
        unsafe { libc::isatty(libc::STDERR_FILENO) == 1 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}
