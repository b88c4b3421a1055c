//! Module bank
//!
//! **Responsibilities:**
//! - Catalogue of built-in modules and plugin modules declared by TOML
//!   manifests under the plugin directories
//! - JSON plugin cache keyed by manifest path and modification time
//! - Capability lookup (`need`) constrained by CPU capabilities, with usage
//!   counts released by `unneed`
//!
//! The bank is shared by every instance of a process: `init_bank` and
//! `end_bank` bracket each instance's use, and the catalogue is dropped when
//! the last user ends.

use crate::cpu::CpuCapabilities;
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use medley_common::config::{ConfigValue, OptionSpec};
use medley_common::paths::{default_plugin_cache, default_plugin_dirs};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Capability implemented by interface modules
pub const CAP_INTERFACE: &str = "interface";

/// Capability implemented by memory copy strategies
pub const CAP_MEMCPY: &str = "memcpy";

/// Capability implemented by service discovery modules
pub const CAP_SERVICES_DISCOVERY: &str = "services_discovery";

/// Plugin cache format version
const CACHE_VERSION: u32 = 1;

/// A module known to the bank
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub longname: String,
    pub capability: String,
    /// Preference among modules of one capability; 0 means "by name only"
    pub score: i32,
    /// CPU capabilities the module needs
    pub requires: CpuCapabilities,
    /// Interface modules that start playback themselves
    pub handles_play: bool,
    /// Options the module adds to the configuration gate
    pub options: Vec<OptionSpec>,
    pub builtin: bool,
}

impl ModuleDescriptor {
    fn builtin(name: &str, longname: &str, capability: &str, score: i32) -> Self {
        Self {
            name: name.to_string(),
            longname: longname.to_string(),
            capability: capability.to_string(),
            score,
            requires: CpuCapabilities::empty(),
            handles_play: false,
            options: Vec::new(),
            builtin: true,
        }
    }

    fn requiring(mut self, caps: CpuCapabilities) -> Self {
        self.requires = caps;
        self
    }

    fn with_option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec.in_module(&self.name));
        self
    }

    /// Whether the module can run with the given CPU capabilities
    pub fn runs_on(&self, cpu: CpuCapabilities) -> bool {
        cpu.contains(self.requires)
    }
}

/// A module held by an instance after a successful `need`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyHandle {
    pub module: String,
    pub capability: String,
}

/// Module discovery and loading
pub trait ModuleRegistry: Send + Sync {
    /// Register one more user of the bank
    fn init_bank(&self) -> Result<()>;

    /// Load the built-in module table (idempotent)
    fn load_builtins(&self) -> Result<()>;

    /// Discover plugin modules (idempotent)
    fn load_plugins(&self) -> Result<()>;

    /// Drop one user; the catalogue is unloaded with the last one
    fn end_bank(&self);

    /// Pick the best module implementing `capability`
    ///
    /// `constraint` restricts the choice to one module name.
    fn need(
        &self,
        capability: &str,
        constraint: Option<&str>,
        cpu: CpuCapabilities,
    ) -> Option<StrategyHandle>;

    /// Release a module obtained from [`ModuleRegistry::need`]
    fn unneed(&self, handle: &StrategyHandle);

    /// Ignore and rebuild the plugin cache on the next load
    fn request_cache_reset(&self);

    /// Scan `dir` too on the next plugin load
    fn add_search_path(&self, dir: &Path);

    /// Snapshot of the catalogue
    fn modules(&self) -> Vec<ModuleDescriptor>;

    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules().into_iter().find(|m| m.name == name)
    }
}

/// Option declared in a plugin manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionManifest {
    pub name: String,
    #[serde(default = "default_option_kind")]
    pub kind: ManifestOptionKind,
    #[serde(default)]
    pub default: Option<ConfigValue>,
    #[serde(default)]
    pub help: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestOptionKind {
    Bool,
    Int,
    String,
}

fn default_option_kind() -> ManifestOptionKind {
    ManifestOptionKind::String
}

/// Plugin manifest (`<plugin dir>/*.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: String,
    #[serde(default)]
    pub longname: String,
    pub capability: String,
    #[serde(default)]
    pub score: i32,
    /// CPU capability toggles (`sse2`, `mmx`, ...)
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub handles_play: bool,
    #[serde(default, rename = "option")]
    pub options: Vec<OptionManifest>,
}

impl ModuleManifest {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::ModuleLoad(e.to_string()))
    }

    fn descriptor(&self) -> ModuleDescriptor {
        let mut requires = CpuCapabilities::empty();
        for toggle in &self.requires {
            match CpuCapabilities::from_toggle(toggle) {
                Some(cap) => requires |= cap,
                None => warn!("Module {}: unknown CPU requirement '{}'", self.name, toggle),
            }
        }

        let options = self
            .options
            .iter()
            .map(|o| {
                let spec = match o.kind {
                    ManifestOptionKind::Bool => OptionSpec::flag(&o.name, false, &o.help),
                    ManifestOptionKind::Int => OptionSpec::int(&o.name, 0, &o.help),
                    ManifestOptionKind::String => OptionSpec::string(&o.name, "", &o.help),
                };
                let spec = match &o.default {
                    Some(default) => OptionSpec {
                        default: default.clone(),
                        ..spec
                    },
                    None => spec,
                };
                spec.in_module(&self.name)
            })
            .collect();

        ModuleDescriptor {
            name: self.name.clone(),
            longname: if self.longname.is_empty() {
                self.name.clone()
            } else {
                self.longname.clone()
            },
            capability: self.capability.clone(),
            score: self.score,
            requires,
            handles_play: self.handles_play,
            options,
            builtin: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    path: PathBuf,
    modified: DateTime<Utc>,
    manifest: ModuleManifest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PluginCache {
    version: u32,
    generated_at: DateTime<Utc>,
    entries: Vec<CacheEntry>,
}

fn builtin_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::builtin("dummy", "Dummy interface", CAP_INTERFACE, 1),
        ModuleDescriptor::builtin("hotkeys", "Hotkeys management interface", CAP_INTERFACE, 0),
        ModuleDescriptor::builtin(
            "screensaver",
            "Screensaver inhibition interface",
            CAP_INTERFACE,
            0,
        ),
        ModuleDescriptor::builtin("logger", "File logging interface", CAP_INTERFACE, 0)
            .with_option(OptionSpec::string("logmode", "text", "Log format (text, syslog)"))
            .with_option(OptionSpec::string("logfile", "", "Log file name")),
        ModuleDescriptor::builtin("showintf", "Interface showing control interface", CAP_INTERFACE, 0),
        ModuleDescriptor::builtin("netsync", "Network synchronisation", CAP_INTERFACE, 0)
            .with_option(OptionSpec::flag("netsync-master", false, "Act as master"))
            .with_option(OptionSpec::string("netsync-master-ip", "", "Master client IP address")),
        ModuleDescriptor::builtin("memcpysse2", "SSE2 memcpy", CAP_MEMCPY, 100)
            .requiring(CpuCapabilities::SSE2),
        ModuleDescriptor::builtin("memcpymmx", "MMX memcpy", CAP_MEMCPY, 50)
            .requiring(CpuCapabilities::MMX),
        ModuleDescriptor::builtin("sap", "SAP announcements", CAP_SERVICES_DISCOVERY, 0),
    ]
}

#[derive(Debug, Default)]
struct BankInner {
    users: usize,
    modules: Vec<ModuleDescriptor>,
    builtins_loaded: bool,
    plugins_loaded: bool,
    reset_cache: bool,
    in_use: HashMap<String, usize>,
}

/// Default [`ModuleRegistry`]
#[derive(Debug)]
pub struct ModuleBank {
    plugin_dirs: Mutex<Vec<PathBuf>>,
    cache_path: Option<PathBuf>,
    inner: Mutex<BankInner>,
}

impl ModuleBank {
    /// Bank scanning the default plugin directories
    pub fn new() -> Self {
        Self::with_paths(default_plugin_dirs(), default_plugin_cache())
    }

    /// Bank scanning explicit directories with an optional cache file
    pub fn with_paths(plugin_dirs: Vec<PathBuf>, cache_path: Option<PathBuf>) -> Self {
        Self {
            plugin_dirs: Mutex::new(plugin_dirs),
            cache_path,
            inner: Mutex::new(BankInner::default()),
        }
    }

    /// Current usage count of a module obtained through `need`
    pub fn usage(&self, module: &str) -> usize {
        self.inner.lock().in_use.get(module).copied().unwrap_or(0)
    }

    fn read_cache(&self) -> HashMap<PathBuf, CacheEntry> {
        let Some(path) = &self.cache_path else {
            return HashMap::new();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                debug!("No plugin cache at {}", path.display());
                return HashMap::new();
            }
        };

        match serde_json::from_str::<PluginCache>(&content) {
            Ok(cache) if cache.version == CACHE_VERSION => cache
                .entries
                .into_iter()
                .map(|entry| (entry.path.clone(), entry))
                .collect(),
            Ok(cache) => {
                info!(
                    "Discarding plugin cache version {} (expected {})",
                    cache.version, CACHE_VERSION
                );
                HashMap::new()
            }
            Err(e) => {
                warn!("Discarding unreadable plugin cache {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    }

    fn write_cache(&self, entries: Vec<CacheEntry>) {
        let Some(path) = &self.cache_path else {
            return;
        };

        let cache = PluginCache {
            version: CACHE_VERSION,
            generated_at: Utc::now(),
            entries,
        };

        let result = serde_json::to_string_pretty(&cache)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                std::fs::write(path, json).map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => debug!("Wrote plugin cache {}", path.display()),
            Err(e) => warn!("Failed to write plugin cache {}: {}", path.display(), e),
        }
    }

    fn scan_dir(
        dir: &Path,
        cached: &HashMap<PathBuf, CacheEntry>,
        found: &mut Vec<CacheEntry>,
    ) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping plugin directory {}: {}", dir.display(), e);
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            let modified: DateTime<Utc> = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(time) => time.into(),
                Err(e) => {
                    warn!("Cannot stat plugin manifest {}: {}", path.display(), e);
                    continue;
                }
            };

            if let Some(entry) = cached.get(&path).filter(|e| e.modified == modified) {
                found.push(entry.clone());
                continue;
            }

            let manifest = std::fs::read_to_string(&path)
                .map_err(EngineError::from)
                .and_then(|content| ModuleManifest::parse(&content));

            match manifest {
                Ok(manifest) => found.push(CacheEntry {
                    path,
                    modified,
                    manifest,
                }),
                Err(e) => warn!("Ignoring plugin manifest {}: {}", path.display(), e),
            }
        }
    }
}

impl Default for ModuleBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry for ModuleBank {
    fn init_bank(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.users += 1;
        debug!("Module bank users: {}", inner.users);
        Ok(())
    }

    fn load_builtins(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.users == 0 {
            return Err(EngineError::ModuleLoad("module bank not initialized".into()));
        }
        if inner.builtins_loaded {
            return Ok(());
        }

        inner.modules.extend(builtin_modules());
        inner.builtins_loaded = true;
        Ok(())
    }

    fn load_plugins(&self) -> Result<()> {
        {
            let inner = self.inner.lock();
            if inner.users == 0 {
                return Err(EngineError::ModuleLoad("module bank not initialized".into()));
            }
            if inner.plugins_loaded {
                return Ok(());
            }
        }

        let reset = std::mem::take(&mut self.inner.lock().reset_cache);
        let cached = if reset {
            info!("Plugin cache reset requested");
            HashMap::new()
        } else {
            self.read_cache()
        };

        let dirs = self.plugin_dirs.lock().clone();
        let mut found = Vec::new();
        for dir in &dirs {
            Self::scan_dir(dir, &cached, &mut found);
        }

        let mut inner = self.inner.lock();
        for entry in &found {
            let descriptor = entry.manifest.descriptor();
            if inner.modules.iter().any(|m| m.name == descriptor.name) {
                warn!("Duplicate module '{}' in {}", descriptor.name, entry.path.display());
                continue;
            }
            inner.modules.push(descriptor);
        }
        inner.plugins_loaded = true;
        info!("Module bank holds {} module(s)", inner.modules.len());
        drop(inner);

        self.write_cache(found);
        Ok(())
    }

    fn end_bank(&self) {
        let mut inner = self.inner.lock();
        if inner.users == 0 {
            warn!("Module bank ended more often than initialized");
            return;
        }

        inner.users -= 1;
        if inner.users == 0 {
            inner.modules.clear();
            inner.in_use.clear();
            inner.builtins_loaded = false;
            inner.plugins_loaded = false;
            debug!("Module bank unloaded");
        }
    }

    fn need(
        &self,
        capability: &str,
        constraint: Option<&str>,
        cpu: CpuCapabilities,
    ) -> Option<StrategyHandle> {
        let mut inner = self.inner.lock();

        let chosen = inner
            .modules
            .iter()
            .filter(|m| m.capability == capability && m.runs_on(cpu))
            .filter(|m| match constraint {
                Some(name) => m.name == name,
                None => m.score > 0,
            })
            .max_by_key(|m| m.score)
            .map(|m| m.name.clone())?;

        *inner.in_use.entry(chosen.clone()).or_insert(0) += 1;
        debug!("Using {} module {}", capability, chosen);

        Some(StrategyHandle {
            module: chosen,
            capability: capability.to_string(),
        })
    }

    fn unneed(&self, handle: &StrategyHandle) {
        let mut inner = self.inner.lock();
        match inner.in_use.get_mut(&handle.module) {
            Some(count) if *count > 0 => *count -= 1,
            _ => warn!("Module {} released but not in use", handle.module),
        }
    }

    fn request_cache_reset(&self) {
        self.inner.lock().reset_cache = true;
    }

    fn add_search_path(&self, dir: &Path) {
        let mut dirs = self.plugin_dirs.lock();
        if !dirs.iter().any(|d| d == dir) {
            debug!("Adding plugin directory {}", dir.display());
            dirs.push(dir.to_path_buf());
        }
    }

    fn modules(&self) -> Vec<ModuleDescriptor> {
        self.inner.lock().modules.clone()
    }
}
