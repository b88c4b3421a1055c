//! Configuration gate
//!
//! **Responsibilities:**
//! - Option table shared by the core and by loaded modules
//! - Command-line parsing into overrides plus trailing targets
//! - TOML configuration file load/save, one table per module
//!
//! Value priority: command line > config file > option default.

mod cmdline;
pub mod options;
mod store;

pub use options::core_options;
pub use store::ConfigStore;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

/// Module name owning the core options
pub const MAIN_MODULE: &str = "main";

/// A typed option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::Int(i) => Some(*i != 0),
            ConfigValue::Str(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::Bool(b) => Some(i64::from(*b)),
            ConfigValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Kind of value an option carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// `--name` / `--no-name`
    Bool,
    /// `--name <N>`
    Int,
    /// `--name <VALUE>`
    Str,
    /// Repeatable flag counted into an integer (`-vv`)
    Count,
}

/// One entry of the option table
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSpec {
    pub name: String,
    pub short: Option<char>,
    pub kind: OptionKind,
    pub default: ConfigValue,
    pub help: String,
    /// Owning module (`main` for core options)
    pub module: String,
    /// Transient options (informational requests, one-shot actions) are
    /// never written to the configuration file
    pub transient: bool,
}

impl OptionSpec {
    pub fn flag(name: &str, default: bool, help: &str) -> Self {
        Self::new(name, OptionKind::Bool, ConfigValue::Bool(default), help)
    }

    pub fn int(name: &str, default: i64, help: &str) -> Self {
        Self::new(name, OptionKind::Int, ConfigValue::Int(default), help)
    }

    pub fn string(name: &str, default: &str, help: &str) -> Self {
        Self::new(
            name,
            OptionKind::Str,
            ConfigValue::Str(default.to_string()),
            help,
        )
    }

    pub fn count(name: &str, help: &str) -> Self {
        Self::new(name, OptionKind::Count, ConfigValue::Int(0), help)
    }

    fn new(name: &str, kind: OptionKind, default: ConfigValue, help: &str) -> Self {
        Self {
            name: name.to_string(),
            short: None,
            kind,
            default,
            help: help.to_string(),
            module: MAIN_MODULE.to_string(),
            transient: false,
        }
    }

    pub fn short(mut self, c: char) -> Self {
        self.short = Some(c);
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn in_module(mut self, module: &str) -> Self {
        self.module = module.to_string();
        self
    }
}

/// How strictly a command line is checked against the option table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Unknown options and malformed values are skipped; used before
    /// modules have registered their options
    Lenient,
    /// Any parse error is reported
    Strict,
}

/// Result of parsing a command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLine {
    /// Options given explicitly on the command line
    pub overrides: BTreeMap<String, ConfigValue>,
    /// Trailing non-flag arguments, in left-to-right order
    pub targets: Vec<OsString>,
}

/// Which help text to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelpTopic {
    /// Core options only
    Short,
    /// Every registered option, grouped by module
    Long,
    /// Options of one module
    Module(String),
}

/// Configuration gate consulted by the engine lifecycle
///
/// Implementations use interior mutability; one gate belongs to one engine
/// instance.
pub trait ConfigGate: Send + Sync {
    /// Parse `argv` (program name first) and record the overrides
    fn load_command_line(&self, argv: &[OsString], mode: ParseMode) -> Result<CommandLine>;

    /// Effective value of an option, `None` for unknown options
    fn get(&self, name: &str) -> Option<ConfigValue>;

    /// Load a configuration file; a missing file leaves defaults in place
    fn load_config_file(&self, path: &Path) -> Result<()>;

    /// Write every persistent option to a configuration file
    fn save(&self, path: &Path) -> Result<()>;

    /// Drop file and command-line values, returning to defaults
    fn reset_all(&self);

    /// Add options declared by a module; already known names are skipped
    fn register_options(&self, specs: Vec<OptionSpec>);

    /// Render help text for the given topic
    fn render_help(&self, topic: &HelpTopic) -> String;

    /// Program name and version line
    fn version_text(&self) -> String;

    fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    fn get_int(&self, name: &str) -> i64 {
        self.get(name).and_then(|v| v.as_int()).unwrap_or(0)
    }

    /// String value, `None` when unset or empty
    fn get_str(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
    }
}
