//! Default [`ConfigGate`] implementation backed by an in-memory option table

use super::{
    cmdline, core_options, CommandLine, ConfigGate, ConfigValue, HelpTopic, OptionKind,
    OptionSpec, ParseMode,
};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct StoreInner {
    specs: Vec<OptionSpec>,
    file_values: HashMap<String, ConfigValue>,
    cli_values: BTreeMap<String, ConfigValue>,
}

impl StoreInner {
    fn spec(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    fn effective(&self, spec: &OptionSpec) -> ConfigValue {
        self.cli_values
            .get(&spec.name)
            .or_else(|| self.file_values.get(&spec.name))
            .cloned()
            .unwrap_or_else(|| spec.default.clone())
    }
}

/// Option table with command-line, file and default layers
///
/// Lookups resolve command line > config file > default.
#[derive(Debug)]
pub struct ConfigStore {
    program: String,
    version: String,
    inner: RwLock<StoreInner>,
}

impl ConfigStore {
    /// Store holding the core option table
    pub fn new(program: &str, version: &str) -> Self {
        Self::with_options(program, version, core_options())
    }

    /// Store holding an explicit option table
    pub fn with_options(program: &str, version: &str, specs: Vec<OptionSpec>) -> Self {
        Self {
            program: program.to_string(),
            version: version.to_string(),
            inner: RwLock::new(StoreInner {
                specs,
                ..Default::default()
            }),
        }
    }

    /// Snapshot of the option table
    pub fn options(&self) -> Vec<OptionSpec> {
        self.inner.read().specs.clone()
    }

    /// Store a value as if it came from the configuration file
    pub fn put(&self, name: &str, value: ConfigValue) -> Result<()> {
        let mut inner = self.inner.write();
        let spec = inner
            .spec(name)
            .ok_or_else(|| Error::NotFound(format!("option '{}'", name)))?;
        let value = coerce(spec, value)?;
        inner.file_values.insert(name.to_string(), value);
        Ok(())
    }
}

/// Check `value` against the option's kind, converting where lossless
fn coerce(spec: &OptionSpec, value: ConfigValue) -> Result<ConfigValue> {
    let invalid = |reason: &str| Error::InvalidValue {
        name: spec.name.clone(),
        reason: reason.to_string(),
    };

    match (spec.kind, value) {
        (OptionKind::Bool, ConfigValue::Bool(b)) => Ok(ConfigValue::Bool(b)),
        (OptionKind::Bool, ConfigValue::Int(i)) => Ok(ConfigValue::Bool(i != 0)),
        (OptionKind::Bool, ConfigValue::Str(_)) => Err(invalid("expected a boolean")),
        (OptionKind::Int | OptionKind::Count, ConfigValue::Int(i)) => Ok(ConfigValue::Int(i)),
        (OptionKind::Int | OptionKind::Count, _) => Err(invalid("expected an integer")),
        (OptionKind::Str, ConfigValue::Str(s)) => Ok(ConfigValue::Str(s)),
        (OptionKind::Str, _) => Err(invalid("expected a string")),
    }
}

fn from_toml(value: &toml::Value) -> Option<ConfigValue> {
    match value {
        toml::Value::Boolean(b) => Some(ConfigValue::Bool(*b)),
        toml::Value::Integer(i) => Some(ConfigValue::Int(*i)),
        toml::Value::String(s) => Some(ConfigValue::Str(s.clone())),
        _ => None,
    }
}

fn to_toml(value: &ConfigValue) -> toml::Value {
    match value {
        ConfigValue::Bool(b) => toml::Value::Boolean(*b),
        ConfigValue::Int(i) => toml::Value::Integer(*i),
        ConfigValue::Str(s) => toml::Value::String(s.clone()),
    }
}

impl ConfigGate for ConfigStore {
    fn load_command_line(&self, argv: &[OsString], mode: ParseMode) -> Result<CommandLine> {
        let parsed = {
            let inner = self.inner.read();
            let specs: Vec<&OptionSpec> = inner.specs.iter().collect();
            cmdline::parse(&self.program, &self.version, &specs, argv, mode)?
        };

        debug!(
            "Command line: {} override(s), {} target(s)",
            parsed.overrides.len(),
            parsed.targets.len()
        );

        self.inner.write().cli_values = parsed.overrides.clone();
        Ok(parsed)
    }

    fn get(&self, name: &str) -> Option<ConfigValue> {
        let inner = self.inner.read();
        inner.spec(name).map(|spec| inner.effective(spec))
    }

    fn load_config_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let table: toml::Table = content.parse().map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let mut inner = self.inner.write();
        let mut loaded = HashMap::new();

        for (module, section) in &table {
            let Some(section) = section.as_table() else {
                warn!("Ignoring non-table entry '{}' in {}", module, path.display());
                continue;
            };

            for (key, raw) in section {
                let Some(spec) = inner.spec(key) else {
                    warn!("Unknown option '{}' in [{}], ignoring", key, module);
                    continue;
                };

                match from_toml(raw).map(|v| coerce(spec, v)) {
                    Some(Ok(value)) => {
                        loaded.insert(key.clone(), value);
                    }
                    Some(Err(e)) => warn!("{}, using default", e),
                    None => warn!("Unsupported value type for '{}', using default", key),
                }
            }
        }

        info!(
            "Loaded {} option(s) from {}",
            loaded.len(),
            path.display()
        );
        inner.file_values = loaded;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut document = toml::Table::new();

        {
            let inner = self.inner.read();
            for spec in inner.specs.iter().filter(|s| !s.transient) {
                let section = document
                    .entry(spec.module.clone())
                    .or_insert(toml::Value::Table(toml::Table::new()));
                if let toml::Value::Table(section) = section {
                    section.insert(spec.name.clone(), to_toml(&inner.effective(spec)));
                }
            }
        }

        let rendered = toml::to_string_pretty(&document)
            .map_err(|e| Error::Config(format!("Failed to render configuration: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, rendered)?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    fn reset_all(&self) {
        let mut inner = self.inner.write();
        inner.file_values.clear();
        inner.cli_values.clear();
        debug!("Configuration reset to defaults");
    }

    fn register_options(&self, specs: Vec<OptionSpec>) {
        let mut inner = self.inner.write();
        for spec in specs {
            if inner.spec(&spec.name).is_some() {
                debug!(
                    "Option '{}' from module '{}' already registered",
                    spec.name, spec.module
                );
                continue;
            }
            inner.specs.push(spec);
        }
    }

    fn render_help(&self, topic: &HelpTopic) -> String {
        let inner = self.inner.read();
        let specs: Vec<&OptionSpec> = inner.specs.iter().collect();
        cmdline::render_help(&self.program, &self.version, &specs, topic)
    }

    fn version_text(&self) -> String {
        format!("{} version {}\n", self.program, self.version)
    }
}
