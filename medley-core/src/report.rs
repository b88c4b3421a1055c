//! Informational reports (help, version, module list)

use crate::modules::ModuleDescriptor;
use medley_common::config::{ConfigGate, HelpTopic};
use std::fmt::Write;

/// Column at which module long names start in `--list` output
const LIST_NAME_WIDTH: usize = 21;

/// A request answered by printing a report and exiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoRequest {
    Help,
    Version,
    LongHelp,
    List,
    ModuleHelp(String),
}

impl InfoRequest {
    /// Requests answerable before the module bank is loaded
    pub fn early(gate: &dyn ConfigGate) -> Option<Self> {
        if gate.get_bool("help") {
            Some(InfoRequest::Help)
        } else if gate.get_bool("version") {
            Some(InfoRequest::Version)
        } else {
            None
        }
    }

    /// Requests that need the module bank
    pub fn with_bank(gate: &dyn ConfigGate) -> Option<Self> {
        if let Some(name) = gate.get_str("module") {
            Some(InfoRequest::ModuleHelp(name))
        } else if gate.get_bool("longhelp") {
            Some(InfoRequest::LongHelp)
        } else if gate.get_bool("list") {
            Some(InfoRequest::List)
        } else {
            None
        }
    }

    /// Render the report text
    pub fn render(&self, gate: &dyn ConfigGate, modules: &[ModuleDescriptor]) -> String {
        match self {
            InfoRequest::Help => gate.render_help(&HelpTopic::Short),
            InfoRequest::Version => gate.version_text(),
            InfoRequest::LongHelp => gate.render_help(&HelpTopic::Long),
            InfoRequest::List => list_modules(modules),
            InfoRequest::ModuleHelp(name) => {
                if modules.iter().any(|m| &m.name == name) {
                    gate.render_help(&HelpTopic::Module(name.clone()))
                } else {
                    format!("No module named '{}'\n", name)
                }
            }
        }
    }
}

/// One line per module: `  name                  longname`
pub fn list_modules(modules: &[ModuleDescriptor]) -> String {
    let mut out = String::new();
    for module in modules {
        let _ = writeln!(
            out,
            "  {:<width$} {}",
            module.name,
            module.longname,
            width = LIST_NAME_WIDTH
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuCapabilities;
    use medley_common::ConfigStore;
    use std::ffi::OsString;

    fn module(name: &str, longname: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            name: name.to_string(),
            longname: longname.to_string(),
            capability: "interface".to_string(),
            score: 0,
            requires: CpuCapabilities::empty(),
            handles_play: false,
            options: Vec::new(),
            builtin: true,
        }
    }

    #[test]
    fn test_list_alignment() {
        let out = list_modules(&[
            module("dummy", "Dummy interface"),
            module("a_really_long_module_name", "Long"),
        ]);
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines[0], format!("  dummy{} Dummy interface", " ".repeat(16)));
        assert_eq!(lines[1], "  a_really_long_module_name Long");
    }

    #[test]
    fn test_request_detection() {
        let gate = ConfigStore::new("medley", "0.1.0");
        let argv: Vec<OsString> = ["medley", "--list", "--version"]
            .iter()
            .map(OsString::from)
            .collect();
        gate.load_command_line(&argv, medley_common::ParseMode::Lenient)
            .unwrap();

        assert_eq!(InfoRequest::early(&gate), Some(InfoRequest::Version));
        assert_eq!(InfoRequest::with_bank(&gate), Some(InfoRequest::List));
    }

    #[test]
    fn test_unknown_module_help() {
        let gate = ConfigStore::new("medley", "0.1.0");
        let text = InfoRequest::ModuleHelp("nope".into()).render(&gate, &[]);
        assert!(text.contains("No module named 'nope'"));
    }
}
