//! Hotkey table
//!
//! Each instance keeps its own snapshot, taken during initialization, so
//! later configuration changes in one instance do not leak into another.

use medley_common::config::{ConfigGate, OptionSpec};

/// One action bound to a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotkey {
    pub action: &'static str,
    pub key: String,
}

/// Default bindings
pub const DEFAULT_BINDINGS: &[(&str, &str)] = &[
    ("play-pause", "Space"),
    ("stop", "s"),
    ("next", "n"),
    ("prev", "p"),
    ("faster", "+"),
    ("slower", "-"),
    ("fullscreen", "f"),
    ("vol-up", "Ctrl+Up"),
    ("vol-down", "Ctrl+Down"),
    ("vol-mute", "m"),
    ("quit", "Ctrl+q"),
];

/// `key-<action>` options, one per default binding
pub fn options() -> Vec<OptionSpec> {
    DEFAULT_BINDINGS
        .iter()
        .map(|(action, key)| {
            OptionSpec::string(&format!("key-{}", action), key, &format!("Key for {}", action))
        })
        .collect()
}

/// Bindings in effect, `key-<action>` options overriding the defaults
pub fn snapshot(gate: &dyn ConfigGate) -> Vec<Hotkey> {
    DEFAULT_BINDINGS
        .iter()
        .map(|&(action, default)| Hotkey {
            action,
            key: gate
                .get_str(&format!("key-{}", action))
                .unwrap_or_else(|| default.to_string()),
        })
        .collect()
}
