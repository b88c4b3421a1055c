//! # Medley Common Library
//!
//! Shared code for the medley engine crates:
//! - Configuration gate (option table, command line, TOML config file)
//! - Home/user/config path resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod paths;

pub use config::{
    CommandLine, ConfigGate, ConfigStore, ConfigValue, HelpTopic, OptionKind, OptionSpec,
    ParseMode,
};
pub use error::{Error, Result};
pub use paths::{InstancePaths, PathResolver};
