//! # Medley Engine Core (medley-core)
//!
//! Runtime lifecycle of embeddable media engine instances.
//!
//! **Purpose:** Create, initialize, clean up and destroy engine instances
//! that share one reference-counted process state, and decide at startup
//! whether to run standalone or hand requested work to an instance that is
//! already running.
//!
//! **Architecture:** [`GlobalRuntimeState`] is the only state shared between
//! instances. Each [`EngineInstance`] owns its resources and reaches the
//! outside world through the collaborator traits in [`Collaborators`].

pub mod coordinator;
pub mod cpu;
pub mod daemon;
pub mod diagnostics;
pub mod error;
pub mod global;
pub mod hotkeys;
pub mod instance;
pub mod interfaces;
pub mod ipc;
pub mod modules;
pub mod outputs;
pub mod playlist;
pub mod report;
pub mod rollback;
pub mod stats;
pub mod strategy;
pub mod targets;

pub use error::{EngineError, ExitStatus, Result};
pub use global::{GlobalLease, GlobalRuntimeState, PlatformHooks};
pub use instance::{Collaborators, EngineInstance, InitOutcome, LifecycleState, ProcessExit};
pub use targets::{InsertMode, WorkItem};
