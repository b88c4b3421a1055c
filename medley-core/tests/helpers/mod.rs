//! Test helper modules for medley-core integration tests
//!
//! Provides reusable test infrastructure components:
//! - Recording fakes for every collaborator trait, with failure injection
//! - EngineFixture: isolated global state, bus and temp directories per test

#![allow(dead_code)]

pub mod fakes;
pub mod fixture;

// Re-export commonly used types
pub use fakes::{
    CountingHooks, FakeDetacher, FakePlaylistService, PanicExit, RecordingHolder,
    RecordingRegistry, RecordingSupervisor, RegistryFailure,
};
pub use fixture::{argv, catch_exit, EngineFixture};
