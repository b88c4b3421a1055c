//! Output sinks and announce handlers attached to an instance
//!
//! The instance owns what is attached and closes it during cleanup: video
//! outputs first, then audio outputs, then announce handlers.

/// Kind of media output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Video,
    Audio,
}

/// A video or audio output owned by an engine instance
pub trait OutputSink: Send {
    fn kind(&self) -> OutputKind;

    fn name(&self) -> &str;

    fn close(&mut self);
}

/// A session announcement handler owned by an engine instance
pub trait AnnounceHandler: Send {
    fn name(&self) -> &str;

    fn close(&mut self);
}
