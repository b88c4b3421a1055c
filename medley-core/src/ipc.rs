//! Inter-process messaging contract
//!
//! **Responsibilities:**
//! - Handoff message types exchanged between a new process and the running
//!   primary instance
//! - [`SessionBus`] abstraction over the session message bus (name claiming,
//!   request dispatch)
//! - [`LocalSessionBus`], an in-process bus for embedding and tests
//!
//! Calls block until the peer answers; there is no timeout.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Well-known channel name claimed by the primary instance
pub const CHANNEL_NAME: &str = "org.medley.engine";

/// IPC failures
#[derive(Error, Debug)]
pub enum IpcError {
    /// The bus itself cannot be reached
    #[error("Session bus unavailable: {0}")]
    Unavailable(String),

    /// No handler is registered under the name
    #[error("No handler registered for {0}")]
    NoSuchName(String),

    /// The message could not be delivered
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer answered with an error
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Message (de)serialization failed
    #[error("Message codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Request sent to the primary instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoffRequest {
    /// Liveness check; the payload is ignored
    Probe,
    /// Add one work item to the primary's playlist
    AddWorkItem {
        reference: String,
        options: Vec<String>,
        play: bool,
    },
}

/// Reply from the primary instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandoffReply {
    Ack,
    Error(String),
}

/// Outcome of claiming a bus name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// This caller now owns the name
    Primary,
    /// Another owner already holds the name
    Taken,
}

/// Serves requests addressed to a claimed name
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: HandoffRequest) -> HandoffReply;
}

/// Session message bus
pub trait SessionBus: Send + Sync {
    /// Try to become the owner of `name`
    fn claim(&self, name: &str) -> Result<Claim, IpcError>;

    /// Attach the handler serving requests to an owned name
    fn register(&self, name: &str, handler: Arc<dyn RequestHandler>) -> Result<(), IpcError>;

    /// Send a request to the owner of `name` and wait for its reply
    fn call(&self, name: &str, request: &HandoffRequest) -> Result<HandoffReply, IpcError>;

    /// Give up ownership of `name`
    fn release(&self, name: &str);
}

#[derive(Default)]
struct NameEntry {
    handler: Option<Arc<dyn RequestHandler>>,
}

/// Session bus local to the current process
///
/// Messages are round-tripped through JSON so handlers see exactly what a
/// wire transport would deliver.
#[derive(Default)]
pub struct LocalSessionBus {
    names: Mutex<HashMap<String, NameEntry>>,
}

static PROCESS_BUS: Lazy<Arc<LocalSessionBus>> = Lazy::new(|| Arc::new(LocalSessionBus::new()));

impl LocalSessionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus shared by every instance of this process
    pub fn process() -> Arc<Self> {
        Arc::clone(&PROCESS_BUS)
    }

    /// Whether some owner currently holds `name`
    pub fn is_claimed(&self, name: &str) -> bool {
        self.names.lock().contains_key(name)
    }
}

fn over_wire<T>(message: &T) -> Result<T, IpcError>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let encoded = serde_json::to_string(message)?;
    Ok(serde_json::from_str(&encoded)?)
}

impl SessionBus for LocalSessionBus {
    fn claim(&self, name: &str) -> Result<Claim, IpcError> {
        let mut names = self.names.lock();
        if names.contains_key(name) {
            return Ok(Claim::Taken);
        }
        names.insert(name.to_string(), NameEntry::default());
        debug!("Claimed bus name {}", name);
        Ok(Claim::Primary)
    }

    fn register(&self, name: &str, handler: Arc<dyn RequestHandler>) -> Result<(), IpcError> {
        let mut names = self.names.lock();
        let entry = names
            .get_mut(name)
            .ok_or_else(|| IpcError::NoSuchName(name.to_string()))?;
        entry.handler = Some(handler);
        Ok(())
    }

    fn call(&self, name: &str, request: &HandoffRequest) -> Result<HandoffReply, IpcError> {
        let handler = self
            .names
            .lock()
            .get(name)
            .and_then(|entry| entry.handler.clone())
            .ok_or_else(|| IpcError::NoSuchName(name.to_string()))?;

        // Handler runs without the bus lock so it may call back into the bus
        let reply = handler.handle(over_wire(request)?);
        over_wire(&reply)
    }

    fn release(&self, name: &str) {
        if self.names.lock().remove(name).is_some() {
            debug!("Released bus name {}", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl RequestHandler for Echo {
        fn handle(&self, request: HandoffRequest) -> HandoffReply {
            match request {
                HandoffRequest::Probe => HandoffReply::Ack,
                HandoffRequest::AddWorkItem { reference, .. } => HandoffReply::Error(reference),
            }
        }
    }

    #[test]
    fn test_claim_is_exclusive_until_released() {
        let bus = LocalSessionBus::new();
        assert_eq!(bus.claim(CHANNEL_NAME).unwrap(), Claim::Primary);
        assert_eq!(bus.claim(CHANNEL_NAME).unwrap(), Claim::Taken);

        bus.release(CHANNEL_NAME);
        assert!(!bus.is_claimed(CHANNEL_NAME));
        assert_eq!(bus.claim(CHANNEL_NAME).unwrap(), Claim::Primary);
    }

    #[test]
    fn test_call_without_handler_fails() {
        let bus = LocalSessionBus::new();
        bus.claim(CHANNEL_NAME).unwrap();
        let err = bus.call(CHANNEL_NAME, &HandoffRequest::Probe).unwrap_err();
        assert!(matches!(err, IpcError::NoSuchName(_)));
    }

    #[test]
    fn test_call_dispatches_to_handler() {
        let bus = LocalSessionBus::new();
        bus.claim(CHANNEL_NAME).unwrap();
        bus.register(CHANNEL_NAME, Arc::new(Echo)).unwrap();

        assert_eq!(
            bus.call(CHANNEL_NAME, &HandoffRequest::Probe).unwrap(),
            HandoffReply::Ack
        );

        let add = HandoffRequest::AddWorkItem {
            reference: "movie.avi".into(),
            options: vec![":sub1".into()],
            play: true,
        };
        assert_eq!(
            bus.call(CHANNEL_NAME, &add).unwrap(),
            HandoffReply::Error("movie.avi".into())
        );
    }

    #[test]
    fn test_register_requires_claim() {
        let bus = LocalSessionBus::new();
        assert!(bus.register("unclaimed", Arc::new(Echo)).is_err());
    }
}
