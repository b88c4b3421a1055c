//! Single-instance coordination
//!
//! **Responsibilities:**
//! - Claim the well-known channel name, becoming the primary instance
//! - Serve `Probe` and `AddWorkItem` for the primary through
//!   [`PrimaryEndpoint`]
//! - When another process holds the name, probe it and hand pending work
//!   items over
//!
//! Outcome per launch:
//! - claim succeeds: [`Coordination::Primary`]
//! - name taken, single-instance mode off: [`Coordination::Independent`]
//! - name taken, probe fails: [`Coordination::NoPeerControl`]
//! - name taken, probe answered: [`Coordination::Handoff`]
//! - bus unavailable: [`Coordination::Independent`]
//!
//! Every IPC call blocks until the peer answers.

use crate::ipc::{Claim, HandoffReply, HandoffRequest, IpcError, RequestHandler, SessionBus};
use crate::playlist::Playlist;
use crate::targets::{InsertMode, WorkItem};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Request handler of the primary instance
#[derive(Default)]
pub struct PrimaryEndpoint {
    playlist: RwLock<Option<Arc<dyn Playlist>>>,
}

impl PrimaryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting work items into `playlist`
    pub fn attach_playlist(&self, playlist: Arc<dyn Playlist>) {
        *self.playlist.write() = Some(playlist);
    }

    pub fn detach_playlist(&self) {
        self.playlist.write().take();
    }
}

impl RequestHandler for PrimaryEndpoint {
    fn handle(&self, request: HandoffRequest) -> HandoffReply {
        match request {
            HandoffRequest::Probe => HandoffReply::Ack,
            HandoffRequest::AddWorkItem {
                reference,
                options,
                play,
            } => {
                let Some(playlist) = self.playlist.read().clone() else {
                    return HandoffReply::Error("playlist not ready".into());
                };

                let item = WorkItem {
                    reference,
                    options,
                    mode: InsertMode::for_handoff(play),
                };
                info!("Received {} from another instance", item.reference);

                match playlist.add_target(&item) {
                    Ok(()) => HandoffReply::Ack,
                    Err(e) => HandoffReply::Error(e.to_string()),
                }
            }
        }
    }
}

/// Ownership of the channel name, held by the primary until destroy
pub struct IpcClaim {
    bus: Arc<dyn SessionBus>,
    name: String,
    endpoint: Arc<PrimaryEndpoint>,
    released: bool,
}

impl IpcClaim {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Arc<PrimaryEndpoint> {
        &self.endpoint
    }

    /// Give the name back; later calls do nothing
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.endpoint.detach_playlist();
        self.bus.release(&self.name);
        debug!("Released channel {}", self.name);
    }
}

impl Drop for IpcClaim {
    fn drop(&mut self) {
        self.release();
    }
}

/// Result of single-instance coordination
pub enum Coordination {
    /// This instance owns the channel name
    Primary(IpcClaim),
    /// Continue without single-instance behaviour
    Independent,
    /// Another instance holds the name but does not answer
    NoPeerControl,
    /// Another instance answered the probe; pending work goes there
    Handoff,
}

impl Coordination {
    pub fn label(&self) -> &'static str {
        match self {
            Coordination::Primary(_) => "primary",
            Coordination::Independent => "independent",
            Coordination::NoPeerControl => "no peer control",
            Coordination::Handoff => "handoff",
        }
    }
}

/// Claim `name` or decide how to relate to its current holder
pub fn coordinate(bus: &Arc<dyn SessionBus>, name: &str, one_instance: bool) -> Coordination {
    match bus.claim(name) {
        Ok(Claim::Primary) => {
            let endpoint = Arc::new(PrimaryEndpoint::new());
            let handler: Arc<dyn RequestHandler> = endpoint.clone();

            if let Err(e) = bus.register(name, handler) {
                warn!("Cannot serve {}: {}", name, e);
                bus.release(name);
                return Coordination::Independent;
            }

            info!("Claimed channel {}", name);
            Coordination::Primary(IpcClaim {
                bus: Arc::clone(bus),
                name: name.to_string(),
                endpoint,
                released: false,
            })
        }
        Ok(Claim::Taken) if !one_instance => {
            info!("Channel {} held by another instance, running independently", name);
            Coordination::Independent
        }
        Ok(Claim::Taken) => match bus.call(name, &HandoffRequest::Probe) {
            Ok(HandoffReply::Ack) => {
                info!("Another instance is running, handing over work");
                Coordination::Handoff
            }
            Ok(HandoffReply::Error(reason)) => {
                warn!("Running instance refused probe: {}", reason);
                Coordination::NoPeerControl
            }
            Err(e) => {
                warn!("Cannot probe running instance: {}", e);
                Coordination::NoPeerControl
            }
        },
        Err(e) => {
            warn!("Session bus unavailable, running independently: {}", e);
            Coordination::Independent
        }
    }
}

/// Outcome of sending work items to the primary
#[derive(Debug)]
pub struct HandoffReport {
    pub sent: usize,
    /// The failure that stopped the transfer, if any
    pub failure: Option<IpcError>,
}

/// Send each item in order; the first failure aborts the rest
pub fn hand_off<'a>(
    bus: &Arc<dyn SessionBus>,
    name: &str,
    items: impl IntoIterator<Item = &'a WorkItem>,
    play: bool,
) -> HandoffReport {
    let mut sent = 0;

    for item in items {
        let request = HandoffRequest::AddWorkItem {
            reference: item.reference.clone(),
            options: item.options.clone(),
            play,
        };

        let failure = match bus.call(name, &request) {
            Ok(HandoffReply::Ack) => {
                debug!("Handed over {}", item.reference);
                sent += 1;
                continue;
            }
            Ok(HandoffReply::Error(reason)) => IpcError::Rejected(reason),
            Err(e) => e,
        };

        error!("Handoff of {} failed: {}", item.reference, failure);
        return HandoffReport {
            sent,
            failure: Some(failure),
        };
    }

    HandoffReport {
        sent,
        failure: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{LocalSessionBus, CHANNEL_NAME};
    use crate::playlist::QueuePlaylist;

    fn bus() -> Arc<dyn SessionBus> {
        Arc::new(LocalSessionBus::new())
    }

    #[test]
    fn test_first_claim_is_primary() {
        let bus = bus();
        let coordination = coordinate(&bus, CHANNEL_NAME, true);
        assert_eq!(coordination.label(), "primary");

        let Coordination::Primary(mut claim) = coordination else {
            unreachable!()
        };
        assert_eq!(
            bus.call(CHANNEL_NAME, &HandoffRequest::Probe).unwrap(),
            HandoffReply::Ack
        );
        claim.release();
        claim.release();
        assert!(bus.call(CHANNEL_NAME, &HandoffRequest::Probe).is_err());
    }

    #[test]
    fn test_second_claim_without_one_instance_is_independent() {
        let bus = bus();
        let _primary = coordinate(&bus, CHANNEL_NAME, false);
        assert_eq!(coordinate(&bus, CHANNEL_NAME, false).label(), "independent");
    }

    #[test]
    fn test_second_claim_hands_off() {
        let bus = bus();
        let _primary = coordinate(&bus, CHANNEL_NAME, true);
        assert_eq!(coordinate(&bus, CHANNEL_NAME, true).label(), "handoff");
    }

    #[test]
    fn test_unanswered_probe_is_no_peer_control() {
        let bus = bus();
        // Holder claimed the name but never registered a handler
        bus.claim(CHANNEL_NAME).unwrap();
        assert_eq!(
            coordinate(&bus, CHANNEL_NAME, true).label(),
            "no peer control"
        );
    }

    #[test]
    fn test_add_work_item_before_playlist_is_refused() {
        let endpoint = PrimaryEndpoint::new();
        let reply = endpoint.handle(HandoffRequest::AddWorkItem {
            reference: "a.ogg".into(),
            options: vec![],
            play: true,
        });
        assert!(matches!(reply, HandoffReply::Error(_)));
    }

    #[test]
    fn test_hand_off_delivers_in_order() {
        let bus = bus();
        let Coordination::Primary(claim) = coordinate(&bus, CHANNEL_NAME, true) else {
            unreachable!()
        };
        let playlist = Arc::new(QueuePlaylist::new());
        claim.endpoint().attach_playlist(playlist.clone());

        let items = vec![
            WorkItem::new("a.ogg", InsertMode::Insert),
            WorkItem::new("b.ogg", InsertMode::Insert),
        ];
        let report = hand_off(&bus, CHANNEL_NAME, &items, false);

        assert_eq!(report.sent, 2);
        assert!(report.failure.is_none());
        let refs: Vec<_> = playlist.items().into_iter().map(|i| i.reference).collect();
        assert_eq!(refs, vec!["a.ogg", "b.ogg"]);
        assert!(playlist.items().iter().all(|i| i.mode == InsertMode::Enqueue));
    }

    #[test]
    fn test_hand_off_aborts_on_first_failure() {
        let bus = bus();
        let Coordination::Primary(claim) = coordinate(&bus, CHANNEL_NAME, true) else {
            unreachable!()
        };
        let playlist = Arc::new(QueuePlaylist::new());
        playlist.destroy();
        claim.endpoint().attach_playlist(playlist);

        let items = vec![
            WorkItem::new("a.ogg", InsertMode::Insert),
            WorkItem::new("b.ogg", InsertMode::Insert),
        ];
        let report = hand_off(&bus, CHANNEL_NAME, &items, true);

        assert_eq!(report.sent, 0);
        assert!(matches!(report.failure, Some(IpcError::Rejected(_))));
    }
}
