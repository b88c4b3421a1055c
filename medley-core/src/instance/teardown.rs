//! Instance cleanup and destruction
//!
//! Cleanup stops what runs: interfaces, playlist, video then audio outputs,
//! stats timers, announce handlers. Destroy gives back what was borrowed:
//! copy strategy, module bank, IPC claim, global runtime state.

use super::{EngineInstance, LifecycleState};
use crate::outputs::OutputKind;
use tracing::{debug, info};

impl EngineInstance {
    /// Stop everything started by init; no-op unless the instance is live
    pub fn cleanup(&mut self) {
        if self.state != LifecycleState::Live {
            debug!("Cleanup skipped in state {:?}", self.state);
            return;
        }

        info!("Stopping interfaces");
        self.collab.interfaces.stop_all();

        if let Some(claim) = &self.claim {
            claim.endpoint().detach_playlist();
        }
        if let Some(playlist) = self.playlist.take() {
            debug!("Removing playlist");
            playlist.destroy();
        }

        let (mut video, mut audio): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outputs)
            .into_iter()
            .partition(|o| o.kind() == OutputKind::Video);
        for output in video.iter_mut().chain(audio.iter_mut()) {
            debug!("Removing {:?} output {}", output.kind(), output.name());
            output.close();
        }

        if let Some(stats) = &self.stats {
            stats.dump_all();
            stats.clean();
        }

        for mut announcer in self.announcers.drain(..) {
            debug!("Removing announce handler {}", announcer.name());
            announcer.close();
        }

        self.state = LifecycleState::CleanedUp;
    }

    /// Release every resource and the global runtime state reference
    ///
    /// Runs [`cleanup`](Self::cleanup) first when the instance is live.
    /// Calling it again does nothing.
    pub fn destroy(&mut self) {
        match self.state {
            LifecycleState::Destroyed => {
                debug!("Engine instance {} already destroyed", self.id);
                return;
            }
            LifecycleState::Live => self.cleanup(),
            LifecycleState::Created | LifecycleState::CleanedUp => {}
        }

        if let Some(strategy) = self.strategy.take() {
            if let (Some(handle), Some(bank)) = (strategy.handle(), &self.bank) {
                bank.unneed(handle);
            }
        }
        if let Some(bank) = self.bank.take() {
            bank.end_bank();
        }

        self.paths = None;
        self.hotkeys.clear();
        self.stats = None;

        if let Some(mut claim) = self.claim.take() {
            claim.release();
        }

        // Last reference tears the global state down
        drop(self.lease.take());

        self.state = LifecycleState::Destroyed;
        debug!("Engine instance {} destroyed", self.id);
        self.diagnostics.flush();
    }
}
