//! Performance timers
//!
//! Named timers accumulating call counts and durations. Disabled timers
//! record nothing; the instance dumps and clears them during cleanup.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
struct TimerRecord {
    calls: u64,
    total: Duration,
    max: Duration,
    started: Option<Instant>,
}

/// Summary of one timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSummary {
    pub name: String,
    pub calls: u64,
    pub total: Duration,
    pub max: Duration,
}

impl TimerSummary {
    /// Mean duration per call
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.calls);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[derive(Debug)]
pub struct StatsTimers {
    enabled: bool,
    timers: Mutex<BTreeMap<String, TimerRecord>>,
}

impl StatsTimers {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start(&self, name: &str) {
        if !self.enabled {
            return;
        }
        let mut timers = self.timers.lock();
        let record = timers.entry(name.to_string()).or_default();
        if record.started.is_some() {
            warn!("Timer {} already running, restarting", name);
        }
        record.started = Some(Instant::now());
    }

    pub fn stop(&self, name: &str) {
        if !self.enabled {
            return;
        }
        let mut timers = self.timers.lock();
        let Some(record) = timers.get_mut(name) else {
            warn!("Timer {} stopped but never started", name);
            return;
        };
        let Some(started) = record.started.take() else {
            warn!("Timer {} stopped twice", name);
            return;
        };

        let elapsed = started.elapsed();
        record.calls += 1;
        record.total += elapsed;
        record.max = record.max.max(elapsed);
    }

    /// Run `f` under the named timer
    pub fn time<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        self.start(name);
        let value = f();
        self.stop(name);
        value
    }

    pub fn summaries(&self) -> Vec<TimerSummary> {
        self.timers
            .lock()
            .iter()
            .map(|(name, r)| TimerSummary {
                name: name.clone(),
                calls: r.calls,
                total: r.total,
                max: r.max,
            })
            .collect()
    }

    /// Log every timer
    pub fn dump_all(&self) {
        for summary in self.summaries() {
            info!(
                "Timer {}: {} call(s), total {:?}, avg {:?}, max {:?}",
                summary.name,
                summary.calls,
                summary.total,
                summary.average(),
                summary.max
            );
        }
    }

    pub fn clean(&self) {
        self.timers.lock().clear();
    }
}
