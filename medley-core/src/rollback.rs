//! LIFO undo stack for staged initialization
//!
//! Each stage that acquires a resource pushes the matching release. Dropping
//! the stack without [`Rollback::commit`] runs the releases newest first.
//! Values moved into the stack with [`Rollback::hold`] are taken back out on
//! success.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

type Undo = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub struct Rollback {
    steps: Vec<(&'static str, Undo)>,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the release of a resource just acquired
    pub fn push(&mut self, label: &'static str, undo: impl FnOnce() + Send + 'static) {
        self.steps.push((label, Box::new(undo)));
    }

    /// Keep `value` until taken; released with `release` on unwind
    pub fn hold<T: Send + 'static>(
        &mut self,
        label: &'static str,
        value: T,
        release: impl FnOnce(T) + Send + 'static,
    ) -> Held<T> {
        let slot = Arc::new(Mutex::new(Some(value)));
        let pending = Arc::clone(&slot);
        self.push(label, move || {
            if let Some(value) = pending.lock().take() {
                release(value);
            }
        });
        Held(slot)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Keep every acquired resource
    pub fn commit(mut self) {
        self.steps.clear();
    }

    /// Release everything acquired so far, newest first
    pub fn unwind(&mut self) {
        while let Some((label, undo)) = self.steps.pop() {
            debug!("Rolling back {}", label);
            undo();
        }
    }
}

/// A value owned by a [`Rollback`] until taken
pub struct Held<T>(Arc<Mutex<Option<T>>>);

impl<T> Held<T> {
    /// Move the value out; the rollback no longer releases it
    pub fn take(&self) -> Option<T> {
        self.0.lock().take()
    }

    /// Run `f` on the value if still held
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.0.lock().as_mut().map(f)
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        self.unwind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_drop_unwinds_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let mut rollback = Rollback::new();
            for label in ["first", "second", "third"] {
                let log = Arc::clone(&log);
                rollback.push(label, move || log.lock().push(label));
            }
            assert_eq!(rollback.len(), 3);
        }
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_commit_keeps_resources() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut rollback = Rollback::new();
        let sink = Arc::clone(&log);
        rollback.push("bank", move || sink.lock().push("bank"));
        rollback.commit();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_taken_value_not_released() {
        let released = Arc::new(Mutex::new(Vec::new()));
        let mut rollback = Rollback::new();

        let sink = Arc::clone(&released);
        let kept = rollback.hold("kept", 1, move |v| sink.lock().push(v));
        let sink = Arc::clone(&released);
        let _lost = rollback.hold("lost", 2, move |v| sink.lock().push(v));

        assert_eq!(kept.take(), Some(1));
        drop(rollback);
        assert_eq!(*released.lock(), vec![2]);
    }

    #[test]
    fn test_unwind_runs_once() {
        let count = Arc::new(Mutex::new(0));
        let mut rollback = Rollback::new();
        let c = Arc::clone(&count);
        rollback.push("claim", move || *c.lock() += 1);

        rollback.unwind();
        drop(rollback);
        assert_eq!(*count.lock(), 1);
    }
}
