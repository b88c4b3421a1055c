//! Global runtime state reference counting tests
//!
//! One-time setup and teardown must run exactly once per 0→1→0 cycle no
//! matter how many threads create and destroy instances concurrently.

mod helpers;

use helpers::{argv, CountingHooks, EngineFixture};
use medley_core::{GlobalRuntimeState, InitOutcome, LifecycleState};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

// ============================================================================
// Raw acquire / release
// ============================================================================

/// **Given:** N threads sharing one global state
/// **When:** all acquire before any of them releases
/// **Then:** setup and teardown each run exactly once
#[test]
fn test_concurrent_acquire_release_runs_setup_once() {
    let hooks = Arc::new(CountingHooks::default());
    let global = Arc::new(GlobalRuntimeState::with_hooks(hooks.clone()));
    let all_acquired = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let global = Arc::clone(&global);
            let all_acquired = Arc::clone(&all_acquired);
            thread::spawn(move || {
                global.acquire();
                all_acquired.wait();
                global.release();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    assert_eq!(hooks.setups(), 1);
    assert_eq!(hooks.teardowns(), 1);
    assert_eq!(global.refcount(), 0);
    assert!(!global.is_ready());
}

/// **Given:** a global state cycled to zero and back up
/// **When:** a second generation of references is taken and dropped
/// **Then:** setup and teardown run once per generation
#[test]
fn test_setup_reruns_after_full_teardown() {
    let hooks = Arc::new(CountingHooks::default());
    let global = Arc::new(GlobalRuntimeState::with_hooks(hooks.clone()));

    for generation in 1..=2 {
        let first = global.lease();
        let second = global.lease();
        assert!(global.is_ready());
        assert_eq!(global.refcount(), 2);
        drop(first);
        drop(second);

        assert_eq!(hooks.setups(), generation);
        assert_eq!(hooks.teardowns(), generation);
    }
}

/// **Given:** a global state with no references
/// **When:** release is called anyway
/// **Then:** the refcount stays at zero and teardown does not run
#[test]
fn test_release_at_zero_is_noop() {
    let hooks = Arc::new(CountingHooks::default());
    let global = GlobalRuntimeState::with_hooks(hooks.clone());

    assert_eq!(global.release(), 0);
    assert_eq!(hooks.teardowns(), 0);
}

// ============================================================================
// Through engine instances
// ============================================================================

/// **Given:** instances created and initialized on several threads
/// **When:** every thread destroys its instance
/// **Then:** the shared state was set up once and torn down once
#[test]
fn test_concurrent_instances_share_one_setup() {
    let fixture = EngineFixture::new();
    let all_live = Barrier::new(THREADS);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                let mut instance = fixture.instance().expect("create failed");
                let outcome = instance.init(&argv(&[])).expect("init failed");
                assert_eq!(outcome, InitOutcome::Success);

                all_live.wait();
                instance.destroy();
                assert_eq!(instance.state(), LifecycleState::Destroyed);
            });
        }
    });

    assert_eq!(fixture.hooks.setups(), 1);
    assert_eq!(fixture.hooks.teardowns(), 1);
    assert_eq!(fixture.global.refcount(), 0);
    assert_eq!(fixture.registry.open_users(), 0);
}

/// **Given:** two live instances on one global state
/// **When:** the first is destroyed
/// **Then:** the state stays ready until the second one goes too
#[test]
fn test_state_survives_until_last_instance() {
    let fixture = EngineFixture::new();
    let mut first = fixture.instance().unwrap();
    let mut second = fixture.instance().unwrap();
    assert_eq!(fixture.global.refcount(), 2);

    first.destroy();
    assert!(fixture.global.is_ready());
    assert_eq!(fixture.hooks.teardowns(), 0);

    second.destroy();
    assert!(!fixture.global.is_ready());
    assert_eq!(fixture.hooks.teardowns(), 1);
}

/// **Given:** collaborators with an empty channel name
/// **When:** an instance is created
/// **Then:** creation fails and the reference it took is given back
#[test]
fn test_failed_create_releases_reference() {
    let fixture = EngineFixture::new();
    let collab = fixture.collaborators().with_channel_name("");

    let result = medley_core::EngineInstance::create(Arc::clone(&fixture.global), collab);

    assert!(result.is_err());
    assert_eq!(fixture.global.refcount(), 0);
    assert_eq!(fixture.hooks.setups(), 1);
    assert_eq!(fixture.hooks.teardowns(), 1);
}
