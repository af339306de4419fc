use std::thread;
use std::time::Duration;

use lockyard_core::{
    LockError, LockManager, LockManagerConfig, NoopLockTracer, ResourceType, WaitSet,
};

const NODE: ResourceType = ResourceType(0);
const SCHEMA: ResourceType = ResourceType(1);
const TRACER: NoopLockTracer = NoopLockTracer;

fn manager() -> LockManager {
    LockManager::with_resource_types(2, LockManagerConfig::default())
}

#[test]
fn close_releases_every_held_lock() {
    let manager = manager();
    let mut c1 = manager.new_client().expect("c1");
    let mut c2 = manager.new_client().expect("c2");

    c1.acquire_shared(&TRACER, NODE, &[1, 2]).expect("shared");
    c1.acquire_exclusive(&TRACER, SCHEMA, &[3]).expect("exclusive");
    // Held in both modes: close must skip the downgrade protocol.
    c1.acquire_exclusive(&TRACER, NODE, &[4]).expect("exclusive");
    c1.acquire_shared(&TRACER, NODE, &[4]).expect("shared on top");

    c1.close().expect("close");

    assert_eq!(manager.resource_count(NODE), 0);
    assert_eq!(manager.resource_count(SCHEMA), 0);

    // Everything is immediately acquirable by someone else.
    for id in [1, 2, 4] {
        assert!(c2.try_exclusive(NODE, id).expect("freed resource"));
    }
    assert!(c2.try_exclusive(SCHEMA, 3).expect("freed schema resource"));

    c2.close().expect("close c2");
    assert_eq!(manager.resource_count(NODE), 0);
}

#[test]
fn close_leaves_shared_locks_to_their_other_holders() {
    let manager = manager();
    let mut c1 = manager.new_client().expect("c1");
    let mut c2 = manager.new_client().expect("c2");

    c1.acquire_shared(&TRACER, NODE, &[7]).expect("c1 shared");
    c2.acquire_shared(&TRACER, NODE, &[7]).expect("c2 shared");

    c1.close().expect("close c1");

    let entry = manager.lock_entry(NODE, 7).expect("survives c1");
    assert_eq!(
        entry.as_shared().expect("shared").holder_ids(),
        vec![c2.lock_session_id()]
    );

    c2.release_shared(NODE, 7).expect("c2 release");
    assert!(manager.lock_entry(NODE, 7).is_none());
    c2.close().expect("close c2");
}

#[test]
fn drop_is_a_close() {
    let manager = manager();
    {
        let mut client = manager.new_client().expect("client");
        client.acquire_exclusive(&TRACER, NODE, &[5]).expect("exclusive");
    }
    assert!(manager.lock_entry(NODE, 5).is_none());
}

#[test]
fn close_handles_a_wide_spread_of_locks() {
    // Exercises the reallocate-on-close path for count maps past the
    // clear-in-place threshold.
    let manager = manager();
    let mut client = manager.new_client().expect("client");

    let ids: Vec<u64> = (0..40).collect();
    client.acquire_exclusive(&TRACER, NODE, &ids).expect("wide acquire");
    assert_eq!(manager.resource_count(NODE), 40);

    client.close().expect("close");
    assert_eq!(manager.resource_count(NODE), 0);
}

#[test]
fn release_after_stop_is_rejected_but_close_still_sweeps() {
    let manager = manager();
    let mut client = manager.new_client().expect("client");

    client.acquire_shared(&TRACER, NODE, &[6]).expect("shared");
    client.stop();

    assert!(matches!(
        client.release_shared(NODE, 6),
        Err(LockError::ClientStopped { .. })
    ));
    assert!(matches!(
        client.acquire_shared(&TRACER, NODE, &[6]),
        Err(LockError::ClientStopped { .. })
    ));

    client.close().expect("close still releases");
    assert!(manager.lock_entry(NODE, 6).is_none());
}

#[test]
fn pooled_reuse_starts_from_a_clean_slate() {
    let manager = manager();
    let mut first = manager.new_client().expect("first");
    let first_id = first.lock_session_id();

    first.acquire_exclusive(&TRACER, NODE, &[1]).expect("exclusive");
    first.stop();
    first.close().expect("close");

    let mut reused = manager.new_client().expect("reused");
    assert_eq!(reused.lock_session_id(), first_id);
    assert_eq!(reused.lock_count(), 0);
    assert!(reused.active_locks().is_empty());

    // The stopped bit from the previous session must not leak in.
    reused.acquire_exclusive(&TRACER, NODE, &[1]).expect("fresh session acquires");
    reused.close().expect("close reused");
}

#[test]
fn stop_drains_in_flight_operations_before_returning() {
    let manager = LockManager::with_resource_types(1, LockManagerConfig::default());
    let mut blocker = manager.new_client().expect("blocker");
    let mut waiter = manager.new_client().expect("waiter");
    let waiter_handle = std::sync::Arc::clone(waiter.handle());

    blocker.acquire_exclusive(&TRACER, NODE, &[1]).expect("hold");

    let waiting = thread::spawn(move || {
        let outcome = waiter.acquire_exclusive(&TRACER, NODE, &[1]);
        (waiter, outcome)
    });

    thread::sleep(Duration::from_millis(20));
    waiter_handle.stop();
    // Once stop returns, no operation is inside the client.
    assert!(waiter_handle.is_stopped());

    let (waiter, outcome) = waiting.join().expect("waiter thread");
    assert!(matches!(outcome, Err(LockError::ClientStopped { .. })));

    waiter.close().expect("close waiter");
    blocker.close().expect("close blocker");
}

#[test]
fn wait_list_snapshot_can_be_copied_out() {
    let manager = manager();
    let client = manager.new_client().expect("client");

    let snapshot = WaitSet::with_capacity(LockManagerConfig::MAX_CLIENTS);
    client.copy_wait_list_to(&snapshot);
    assert_eq!(snapshot.size(), 0, "an idle client waits for nobody");
    assert_eq!(client.wait_list_size(), 0);

    client.close().expect("close");
}
