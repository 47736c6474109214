use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rstest::rstest;
use serial_test::serial;

use shared_upgrade::{FutureExtension, Owned, Shared, Upgrade, UpgradeError};

// Instrumented payload: counts drops so both teardown paths can be checked
// for exactly-once destruction.
//
struct Payload {
    marker: usize,
    drops: Arc<AtomicUsize>,
}

impl Payload {
    fn new(marker: usize, drops: &Arc<AtomicUsize>) -> Self {
        Payload {
            marker,
            drops: Arc::clone(drops),
        }
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_upgrade_on_empty_handle_is_immediate_empty_success() {
    let mut shared = Shared::<i32>::none();

    let upgrade = shared.upgrade();
    assert!(upgrade.is_resolved());

    let owned = upgrade.unwrap_result().unwrap();
    assert_eq!(owned.get(), None);
}

#[test]
fn test_sole_holder_upgrade_resolves_synchronously() {
    let mut shared = Shared::new(13);

    let upgrade = shared.upgrade();

    // The upgrading handle was the last reference; its own release already
    // ran the teardown.
    assert_eq!(shared.get(), None);
    assert!(upgrade.is_resolved());

    let owned = upgrade.unwrap_result().unwrap();
    assert_eq!(owned.get(), Some(&13));
}

#[test]
fn test_second_upgrade_fails_and_keeps_reference() {
    let mut first = Shared::new(1);
    let mut second = first.clone();

    let upgrade = first.upgrade();
    assert!(!upgrade.is_resolved());

    let conflict = second.upgrade().unwrap_result();
    assert_eq!(conflict.unwrap_err(), UpgradeError::AlreadyInProgress);

    // The loser keeps its reference and can still read.
    assert_eq!(second.get(), Some(&1));

    // Retrying is deterministic: the flag never reverts.
    let retry = second.upgrade().unwrap_result();
    assert_eq!(retry.unwrap_err(), UpgradeError::AlreadyInProgress);

    second.reset();
    assert_eq!(upgrade.unwrap_result().unwrap().get(), Some(&1));
}

#[test]
fn test_upgrade_resolves_on_last_release() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut shared = Shared::new(Payload::new(99, &drops));
    let clone_a = shared.clone();
    let clone_b = shared.clone();

    let upgrade = shared.upgrade();
    assert!(!upgrade.is_resolved());

    drop(clone_a);
    assert!(!upgrade.is_resolved());

    drop(clone_b);
    assert!(upgrade.is_resolved());

    let owned = upgrade.unwrap_result().unwrap();
    assert_eq!(owned.marker, 99);

    // Transferred, not destroyed: only dropping the Owned frees the value.
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(owned);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

// The scenario from the contract: upgrade via h1, release via h2, then
// upgrade the now-empty h2.
//
#[test]
fn test_upgrade_then_release_then_empty_upgrade() {
    let mut h1 = Shared::new(String::from("content"));
    let mut h2 = h1.clone();

    let future = h1.upgrade();
    assert!(!future.is_resolved());

    h2.reset();

    let owned = future.wait_result().unwrap();
    assert_eq!(owned.get(), Some(&String::from("content")));

    let empty = h2.upgrade();
    assert!(empty.is_resolved());
    assert_eq!(empty.unwrap_result().unwrap().get(), None);
}

#[test]
fn test_resolution_delivered_by_other_thread() {
    let mut shared = Shared::new(vec![1, 2, 3]);
    let clone = shared.clone();

    let upgrade = shared.upgrade();

    let releaser = thread::spawn(move || {
        // Hold the last reference briefly, then release it; this thread
        // runs the teardown and wakes the waiter.
        thread::sleep(std::time::Duration::from_millis(50));
        drop(clone);
    });

    let owned = upgrade.wait_result().unwrap();
    assert_eq!(owned.get(), Some(&vec![1, 2, 3]));

    releaser.join().unwrap();
}

#[rstest]
#[serial(upgrade_race)]
#[case::single(1)]
#[case::pair(2)]
#[case::small_group(8)]
#[case::thundering_herd(64)]
fn test_exactly_one_upgrade_wins(#[case] num_threads: usize) {
    let drops = Arc::new(AtomicUsize::new(0));
    let shared = Shared::new(Payload::new(7, &drops));
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let mut clone = shared.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // All threads attempt the CAS as close together as possible.
                barrier.wait();
                clone.upgrade()
            })
        })
        .collect();

    let upgrades: Vec<Upgrade<Payload>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Release the original handle; every thread's own handle was either
    // consumed by the winning upgrade or dropped with its closure.
    drop(shared);

    let mut winners = 0;
    let mut losers = 0;
    for upgrade in upgrades {
        match upgrade.wait_result() {
            Ok(owned) => {
                assert_eq!(owned.marker, 7);
                winners += 1;
            }
            Err(UpgradeError::AlreadyInProgress) => losers += 1,
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(losers, num_threads - 1);

    // The payload was moved into exactly one Owned and dropped with it.
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[rstest]
#[serial(upgrade_race)]
#[case::pair(2)]
#[case::small_group(8)]
fn test_winner_resolves_under_concurrent_readers(#[case] num_readers: usize) {
    let shared = Shared::new(0xdead_beefusize);
    let barrier = Arc::new(Barrier::new(num_readers + 1));

    let readers: Vec<_> = (0..num_readers)
        .map(|_| {
            let clone = shared.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..1000 {
                    assert_eq!(*clone, 0xdead_beefusize);
                }
                // clone dropped here; some reader performs the last release.
            })
        })
        .collect();

    let mut upgrader = shared.clone();
    drop(shared);

    barrier.wait();
    let upgrade = upgrader.upgrade();

    let owned: Owned<usize> = upgrade.wait_result().unwrap();
    assert_eq!(owned.get(), Some(&0xdead_beefusize));

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_no_upgrade_teardown_destroys_value_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let shared = Shared::new(Payload::new(0, &drops));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let clone = shared.clone();
            thread::spawn(move || drop(clone))
        })
        .collect();

    drop(shared);
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropping_unpolled_upgrade_frees_value() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut shared = Shared::new(Payload::new(0, &drops));

    let upgrade = shared.upgrade();
    assert!(upgrade.is_resolved());

    // Never polled; the delivered Owned is dropped with the future.
    drop(upgrade);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
