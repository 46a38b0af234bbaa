use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "sqlite")]
use dav_locks::SqliteLockStore;
use dav_locks::{
    AnyLockStore, InMemoryLockStore, LockError, LockEvent, LockManager, LockStore, LockType,
    Timeout,
};
#[cfg(feature = "sqlite")]
use tempfile::TempDir;

fn race_for_exclusive(manager: Arc<LockManager<AnyLockStore>>) {
    const THREADS: usize = 8;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.lock(
                    "/shared/report.odt",
                    false,
                    LockType::Exclusive,
                    Some(&format!("client-{}", i)),
                    Timeout::seconds(60),
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);

    for result in &results {
        if let Err(err) = result {
            let conflict = err.conflict().expect("losers see a conflict");
            assert!(conflict.contains(winners[0].state_token()));
        }
    }
    assert_eq!(manager.all_active_locks().unwrap().len(), 1);
}

#[test]
fn exactly_one_exclusive_wins_in_memory() {
    race_for_exclusive(Arc::new(LockManager::new(InMemoryLockStore::new().into())));
}

#[cfg(feature = "sqlite")]
#[test]
fn exactly_one_exclusive_wins_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = SqliteLockStore::open(dir.path().join("locks.db")).unwrap();
    race_for_exclusive(Arc::new(LockManager::new(store.into())));
}

#[test]
fn shared_locks_all_succeed_under_contention() {
    let manager = Arc::new(LockManager::new(InMemoryLockStore::new()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager.lock("/shared", true, LockType::Shared, None, Timeout::seconds(60))
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(manager.all_active_locks().unwrap().len(), 8);
}

#[test]
fn writers_on_disjoint_paths_do_not_interfere() {
    let manager = Arc::new(LockManager::new(InMemoryLockStore::new()));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let path = format!("/users/{}", i);
                for _ in 0..20 {
                    let lock = manager
                        .lock(&path, true, LockType::Exclusive, None, Timeout::seconds(60))
                        .unwrap();
                    manager.unlock(lock.state_token()).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(manager.all_active_locks().unwrap().is_empty());
}

#[test]
fn abandoned_wait_leaves_store_untouched() {
    let manager = LockManager::new(InMemoryLockStore::new());
    manager
        .lock("/a", false, LockType::Exclusive, None, Timeout::seconds(60))
        .unwrap();

    let store = manager.store();
    let generation = store.generation().unwrap();
    let held = store.begin().unwrap();
    assert!(store.begin_timeout(Duration::from_millis(20)).unwrap().is_none());
    drop(held);

    assert_eq!(store.generation().unwrap(), generation);
    assert_eq!(manager.all_active_locks().unwrap().len(), 1);
}

#[test]
fn lock_waits_for_an_open_transaction() {
    let manager = Arc::new(LockManager::new(InMemoryLockStore::new()));
    let held = manager.store().clone();
    let tx = held.begin().unwrap();

    let waiter = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            manager.lock("/a", false, LockType::Exclusive, None, Timeout::seconds(60))
        })
    };

    thread::sleep(Duration::from_millis(30));
    assert!(!waiter.is_finished());
    drop(tx);

    let lock = waiter.join().unwrap().unwrap();
    assert!(matches!(
        manager.lock("/a", false, LockType::Shared, None, Timeout::seconds(60)),
        Err(LockError::Conflict(c)) if c.contains(lock.state_token())
    ));
}

#[test]
fn abandoned_manager_wait_changes_nothing() {
    let manager =
        LockManager::new(InMemoryLockStore::new()).with_max_wait(Duration::from_millis(25));
    let lock = manager
        .lock("/a", false, LockType::Exclusive, None, Timeout::seconds(60))
        .unwrap();
    let generation = manager.store().generation().unwrap();
    let events = manager.subscribe();

    let blocker = manager.store().clone();
    let held = blocker.begin().unwrap();
    let started = Instant::now();
    let err = manager
        .lock("/b", false, LockType::Exclusive, None, Timeout::seconds(60))
        .unwrap_err();
    assert!(matches!(err, LockError::Busy(_)));
    assert!(started.elapsed() >= Duration::from_millis(25));
    assert!(matches!(manager.unlock(lock.state_token()), Err(LockError::Busy(_))));
    drop(held);

    assert_eq!(manager.store().generation().unwrap(), generation);
    assert!(events.try_recv().is_err());
    assert_eq!(manager.all_active_locks().unwrap(), vec![lock]);
}

#[test]
fn events_arrive_in_commit_order() {
    const THREADS: usize = 6;
    const ROUNDS: usize = 50;

    let manager = Arc::new(LockManager::new(InMemoryLockStore::new()));
    let events = manager.subscribe();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    if let Ok(lock) =
                        manager.lock("/hot", false, LockType::Exclusive, None, Timeout::seconds(60))
                    {
                        manager.unlock(lock.state_token()).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Replaying the stream must never show two exclusive holders at once.
    let mut holder: Option<String> = None;
    let mut grants = 0;
    for event in events.try_iter() {
        match event {
            LockEvent::Acquired(lock) => {
                assert_eq!(holder, None, "granted {} while held", lock.state_token());
                holder = Some(lock.state_token().to_string());
                grants += 1;
            }
            LockEvent::Released(lock) => {
                assert_eq!(holder.as_deref(), Some(lock.state_token()));
                holder = None;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(holder, None);
    assert!(grants > 0);
}
