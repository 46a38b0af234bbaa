//! Invariants that must hold for any sequence of operations.

use std::collections::HashSet;
use std::time::Duration;

use dav_locks::{ActiveLock, Clock, LockError, LockType, Timeout};
use proptest::prelude::*;

use crate::support::{for_each_backend, in_memory};

const PATHS: &[&str] = &[
    "/",
    "/docs",
    "/docs/a.txt",
    "/docs/b.txt",
    "/docs/sub",
    "/docs/sub/c.txt",
    "/other",
];

#[derive(Debug, Clone)]
enum Op {
    Lock {
        path: usize,
        recursive: bool,
        exclusive: bool,
        timeout_secs: u64,
    },
    Refresh {
        nth: usize,
        timeout_secs: u64,
    },
    Unlock {
        nth: usize,
    },
    Advance {
        secs: u64,
    },
    Sweep,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..PATHS.len(), any::<bool>(), any::<bool>(), 1u64..30).prop_map(
            |(path, recursive, exclusive, timeout_secs)| Op::Lock {
                path,
                recursive,
                exclusive,
                timeout_secs,
            }
        ),
        1 => (0usize..8, 1u64..30).prop_map(|(nth, timeout_secs)| Op::Refresh { nth, timeout_secs }),
        1 => (0usize..8).prop_map(|nth| Op::Unlock { nth }),
        1 => (1u64..20).prop_map(|secs| Op::Advance { secs }),
        1 => Just(Op::Sweep),
    ]
}

/// Two locks may coexist only if they do not overlap or are both shared.
fn compatible(a: &ActiveLock, b: &ActiveLock) -> bool {
    let overlap = a.covers(b.path()) || b.covers(a.path());
    !overlap || (a.lock_type() == LockType::Shared && b.lock_type() == LockType::Shared)
}

fn assert_conflict_free(locks: &[ActiveLock]) {
    for (i, a) in locks.iter().enumerate() {
        for b in &locks[i + 1..] {
            assert!(compatible(a, b), "incompatible locks coexist: {:?} and {:?}", a, b);
        }
    }
}

fn assert_unique_tokens(locks: &[ActiveLock]) {
    let tokens: HashSet<&str> = locks.iter().map(ActiveLock::state_token).collect();
    assert_eq!(tokens.len(), locks.len());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: no sequence of operations produces incompatible or duplicate locks,
    /// and refreshes never change a lock's identity.
    #[test]
    fn random_operations_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let fx = in_memory();
        let mut issued: Vec<ActiveLock> = Vec::new();

        for op in ops {
            match op {
                Op::Lock { path, recursive, exclusive, timeout_secs } => {
                    let lock_type = if exclusive { LockType::Exclusive } else { LockType::Shared };
                    match fx.manager.lock(PATHS[path], recursive, lock_type, None, Timeout::seconds(timeout_secs)) {
                        Ok(lock) => issued.push(lock),
                        Err(LockError::Conflict(conflict)) => prop_assert!(!conflict.conflicts.is_empty()),
                        Err(err) => return Err(TestCaseError::fail(err.to_string())),
                    }
                }
                Op::Refresh { nth, timeout_secs } => {
                    if let Some(original) = issued.get(nth) {
                        if let Ok(refreshed) = fx.manager.refresh(original.state_token(), Timeout::seconds(timeout_secs)) {
                            prop_assert_eq!(refreshed.state_token(), original.state_token());
                            prop_assert_eq!(refreshed.path(), original.path());
                            prop_assert_eq!(refreshed.recursive(), original.recursive());
                            prop_assert_eq!(refreshed.lock_type(), original.lock_type());
                            prop_assert_eq!(refreshed.owner(), original.owner());
                        }
                    }
                }
                Op::Unlock { nth } => {
                    if let Some(lock) = issued.get(nth) {
                        let _ = fx.manager.unlock(lock.state_token());
                    }
                }
                Op::Advance { secs } => fx.clock.advance(Duration::from_secs(secs)),
                Op::Sweep => {
                    let now = fx.clock.now();
                    fx.manager.sweep_expired(now).unwrap();
                    let remaining = fx.manager.all_active_locks().unwrap();
                    for lock in &remaining {
                        prop_assert!(!lock.is_expired(now));
                    }
                }
            }

            let active = fx.manager.all_active_locks().unwrap();
            assert_conflict_free(&active);
            assert_unique_tokens(&active);
        }
    }
}

#[test]
fn unlock_twice_fails_the_second_time() {
    for_each_backend(|fx| {
        let lock = fx
            .manager
            .lock("/docs", false, LockType::Exclusive, None, Timeout::seconds(60))
            .unwrap();

        fx.manager.unlock(lock.state_token()).unwrap();
        assert!(
            matches!(fx.manager.unlock(lock.state_token()), Err(LockError::NotFound(_))),
            "{}",
            fx.name
        );
        assert!(matches!(
            fx.manager.refresh(lock.state_token(), Timeout::seconds(60)),
            Err(LockError::NotFound(_))
        ));
    });
}

#[test]
fn sweep_leaves_no_expired_records() {
    for_each_backend(|fx| {
        for (i, secs) in [1u64, 2, 3, 10, 20].into_iter().enumerate() {
            fx.manager
                .lock(
                    &format!("/file-{}", i),
                    false,
                    LockType::Exclusive,
                    None,
                    Timeout::seconds(secs),
                )
                .unwrap();
        }
        fx.manager
            .lock("/pinned", false, LockType::Exclusive, None, Timeout::Infinite)
            .unwrap();

        fx.clock.advance(Duration::from_millis(5_500));
        let now = fx.clock.now();
        assert_eq!(fx.manager.sweep_expired(now).unwrap(), 3, "{}", fx.name);

        let remaining = fx.manager.all_active_locks().unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|lock| !lock.is_expired(now)));
    });
}

#[test]
fn tokens_are_unique_across_many_grants() {
    let fx = in_memory();
    let locks: Vec<ActiveLock> = (0..200)
        .map(|i| {
            fx.manager
                .lock(&format!("/f/{}", i), false, LockType::Shared, None, Timeout::seconds(60))
                .unwrap()
        })
        .collect();
    assert_unique_tokens(&locks);
}
