//! Lock coverage and conflict evaluation.
//!
//! A lock covers its own path, plus every descendant when recursive. Two locks
//! overlap when one covers the root path of the other, and overlapping locks
//! conflict unless both are shared.

use std::collections::{BTreeMap, HashSet};

use crate::active_lock::{ActiveLock, LockType};
use crate::error::{ConflictingLock, LockRelation};
use crate::path;

/// The region a request or query touches: `path`, plus everything beneath it
/// when `recursive`.
pub(crate) struct Scope<'a> {
    path: &'a str,
    recursive: bool,
    ancestors: HashSet<&'a str>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(path: &'a str, recursive: bool) -> Self {
        let mut ancestors: HashSet<&str> = path::ancestors(path).into_iter().collect();
        ancestors.remove(path);
        Self {
            path,
            recursive,
            ancestors,
        }
    }

    /// How `existing` relates to this scope, if the two overlap.
    pub(crate) fn relation(&self, existing: &ActiveLock) -> Option<LockRelation> {
        if existing.path() == self.path {
            Some(LockRelation::SamePath)
        } else if existing.recursive() && self.ancestors.contains(existing.path()) {
            Some(LockRelation::Ancestor)
        } else if self.recursive && path::is_self_or_descendant(existing.path(), self.path) {
            Some(LockRelation::Descendant)
        } else {
            None
        }
    }
}

/// Every lock in `active` that rules out granting the request.
pub(crate) fn find_conflicts(
    active: &[ActiveLock],
    path: &str,
    recursive: bool,
    lock_type: LockType,
) -> Vec<ConflictingLock> {
    let scope = Scope::new(path, recursive);
    active
        .iter()
        .filter(|existing| {
            existing.lock_type() == LockType::Exclusive || lock_type == LockType::Exclusive
        })
        .filter_map(|existing| {
            scope.relation(existing).map(|relation| ConflictingLock {
                lock: existing.clone(),
                relation,
            })
        })
        .collect()
}

/// Locks that affect `path`: those rooted at it, recursive ancestors reaching
/// it (`find_parents`) and those rooted beneath it (`find_children`).
pub(crate) fn affected(
    active: Vec<ActiveLock>,
    path: &str,
    find_children: bool,
    find_parents: bool,
) -> Vec<ConflictingLock> {
    let scope = Scope::new(path, find_children);
    let mut out: Vec<ConflictingLock> = active
        .into_iter()
        .filter_map(|lock| {
            let relation = scope.relation(&lock)?;
            if relation == LockRelation::Ancestor && !find_parents {
                return None;
            }
            Some(ConflictingLock { lock, relation })
        })
        .collect();
    out.sort_by(|a, b| {
        a.lock
            .path()
            .cmp(b.lock.path())
            .then_with(|| a.lock.state_token().cmp(b.lock.state_token()))
    });
    out
}

/// Locks whose root path has no submitted token among its locks.
pub(crate) fn unsatisfied(affecting: Vec<ConflictingLock>, tokens: &[&str]) -> Vec<ConflictingLock> {
    let mut by_root: BTreeMap<String, Vec<ConflictingLock>> = BTreeMap::new();
    for entry in affecting {
        by_root
            .entry(entry.lock.path().to_string())
            .or_default()
            .push(entry);
    }

    by_root
        .into_values()
        .filter(|group| {
            !group
                .iter()
                .any(|entry| tokens.contains(&entry.lock.state_token()))
        })
        .flatten()
        .collect()
}
