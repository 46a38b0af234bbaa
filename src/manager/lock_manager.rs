use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use super::conflict;
use super::events::{EventHub, LockEvent};
use crate::active_lock::{ActiveLock, LockType, Timeout};
use crate::clock::{truncate_to_millis, Clock, SystemClock};
use crate::error::{ConflictingLock, LockConflict, LockError};
use crate::path;
use crate::rounding::TimeoutRounding;
use crate::store::{LockStore, LockTransaction};

/// Grants, refreshes and releases WebDAV locks on top of a [`LockStore`].
///
/// Every mutation runs inside one store transaction, so concurrent callers are
/// evaluated one after another against the state the previous caller
/// committed. Expired locks never block a grant.
///
/// By default a mutation waits as long as it takes for the store. With
/// [`with_max_wait`](Self::with_max_wait) it gives up instead and fails with
/// [`LockError::Busy`], leaving the store untouched.
///
/// ## Example
///
/// ```
/// use dav_locks::{InMemoryLockStore, LockManager, LockType, Timeout};
///
/// let manager = LockManager::new(InMemoryLockStore::new());
/// let lock = manager
///     .lock("/docs", true, LockType::Exclusive, Some("alice"), Timeout::seconds(60))
///     .unwrap();
///
/// let err = manager
///     .lock("/docs/a.txt", false, LockType::Shared, None, Timeout::seconds(60))
///     .unwrap_err();
/// assert_eq!(err.conflict().unwrap().tokens(), vec![lock.state_token()]);
///
/// manager.unlock(lock.state_token()).unwrap();
/// ```
pub struct LockManager<S> {
    store: S,
    clock: Arc<dyn Clock>,
    rounding: TimeoutRounding,
    max_wait: Option<Duration>,
    events: EventHub,
    drop_hooks: Mutex<Vec<DropHook>>,
}

type DropHook = Box<dyn FnOnce() + Send>;

impl<S: LockStore> LockManager<S> {
    /// A manager using the system clock and the default rounding policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            rounding: TimeoutRounding::default(),
            max_wait: None,
            events: EventHub::default(),
            drop_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_rounding(mut self, rounding: TimeoutRounding) -> Self {
        self.rounding = rounding;
        self
    }

    /// Give up on a mutation when the store stays busy for longer than `wait`.
    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = Some(wait);
        self
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rounding(&self) -> TimeoutRounding {
        self.rounding
    }

    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Receive every lock change committed from now on.
    pub fn subscribe(&self) -> Receiver<LockEvent> {
        self.events.subscribe()
    }

    /// Grant a new lock on `path`.
    ///
    /// Expired records are purged first. Fails with [`LockError::Conflict`]
    /// listing every overlapping lock that is incompatible with the request.
    pub fn lock(
        &self,
        path: &str,
        recursive: bool,
        lock_type: LockType,
        owner: Option<&str>,
        timeout: Timeout,
    ) -> Result<ActiveLock, LockError> {
        let path = path::normalize(path)?;
        let timeout = self.rounding.round(timeout);

        let mut tx = self.begin()?;
        let now = truncate_to_millis(self.clock.now());
        let (active, mut events) = purge_expired(&mut tx, now)?;

        let conflicts = conflict::find_conflicts(&active, &path, recursive, lock_type);
        if !conflicts.is_empty() {
            if !events.is_empty() {
                self.events.commit(tx, events)?;
            }
            let conflict = LockConflict { path, conflicts };
            tracing::debug!(path = %conflict.path, tokens = ?conflict.tokens(), "lock request conflicts");
            return Err(LockError::Conflict(conflict));
        }

        let lock = ActiveLock::new(
            new_state_token(),
            path,
            recursive,
            lock_type,
            owner.map(str::to_string),
            timeout,
            now,
        );
        tx.add(lock.clone())?;
        events.push(LockEvent::Acquired(lock.clone()));
        self.events.commit(tx, events)?;

        tracing::debug!(
            token = lock.state_token(),
            path = lock.path(),
            recursive,
            lock_type = %lock_type,
            "lock granted"
        );
        Ok(lock)
    }

    /// Extend the lease of an active lock.
    ///
    /// Only the expiry changes; token, path, depth, type and owner are kept.
    pub fn refresh(&self, state_token: &str, timeout: Timeout) -> Result<ActiveLock, LockError> {
        require_token(state_token)?;
        let timeout = self.rounding.round(timeout);

        let mut tx = self.begin()?;
        let now = truncate_to_millis(self.clock.now());
        let existing = tx
            .get(state_token)?
            .ok_or_else(|| LockError::NotFound(state_token.to_string()))?;
        if existing.is_expired(now) {
            return Err(LockError::Expired(state_token.to_string()));
        }

        let refreshed = existing.refreshed(now, timeout);
        tx.update(refreshed.clone())?;
        self.events
            .commit(tx, vec![LockEvent::Refreshed(refreshed.clone())])?;

        tracing::debug!(token = state_token, path = refreshed.path(), "lock refreshed");
        Ok(refreshed)
    }

    /// Release a lock. Unknown, already released and expired tokens all fail
    /// with [`LockError::NotFound`].
    pub fn unlock(&self, state_token: &str) -> Result<(), LockError> {
        self.release(state_token, None)
    }

    /// Release a lock, checking that it covers `path`.
    pub fn unlock_at(&self, path: &str, state_token: &str) -> Result<(), LockError> {
        let path = path::normalize(path)?;
        self.release(state_token, Some(&path))
    }

    fn release(&self, state_token: &str, path: Option<&str>) -> Result<(), LockError> {
        require_token(state_token)?;

        let mut tx = self.begin()?;
        let now = truncate_to_millis(self.clock.now());
        let existing = match tx.get(state_token)? {
            Some(lock) if !lock.is_expired(now) => lock,
            _ => return Err(LockError::NotFound(state_token.to_string())),
        };
        if let Some(path) = path {
            if !existing.covers(path) {
                return Err(LockError::RangeMismatch {
                    token: state_token.to_string(),
                    path: path.to_string(),
                });
            }
        }

        tx.remove(state_token)?;
        tracing::debug!(token = state_token, path = existing.path(), "lock released");
        self.events.commit(tx, vec![LockEvent::Released(existing)])?;
        Ok(())
    }

    /// Unexpired locks affecting `path`: its own locks, recursive ancestor locks
    /// reaching it and, with `recursive_query`, locks anywhere beneath it.
    pub fn get_active_locks(
        &self,
        path: &str,
        recursive_query: bool,
    ) -> Result<Vec<ActiveLock>, LockError> {
        Ok(self
            .get_affected_locks(path, recursive_query, true)?
            .into_iter()
            .map(|entry| entry.lock)
            .collect())
    }

    /// Unexpired locks affecting `path`, tagged with how they relate to it.
    pub fn get_affected_locks(
        &self,
        path: &str,
        find_children: bool,
        find_parents: bool,
    ) -> Result<Vec<ConflictingLock>, LockError> {
        let path = path::normalize(path)?;
        let active = self.active_snapshot()?;
        Ok(conflict::affected(active, &path, find_children, find_parents))
    }

    /// Every unexpired lock, ordered by path then token.
    pub fn all_active_locks(&self) -> Result<Vec<ActiveLock>, LockError> {
        let mut locks = self.active_snapshot()?;
        locks.sort_by(|a, b| {
            a.path()
                .cmp(b.path())
                .then_with(|| a.state_token().cmp(b.state_token()))
        });
        Ok(locks)
    }

    /// Look up an unexpired lock by token without opening a transaction.
    pub fn find_lock(&self, state_token: &str) -> Result<Option<ActiveLock>, LockError> {
        Ok(self
            .active_snapshot()?
            .into_iter()
            .find(|lock| lock.state_token() == state_token))
    }

    /// Check that a write to `path` (and, if `recursive`, everything beneath
    /// it) is permitted given the submitted lock tokens.
    ///
    /// Each locked root path affected by the operation needs at least one of
    /// its lock tokens submitted. Read-only.
    pub fn check_submitted_tokens(
        &self,
        path: &str,
        recursive: bool,
        tokens: &[&str],
    ) -> Result<(), LockError> {
        let path = path::normalize(path)?;
        let affecting = conflict::affected(self.active_snapshot()?, &path, recursive, true);
        let missing = conflict::unsatisfied(affecting, tokens);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LockError::Conflict(LockConflict {
                path,
                conflicts: missing,
            }))
        }
    }

    /// Remove every lock that expired before `now`. Returns how many were removed.
    pub fn sweep_expired(&self, now: SystemTime) -> Result<usize, LockError> {
        let mut tx = self.begin()?;
        let (_, events) = purge_expired(&mut tx, now)?;
        if events.is_empty() {
            return Ok(0);
        }

        let removed = events.len();
        self.events.commit(tx, events)?;
        tracing::info!(removed, "swept expired locks");
        Ok(removed)
    }

    /// [`sweep_expired`](Self::sweep_expired) at the manager's current time.
    pub fn sweep_expired_now(&self) -> Result<usize, LockError> {
        self.sweep_expired(self.clock.now())
    }

    /// Run `hook` once when the manager is dropped.
    pub(crate) fn on_drop(&self, hook: impl FnOnce() + Send + 'static) {
        self.drop_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    fn begin(&self) -> Result<S::Transaction<'_>, LockError> {
        match self.max_wait {
            None => Ok(self.store.begin()?),
            Some(wait) => self
                .store
                .begin_timeout(wait)?
                .ok_or(LockError::Busy(wait)),
        }
    }

    fn active_snapshot(&self) -> Result<Vec<ActiveLock>, LockError> {
        let now = self.clock.now();
        Ok(self
            .store
            .snapshot()?
            .into_iter()
            .filter(|lock| !lock.is_expired(now))
            .collect())
    }
}

impl<S> Drop for LockManager<S> {
    fn drop(&mut self) {
        let hooks = std::mem::take(
            self.drop_hooks
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for hook in hooks {
            hook();
        }
    }
}

/// Remove expired locks inside `tx`, returning the survivors and an `Expired`
/// event per removed lock.
fn purge_expired<T: LockTransaction>(
    tx: &mut T,
    now: SystemTime,
) -> Result<(Vec<ActiveLock>, Vec<LockEvent>), LockError> {
    let mut active = Vec::new();
    let mut events = Vec::new();
    for lock in tx.list()? {
        if lock.is_expired(now) {
            tx.remove(lock.state_token())?;
            tracing::debug!(token = lock.state_token(), path = lock.path(), "lock expired");
            events.push(LockEvent::Expired(lock));
        } else {
            active.push(lock);
        }
    }
    Ok((active, events))
}

fn require_token(state_token: &str) -> Result<(), LockError> {
    if state_token.trim().is_empty() {
        return Err(LockError::InvalidArgument(
            "state token must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// A fresh `urn:uuid:` state token carrying 128 random bits.
pub fn new_state_token() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}
