//! Keyed intake store — per-user locking without a global lock.
//!
//! Users are spread over a fixed number of shards. A shard lock is held only
//! to look up or insert a user's entry; the entry's own mutex serializes that
//! user's transitions. Tokio mutexes queue waiters in FIFO order, so a user's
//! messages are handled in arrival order.
//!
//! Entries leave the store on reset or when [`IntakeStore::expire_idle`]
//! finds them idle past their [`ExpiryPolicy`] TTL. An entry another task
//! holds or waits on is never removed.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::state::{IntakeState, UserIntake};
use crate::documents::NormalizedRecord;
use crate::error::StateError;

/// Default shard count.
const DEFAULT_SHARDS: usize = 16;

/// How long idle entries are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Any intake untouched this long is dropped.
    pub idle_ttl: Duration,
    /// Complete intakes are dropped after this much idle time. Their records
    /// were synced when they arrived.
    pub complete_ttl: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(24 * 60 * 60),
            complete_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl ExpiryPolicy {
    fn is_expired(&self, slot: &Slot, now: Instant) -> bool {
        let idle = now.saturating_duration_since(slot.last_active);
        let ttl = if slot.intake.is_complete() {
            self.complete_ttl.min(self.idle_ttl)
        } else {
            self.idle_ttl
        };
        idle >= ttl
    }
}

/// A user's intake plus when it was last locked.
struct Slot {
    intake: UserIntake,
    last_active: Instant,
}

type Entry = Arc<Mutex<Slot>>;
type Shard = RwLock<HashMap<String, Entry>>;

/// Exclusive access to one user's intake.
pub struct IntakeGuard {
    /// Whether this call created the intake (first contact).
    pub created: bool,
    guard: OwnedMutexGuard<Slot>,
}

impl std::ops::Deref for IntakeGuard {
    type Target = UserIntake;

    fn deref(&self) -> &UserIntake {
        &self.guard.intake
    }
}

impl std::ops::DerefMut for IntakeGuard {
    fn deref_mut(&mut self) -> &mut UserIntake {
        &mut self.guard.intake
    }
}

/// All user intakes, keyed by messaging-channel user id.
pub struct IntakeStore {
    shards: Vec<Shard>,
}

impl IntakeStore {
    pub fn new() -> Arc<Self> {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub fn with_shards(count: usize) -> Arc<Self> {
        let shards = (0..count.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Arc::new(Self { shards })
    }

    fn shard(&self, user_id: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    async fn existing(&self, user_id: &str) -> Option<Entry> {
        self.shard(user_id).read().await.get(user_id).cloned()
    }

    /// Get the user's entry, creating it lazily in `AwaitingId`.
    async fn entry(&self, user_id: &str) -> (Entry, bool) {
        if let Some(entry) = self.existing(user_id).await {
            return (entry, false);
        }

        let mut shard = self.shard(user_id).write().await;
        // Another task may have inserted between the read and write locks.
        if let Some(entry) = shard.get(user_id) {
            return (Arc::clone(entry), false);
        }
        let entry = Arc::new(Mutex::new(Slot {
            intake: UserIntake::new(),
            last_active: Instant::now(),
        }));
        shard.insert(user_id.to_string(), Arc::clone(&entry));
        info!(user_id, "New intake started");
        (entry, true)
    }

    /// Lock the user's intake for the duration of one message.
    pub async fn lock(&self, user_id: &str) -> IntakeGuard {
        let (entry, created) = self.entry(user_id).await;
        let mut guard = entry.lock_owned().await;
        guard.last_active = Instant::now();
        IntakeGuard { created, guard }
    }

    /// Record a classified document and advance the user's state.
    pub async fn on_document_classified(
        &self,
        user_id: &str,
        record: NormalizedRecord,
    ) -> Result<IntakeState, StateError> {
        let mut intake = self.lock(user_id).await;
        advance(user_id, &mut intake, record)
    }

    /// Whether the user has submitted every document. Unknown users are not.
    pub async fn is_complete(&self, user_id: &str) -> bool {
        match self.existing(user_id).await {
            Some(entry) => entry.lock().await.intake.is_complete(),
            None => false,
        }
    }

    /// Current state, if the user has an intake.
    pub async fn state(&self, user_id: &str) -> Option<IntakeState> {
        let entry = self.existing(user_id).await?;
        let state = entry.lock().await.intake.state();
        Some(state)
    }

    /// Reset the user back to `AwaitingId` and drop the intake. If another
    /// message for the user is in flight the reset entry stays in place.
    pub async fn reset(&self, user_id: &str) -> Result<(), StateError> {
        let entry = self.existing(user_id).await.ok_or_else(|| StateError::UnknownUser {
            user_id: user_id.to_string(),
        })?;
        entry.lock().await.intake.reset();
        drop(entry);
        self.remove(user_id).await;
        info!(user_id, "Intake reset");
        Ok(())
    }

    /// Drop the user's intake unless another task holds or awaits it.
    /// Returns whether an entry was removed.
    pub async fn remove(&self, user_id: &str) -> bool {
        let mut shard = self.shard(user_id).write().await;
        // New references are only taken under a shard lock, so a count of one
        // means nobody else holds or waits on the entry.
        match shard.get(user_id) {
            Some(entry) if Arc::strong_count(entry) == 1 => {
                shard.remove(user_id);
                debug!(user_id, "Intake removed");
                true
            }
            _ => false,
        }
    }

    /// Drop every idle intake past its TTL. Returns how many were dropped.
    pub async fn expire_idle(&self, policy: &ExpiryPolicy) -> usize {
        let now = Instant::now();
        let mut expired = 0;
        for shard in &self.shards {
            let mut shard = shard.write().await;
            let before = shard.len();
            shard.retain(|_, entry| {
                if Arc::strong_count(entry) > 1 {
                    return true;
                }
                match entry.try_lock() {
                    Ok(slot) => !policy.is_expired(&slot, now),
                    Err(_) => true,
                }
            });
            expired += before - shard.len();
        }
        if expired > 0 {
            info!(expired, "Expired idle intakes");
        }
        expired
    }

    /// Number of users with an intake.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Spawn a background task that periodically expires idle intakes.
pub fn spawn_expiry_task(
    store: Arc<IntakeStore>,
    policy: ExpiryPolicy,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            store.expire_idle(&policy).await;
        }
    })
}

/// Apply a classified record to a locked intake.
pub fn advance(
    user_id: &str,
    intake: &mut UserIntake,
    record: NormalizedRecord,
) -> Result<IntakeState, StateError> {
    let document_type = record.document_type();
    let from = intake.state();
    let to = intake
        .record_document(record)
        .map_err(|_| StateError::AlreadyComplete {
            user_id: user_id.to_string(),
        })?;

    if from.expected_document() != Some(document_type) {
        debug!(
            user_id,
            expected = ?from.expected_document(),
            received = %document_type,
            "Document arrived out of order, advancing positionally"
        );
    }
    info!(user_id, %from, %to, document_type = %document_type, "Intake advanced");
    Ok(to)
}
