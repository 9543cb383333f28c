//! Shared document store boundary and in-memory implementation
//!
//! This module defines the interface the session core needs from a shared
//! mutable document store with push-based change notification: create,
//! equality lookup by PIN, merge-style partial update, keyed roster
//! primitives, and live-update subscriptions. [`MemoryStore`] provides the
//! single-process implementation; a persisted backend can stand in behind
//! the same trait without touching the controllers.
//!
//! Writes to one document are serialized, and every mutation fans out
//! exactly one full-snapshot notification to every live subscriber,
//! including the mutator itself. A failed mutation never produces a
//! notification, so errors stay local to the caller. Each subscriber
//! observes snapshots in document-version order; when a fresh
//! subscription races a mutation, the stale initial snapshot is skipped
//! rather than delivered late.

use std::{
    collections::HashMap,
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    pin::Pin,
    session::{GameSession, Id, Player, PlayerUpdate, SessionPatch},
};

/// A store-assigned opaque identifier addressing one session document
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    /// Parses a session identifier from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Errors surfaced by store operations
///
/// No retry happens at this layer; callers report the failure and leave
/// their local state unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The session identifier no longer resolves to a document
    #[error("session not found")]
    SessionNotFound,
    /// The player identifier is not present in the session's roster
    #[error("player not found in session")]
    PlayerNotFound,
    /// A generic backend failure (network, serialization, lock poisoning)
    #[error("store operation failed: {0}")]
    Backend(String),
}

/// Callback invoked with the full document snapshot on every change
pub type OnChange = Box<dyn FnMut(GameSession) + Send>;

/// Handle to a live subscription on one session document
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops
/// delivery. Releasing subscriptions when a view is torn down is the only
/// explicit resource-lifetime discipline in the core.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps a cancellation action into a subscription handle
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stops delivery of further snapshots
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

/// The shared document store the session core is built against
///
/// The store assumes nothing about the document's meaning and enforces no
/// schema; all session invariants live in the controllers. Implementations
/// must serialize writes to a single document so that subscribers observe a
/// totally ordered stream of snapshots per session.
pub trait DocumentStore {
    /// Creates a new session document and returns its store-assigned id
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the document could not be stored.
    fn create(&self, initial: GameSession) -> Result<SessionId, Error>;

    /// Reads the current snapshot of a session document
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the id does not resolve.
    fn get(&self, id: SessionId) -> Result<GameSession, Error>;

    /// Looks up a session by its join PIN
    ///
    /// PIN uniqueness is advisory; when two active sessions collide, the
    /// first match wins and the result is still at most one document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] if the query could not be executed.
    fn find_by_pin(&self, pin: &Pin) -> Result<Option<(SessionId, GameSession)>, Error>;

    /// Applies a merge-style partial update to a session document
    ///
    /// Triggers exactly one notification to every live subscriber,
    /// including the mutator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the id does not resolve; no
    /// notification is produced on failure.
    fn mutate(&self, id: SessionId, patch: SessionPatch) -> Result<(), Error>;

    /// Atomically appends one player to the roster
    ///
    /// This primitive exists so that concurrent joins never lose an entry
    /// to a read-modify-write race. Join order is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the id does not resolve.
    fn append_player(&self, id: SessionId, player: Player) -> Result<(), Error>;

    /// Applies a field-level merge update to a single roster entry
    ///
    /// Only the addressed player's record is touched, so concurrent
    /// updates to sibling entries never clobber each other.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] or [`Error::PlayerNotFound`] if
    /// the addressed document or roster entry does not exist.
    fn update_player(
        &self,
        id: SessionId,
        player_id: Id,
        update: PlayerUpdate,
    ) -> Result<(), Error>;

    /// Subscribes to live updates of a session document
    ///
    /// The callback receives the full current snapshot immediately and
    /// once per subsequent mutation until the handle is released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if the id does not resolve.
    fn subscribe(&self, id: SessionId, on_change: OnChange) -> Result<Subscription, Error>;
}

type Subscriber = Arc<Mutex<SubscriberState>>;

/// A subscriber callback together with the last snapshot version it saw
///
/// Deliveries are gated on the slot version, so a notification racing a
/// fresh subscription can never hand that subscriber an older snapshot
/// after a newer one.
struct SubscriberState {
    last_seen: u64,
    on_change: OnChange,
}

/// One stored document together with its version and live subscribers
struct Slot {
    session: GameSession,
    version: u64,
    subscribers: Vec<(u64, Subscriber)>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Slot>,
    next_subscriber: u64,
}

/// In-memory document store with change-notification fan-out
///
/// Cloning the store produces another handle to the same documents, which
/// is how one process hosts the store that several client controllers
/// share.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, Error> {
        self.inner
            .lock()
            .map_err(|_| Error::Backend("store lock poisoned".to_string()))
    }

    /// Collects the fan-out list and snapshot under the lock, then invokes
    /// the callbacks after releasing it so a callback may call back into
    /// the store.
    fn notify(&self, id: SessionId) -> Result<(), Error> {
        let (version, snapshot, subscribers) = {
            let guard = self.lock()?;
            let slot = guard.sessions.get(&id).ok_or(Error::SessionNotFound)?;
            (slot.version, slot.session.clone(), slot.subscribers.clone())
        };

        debug!(session = %id, subscribers = subscribers.len(), "fanning out snapshot");

        for (_, subscriber) in subscribers {
            Self::deliver(&subscriber, version, snapshot.clone());
        }

        Ok(())
    }

    /// Hands a snapshot to one subscriber unless it already saw a newer one
    fn deliver(subscriber: &Subscriber, version: u64, snapshot: GameSession) {
        if let Ok(mut state) = subscriber.lock() {
            if version > state.last_seen {
                state.last_seen = version;
                (state.on_change)(snapshot);
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn create(&self, initial: GameSession) -> Result<SessionId, Error> {
        let id = SessionId::new();
        let mut guard = self.lock()?;
        info!(session = %id, pin = %initial.pin, "created session document");
        guard.sessions.insert(
            id,
            Slot {
                session: initial,
                version: 1,
                subscribers: Vec::new(),
            },
        );
        Ok(id)
    }

    fn get(&self, id: SessionId) -> Result<GameSession, Error> {
        let guard = self.lock()?;
        guard
            .sessions
            .get(&id)
            .map(|slot| slot.session.clone())
            .ok_or(Error::SessionNotFound)
    }

    fn find_by_pin(&self, pin: &Pin) -> Result<Option<(SessionId, GameSession)>, Error> {
        let guard = self.lock()?;
        Ok(guard
            .sessions
            .iter()
            .find(|(_, slot)| slot.session.pin == *pin)
            .map(|(id, slot)| (*id, slot.session.clone())))
    }

    fn mutate(&self, id: SessionId, patch: SessionPatch) -> Result<(), Error> {
        {
            let mut guard = self.lock()?;
            let slot = guard.sessions.get_mut(&id).ok_or(Error::SessionNotFound)?;
            patch.apply_to(&mut slot.session);
            slot.version += 1;
            debug!(session = %id, ?patch, "applied session patch");
        }
        self.notify(id)
    }

    fn append_player(&self, id: SessionId, player: Player) -> Result<(), Error> {
        {
            let mut guard = self.lock()?;
            let slot = guard.sessions.get_mut(&id).ok_or(Error::SessionNotFound)?;
            debug!(session = %id, player = %player.id, name = %player.name, "appended player");
            slot.session.players.insert(player.id, player);
            slot.version += 1;
        }
        self.notify(id)
    }

    fn update_player(
        &self,
        id: SessionId,
        player_id: Id,
        update: PlayerUpdate,
    ) -> Result<(), Error> {
        {
            let mut guard = self.lock()?;
            let slot = guard.sessions.get_mut(&id).ok_or(Error::SessionNotFound)?;
            let player = slot
                .session
                .players
                .get_mut(&player_id)
                .ok_or(Error::PlayerNotFound)?;
            update.apply_to(player);
            slot.version += 1;
            debug!(session = %id, player = %player_id, score = player.score, "updated player");
        }
        self.notify(id)
    }

    fn subscribe(&self, id: SessionId, on_change: OnChange) -> Result<Subscription, Error> {
        let subscriber: Subscriber = Arc::new(Mutex::new(SubscriberState {
            last_seen: 0,
            on_change,
        }));

        let (token, version, snapshot) = {
            let mut guard = self.lock()?;
            let token = guard.next_subscriber;
            guard.next_subscriber += 1;
            let slot = guard.sessions.get_mut(&id).ok_or(Error::SessionNotFound)?;
            slot.subscribers.push((token, Arc::clone(&subscriber)));
            (token, slot.version, slot.session.clone())
        };

        // the initial value counts as the first delivery; the version gate
        // lets a concurrent mutation's newer snapshot win the race
        Self::deliver(&subscriber, version, snapshot);

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut guard) = inner.lock() {
                    if let Some(slot) = guard.sessions.get_mut(&id) {
                        slot.subscribers.retain(|(t, _)| *t != token);
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::session::{Question, Status};

    fn sample_session(pin: &str) -> GameSession {
        GameSession::new(
            Pin::from_str(pin).unwrap(),
            Id::new(),
            vec![Question {
                id: "1".to_string(),
                text: "What is 2 + 2?".to_string(),
                options: ["3", "4", "5", "6"].map(String::from).to_vec(),
                correct_answer: 1,
                time_limit: 30,
            }],
        )
    }

    fn snapshot_log() -> (Arc<Mutex<Vec<GameSession>>>, OnChange) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let on_change: OnChange = Box::new(move |snapshot| {
            sink.lock().unwrap().push(snapshot);
        });
        (log, on_change)
    }

    #[test]
    fn test_create_then_get_round_trip() {
        let store = MemoryStore::new();
        let session = sample_session("AB12CD");
        let id = store.create(session.clone()).unwrap();
        assert_eq!(store.get(id).unwrap(), session);
    }

    #[test]
    fn test_get_unknown_session_fails() {
        let store = MemoryStore::new();
        let other = MemoryStore::new();
        let id = other.create(sample_session("AB12CD")).unwrap();
        assert_eq!(store.get(id), Err(Error::SessionNotFound));
    }

    #[test]
    fn test_find_by_pin() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();
        store.create(sample_session("ZZ99ZZ")).unwrap();

        let pin = Pin::from_str("AB12CD").unwrap();
        let (found_id, found) = store.find_by_pin(&pin).unwrap().unwrap();
        assert_eq!(found_id, id);
        assert_eq!(found.pin, pin);

        let missing = Pin::from_str("XXXXXX").unwrap();
        assert!(store.find_by_pin(&missing).unwrap().is_none());
    }

    #[test]
    fn test_subscribe_delivers_initial_snapshot() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let (log, on_change) = snapshot_log();
        let _subscription = store.subscribe(id, on_change).unwrap();

        let delivered = log.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].status, Status::Waiting);
    }

    #[test]
    fn test_mutate_notifies_every_subscriber_exactly_once() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let (first_log, first) = snapshot_log();
        let (second_log, second) = snapshot_log();
        let _first_subscription = store.subscribe(id, first).unwrap();
        let _second_subscription = store.subscribe(id, second).unwrap();

        store
            .mutate(
                id,
                SessionPatch {
                    status: Some(Status::Active),
                    current_question: Some(0),
                    start_time: None,
                },
            )
            .unwrap();

        // initial snapshot plus one change each, no self-suppression
        assert_eq!(first_log.lock().unwrap().len(), 2);
        assert_eq!(second_log.lock().unwrap().len(), 2);
        assert_eq!(
            first_log.lock().unwrap().last().unwrap().status,
            Status::Active
        );
    }

    #[test]
    fn test_failed_mutate_produces_no_notification() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let (log, on_change) = snapshot_log();
        let _subscription = store.subscribe(id, on_change).unwrap();

        let bogus = MemoryStore::new().create(sample_session("QQQQQQ")).unwrap();
        assert_eq!(
            store.mutate(bogus, SessionPatch::default()),
            Err(Error::SessionNotFound)
        );
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_append_player_keeps_join_order_and_loses_no_entry() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let alice = Id::new();
        let bob = Id::new();
        store.append_player(id, Player::new(alice, "Alice")).unwrap();
        store.append_player(id, Player::new(bob, "Bob")).unwrap();

        let session = store.get(id).unwrap();
        let names: Vec<_> = session.players.values().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);
    }

    #[test]
    fn test_update_player_touches_only_the_addressed_entry() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let alice = Id::new();
        let bob = Id::new();
        store.append_player(id, Player::new(alice, "Alice")).unwrap();
        store.append_player(id, Player::new(bob, "Bob")).unwrap();

        store
            .update_player(
                id,
                alice,
                PlayerUpdate {
                    score: Some(500),
                    last_answer_time: Some(web_time::SystemTime::now()),
                },
            )
            .unwrap();
        store
            .update_player(
                id,
                bob,
                PlayerUpdate {
                    score: Some(250),
                    last_answer_time: Some(web_time::SystemTime::now()),
                },
            )
            .unwrap();

        let session = store.get(id).unwrap();
        assert_eq!(session.players[&alice].score, 500);
        assert_eq!(session.players[&bob].score, 250);
    }

    #[test]
    fn test_update_player_unknown_entry_fails() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();
        assert_eq!(
            store.update_player(id, Id::new(), PlayerUpdate::default()),
            Err(Error::PlayerNotFound)
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let (log, on_change) = snapshot_log();
        let subscription = store.subscribe(id, on_change).unwrap();
        subscription.unsubscribe();

        store
            .append_player(id, Player::new(Id::new(), "Alice"))
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dropping_subscription_stops_delivery() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let (log, on_change) = snapshot_log();
        {
            let _subscription = store.subscribe(id, on_change).unwrap();
        }

        store
            .append_player(id, Player::new(Id::new(), "Alice"))
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_snapshots_never_reorder_for_a_subscriber_racing_a_writer() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();
        let alice = Id::new();
        store.append_player(id, Player::new(alice, "Alice")).unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for score in 1..=200 {
                    store
                        .update_player(
                            id,
                            alice,
                            PlayerUpdate {
                                score: Some(score),
                                last_answer_time: None,
                            },
                        )
                        .unwrap();
                }
            })
        };

        // subscribing mid-stream must never hand back an older snapshot
        // after a newer one
        let (log, on_change) = snapshot_log();
        let _subscription = store.subscribe(id, on_change).unwrap();
        writer.join().unwrap();

        let seen = log.lock().unwrap();
        assert!(!seen.is_empty());
        let scores: Vec<u64> = seen.iter().map(|s| s.players[&alice].score).collect();
        assert!(scores.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_two_subscribers_replaying_the_same_mutations_agree() {
        let store = MemoryStore::new();
        let id = store.create(sample_session("AB12CD")).unwrap();

        let (first_log, first) = snapshot_log();
        let (second_log, second) = snapshot_log();
        let _first_subscription = store.subscribe(id, first).unwrap();
        let _second_subscription = store.subscribe(id, second).unwrap();

        let alice = Id::new();
        store.append_player(id, Player::new(alice, "Alice")).unwrap();
        store
            .mutate(
                id,
                SessionPatch {
                    status: Some(Status::Active),
                    current_question: Some(0),
                    start_time: Some(web_time::SystemTime::now()),
                },
            )
            .unwrap();
        store
            .update_player(
                id,
                alice,
                PlayerUpdate {
                    score: Some(500),
                    last_answer_time: None,
                },
            )
            .unwrap();

        let first_seen = first_log.lock().unwrap();
        let second_seen = second_log.lock().unwrap();
        assert_eq!(*first_seen, *second_seen);
        assert_eq!(first_seen.last().unwrap().players[&alice].score, 500);
    }
}
