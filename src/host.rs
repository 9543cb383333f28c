//! Host-side controllers: lobby and round driving
//!
//! The host creates the session document, publishes its join PIN, and
//! observes roster growth through its own subscription; there is no direct
//! host-to-player channel. Once started, the host is the only writer that
//! advances the question index or flips the session to finished. Everyone
//! else only ever follows the document.
//!
//! Timed transitions are scheduled rather than slept: starting or
//! advancing a round hands an [`AlarmMessage`] and a delay to a
//! caller-supplied scheduling callback, and the alarm comes back through
//! [`HostController::receive_alarm`] once the question's countdown or the
//! reveal dwell has passed.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    constants::round::REVEAL_DWELL_SECONDS,
    leaderboard::{self, Standing},
    pin::Pin,
    round::{RoundClock, RoundView, ViewCell},
    session::{GameSession, Id, Question, SessionPatch, Status},
    store::{self, DocumentStore, SessionId, Subscription},
};

/// Errors surfaced by host-side operations
///
/// Precondition failures leave the shared document untouched; the caller
/// reports them to the user and nothing else changes.
#[derive(Error, Debug)]
pub enum Error {
    /// The session was created without any questions
    #[error("a session needs at least one question")]
    NoQuestions,
    /// A question failed validation at session creation
    #[error("invalid question: {0}")]
    InvalidQuestion(String),
    /// `start_game` was called with an empty roster
    #[error("need at least one player to start")]
    NoPlayers,
    /// `start_game` was called after the session left the lobby
    #[error("game has already started")]
    AlreadyStarted,
    /// A round operation was attempted while no question is active
    #[error("no round is active")]
    NoActiveRound,
    /// The underlying store operation failed
    #[error(transparent)]
    Store(#[from] store::Error),
}

/// Scheduled messages that drive timed host transitions
///
/// Each round arms one reveal alarm for its countdown; the reveal then
/// stays visible for a fixed dwell before the advance alarm fires. The
/// carried round index guards against stale alarms arriving after the
/// round has already moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmMessage {
    /// Show the reveal of the round at `index` once its countdown ran out
    RevealRound {
        /// Index of the round whose countdown expired
        index: usize,
    },
    /// Advance past the reveal of the round at `index`
    AdvanceRound {
        /// Index of the round being revealed
        index: usize,
    },
}

/// The controlling client of one session
///
/// Created in the lobby phase and kept for the whole session lifetime; its
/// subscription is released when the controller is dropped.
pub struct HostController<S, C> {
    store: Arc<S>,
    session_id: SessionId,
    host_id: Id,
    pin: Pin,
    cell: Arc<Mutex<ViewCell<C>>>,
    _subscription: Subscription,
}

impl<S, C> HostController<S, C>
where
    S: DocumentStore,
    C: RoundClock + Send + 'static,
{
    /// Creates a session document and subscribes to it
    ///
    /// Generates a fresh host identifier and join PIN, validates the fixed
    /// question list, and stores the document in the `Waiting` phase with
    /// an empty roster. The subscription is the host's only way of
    /// learning about joins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoQuestions`] or [`Error::InvalidQuestion`] for a
    /// bad question list, or a [`store::Error`] if the document could not
    /// be created.
    pub fn create(store: Arc<S>, clock: C, questions: Vec<Question>) -> Result<Self, Error> {
        if questions.is_empty() {
            return Err(Error::NoQuestions);
        }
        for question in &questions {
            question
                .validate()
                .map_err(|report| Error::InvalidQuestion(report.to_string()))?;
            if !question.correct_answer_in_bounds() {
                return Err(Error::InvalidQuestion(format!(
                    "correct answer {} is out of bounds for {} options",
                    question.correct_answer,
                    question.options.len()
                )));
            }
        }

        let host_id = Id::new();
        let pin = Pin::new();
        let session = GameSession::new(pin.clone(), host_id, questions);

        let session_id = store.create(session.clone())?;
        let cell = Arc::new(Mutex::new(ViewCell::new(session, clock)));

        let callback_cell = Arc::clone(&cell);
        let subscription = store.subscribe(
            session_id,
            Box::new(move |snapshot| {
                let mut cell = callback_cell
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                cell.apply(snapshot);
            }),
        )?;

        info!(session = %session_id, pin = %pin, "hosting new session");

        Ok(Self {
            store,
            session_id,
            host_id,
            pin,
            cell,
            _subscription: subscription,
        })
    }

    fn cell(&self) -> MutexGuard<'_, ViewCell<C>> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The join PIN to display and share
    pub fn pin(&self) -> &Pin {
        &self.pin
    }

    /// The store-assigned session address
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// This host's client identifier
    pub fn host_id(&self) -> Id {
        self.host_id
    }

    /// The latest observed document snapshot
    pub fn snapshot(&self) -> GameSession {
        self.cell().snapshot.clone()
    }

    /// The host's current local round view
    pub fn view(&self) -> RoundView {
        self.cell().view.clone()
    }

    /// Whole seconds left on the host's local countdown
    pub fn time_left(&self) -> u32 {
        self.cell().clock.remaining()
    }

    /// The current roster ranking, for the reveal and lobby displays
    pub fn standings(&self) -> Vec<Standing> {
        leaderboard::standings(&self.cell().snapshot)
    }

    /// Transitions the lobby into the first round
    ///
    /// The sole transition out of `Waiting`: sets the session active at
    /// question zero with a fresh activation timestamp, and arms an
    /// [`AlarmMessage::RevealRound`] for when that question's countdown
    /// runs out, making the host's local timer authoritative for round
    /// advance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPlayers`] on an empty roster and
    /// [`Error::AlreadyStarted`] outside the lobby phase; neither mutates
    /// the document.
    pub fn start_game<F>(&self, mut schedule: F) -> Result<(), Error>
    where
        F: FnMut(AlarmMessage, Duration),
    {
        let (start_time, time_limit) = {
            let cell = self.cell();
            if cell.snapshot.status != Status::Waiting {
                return Err(Error::AlreadyStarted);
            }
            if cell.snapshot.players.is_empty() {
                return Err(Error::NoPlayers);
            }
            let Some(first) = cell.snapshot.questions.first() else {
                return Err(Error::NoQuestions);
            };
            (cell.clock.now(), first.time_limit)
        };

        info!(session = %self.session_id, "starting game");

        self.store.mutate(
            self.session_id,
            SessionPatch {
                status: Some(Status::Active),
                current_question: Some(0),
                start_time: Some(start_time),
            },
        )?;

        schedule(
            AlarmMessage::RevealRound { index: 0 },
            Duration::from_secs(time_limit.into()),
        );

        Ok(())
    }

    /// Shows the reveal and schedules the advance past it
    ///
    /// Sets the host-local reveal flag (never persisted; players only see
    /// the advance it leads to) and schedules an
    /// [`AlarmMessage::AdvanceRound`] after the fixed reveal dwell. Fired
    /// manually by the host; countdown expiry arrives as a scheduled
    /// [`AlarmMessage::RevealRound`] instead. Calling it again during the
    /// same reveal is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRound`] outside an active round.
    pub fn reveal_answer<F>(&self, mut schedule: F) -> Result<(), Error>
    where
        F: FnMut(AlarmMessage, Duration),
    {
        let index = {
            let mut cell = self.cell();
            let Some((index, _)) = cell.snapshot.active_question() else {
                return Err(Error::NoActiveRound);
            };
            if cell.view.show_results {
                return Ok(());
            }
            cell.view.show_results = true;
            index
        };

        debug!(session = %self.session_id, round = index, "revealing answer");

        schedule(
            AlarmMessage::AdvanceRound { index },
            Duration::from_secs(REVEAL_DWELL_SECONDS),
        );

        Ok(())
    }

    /// Handles a previously scheduled alarm
    ///
    /// An [`AlarmMessage::RevealRound`] fires when the round's countdown
    /// ran out and shows the reveal unless the host already did so
    /// manually. An [`AlarmMessage::AdvanceRound`] advances past the
    /// revealed round: to the next question with a fresh activation
    /// timestamp and a newly armed reveal alarm, or to `Finished` after
    /// the last one. An alarm whose round index no longer matches the
    /// document is stale and is dropped, so the question index never
    /// regresses.
    ///
    /// # Errors
    ///
    /// Returns a [`store::Error`] if the advance mutation fails; the
    /// document is left unchanged in that case.
    pub fn receive_alarm<F>(&self, alarm: AlarmMessage, mut schedule: F) -> Result<(), Error>
    where
        F: FnMut(AlarmMessage, Duration),
    {
        match alarm {
            AlarmMessage::RevealRound { index } => {
                {
                    let cell = self.cell();
                    if cell.snapshot.status != Status::Active
                        || cell.snapshot.current_question != Some(index)
                    {
                        warn!(session = %self.session_id, round = index, "dropping stale alarm");
                        return Ok(());
                    }
                }
                self.reveal_answer(schedule)
            }
            AlarmMessage::AdvanceRound { index } => {
                let (next, next_limit, now) = {
                    let cell = self.cell();
                    if cell.snapshot.status != Status::Active
                        || cell.snapshot.current_question != Some(index)
                    {
                        warn!(session = %self.session_id, round = index, "dropping stale alarm");
                        return Ok(());
                    }
                    let next = index + 1;
                    (
                        next,
                        cell.snapshot.questions.get(next).map(|q| q.time_limit),
                        cell.clock.now(),
                    )
                };

                if let Some(limit) = next_limit {
                    debug!(session = %self.session_id, round = next, "advancing to next round");
                    self.store.mutate(
                        self.session_id,
                        SessionPatch {
                            status: None,
                            current_question: Some(next),
                            start_time: Some(now),
                        },
                    )?;
                    schedule(
                        AlarmMessage::RevealRound { index: next },
                        Duration::from_secs(limit.into()),
                    );
                } else {
                    info!(session = %self.session_id, "all rounds played, finishing");
                    self.store.mutate(
                        self.session_id,
                        SessionPatch {
                            status: Some(Status::Finished),
                            current_question: None,
                            start_time: None,
                        },
                    )?;
                }

                Ok(())
            }
        }
    }
}

impl<S, C> std::fmt::Debug for HostController<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostController")
            .field("session_id", &self.session_id)
            .field("pin", &self.pin)
            .finish_non_exhaustive()
    }
}
