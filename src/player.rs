//! Player-side controllers: joining and answering
//!
//! A player resolves a PIN to a session, appends themselves to the roster
//! through the store's atomic append, and from then on follows the shared
//! document like every other subscriber. The only writes a player ever
//! performs are field-level updates to their own roster entry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use garde::Validate;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    leaderboard::{self, Standing},
    pin::Pin,
    round::{self, RoundClock, RoundPhase, RoundView, ViewCell},
    session::{GameSession, Id, Player, PlayerUpdate, Role, Status},
    store::{self, DocumentStore, SessionId, Subscription},
};

/// Errors surfaced when joining a session
#[derive(Error, Debug)]
pub enum JoinError {
    /// The PIN matches no session
    #[error("game not found")]
    NotFound,
    /// The matched session is no longer waiting for players
    #[error("game has already started")]
    AlreadyStarted,
    /// The roster has reached its maximum size
    #[error("game is full")]
    SessionFull,
    /// The display name failed validation
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// The underlying store operation failed
    #[error(transparent)]
    Store(#[from] store::Error),
}

/// Errors surfaced when submitting an answer
#[derive(Error, Debug)]
pub enum AnswerError {
    /// No question is currently active
    #[error("no round is active")]
    NoActiveRound,
    /// This player already answered the current round
    #[error("already answered this round")]
    AlreadyAnswered,
    /// The selected option does not exist on the current question
    #[error("selected option does not exist")]
    InvalidChoice,
    /// This client's id is not in the session roster
    #[error("player not found in game")]
    NotInRoster,
    /// The underlying store operation failed
    #[error(transparent)]
    Store(#[from] store::Error),
}

/// One joined player's client controller
///
/// Holds the player's self-generated identity so answer submissions target
/// the correct roster entry. The subscription is released when the
/// controller is dropped.
pub struct PlayerController<S, C> {
    store: Arc<S>,
    session_id: SessionId,
    player_id: Id,
    cell: Arc<Mutex<ViewCell<C>>>,
    _subscription: Subscription,
}

impl<S, C> PlayerController<S, C>
where
    S: DocumentStore,
    C: RoundClock + Send + 'static,
{
    /// Resolves a PIN and joins the session under `name`
    ///
    /// Appends a zero-score roster entry through the store's atomic append
    /// so that two players joining at the same instant both land in the
    /// roster. The status check races benignly against a concurrent start:
    /// a straggler simply finds no active question on their first
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::NotFound`] for an unknown PIN,
    /// [`JoinError::AlreadyStarted`] once the session left the lobby,
    /// [`JoinError::SessionFull`] at the roster cap, or
    /// [`JoinError::InvalidName`] for an unusable display name.
    pub fn join(store: Arc<S>, clock: C, pin: &Pin, name: &str) -> Result<Self, JoinError> {
        let player_id = Id::new();
        let player = Player::new(player_id, name);
        player
            .validate()
            .map_err(|report| JoinError::InvalidName(report.to_string()))?;

        let (session_id, session) = store.find_by_pin(pin)?.ok_or(JoinError::NotFound)?;

        if session.status != Status::Waiting {
            return Err(JoinError::AlreadyStarted);
        }
        if session.is_full() {
            return Err(JoinError::SessionFull);
        }

        store.append_player(session_id, player)?;

        info!(session = %session_id, player = %player_id, name, "joined session");

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

        Ok(Self {
            store,
            session_id,
            player_id,
            cell,
            _subscription: subscription,
        })
    }

    fn cell(&self) -> MutexGuard<'_, ViewCell<C>> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The store-assigned session address
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// This player's self-generated identifier
    pub fn player_id(&self) -> Id {
        self.player_id
    }

    /// The latest observed document snapshot
    pub fn snapshot(&self) -> GameSession {
        self.cell().snapshot.clone()
    }

    /// This player's current local round view
    pub fn view(&self) -> RoundView {
        self.cell().view.clone()
    }

    /// Whole seconds left on this player's local countdown
    pub fn time_left(&self) -> u32 {
        self.cell().clock.remaining()
    }

    /// The role this client holds in the latest snapshot
    ///
    /// `None` means the client is not part of the session and must be
    /// treated as unauthorized.
    pub fn role(&self) -> Option<Role> {
        self.cell().snapshot.role_of(self.player_id)
    }

    /// The final ranking, rendered once the session is finished
    pub fn standings(&self) -> Vec<Standing> {
        leaderboard::standings(&self.cell().snapshot)
    }

    /// This player's own position in the ranking
    pub fn own_standing(&self) -> Option<Standing> {
        leaderboard::standing_of(&self.cell().snapshot, self.player_id)
    }

    /// Submits this player's answer for the active round
    ///
    /// At most one submission is scored per round; the first one wins and
    /// locks out corrections. A correct answer awards points proportional
    /// to the seconds left on this client's own countdown; an incorrect or
    /// expired one awards zero and still locks. The resulting score is
    /// written through a field-level update to this player's entry only.
    ///
    /// Returns the awarded increment.
    ///
    /// # Errors
    ///
    /// Returns [`AnswerError::NoActiveRound`], [`AnswerError::AlreadyAnswered`],
    /// [`AnswerError::InvalidChoice`], or [`AnswerError::NotInRoster`] as
    /// precondition failures; a failed store write surfaces as
    /// [`AnswerError::Store`] and leaves the local lockout unset so the
    /// player may retry.
    pub fn submit_answer(&self, choice: usize) -> Result<u64, AnswerError> {
        let (index, increment, new_score, now) = {
            let cell = self.cell();

            let index = match cell.view.phase {
                RoundPhase::Answering { question } => question,
                RoundPhase::Answered { .. } => return Err(AnswerError::AlreadyAnswered),
                RoundPhase::Waiting | RoundPhase::Finished => {
                    return Err(AnswerError::NoActiveRound);
                }
            };

            let Some((_, question)) = cell.snapshot.active_question() else {
                return Err(AnswerError::NoActiveRound);
            };
            if choice >= question.options.len() {
                return Err(AnswerError::InvalidChoice);
            }

            let current = cell
                .snapshot
                .players
                .get(&self.player_id)
                .ok_or(AnswerError::NotInRoster)?;

            let remaining = cell.clock.remaining();
            let increment = if choice == question.correct_answer {
                round::award(remaining, question.time_limit)
            } else {
                0
            };

            (index, increment, current.score + increment, cell.clock.now())
        };

        self.store.update_player(
            self.session_id,
            self.player_id,
            PlayerUpdate {
                score: Some(new_score),
                last_answer_time: Some(now),
            },
        )?;

        debug!(
            session = %self.session_id,
            player = %self.player_id,
            round = index,
            increment,
            "answer recorded"
        );

        // lock out further submissions for this round; the write above
        // already fanned back to us as a roster-only change
        let mut cell = self.cell();
        if cell.view.question_index() == Some(index) {
            cell.view.phase = RoundPhase::Answered {
                question: index,
                choice,
            };
        }

        Ok(increment)
    }
}

impl<S, C> std::fmt::Debug for PlayerController<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerController")
            .field("session_id", &self.session_id)
            .field("player_id", &self.player_id)
            .finish_non_exhaustive()
    }
}
