//! Round state machine, countdown clock, and scoring
//!
//! Every subscribed client mirrors the same round state machine by reducing
//! each incoming document snapshot into a local view. The reducer is pure:
//! derived local-only state (the selected answer, the host's reveal flag)
//! lives in the view and never enters the shared document.
//!
//! Countdowns are derived independently on each client from the snapshot,
//! not from a server-pushed tick. The host's local clock is authoritative
//! for round advance, an accepted trust and clock-skew decision. The
//! [`RoundClock`] trait isolates that choice so a server-pushed deadline
//! could replace the local countdown without touching the state machine.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use web_time::{Instant, SystemTime};

use crate::{constants::round::MAX_POINTS, session::{GameSession, Status}};

/// Source of countdown time for one client's round view
pub trait RoundClock {
    /// Starts a fresh countdown from `time_limit` seconds
    fn restart(&mut self, time_limit: u32);

    /// Whole seconds left on the countdown, zero once expired
    fn remaining(&self) -> u32;

    /// The current wall-clock time, used for answer and round timestamps
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Client-local wall-clock countdown
///
/// This is the trusting implementation: each client counts down on its own
/// clock, so skew between clients shows up as slightly different countdowns
/// for the same round.
#[derive(Debug, Default)]
pub struct WallClock {
    deadline: Option<Instant>,
}

impl WallClock {
    /// Creates a clock with no countdown running
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoundClock for WallClock {
    fn restart(&mut self, time_limit: u32) {
        self.deadline = Some(Instant::now() + std::time::Duration::from_secs(time_limit.into()));
    }

    fn remaining(&self) -> u32 {
        let Some(deadline) = self.deadline else {
            return 0;
        };
        let left = deadline.saturating_duration_since(Instant::now());
        // round up so the countdown reads full immediately after restart
        u32::try_from(left.as_secs()).unwrap_or(u32::MAX)
            + u32::from(left.subsec_nanos() > 0)
    }
}

/// Hand-driven countdown for tests and embeddings that control time
///
/// Clones share the same countdown, so a test can keep a handle and move
/// time while a controller owns the clock.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    remaining: Arc<AtomicU32>,
}

impl ManualClock {
    /// Creates a clock with an expired countdown
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the seconds left on the countdown
    pub fn set_remaining(&self, seconds: u32) {
        self.remaining.store(seconds, Ordering::SeqCst);
    }
}

impl RoundClock for ManualClock {
    fn restart(&mut self, time_limit: u32) {
        self.remaining.store(time_limit, Ordering::SeqCst);
    }

    fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }
}

/// The phase a client's round view is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    /// No active question; players wait for the host
    #[default]
    Waiting,
    /// A question is active and this client has not answered it
    Answering {
        /// Index of the active question
        question: usize,
    },
    /// A question is active and this client is locked out of answering
    Answered {
        /// Index of the active question
        question: usize,
        /// The option this client selected
        choice: usize,
    },
    /// The session is over; the final ranking is displayed
    Finished,
}

/// One client's local view of the round state machine
///
/// `show_results` is host-local UI state. It is never persisted to the
/// shared document; players learn about a reveal only through the round
/// advance it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoundView {
    /// Current phase of the state machine
    pub phase: RoundPhase,
    /// Whether the host is currently displaying the reveal
    pub show_results: bool,
}

impl RoundView {
    /// The index of the question this view is on, if a round is running
    pub fn question_index(&self) -> Option<usize> {
        match self.phase {
            RoundPhase::Answering { question } | RoundPhase::Answered { question, .. } => {
                Some(question)
            }
            RoundPhase::Waiting | RoundPhase::Finished => None,
        }
    }
}

/// Reduces an incoming snapshot into the next local view
///
/// Invoked once per change notification. A snapshot that stays on the same
/// round (a roster-only change, such as another player's score write)
/// preserves the local phase and reveal flag; a snapshot that moves to a
/// new round restarts the countdown fresh from that question's time limit
/// and clears all round-local state.
pub fn reduce(prev: &RoundView, snapshot: &GameSession, clock: &mut impl RoundClock) -> RoundView {
    match snapshot.status {
        Status::Waiting => RoundView::default(),
        Status::Finished => RoundView {
            phase: RoundPhase::Finished,
            show_results: false,
        },
        Status::Active => {
            let Some((index, question)) = snapshot.active_question() else {
                // straggler join: active session whose question is not
                // visible in this snapshot yet
                return RoundView::default();
            };

            if prev.question_index() == Some(index) {
                return prev.clone();
            }

            clock.restart(question.time_limit);
            RoundView {
                phase: RoundPhase::Answering { question: index },
                show_results: false,
            }
        }
    }
}

/// Latest snapshot and reduced view shared between a controller and its
/// subscription callback
#[derive(Debug)]
pub(crate) struct ViewCell<C> {
    pub snapshot: GameSession,
    pub view: RoundView,
    pub clock: C,
}

impl<C: RoundClock> ViewCell<C> {
    pub fn new(snapshot: GameSession, clock: C) -> Self {
        Self {
            snapshot,
            view: RoundView::default(),
            clock,
        }
    }

    /// Runs the reducer for one incoming notification
    pub fn apply(&mut self, snapshot: GameSession) {
        self.view = reduce(&self.view, &snapshot, &mut self.clock);
        self.snapshot = snapshot;
    }
}

/// Points awarded for a correct answer submitted with `remaining` of
/// `time_limit` seconds left
///
/// Faster correct answers award up to [`MAX_POINTS`], decaying linearly to
/// zero as the countdown expires: `ceil(remaining / time_limit * 1000)`.
pub fn award(remaining: u32, time_limit: u32) -> u64 {
    if time_limit == 0 {
        return 0;
    }
    let remaining = u64::from(remaining.min(time_limit));
    (remaining * MAX_POINTS).div_ceil(u64::from(time_limit))
}
