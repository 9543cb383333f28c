//! Shared session document model
//!
//! This module defines the shape of the one shared document that a host and
//! its players synchronize through: the join PIN, the roster, the fixed
//! question list, and the round cursor. All invariants on the document are
//! enforced by the controllers; the store treats it as opaque data.

use std::{fmt::Display, str::FromStr};

use garde::Validate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay, skip_serializing_none};
use uuid::Uuid;
use web_time::SystemTime;

use crate::pin::Pin;

/// A unique identifier for a client in a session
///
/// Both the host and every player generate their own random identifier when
/// they enter a session. Identifiers are never verified: any client that
/// knows a session address could forge one. Per-session authorization is
/// advisory only.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, DeserializeFromStr, SerializeDisplay,
)]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random client identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Id {
    /// Creates a new random client identifier (same as `new()`)
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    /// Parses an identifier from a UUID string
    ///
    /// # Errors
    ///
    /// Returns a `uuid::Error` if the string is not a valid UUID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Lifecycle phase of a session
///
/// The status drives which controller logic is live on every subscribed
/// client. It only ever moves forward: `Waiting` to `Active` to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Lobby phase, roster is growing, no question is active
    Waiting,
    /// A question is active and the round state machine is running
    Active,
    /// Terminal phase, final ranking is displayed
    Finished,
}

/// The role a client id holds within a session snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The controlling client that created the session
    Host,
    /// A joined player present in the roster
    Player,
}

/// One joined player's roster entry
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Player {
    /// Client-generated identifier, unique within one session
    #[garde(skip)]
    pub id: Id,
    /// Free-text display name, no uniqueness constraint
    #[garde(length(min = 1, max = crate::constants::session::MAX_NAME_LENGTH))]
    pub name: String,
    /// Accumulated points, monotonically non-decreasing
    #[garde(skip)]
    pub score: u64,
    /// Timestamp of the most recent scored answer
    #[garde(skip)]
    pub last_answer_time: Option<SystemTime>,
}

impl Player {
    /// Creates a fresh roster entry with a zero score
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            score: 0,
            last_answer_time: None,
        }
    }
}

/// A single question of the fixed list populated at session creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// Opaque question identifier
    #[garde(skip)]
    pub id: String,
    /// The question text shown to everyone
    #[garde(length(min = 1, max = crate::constants::question::MAX_TEXT_LENGTH))]
    pub text: String,
    /// Ordered displayable choices
    #[garde(
        length(
            min = crate::constants::question::MIN_OPTION_COUNT,
            max = crate::constants::question::MAX_OPTION_COUNT,
        ),
        inner(length(max = crate::constants::question::MAX_OPTION_LENGTH))
    )]
    pub options: Vec<String>,
    /// Index into `options` of the correct choice
    #[garde(skip)]
    pub correct_answer: usize,
    /// Seconds allotted for answering
    #[garde(range(
        min = crate::constants::question::MIN_TIME_LIMIT,
        max = crate::constants::question::MAX_TIME_LIMIT,
    ))]
    pub time_limit: u32,
}

impl Question {
    /// Checks the cross-field invariant that `correct_answer` indexes into
    /// `options`
    ///
    /// Field bounds are covered by `validate()`; this one needs both fields
    /// at once so it lives outside the derive.
    pub fn correct_answer_in_bounds(&self) -> bool {
        self.correct_answer < self.options.len()
    }
}

/// The shared session document
///
/// One document exists per hosted game. The roster is a keyed mapping from
/// player id to roster entry, in join order, so that a player's score update
/// touches only their own entry and never clobbers a concurrent sibling
/// write.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    /// Human-facing join code, advisory-unique among active sessions
    pub pin: Pin,
    /// Identifier of the controlling client, not cryptographically verified
    pub host_id: Id,
    /// Current lifecycle phase
    pub status: Status,
    /// Joined players keyed by id, insertion order = join order
    pub players: IndexMap<Id, Player>,
    /// Fixed question list, immutable after creation
    pub questions: Vec<Question>,
    /// Index of the active question, present once the session leaves `Waiting`
    pub current_question: Option<usize>,
    /// Moment the current question activated, host-side bookkeeping only
    pub start_time: Option<SystemTime>,
}

impl GameSession {
    /// Creates a fresh session document in the `Waiting` phase
    pub fn new(pin: Pin, host_id: Id, questions: Vec<Question>) -> Self {
        Self {
            pin,
            host_id,
            status: Status::Waiting,
            players: IndexMap::new(),
            questions,
            current_question: None,
            start_time: None,
        }
    }

    /// Returns the active question and its index, if a round is running
    pub fn active_question(&self) -> Option<(usize, &Question)> {
        if self.status != Status::Active {
            return None;
        }
        let index = self.current_question?;
        Some((index, self.questions.get(index)?))
    }

    /// Resolves a client id to the role it holds in this snapshot
    ///
    /// A client that is neither the host nor in the roster holds no role
    /// and must be treated as unauthorized.
    pub fn role_of(&self, id: Id) -> Option<Role> {
        if id == self.host_id {
            Some(Role::Host)
        } else if self.players.contains_key(&id) {
            Some(Role::Player)
        } else {
            None
        }
    }

    /// Whether the roster has reached its configured capacity
    pub fn is_full(&self) -> bool {
        self.players.len() >= crate::constants::session::MAX_PLAYER_COUNT
    }
}

/// A merge-style partial update to the session document
///
/// Fields left as `None` are untouched; fields set to `Some` replace the
/// stored value wholesale. The roster deliberately has no field here: it
/// only moves through the store's keyed append and per-player update
/// primitives.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    /// New lifecycle phase
    pub status: Option<Status>,
    /// New active question index
    pub current_question: Option<usize>,
    /// New activation timestamp for the current question
    pub start_time: Option<SystemTime>,
}

impl SessionPatch {
    /// Applies the patch to a document, replacing only the specified fields
    pub fn apply_to(&self, session: &mut GameSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(current_question) = self.current_question {
            session.current_question = Some(current_question);
        }
        if let Some(start_time) = self.start_time {
            session.start_time = Some(start_time);
        }
    }
}

/// A field-level merge update to a single roster entry
///
/// Only the submitting player's own entry is touched, so two players
/// answering at the same instant can never overwrite each other's score.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerUpdate {
    /// New accumulated score
    pub score: Option<u64>,
    /// Timestamp of the answer being recorded
    pub last_answer_time: Option<SystemTime>,
}

impl PlayerUpdate {
    /// Applies the update to a roster entry, replacing only specified fields
    pub fn apply_to(&self, player: &mut Player) {
        if let Some(score) = self.score {
            player.score = score;
        }
        if let Some(last_answer_time) = self.last_answer_time {
            player.last_answer_time = Some(last_answer_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn sample_questions() -> Vec<Question> {
        vec![
            Question {
                id: "1".to_string(),
                text: "What is the capital of France?".to_string(),
                options: ["London", "Berlin", "Paris", "Madrid"]
                    .map(String::from)
                    .to_vec(),
                correct_answer: 2,
                time_limit: 30,
            },
            Question {
                id: "2".to_string(),
                text: "Which planet is known as the Red Planet?".to_string(),
                options: ["Venus", "Mars", "Jupiter", "Saturn"]
                    .map(String::from)
                    .to_vec(),
                correct_answer: 1,
                time_limit: 30,
            },
        ]
    }

    fn sample_session() -> GameSession {
        GameSession::new(Pin::from_str("AB12CD").unwrap(), Id::new(), sample_questions())
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Waiting).unwrap(), "\"waiting\"");
        assert_eq!(serde_json::to_string(&Status::Active).unwrap(), "\"active\"");
        assert_eq!(
            serde_json::to_string(&Status::Finished).unwrap(),
            "\"finished\""
        );
    }

    #[test]
    fn test_new_session_starts_waiting_and_empty() {
        let session = sample_session();
        assert_eq!(session.status, Status::Waiting);
        assert!(session.players.is_empty());
        assert_eq!(session.current_question, None);
        assert_eq!(session.start_time, None);
    }

    #[test]
    fn test_active_question_requires_active_status() {
        let mut session = sample_session();
        assert!(session.active_question().is_none());

        session.status = Status::Active;
        session.current_question = Some(1);
        let (index, question) = session.active_question().unwrap();
        assert_eq!(index, 1);
        assert_eq!(question.id, "2");
    }

    #[test]
    fn test_active_question_rejects_out_of_range_index() {
        let mut session = sample_session();
        session.status = Status::Active;
        session.current_question = Some(10);
        assert!(session.active_question().is_none());
    }

    #[test]
    fn test_role_of_resolves_host_player_and_stranger() {
        let mut session = sample_session();
        let player_id = Id::new();
        session
            .players
            .insert(player_id, Player::new(player_id, "Alice"));

        assert_eq!(session.role_of(session.host_id), Some(Role::Host));
        assert_eq!(session.role_of(player_id), Some(Role::Player));
        assert_eq!(session.role_of(Id::new()), None);
    }

    #[test]
    fn test_patch_leaves_unspecified_fields_untouched() {
        let mut session = sample_session();
        let patch = SessionPatch {
            status: Some(Status::Active),
            current_question: Some(0),
            start_time: None,
        };
        patch.apply_to(&mut session);

        assert_eq!(session.status, Status::Active);
        assert_eq!(session.current_question, Some(0));
        assert_eq!(session.start_time, None);
        assert_eq!(session.questions.len(), 2);
    }

    #[test]
    fn test_empty_patch_is_a_no_op() {
        let mut session = sample_session();
        let before = session.clone();
        SessionPatch::default().apply_to(&mut session);
        assert_eq!(session, before);
    }

    #[test]
    fn test_player_update_merges_fields() {
        let id = Id::new();
        let mut player = Player::new(id, "Alice");
        let update = PlayerUpdate {
            score: Some(500),
            last_answer_time: Some(SystemTime::now()),
        };
        update.apply_to(&mut player);

        assert_eq!(player.score, 500);
        assert!(player.last_answer_time.is_some());
        assert_eq!(player.name, "Alice");
    }

    #[test]
    fn test_player_name_validation() {
        use garde::Validate;

        let player = Player::new(Id::new(), "Alice");
        assert!(player.validate().is_ok());

        let nameless = Player::new(Id::new(), "");
        assert!(nameless.validate().is_err());

        let long = Player::new(
            Id::new(),
            "a".repeat(crate::constants::session::MAX_NAME_LENGTH + 1),
        );
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_question_validation() {
        use garde::Validate;

        let mut question = sample_questions().remove(0);
        assert!(question.validate().is_ok());
        assert!(question.correct_answer_in_bounds());

        question.correct_answer = 4;
        assert!(!question.correct_answer_in_bounds());

        question.options.truncate(1);
        assert!(question.validate().is_err());

        let mut short_timer = sample_questions().remove(0);
        short_timer.time_limit = 0;
        assert!(short_timer.validate().is_err());
    }

    #[test]
    fn test_session_document_serde_round_trip() {
        let mut session = sample_session();
        let player_id = Id::new();
        session
            .players
            .insert(player_id, Player::new(player_id, "Alice"));

        let json = serde_json::to_string(&session).unwrap();
        let parsed: GameSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
        // optional fields are omitted rather than serialized as null
        assert!(!json.contains("currentQuestion"));
        assert!(!json.contains("\"current_question\":null"));
    }
}
