//! Configuration constants for the quizroom session core
//!
//! This module contains all the configuration limits and constraints
//! used throughout the session core to ensure data integrity and
//! provide consistent boundaries for different components.

/// Join PIN configuration constants
pub mod pin {
    /// Number of characters in a join PIN
    pub const PIN_LENGTH: usize = 6;
    /// Characters a join PIN is drawn from (uppercase alphanumeric)
    pub const PIN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
}

/// Session and roster configuration constants
pub mod session {
    /// Maximum number of players allowed in a single session
    pub const MAX_PLAYER_COUNT: usize = 1000;
    /// Maximum length of a player display name in characters
    pub const MAX_NAME_LENGTH: usize = 50;
}

/// Question configuration constants
pub mod question {
    /// Maximum length of a question text in characters
    pub const MAX_TEXT_LENGTH: usize = 200;
    /// Maximum length of a single answer option in characters
    pub const MAX_OPTION_LENGTH: usize = 200;
    /// Minimum number of answer options for a question
    pub const MIN_OPTION_COUNT: usize = 2;
    /// Maximum number of answer options for a question
    pub const MAX_OPTION_COUNT: usize = 8;
    /// Minimum time limit in seconds for answering a question
    pub const MIN_TIME_LIMIT: u32 = 1;
    /// Maximum time limit in seconds for answering a question
    pub const MAX_TIME_LIMIT: u32 = 240;
}

/// Round flow configuration constants
pub mod round {
    /// Points awarded for an instant correct answer
    pub const MAX_POINTS: u64 = 1000;
    /// Seconds the reveal stays visible before the host advances
    pub const REVEAL_DWELL_SECONDS: u64 = 3;
}
