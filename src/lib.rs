//! # Quizroom Session Core
//!
//! This library provides the session-synchronization core of a real-time
//! multiplayer trivia game. A host and any number of players coordinate
//! exclusively through a shared session document held in a pub/sub store:
//! every client subscribes to the document, reduces each pushed snapshot
//! into a local round view, and writes back only the fields it owns.
//!
//! The host creates a session with a fixed question list and a join PIN,
//! starts the game once players arrive, and drives round advance off its
//! own countdown. Players join by PIN, answer against their own local
//! countdown, and earn speed-scaled points for correct answers. Nobody
//! talks to anybody directly; the document is the only channel.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod constants;

pub mod host;
pub mod leaderboard;
pub mod pin;
pub mod player;
pub mod round;
pub mod session;
pub mod store;
