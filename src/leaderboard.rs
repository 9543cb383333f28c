//! Roster ranking for reveals and final results
//!
//! Standings are derived from a session snapshot on demand: descending by
//! score, with ties broken by original roster order. The sort is stable and
//! no secondary tiebreak field is consulted, so two tied players rank in
//! join order.

use std::cmp::Reverse;

use itertools::Itertools;

use crate::session::{GameSession, Id};

/// One ranked row of the leaderboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// The ranked player's identifier
    pub player_id: Id,
    /// The ranked player's display name
    pub name: String,
    /// The ranked player's accumulated score
    pub score: u64,
    /// Position in the ranking, 1-indexed
    pub position: usize,
}

/// Ranks the roster of a session snapshot
///
/// Used for the host's live standings during a reveal and for the final
/// ranking every client renders once the session is finished.
pub fn standings(session: &GameSession) -> Vec<Standing> {
    session
        .players
        .values()
        .sorted_by_key(|player| Reverse(player.score))
        .enumerate()
        .map(|(index, player)| Standing {
            player_id: player.id,
            name: player.name.clone(),
            score: player.score,
            position: index + 1,
        })
        .collect()
}

/// The standing of one specific player, if present in the roster
pub fn standing_of(session: &GameSession, player_id: Id) -> Option<Standing> {
    standings(session)
        .into_iter()
        .find(|standing| standing.player_id == player_id)
}
