//! Internal-consistency failures of the referee.
//!
//! Everything a bot can do wrong is recovered locally (default action, offline bot). The errors
//! below can only be produced by a defect in the engine itself, so they abort the whole match.

use thiserror::Error;

use crate::board::PlayerId;

/// A fatal error: one of the invariants the engine relies on was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefereeError {
    /// Turn sequencing found no alive player other than the current one.
    #[error("internal referee error: the same player ({0}) comes again")]
    SamePlayerAgain(PlayerId),

    /// Every pawn is eliminated, nobody can be selected.
    #[error("internal referee error: no player is alive")]
    NoPlayerAlive,

    /// The player was deemed able to act but no default action exists.
    #[error("internal referee error: player {0} cannot do anything, but was deemed able to act")]
    NoDefaultAction(PlayerId),

    /// The breadth-first search went deeper than the number of cells.
    #[error("internal referee error: max depth {max_depth} reached in path search")]
    SearchDepthExceeded {
        /// the bound that was exceeded (`board_size²`)
        max_depth: usize,
    },

    /// The initial state handed to the referee is not playable.
    #[error("invalid initial state: {0}")]
    InvalidInitialState(String),
}
