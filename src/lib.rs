//! # Quoridor Referee
//!
//! Runs a Quoridor-like match between bots, each running as a separate OS process and talking
//! to the referee over its standard input and output.
//!
//! It provides:
//! - The board model and the legality engine (pawn moves, jumps, wall placement, path checks)
//!   in [`board`] and [`rules`]
//! - The turn orchestrator [`MatchRunner`](crate::match_runner::MatchRunner)
//! - A bot supervisor enforcing a per-bot time bank, see [`bot_process`]
//! - The match history and score files, see [`match_log`]
//!
//! A bot that crashes, answers garbage, plays an illegal action or runs out of time never stops
//! the match: a random legal action is played in its place and the failure is recorded.
//!
//! # Documentation Overview
//!
//! - The wire format spoken with bots is described in [`protocol`].
//! - Matches are described by JSON files, see [`match_config`].
//! - Runtime behavior (time bank, verbosity, logs, seed) is set through
//!   [`Configuration`](crate::configuration::Configuration).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::path::Path;
//! use quoridor_referee::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env().with_verbose(true);
//!     let match_config = MatchConfig::from_file(Path::new("match.json"))?;
//!
//!     let runner = MatchRunner::from_config(&match_config, &config)?;
//!     let outcome = runner.run()?;
//!     outcome.recorder.write_to(config.output_dir())?;
//!
//!     for (bot, score) in &outcome.scores {
//!         println!("{bot}: {score}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Bot Requirements
//!
//! - Answer `OK` to `START` within the initial time bank
//! - Answer every tick with exactly one line: `x y` to move or `x y isVertical` to place a wall
//! - Unused time is kept for later turns, and every question adds a small bonus to the bank

pub mod board;
pub mod bot;
pub mod bot_process;
pub mod configuration;
pub mod error;
mod logger;
pub mod match_config;
pub mod match_log;
pub mod match_runner;
pub mod protocol;
pub mod rules;

pub use anyhow;
pub use logger::init_logger;

/// Commonly used types for quick access.
///
/// ```rust
/// use quoridor_referee::prelude::*;
/// ```
pub mod prelude {
    pub use crate::board::{Action, MatchState, Position};
    pub use crate::configuration::Configuration;
    pub use crate::match_config::{MapConfig, MatchConfig};
    pub use crate::match_runner::{Ending, MatchOutcome, MatchRunner};
}
