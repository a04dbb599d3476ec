//! Match history: one record per tick plus the communication with every bot during that tick.
//!
//! Written as `match.log` (the whole history, JSON) and `score.json` (bot id → score).

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::Context;
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    board::{Action, MatchState, Orientation, PlayerId, Position, Wall},
    bot::BotIdentity,
};

pub const MATCH_LOG_FILE: &str = "match.log";
pub const SCORE_FILE: &str = "score.json";

/// What happened during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TickAction {
    /// The initial position, before any turn.
    Start,
    Move {
        x: i32,
        y: i32,
    },
    Place {
        x: i32,
        y: i32,
        #[serde(rename = "isVertical")]
        is_vertical: u8,
    },
    /// The player could neither move nor place a wall.
    CannotMove,
}

impl From<Action> for TickAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Move(Position { x, y }) => TickAction::Move { x, y },
            Action::PlaceWall(wall) => TickAction::Place {
                x: wall.x,
                y: wall.y,
                is_vertical: (wall.orientation == Orientation::Vertical).into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedMessage {
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl TimedMessage {
    fn now(message: &str) -> Self {
        Self {
            message: message.to_string(),
            timestamp: (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
        }
    }
}

/// Communication with one bot during one tick, seen from the bot: `received` is what the
/// referee wrote to it, `sent` is what it answered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommLog {
    pub received: Vec<TimedMessage>,
    pub sent: Vec<TimedMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_log: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub offline: bool,
}

impl CommLog {
    pub fn is_empty(&self) -> bool {
        *self == CommLog::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRecord {
    pub tick_id: u32,
    pub current_player: Option<PlayerId>,
    pub pawn_pos: Vec<Position>,
    pub walls: Vec<Wall>,
    pub owned_walls: Vec<u32>,
    pub action: TickAction,
    /// The action was substituted after a failed or missing response.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub defaulted: bool,
    /// Shortest path to goal of every player after the tick.
    pub distances: Vec<Option<u32>>,
    /// Indexed by player. Bots that did not communicate have an empty entry.
    pub bots: Vec<CommLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub index: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInit {
    pub players: Vec<PlayerInfo>,
    pub board: usize,
    pub num_of_walls: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchLog {
    pub init: MatchInit,
    pub ticks: Vec<TickRecord>,
}

/// Accumulates the history of a match while it is played.
#[derive(Debug, Clone)]
pub struct MatchRecorder {
    log: MatchLog,
    pending: Vec<CommLog>,
    scores: BTreeMap<String, f64>,
}

impl MatchRecorder {
    pub fn new(players: &[BotIdentity], state: &MatchState) -> Self {
        let players: Vec<_> = players
            .iter()
            .map(|bot| PlayerInfo {
                id: bot.id.clone(),
                name: bot.name.clone(),
                index: bot.index,
            })
            .collect();
        Self {
            pending: vec![CommLog::default(); players.len()],
            log: MatchLog {
                init: MatchInit {
                    players,
                    board: state.board_size(),
                    num_of_walls: state.owned_walls().iter().sum(),
                },
                ticks: vec![],
            },
            scores: BTreeMap::new(),
        }
    }

    /// `message` was written to the bot.
    pub fn received(&mut self, bot: PlayerId, message: &str) {
        self.pending[bot].received.push(TimedMessage::now(message));
    }

    /// The bot answered `message`.
    pub fn sent(&mut self, bot: PlayerId, message: &str) {
        self.pending[bot].sent.push(TimedMessage::now(message));
    }

    pub fn command_error(&mut self, bot: PlayerId, error: impl ToString) {
        self.pending[bot].command_error = Some(error.to_string());
    }

    pub fn bot_log(&mut self, bot: PlayerId, log: String) {
        self.pending[bot]
            .bot_log
            .get_or_insert_with(String::new)
            .push_str(&log);
    }

    pub fn mark_offline(&mut self, bot: PlayerId) {
        self.pending[bot].offline = true;
    }

    /// Close the current tick: snapshot `state` and attach the communication gathered since the
    /// previous record.
    pub fn record_tick(
        &mut self,
        state: &MatchState,
        action: TickAction,
        defaulted: bool,
        distances: Vec<Option<u32>>,
    ) {
        let bots = std::mem::replace(
            &mut self.pending,
            vec![CommLog::default(); state.player_count()],
        );
        self.log.ticks.push(TickRecord {
            tick_id: state.tick_id(),
            current_player: state.current_player(),
            pawn_pos: state.pawns().to_vec(),
            walls: state.walls().to_vec(),
            owned_walls: state.owned_walls().to_vec(),
            action,
            defaulted,
            distances,
            bots,
        });
    }

    /// Communication gathered after the last tick, e.g. the end of game message, goes into the
    /// last record.
    pub fn flush_into_last_tick(&mut self) {
        let Some(last) = self.log.ticks.last_mut() else {
            return;
        };
        for (record, pending) in last.bots.iter_mut().zip(self.pending.iter_mut()) {
            let pending = std::mem::take(pending);
            record.received.extend(pending.received);
            record.sent.extend(pending.sent);
            if pending.command_error.is_some() {
                record.command_error = pending.command_error;
            }
            if let Some(log) = pending.bot_log {
                record.bot_log.get_or_insert_with(String::new).push_str(&log);
            }
            record.offline |= pending.offline;
        }
    }

    pub fn set_scores(&mut self, scores: BTreeMap<String, f64>) {
        self.scores = scores;
    }

    pub fn log(&self) -> &MatchLog {
        &self.log
    }

    pub fn ticks(&self) -> &[TickRecord] {
        &self.log.ticks
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    /// Write `match.log` and `score.json` into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create output directory {}", dir.display()))?;

        let log = serde_json::to_string_pretty(&self.log).context("could not serialize match log")?;
        let path = dir.join(MATCH_LOG_FILE);
        fs::write(&path, log).with_context(|| format!("could not write {}", path.display()))?;

        let scores =
            serde_json::to_string_pretty(&self.scores).context("could not serialize scores")?;
        let path = dir.join(SCORE_FILE);
        fs::write(&path, scores).with_context(|| format!("could not write {}", path.display()))?;
        Ok(())
    }
}
