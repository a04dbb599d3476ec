use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use anyhow::ensure;
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    board::{Action, MatchState, PlayerId},
    bot::{BotIdentity, BotPool},
    configuration::Configuration,
    error::RefereeError,
    match_config::MatchConfig,
    match_log::{MatchRecorder, TickAction},
    protocol::{self, ProtocolError, END_OF_GAME, READY},
    rules,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPhase {
    #[default]
    NotStarted,
    Running,
    Ended,
}

/// Why the match stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// A pawn reached its goal side.
    GoalReached(PlayerId),
    /// Every other pawn was eliminated.
    LastStanding(PlayerId),
    /// `max_ticks` ticks were played.
    TickLimit,
    /// Stopped from outside through an [`AbortHandle`].
    Aborted,
}

#[derive(Debug, Default)]
struct Shared {
    aborted: AtomicBool,
    phase: Mutex<MatchPhase>,
}

/// Shared with a running match: stops it at the next tick boundary and tells where it is.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<Shared>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.aborted.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> MatchPhase {
        *self.0.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: MatchPhase) {
        *self.0.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub ending: Ending,
    /// Bot id → score.
    pub scores: BTreeMap<String, f64>,
    pub final_state: MatchState,
    pub recorder: MatchRecorder,
}

/// Drives one match: asks the bots in turn, enforces the rules and records everything.
pub struct MatchRunner {
    state: MatchState,
    bots: BotPool,
    identities: Vec<BotIdentity>,
    admitted: Vec<bool>,
    recorder: MatchRecorder,
    rng: StdRng,
    verbose: bool,
    abort: AbortHandle,
}

impl MatchRunner {
    /// `bots` must hold one bot per player, in player order.
    pub fn new(
        state: MatchState,
        bots: BotPool,
        config: &Configuration,
    ) -> anyhow::Result<MatchRunner> {
        ensure!(
            bots.len() == state.player_count(),
            "{} bots for {} players",
            bots.len(),
            state.player_count()
        );
        let identities = bots.identities();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(MatchRunner {
            recorder: MatchRecorder::new(&identities, &state),
            admitted: vec![false; identities.len()],
            identities,
            state,
            bots,
            rng,
            verbose: config.verbose,
            abort: AbortHandle::default(),
        })
    }

    /// Load the map and spawn the bots of `match_config`.
    pub fn from_config(
        match_config: &MatchConfig,
        config: &Configuration,
    ) -> anyhow::Result<MatchRunner> {
        let state = match_config.load_map()?.to_state()?;
        let bots = BotPool::launch(&match_config.bots, config);
        MatchRunner::new(state, bots, config)
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn phase(&self) -> MatchPhase {
        self.abort.phase()
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Play the match to its end. Bots are stopped whatever the result.
    ///
    /// # Errors
    /// Only on an internal inconsistency of the engine; bot misbehavior never fails a match.
    #[instrument(skip_all, fields(players = self.state.player_count()))]
    pub fn run(mut self) -> Result<MatchOutcome, RefereeError> {
        let result = self.play();
        self.bots.stop_all();
        self.abort.set_phase(MatchPhase::Ended);
        let ending = result.inspect_err(|e| error!("{e}"))?;

        let scores = compute_scores(&self.state, ending)?;
        let scores: BTreeMap<_, _> = self
            .identities
            .iter()
            .zip(scores)
            .map(|(bot, score)| (bot.id.clone(), score))
            .collect();
        info!(?ending, ?scores, ticks = self.state.tick_id(), "match over");
        self.recorder.set_scores(scores.clone());
        Ok(MatchOutcome {
            ending,
            scores,
            final_state: self.state,
            recorder: self.recorder,
        })
    }

    fn play(&mut self) -> Result<Ending, RefereeError> {
        self.start()?;
        let ending = loop {
            if let Some(ending) = end_status(&self.state)? {
                break ending;
            }
            if self.abort.is_aborted() {
                warn!("match aborted");
                break Ending::Aborted;
            }
            self.play_tick()?;
        };
        if ending != Ending::Aborted {
            self.say_goodbye();
        }
        Ok(ending)
    }

    fn start(&mut self) -> Result<(), RefereeError> {
        self.abort.set_phase(MatchPhase::Running);
        let replies = self.bots.handshake();
        for (player, reply) in replies.into_iter().enumerate() {
            self.recorder.received(player, protocol::START);
            if let Some(data) = &reply.data {
                self.recorder.sent(player, data);
            }
            self.admitted[player] = reply.ok() == Some(READY);
            if !self.admitted[player] {
                let reason = match reply.error {
                    Some(e) => e.to_string(),
                    None => format!("expected '{READY}' but received {:?}", reply.data),
                };
                warn!(bot = self.identities[player].id, "bot not admitted: {reason}");
                self.recorder.command_error(player, reason);
            }
        }
        for player in 0..self.state.player_count() {
            if self.admitted[player] {
                let message = protocol::handshake_message(&self.state, player);
                if let Err(e) = self.send(player, &message) {
                    self.recorder.command_error(player, e);
                }
            }
        }
        self.collect_bot_status();
        let distances = rules::goal_distances(&self.state)?;
        self.recorder
            .record_tick(&self.state, TickAction::Start, false, distances);
        if self.verbose {
            println!("{}", self.state);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(tick = self.state.tick_id() + 1))]
    fn play_tick(&mut self) -> Result<(), RefereeError> {
        self.state.tick_id += 1;
        let player = next_player(&self.state)?;
        self.state.current_player = Some(player);
        trace!(player, "player to play");

        let (action, defaulted) = if !rules::can_act(&self.state, player)? {
            if self.state.variant().eliminate_stuck {
                info!(player, "player cannot act and is eliminated");
                rules::eliminate(&mut self.state, player);
            } else {
                info!(player, "player cannot act, turn skipped");
            }
            (TickAction::CannotMove, false)
        } else {
            let (action, defaulted) = match self.ask_bot(player)? {
                Ok(action) => (action, false),
                Err(reason) => {
                    debug!(player, "default action used: {reason}");
                    self.recorder.command_error(player, reason);
                    (
                        rules::default_action(&self.state, player, &mut self.rng)?,
                        true,
                    )
                }
            };
            rules::apply_action(&mut self.state, player, action);
            (action.into(), defaulted)
        };

        self.collect_bot_status();
        let distances = rules::goal_distances(&self.state)?;
        self.recorder
            .record_tick(&self.state, action, defaulted, distances);
        if self.verbose {
            println!("{}", self.state);
        }
        Ok(())
    }

    /// The action `player`'s bot wants to play, or why it cannot be used.
    fn ask_bot(&mut self, player: PlayerId) -> Result<Result<Action, String>, RefereeError> {
        if !self.admitted[player] {
            return Ok(Err("bot was not admitted at handshake".to_string()));
        }
        if let Some(reason) = self.bots.get_mut(player).offline_reason() {
            return Ok(Err(format!("bot is offline: {reason}")));
        }
        for line in self.bots.get_mut(player).discard_pending() {
            warn!(player, "late answer discarded: {line:?}");
            self.recorder.sent(player, &line);
        }

        let message = protocol::tick_message(&self.state);
        if let Err(e) = self.send(player, &message) {
            return Ok(Err(e));
        }
        let reply = self.bots.get_mut(player).ask(1);
        if let Some(data) = &reply.data {
            self.recorder.sent(player, data);
        }
        if let Some(error) = reply.error {
            return Ok(Err(error.to_string()));
        }
        let Some(line) = reply.data else {
            return Ok(Err(ProtocolError::NoResponse.to_string()));
        };

        let action = match protocol::parse_response(&line, self.state.board_size()) {
            Ok(action) => action,
            Err(e) => return Ok(Err(e.to_string())),
        };
        Ok(rules::validate_action(&self.state, player, &action)?
            .map(|()| action)
            .map_err(|e| format!("invalid input! Reason: {e}")))
    }

    fn send(&mut self, player: PlayerId, message: &str) -> Result<(), String> {
        match self.bots.get_mut(player).send(message) {
            Ok(()) => {
                self.recorder.received(player, message);
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Move bot diagnostics and offline flags into the current tick.
    fn collect_bot_status(&mut self) {
        for player in 0..self.bots.len() {
            let bot = self.bots.get_mut(player);
            let log = bot.take_log();
            let offline = !bot.is_online();
            if let Some(log) = log {
                self.recorder.bot_log(player, log);
            }
            if offline {
                self.recorder.mark_offline(player);
            }
        }
    }

    fn say_goodbye(&mut self) {
        for player in 0..self.bots.len() {
            if self.admitted[player]
                && self.state.is_active(player)
                && self.bots.get_mut(player).is_online()
            {
                // a bot quitting before reading it is fine
                let _ = self.send(player, END_OF_GAME);
            }
        }
        self.recorder.flush_into_last_tick();
    }
}

/// The next active player after the current one, in circular order.
///
/// # Errors
/// [`RefereeError::SamePlayerAgain`] when the scan comes back to the current player, and
/// [`RefereeError::NoPlayerAlive`] when no pawn is left.
pub fn next_player(state: &MatchState) -> Result<PlayerId, RefereeError> {
    let count = state.player_count();
    let first = state.current_player().map_or(0, |current| current + 1);
    let next = (first..first + count)
        .map(|i| i % count)
        .find(|&player| state.is_active(player))
        .ok_or(RefereeError::NoPlayerAlive)?;
    if state.current_player() == Some(next) {
        return Err(RefereeError::SamePlayerAgain(next));
    }
    Ok(next)
}

/// Whether the match is over, checked after every tick.
pub fn end_status(state: &MatchState) -> Result<Option<Ending>, RefereeError> {
    if let Some(winner) = state.players_on_goal().next() {
        return Ok(Some(Ending::GoalReached(winner)));
    }
    let mut active = state.active_players();
    match (active.next(), active.next()) {
        (None, _) => return Err(RefereeError::NoPlayerAlive),
        (Some(survivor), None) => return Ok(Some(Ending::LastStanding(survivor))),
        _ => {}
    }
    if state.tick_id() >= state.max_ticks() {
        return Ok(Some(Ending::TickLimit));
    }
    Ok(None)
}

/// Scores by player. At the tick limit, 1 is split between the active players with the
/// shortest remaining path.
pub fn compute_scores(state: &MatchState, ending: Ending) -> Result<Vec<f64>, RefereeError> {
    let mut scores = vec![0.0; state.player_count()];
    match ending {
        Ending::GoalReached(winner) | Ending::LastStanding(winner) => scores[winner] = 1.0,
        Ending::Aborted => {}
        Ending::TickLimit => {
            let distances = rules::goal_distances(state)?;
            if let Some(best) = distances.iter().flatten().min() {
                let leaders: Vec<_> = (0..distances.len())
                    .filter(|&p| distances[p] == Some(*best))
                    .collect();
                for &player in &leaders {
                    scores[player] = 1.0 / leaders.len() as f64;
                }
            }
        }
    }
    Ok(scores)
}
