use std::hash::Hash;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    board::PlayerId,
    bot_process::BotProcess,
    configuration::Configuration,
    match_config::BotConfig,
    protocol::{READY, START},
};

/// Who a bot is, as declared in the match configuration. `index` is the player it controls.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
    pub index: PlayerId,
}

impl PartialEq for BotIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.index == other.index
    }
}

impl Eq for BotIdentity {}

impl Hash for BotIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.index.hash(state);
    }
}

impl BotIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, index: PlayerId) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            index,
        }
    }
}

/// Per-bot communication failures. None of them is fatal to the match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    /// The process exited, closed its output or could not be written to. Permanent.
    #[error("bot is offline: {0}")]
    Offline(String),

    /// The time bank ran out before the expected lines arrived.
    #[error("response time limit exceeded")]
    TimeLimitExceeded,
}

/// What came back from [`BotConnection::ask`].
///
/// Both fields can be set at once: a bot may print its answer and then crash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Received lines joined with `\n`, `None` if nothing arrived.
    pub data: Option<String>,
    pub error: Option<BotError>,
}

impl Reply {
    pub fn failed(error: BotError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// The data, only if it arrived without error.
    pub fn ok(&self) -> Option<&str> {
        match self.error {
            None => self.data.as_deref(),
            Some(_) => None,
        }
    }
}

/// A connected bot. The match runner only talks to bots through this trait.
pub trait BotConnection: Send {
    fn identity(&self) -> &BotIdentity;

    /// Write one message followed by a newline. A failed write puts the bot offline for good.
    fn send(&mut self, message: &str) -> Result<(), BotError>;

    /// Wait for `expected_lines` non-empty lines, within the bot's remaining time bank.
    fn ask(&mut self, expected_lines: usize) -> Reply;

    /// Why the bot went offline, `None` while it is still reachable.
    fn offline_reason(&mut self) -> Option<String>;

    fn is_online(&mut self) -> bool {
        self.offline_reason().is_none()
    }

    /// Lines that arrived after their question was given up on. Called before each new question
    /// so an answer that came too late is never taken for the next one.
    fn discard_pending(&mut self) -> Vec<String> {
        Vec::new()
    }

    /// Diagnostics the bot wrote since the previous call, if any.
    fn take_log(&mut self) -> Option<String> {
        None
    }

    /// Close the bot's input and terminate it. Idempotent.
    fn stop(&mut self);
}

/// Stand-in for a bot whose process could not even be started.
#[derive(Debug)]
pub struct UnreachableBot {
    identity: BotIdentity,
    reason: String,
}

impl UnreachableBot {
    pub fn new(identity: BotIdentity, reason: String) -> Self {
        Self { identity, reason }
    }
}

impl BotConnection for UnreachableBot {
    fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    fn send(&mut self, _message: &str) -> Result<(), BotError> {
        Err(BotError::Offline(self.reason.clone()))
    }

    fn ask(&mut self, _expected_lines: usize) -> Reply {
        Reply::failed(BotError::Offline(self.reason.clone()))
    }

    fn offline_reason(&mut self) -> Option<String> {
        Some(self.reason.clone())
    }

    fn stop(&mut self) {}
}

/// All the bots of a match, indexed by player.
pub struct BotPool {
    bots: Vec<Box<dyn BotConnection>>,
}

impl BotPool {
    pub fn new(bots: Vec<Box<dyn BotConnection>>) -> Self {
        Self { bots }
    }

    /// Start one process per configured bot. A bot that cannot be spawned joins the pool as
    /// already offline, so the match still runs with default actions in its place.
    #[instrument(skip_all, fields(bots = configs.len()))]
    pub fn launch(configs: &[BotConfig], config: &Configuration) -> BotPool {
        let bots = configs
            .iter()
            .enumerate()
            .map(|(index, bot)| {
                let identity = BotIdentity::new(&bot.id, &bot.name, index);
                match BotProcess::spawn(
                    identity.clone(),
                    &bot.run_command,
                    config.time_budget,
                    !config.debug_bot_stderr,
                ) {
                    Ok(process) => Box::new(process) as Box<dyn BotConnection>,
                    Err(e) => {
                        warn!(bot = bot.id, "could not launch bot: {e:#}");
                        Box::new(UnreachableBot::new(identity, format!("{e:#}")))
                    }
                }
            })
            .collect();
        BotPool { bots }
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    pub fn get_mut(&mut self, player: PlayerId) -> &mut dyn BotConnection {
        self.bots[player].as_mut()
    }

    pub fn identities(&self) -> Vec<BotIdentity> {
        self.bots.iter().map(|bot| bot.identity().clone()).collect()
    }

    /// Send `START` to every bot concurrently and collect what each answered.
    ///
    /// A bot is admitted when [`Reply::ok`] is exactly `OK`.
    #[instrument(skip_all)]
    pub fn handshake(&mut self) -> Vec<Reply> {
        let replies = std::thread::scope(|s| {
            let handles: Vec<_> = self
                .bots
                .iter_mut()
                .map(|bot| {
                    s.spawn(move || {
                        if let Err(e) = bot.send(START) {
                            return Reply::failed(e);
                        }
                        bot.ask(1)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Reply::failed(BotError::Offline("handshake thread panicked".to_string()))
                    })
                })
                .collect::<Vec<_>>()
        });
        let ready = replies.iter().filter(|r| r.ok() == Some(READY)).count();
        info!("{ready}/{} bots ready", replies.len());
        replies
    }

    pub fn stop_all(&mut self) {
        for bot in &mut self.bots {
            bot.stop();
        }
    }
}

impl Drop for BotPool {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_bot_is_offline() {
        let mut bot = UnreachableBot::new(BotIdentity::new("a", "A", 0), "no such file".into());
        assert!(!bot.is_online());
        assert_eq!(
            bot.send("START"),
            Err(BotError::Offline("no such file".into()))
        );
        let reply = bot.ask(1);
        assert_eq!(reply.data, None);
        assert_eq!(reply.ok(), None);
    }

    #[test]
    fn handshake_reports_every_bot() {
        let mut pool = BotPool::new(vec![
            Box::new(UnreachableBot::new(BotIdentity::new("a", "A", 0), "x".into())),
            Box::new(UnreachableBot::new(BotIdentity::new("b", "B", 1), "y".into())),
        ]);
        let replies = pool.handshake();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].error, Some(BotError::Offline("y".into())));
    }

    #[test]
    fn reply_with_error_has_no_usable_data() {
        let reply = Reply {
            data: Some("OK".into()),
            error: Some(BotError::Offline("exited".into())),
        };
        assert_eq!(reply.ok(), None);
    }
}
