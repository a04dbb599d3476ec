use std::{
    collections::VecDeque,
    io::{BufRead, BufReader, Read, Write},
    process::{Child, ChildStdin, Command, Stdio},
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use tracing::{debug, instrument, trace, warn};

use crate::bot::{BotConnection, BotError, BotIdentity, Reply};

/// Time bank rules shared by every bot of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    /// Bank at the start of the match.
    pub initial: Duration,
    /// Added to the bank each time the bot is asked something.
    pub per_round: Duration,
}

impl Default for TimeBudget {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            per_round: Duration::from_millis(30),
        }
    }
}

#[derive(Debug)]
enum StreamEvent {
    Line(String),
    Closed,
    Failed(String),
}

/// A bot running as a child process, spoken to over its standard streams.
///
/// Child process is killed on drop.
#[derive(Debug)]
pub struct BotProcess {
    identity: BotIdentity,
    child: Child,
    stdin: Option<ChildStdin>,
    events: Receiver<StreamEvent>,
    pending: VecDeque<String>,
    stderr: Option<Arc<Mutex<String>>>,
    budget: TimeBudget,
    available_time: Duration,
    failure: Option<String>,
    stopped: bool,
}

impl BotProcess {
    const KILL_TIMEOUT: Duration = Duration::from_secs(1);

    /// Run `run_command` through `sh -c`. With `capture_stderr` the bot's diagnostics are kept
    /// for the match log, otherwise they go straight to the referee's stderr.
    #[instrument(skip_all, fields(bot = identity.id))]
    pub fn spawn(
        identity: BotIdentity,
        run_command: &str,
        budget: TimeBudget,
        capture_stderr: bool,
    ) -> anyhow::Result<BotProcess> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(run_command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if capture_stderr {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .spawn()
            .with_context(|| format!("could not start '{run_command}'"))?;
        debug!(pid = child.id(), "bot started");

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("child stdout was not captured"))?;

        let (sender, events) = mpsc::channel();
        thread::Builder::new()
            .name(format!("{}-stdout", identity.id))
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                let mut buf = String::new();
                loop {
                    buf.clear();
                    let event = match reader.read_line(&mut buf) {
                        Ok(0) => StreamEvent::Closed,
                        Ok(_) => {
                            let line = buf.trim();
                            if line.is_empty() {
                                continue;
                            }
                            StreamEvent::Line(line.to_string())
                        }
                        Err(e) => StreamEvent::Failed(format!("read error: {e}")),
                    };
                    let last = !matches!(event, StreamEvent::Line(_));
                    if sender.send(event).is_err() || last {
                        break;
                    }
                }
            })
            .context("could not start stdout reader")?;

        let stderr = match child.stderr.take() {
            Some(mut pipe) => {
                let log = Arc::new(Mutex::new(String::new()));
                let sink = Arc::clone(&log);
                thread::Builder::new()
                    .name(format!("{}-stderr", identity.id))
                    .spawn(move || {
                        let mut chunk = [0u8; 4096];
                        while let Ok(n) = pipe.read(&mut chunk) {
                            if n == 0 {
                                break;
                            }
                            if let Ok(mut log) = sink.lock() {
                                log.push_str(&String::from_utf8_lossy(&chunk[..n]));
                            }
                        }
                    })
                    .context("could not start stderr reader")?;
                Some(log)
            }
            None => None,
        };

        Ok(BotProcess {
            identity,
            child,
            stdin,
            events,
            pending: VecDeque::new(),
            stderr,
            budget,
            available_time: budget.initial,
            failure: None,
            stopped: false,
        })
    }

    /// Remaining time bank.
    pub fn available_time(&self) -> Duration {
        self.available_time
    }

    fn mark_offline(&mut self, reason: impl Into<String>) {
        if self.failure.is_none() {
            let reason = reason.into();
            warn!(bot = self.identity.id, "bot went offline: {reason}");
            self.failure = Some(reason);
        }
    }

    fn handle(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Line(line) => {
                trace!(bot = self.identity.id, "received {line:?}");
                self.pending.push_back(line);
            }
            StreamEvent::Closed => self.mark_offline("output stream closed"),
            StreamEvent::Failed(e) => self.mark_offline(e),
        }
    }

    fn drain_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.mark_offline("output stream closed");
                    break;
                }
            }
        }
    }

    fn poll_exit(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => self.mark_offline(format!("process exited ({status})")),
            Ok(None) => {}
            Err(e) => self.mark_offline(format!("could not poll process: {e}")),
        }
    }

    /// Kill the process and wait at most `max_duration` for it to be reaped.
    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        if self.child.try_wait().context("could not poll process")?.is_some() {
            return Ok(());
        }
        self.child.kill().context("could not kill process")?;
        let deadline = Instant::now() + max_duration;
        while self
            .child
            .try_wait()
            .context("could not poll process")?
            .is_none()
        {
            if Instant::now() > deadline {
                return Err(anyhow!("process cleanup timed out"));
            }
            thread::sleep(Duration::from_millis(10).min(max_duration / 10));
        }
        Ok(())
    }
}

impl BotConnection for BotProcess {
    fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    fn send(&mut self, message: &str) -> Result<(), BotError> {
        if let Some(reason) = self.offline_reason() {
            return Err(BotError::Offline(reason));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            self.mark_offline("input stream closed");
            return Err(BotError::Offline("input stream closed".to_string()));
        };
        let written = stdin
            .write_all(message.as_bytes())
            .and_then(|()| stdin.write_all(b"\n"))
            .and_then(|()| stdin.flush());
        if let Err(e) = written {
            let reason = format!("write error: {e}");
            self.mark_offline(reason.clone());
            return Err(BotError::Offline(reason));
        }
        trace!(bot = self.identity.id, "sent {message:?}");
        Ok(())
    }

    #[instrument(skip(self), fields(bot = self.identity.id))]
    fn ask(&mut self, expected_lines: usize) -> Reply {
        if let Some(reason) = &self.failure {
            return Reply::failed(BotError::Offline(reason.clone()));
        }

        self.available_time += self.budget.per_round;
        let start = Instant::now();
        let deadline = start + self.available_time;
        while self.pending.len() < expected_lines && self.failure.is_none() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.events.recv_timeout(deadline - now) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => self.mark_offline("output stream closed"),
            }
        }
        let elapsed = start.elapsed();
        self.available_time = self.available_time.saturating_sub(elapsed);
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            left_ms = self.available_time.as_millis() as u64,
            "bot answered"
        );

        let count = expected_lines.min(self.pending.len());
        let data = (count > 0).then(|| self.pending.drain(..count).collect::<Vec<_>>().join("\n"));
        let error = match &self.failure {
            Some(reason) => Some(BotError::Offline(reason.clone())),
            None if count < expected_lines && self.available_time.is_zero() => {
                Some(BotError::TimeLimitExceeded)
            }
            None => None,
        };
        Reply { data, error }
    }

    fn offline_reason(&mut self) -> Option<String> {
        if self.failure.is_none() {
            self.drain_events();
        }
        if self.failure.is_none() && !self.stopped {
            self.poll_exit();
        }
        self.failure.clone()
    }

    fn discard_pending(&mut self) -> Vec<String> {
        self.drain_events();
        self.pending.drain(..).collect()
    }

    fn take_log(&mut self) -> Option<String> {
        let log = self.stderr.as_ref()?;
        let mut log = log.lock().ok()?;
        if log.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut *log))
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        drop(self.stdin.take());
        if let Err(e) = self.try_kill(Self::KILL_TIMEOUT) {
            warn!(bot = self.identity.id, "could not stop bot: {e:#}");
        }
        self.mark_offline("stopped by the referee");
    }
}

impl Drop for BotProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spawn(cmd: &str, budget_ms: u64) -> BotProcess {
        let budget = TimeBudget {
            initial: Duration::from_millis(budget_ms),
            per_round: Duration::from_millis(10),
        };
        BotProcess::spawn(BotIdentity::new("t", "test", 0), cmd, budget, true).unwrap()
    }

    #[test]
    fn echoes_trimmed_lines() {
        let mut bot = spawn("read l; echo; echo \"  $l  \"", 2000);
        bot.send("hello").unwrap();
        let reply = bot.ask(1);
        assert_eq!(reply.data.as_deref(), Some("hello"));
    }

    #[test]
    fn silent_bot_exceeds_time_limit() {
        let mut bot = spawn("cat > /dev/null", 50);
        let start = Instant::now();
        let reply = bot.ask(1);
        assert_eq!(reply, Reply::failed(BotError::TimeLimitExceeded));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert!(bot.is_online());
        assert!(bot.available_time().is_zero());
    }

    #[test]
    fn late_answer_is_kept_apart() {
        let budget = TimeBudget {
            initial: Duration::ZERO,
            per_round: Duration::from_millis(100),
        };
        let cmd = "read l; sleep 0.3; echo late-$l; while read l; do echo on-time-$l; done";
        let identity = BotIdentity::new("t", "test", 0);
        let mut bot = BotProcess::spawn(identity, cmd, budget, true).unwrap();

        bot.send("tick1").unwrap();
        assert_eq!(bot.ask(1), Reply::failed(BotError::TimeLimitExceeded));
        thread::sleep(Duration::from_millis(500));
        assert_eq!(bot.discard_pending(), ["late-tick1"]);

        bot.send("tick2").unwrap();
        let reply = bot.ask(1);
        assert_eq!(reply.data.as_deref(), Some("on-time-tick2"));
        assert!(bot.discard_pending().is_empty());
    }

    #[test]
    fn exited_bot_is_offline() {
        let mut bot = spawn("echo OK", 2000);
        let reply = bot.ask(1);
        assert_eq!(reply.data.as_deref(), Some("OK"));
        let reply = bot.ask(1);
        assert!(matches!(reply.error, Some(BotError::Offline(_))));
        assert!(bot.send("1").is_err());
        assert!(!bot.is_online());
    }

    #[test]
    fn stderr_is_captured() {
        let mut bot = spawn("echo thinking >&2; echo 4 5; cat > /dev/null", 2000);
        assert_eq!(bot.ask(1).data.as_deref(), Some("4 5"));
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut log = String::new();
        while !log.contains("thinking") && Instant::now() < deadline {
            log.push_str(&bot.take_log().unwrap_or_default());
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(log, "thinking\n");
    }

    #[test]
    fn stop_kills_the_process() {
        let mut bot = spawn("while true; do sleep 1; done", 100);
        bot.stop();
        assert!(bot.child.try_wait().unwrap().is_some());
        assert!(!bot.is_online());
    }
}
