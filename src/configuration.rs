//! Config for the referee behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive, set them to `"true"` to enable them.
//!
//! - `REFEREE_VERBOSE`: Print the board after every tick (default: `false`)
//! - `REFEREE_LOG`: Enable tracing logs to a file in the output directory (default: `false`)
//! - `REFEREE_DEBUG_BOT_STDERR`: Let bots write to the referee's stderr instead of capturing
//!   it into the match log (default: `false`)
//! - `REFEREE_INITIAL_BUDGET_MS`: Time bank of every bot at the start of the match
//!   (default: `1000`)
//! - `REFEREE_ROUND_BONUS_MS`: Time added to the bank before every question (default: `30`)
//! - `REFEREE_OUTPUT_DIR`: Where `match.log`, `score.json` and logs are written (default: `.`)
//! - `REFEREE_SEED`: Seed of the random default actions (default: random)

use std::{env, path::PathBuf, time::Duration};

use crate::bot_process::TimeBudget;

/// Configuration for referee behaviors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) debug_bot_stderr: bool,
    pub(crate) time_budget: TimeBudget,
    pub(crate) output_dir: PathBuf,
    pub(crate) seed: Option<u64>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The board is not printed.
    /// - Logging to file is disabled.
    /// - Bot stderr is captured into the match log.
    /// - Bots start with 1000ms of time bank and earn 30ms per question.
    /// - Output files go to the current directory.
    /// - Default actions are drawn from an unseeded generator.
    pub fn new() -> Self {
        Self {
            verbose: false,
            log: false,
            debug_bot_stderr: false,
            time_budget: TimeBudget::default(),
            output_dir: PathBuf::from("."),
            seed: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Any missing or unparsable variable results in the default value for its field.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn parse_u64(var: &str) -> Option<u64> {
            env::var(var).ok()?.trim().parse().ok()
        }

        let defaults = TimeBudget::default();
        Self {
            verbose: get_env_flag("REFEREE_VERBOSE", false),
            log: get_env_flag("REFEREE_LOG", false),
            debug_bot_stderr: get_env_flag("REFEREE_DEBUG_BOT_STDERR", false),
            time_budget: TimeBudget {
                initial: parse_u64("REFEREE_INITIAL_BUDGET_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.initial),
                per_round: parse_u64("REFEREE_ROUND_BONUS_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.per_round),
            },
            output_dir: env::var_os("REFEREE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            seed: parse_u64("REFEREE_SEED"),
        }
    }

    /// Enable or disable printing the board after every tick.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable bot stderr passthrough (debug purposes only).
    pub fn with_debug_bot_stderr(mut self, value: bool) -> Self {
        self.debug_bot_stderr = value;
        self
    }

    /// Time bank every bot starts the match with.
    pub fn with_initial_time_budget(mut self, value: Duration) -> Self {
        self.time_budget.initial = value;
        self
    }

    /// Time added to a bot's bank each time it is asked for a response.
    pub fn with_round_bonus(mut self, value: Duration) -> Self {
        self.time_budget.per_round = value;
        self
    }

    /// Directory receiving `match.log`, `score.json` and the log file.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Seed the generator used for default actions, making fallback play reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Where output artifacts go.
    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    pub fn is_log_enabled(&self) -> bool {
        self.log
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Configuration::new()
            .with_verbose(true)
            .with_initial_time_budget(Duration::from_millis(200))
            .with_round_bonus(Duration::from_millis(5))
            .with_output_dir("/tmp/out")
            .with_seed(42);
        assert!(config.verbose);
        assert!(!config.log);
        assert_eq!(config.time_budget.initial, Duration::from_millis(200));
        assert_eq!(config.time_budget.per_round, Duration::from_millis(5));
        assert_eq!(config.output_dir(), std::path::Path::new("/tmp/out"));
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn default_time_budget() {
        let config = Configuration::default();
        assert_eq!(config.time_budget.initial, Duration::from_millis(1000));
        assert_eq!(config.time_budget.per_round, Duration::from_millis(30));
        assert_eq!(config.seed, None);
    }
}
