use std::{path::PathBuf, process::ExitCode};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use tracing::error;

use quoridor_referee::{
    bot::BotPool,
    init_logger,
    match_config::{BotConfig, MapConfig},
    prelude::*,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Two,
    Four,
}

/// Referee for Quoridor-like bot matches.
///
/// Behavior can be tuned with the REFEREE_* environment variables.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Match file (JSON) naming the map and the bots
    #[arg(conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Play a standard map instead of a match file
    #[arg(long, value_enum, requires = "bots")]
    preset: Option<Preset>,

    /// Command starting a bot, once per player, in player order (with --preset)
    #[arg(long = "bot", value_name = "COMMAND")]
    bots: Vec<String>,

    /// Where match.log and score.json are written
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Print the board after every tick
    #[arg(long, short)]
    verbose: bool,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Configuration::from_env();
    if let Some(output) = cli.output {
        config = config.with_output_dir(output);
    }
    if cli.verbose {
        config = config.with_verbose(true);
    }
    if config.is_log_enabled() {
        init_logger(config.output_dir())?;
    }

    let runner = match (cli.config, cli.preset) {
        (Some(path), _) => {
            let match_config = MatchConfig::from_file(&path)?;
            MatchRunner::from_config(&match_config, &config)?
        }
        (None, Some(preset)) => {
            let map = match preset {
                Preset::Two => MapConfig::two_player(),
                Preset::Four => MapConfig::four_player(),
            };
            if cli.bots.len() != map.player_count {
                bail!(
                    "this preset needs {} bots, {} given",
                    map.player_count,
                    cli.bots.len()
                );
            }
            let bots: Vec<_> = cli
                .bots
                .into_iter()
                .enumerate()
                .map(|(index, run_command)| BotConfig {
                    id: index.to_string(),
                    name: format!("bot {index}"),
                    run_command,
                })
                .collect();
            let state = map.to_state()?;
            MatchRunner::new(state, BotPool::launch(&bots, &config), &config)?
        }
        (None, None) => bail!("either a match file or --preset is required"),
    };

    let outcome = runner.run()?;
    outcome
        .recorder
        .write_to(config.output_dir())
        .context("could not write match results")?;

    println!("{:?}", outcome.ending);
    for (bot, score) in &outcome.scores {
        println!("{bot}: {score}");
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
