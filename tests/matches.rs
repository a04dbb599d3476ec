#![cfg(unix)]

use std::{fs, path::Path, time::Duration};

use quoridor_referee::{match_config::MapConfig, match_log::TickAction, prelude::*};
use serde_json::{json, Value};

const IDLE: &str = "read s; echo OK; cat > /dev/null";
const QUITTER: &str = "read s; echo OK";
const GARBAGE: &str = "read s; echo OK; while read l; do echo garbage; done";

fn write_match(dir: &Path, map: &MapConfig, commands: &[&str]) -> MatchConfig {
    fs::write(dir.join("map.json"), serde_json::to_string(map).unwrap()).unwrap();
    let bots: Vec<_> = commands
        .iter()
        .enumerate()
        .map(|(i, cmd)| {
            json!({"id": format!("bot{i}"), "name": format!("Bot {i}"), "runCommand": cmd})
        })
        .collect();
    let path = dir.join("match.json");
    fs::write(&path, json!({"map": "map.json", "bots": bots}).to_string()).unwrap();
    MatchConfig::from_file(&path).unwrap()
}

fn config(dir: &Path) -> Configuration {
    Configuration::new()
        .with_output_dir(dir.join("out"))
        .with_seed(1)
        .with_initial_time_budget(Duration::from_millis(100))
        .with_round_bonus(Duration::from_millis(10))
}

#[test]
fn forward_bot_wins_in_one_tick() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = MapConfig::two_player();
    map.pawn_pos = vec![Position { x: 4, y: 7 }, Position { x: 0, y: 5 }];
    // 5 handshake lines, 4 tick lines, then the move
    let forward =
        "read s; echo OK; for i in 1 2 3 4 5 6 7 8 9; do read l; done; echo 4 8; cat > /dev/null";
    let match_config = write_match(dir.path(), &map, &[forward, IDLE]);
    let config = config(dir.path()).with_initial_time_budget(Duration::from_secs(2));

    let outcome = MatchRunner::from_config(&match_config, &config)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(outcome.ending, Ending::GoalReached(0));
    outcome.recorder.write_to(config.output_dir()).unwrap();

    let scores: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/score.json")).unwrap())
            .unwrap();
    assert_eq!(scores, json!({"bot0": 1.0, "bot1": 0.0}));

    let log: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/match.log")).unwrap())
            .unwrap();
    assert_eq!(log["ticks"][1]["action"], json!({"type": "move", "x": 4, "y": 8}));
    assert_eq!(log["ticks"][1]["bots"][0]["sent"][0]["message"], "4 8");
}

#[test]
fn crashed_bot_goes_offline_and_plays_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = MapConfig::two_player();
    map.max_ticks = 4;
    let match_config = write_match(dir.path(), &map, &[IDLE, QUITTER]);

    let outcome = MatchRunner::from_config(&match_config, &config(dir.path()))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(outcome.ending, Ending::TickLimit);
    let ticks = outcome.recorder.ticks();
    assert_eq!(ticks.len(), 5);
    // the silent bot ran out of time
    assert_eq!(
        ticks[1].bots[0].command_error.as_deref(),
        Some("response time limit exceeded")
    );
    for tick in ticks.iter().filter(|t| t.current_player == Some(1)) {
        assert!(tick.defaulted);
        assert!(tick.bots[1].offline);
        assert!(tick.bots[1].received.is_empty());
        assert!(matches!(tick.action, TickAction::Move { .. }));
    }
}

#[test]
fn garbage_bots_cannot_stall_the_match() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = MapConfig::two_player();
    map.max_ticks = 10;
    let match_config = write_match(dir.path(), &map, &[GARBAGE, GARBAGE]);
    let config = config(dir.path());

    let outcome = MatchRunner::from_config(&match_config, &config)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(outcome.ending, Ending::TickLimit);
    assert_eq!(outcome.scores.values().sum::<f64>(), 1.0);
    outcome.recorder.write_to(config.output_dir()).unwrap();

    let log: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/match.log")).unwrap())
            .unwrap();
    let ticks = log["ticks"].as_array().unwrap();
    assert_eq!(ticks.len(), 11);
    for tick in &ticks[1..] {
        assert_eq!(tick["defaulted"], true);
        let player = tick["currentPlayer"].as_u64().unwrap() as usize;
        assert_eq!(tick["bots"][player]["sent"][0]["message"], "garbage");
    }
}

#[test]
fn missing_bot_program_does_not_stop_the_match() {
    let dir = tempfile::tempdir().unwrap();
    let mut map = MapConfig::four_player();
    map.max_ticks = 8;
    let match_config = write_match(
        dir.path(),
        &map,
        &[IDLE, "/nonexistent/bot", GARBAGE, QUITTER],
    );

    let outcome = MatchRunner::from_config(&match_config, &config(dir.path()))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(outcome.final_state.tick_id(), 8);
    let ticks = outcome.recorder.ticks();
    assert!(ticks[0].bots[1].command_error.is_some());
    assert!(ticks[2].defaulted);
    assert_eq!(outcome.scores.len(), 4);
}
