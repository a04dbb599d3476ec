//! JSON description of a match: which map to play and which bots play it.
//!
//! ```json
//! {
//!   "map": "maps/two.json",
//!   "bots": [
//!     { "id": "a", "name": "Alice", "runCommand": "./alice" },
//!     { "id": "b", "name": "Bob", "runCommand": "python3 bob.py" }
//!   ]
//! }
//! ```
//!
//! A relative `map` path is resolved against the directory of the match file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::{
    board::{GoalSide, MatchState, Position, Variant, PRESET_BOARD_SIZE},
    error::RefereeError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    pub id: String,
    pub name: String,
    /// Shell command starting the bot.
    pub run_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub map: PathBuf,
    pub bots: Vec<BotConfig>,
}

impl MatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<MatchConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read match file {}", path.display()))?;
        let mut config: MatchConfig = serde_json::from_str(&text)
            .with_context(|| format!("invalid match file {}", path.display()))?;
        if config.map.is_relative() {
            if let Some(dir) = path.parent() {
                config.map = dir.join(&config.map);
            }
        }
        Ok(config)
    }

    pub fn load_map(&self) -> anyhow::Result<MapConfig> {
        let map = MapConfig::from_file(&self.map)?;
        ensure!(
            map.player_count == self.bots.len(),
            "the map is for {} players but {} bots are configured",
            map.player_count,
            self.bots.len()
        );
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapConfig {
    pub player_count: usize,
    #[serde(default = "default_board_size")]
    pub board_size: usize,
    pub max_ticks: u32,
    pub pawn_pos: Vec<Position>,
    /// Walls every player starts with.
    pub owned_walls: u32,
    /// Overrides the standard goal layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<GoalSide>>,
    /// Overrides whether a player unable to act loses its pawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminate_stuck: Option<bool>,
}

fn default_board_size() -> usize {
    PRESET_BOARD_SIZE
}

impl MapConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<MapConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read map file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid map file {}", path.display()))
    }

    /// Standard two-player map.
    pub fn two_player() -> MapConfig {
        MapConfig::from_state(&MatchState::two_player())
    }

    /// Standard four-player map.
    pub fn four_player() -> MapConfig {
        MapConfig::from_state(&MatchState::four_player())
    }

    fn from_state(state: &MatchState) -> MapConfig {
        MapConfig {
            player_count: state.player_count(),
            board_size: state.board_size(),
            max_ticks: state.max_ticks(),
            pawn_pos: state.pawns().to_vec(),
            owned_walls: state.owned_walls()[0],
            goals: None,
            eliminate_stuck: None,
        }
    }

    /// Build the initial state, validating the map on the way.
    pub fn to_state(&self) -> Result<MatchState, RefereeError> {
        let mut variant = Variant::standard(self.player_count)?;
        if let Some(goals) = &self.goals {
            if goals.len() != self.player_count {
                return Err(RefereeError::InvalidInitialState(format!(
                    "{} goals for {} players",
                    goals.len(),
                    self.player_count
                )));
            }
            variant.goals = goals.clone();
        }
        if let Some(eliminate_stuck) = self.eliminate_stuck {
            variant.eliminate_stuck = eliminate_stuck;
        }
        MatchState::new(
            self.board_size,
            self.max_ticks,
            self.pawn_pos.clone(),
            self.owned_walls,
            variant,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_map() {
        let map: MapConfig = serde_json::from_str(
            r#"{"playerCount":2,"boardSize":5,"maxTicks":30,
                "pawnPos":[{"x":2,"y":0},{"x":2,"y":4}],"ownedWalls":3}"#,
        )
        .unwrap();
        let state = map.to_state().unwrap();
        assert_eq!(state.board_size(), 5);
        assert_eq!(state.owned_walls(), &[3, 3]);
        assert_eq!(state.goal(0), GoalSide::Bottom);
        assert!(!state.variant().eliminate_stuck);
    }

    #[test]
    fn board_size_defaults_to_nine() {
        let map: MapConfig = serde_json::from_str(
            r#"{"playerCount":2,"maxTicks":30,
                "pawnPos":[{"x":4,"y":0},{"x":4,"y":8}],"ownedWalls":10}"#,
        )
        .unwrap();
        assert_eq!(map, MapConfig::two_player().with_max_ticks(30));
    }

    #[test]
    fn overrides_variant() {
        let mut map = MapConfig::two_player();
        map.goals = Some(vec![GoalSide::Right, GoalSide::Left]);
        map.eliminate_stuck = Some(true);
        let state = map.to_state().unwrap();
        assert_eq!(state.goal(0), GoalSide::Right);
        assert!(state.variant().eliminate_stuck);

        map.goals = Some(vec![GoalSide::Right]);
        assert!(matches!(
            map.to_state(),
            Err(RefereeError::InvalidInitialState(_))
        ));
    }

    #[test]
    fn presets_round_trip_to_states() {
        assert_eq!(
            MapConfig::four_player().to_state().unwrap(),
            MatchState::four_player()
        );
    }

    #[test]
    fn match_file_resolves_map_next_to_it() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("map.json"),
            serde_json::to_string(&MapConfig::two_player()).unwrap(),
        )
        .unwrap();
        let match_path = dir.path().join("match.json");
        fs::write(
            &match_path,
            r#"{"map":"map.json","bots":[
                {"id":"a","name":"A","runCommand":"./a"},
                {"id":"b","name":"B","runCommand":"./b"}]}"#,
        )
        .unwrap();

        let config = MatchConfig::from_file(&match_path).unwrap();
        assert_eq!(config.bots[1].run_command, "./b");
        assert_eq!(config.load_map().unwrap(), MapConfig::two_player());

        let mut config = config;
        config.bots.pop();
        assert!(config.load_map().is_err());
    }

    impl MapConfig {
        fn with_max_ticks(mut self, max_ticks: u32) -> Self {
            self.max_ticks = max_ticks;
            self
        }
    }
}
