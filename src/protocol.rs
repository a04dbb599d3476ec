//! Line-based text protocol spoken with the bots over their standard streams.
//!
//! ```text
//! referee -> bot : START
//! bot -> referee : OK
//! referee -> bot : <numOfPlayers>\n<myPlayerIndex>\n<boardSize>\n(<x> <y> <walls>\n)*
//! referee -> bot : <tickId>\n(<x> <y> <walls>\n)*<wallCount>\n(<x> <y> <isVertical> <owner>\n)*
//! bot -> referee : <x> <y>                 (move)
//!                | <x> <y> <isVertical>    (wall)
//! referee -> bot : -1                      (end of game)
//! ```

use thiserror::Error;

use crate::board::{Action, MatchState, Orientation, PlayerId, Position, WallPlacement};

/// Sent to every bot before the match.
pub const START: &str = "START";
/// Expected handshake reply.
pub const READY: &str = "OK";
/// Sent to the bots still connected when the match is over.
pub const END_OF_GAME: &str = "-1";

/// Why a bot response could not be turned into an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid input! No response was received")]
    NoResponse,
    #[error("invalid input! You should send two or three numbers separated by spaces")]
    Shape,
    #[error("invalid input! The two numbers are not in the correct intervals")]
    MoveOutOfRange,
    #[error("invalid input! The three numbers are not in the correct intervals")]
    WallOutOfRange,
}

/// One `x y walls` line per player.
fn pawn_lines(state: &MatchState) -> impl Iterator<Item = String> + '_ {
    state
        .pawns()
        .iter()
        .zip(state.owned_walls())
        .map(|(pawn, walls)| format!("{} {} {walls}", pawn.x, pawn.y))
}

/// Initial message telling `player` who it is and where everybody stands.
pub fn handshake_message(state: &MatchState, player: PlayerId) -> String {
    let header = [
        state.player_count().to_string(),
        player.to_string(),
        state.board_size().to_string(),
    ];
    header
        .into_iter()
        .chain(pawn_lines(state))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The state sent to the acting bot at the start of its turn.
pub fn tick_message(state: &MatchState) -> String {
    let walls = state.walls().iter().map(|wall| {
        format!(
            "{} {} {} {}",
            wall.x,
            wall.y,
            wall.orientation.flag(),
            wall.owner
        )
    });
    std::iter::once(state.tick_id().to_string())
        .chain(pawn_lines(state))
        .chain(std::iter::once(state.walls().len().to_string()))
        .chain(walls)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a bot response. Only the shape and value ranges are checked here; legality is up to
/// [`crate::rules::validate_action`].
pub fn parse_response(line: &str, board_size: usize) -> Result<Action, ProtocolError> {
    let numbers = line
        .split_whitespace()
        .map(str::parse::<i64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ProtocolError::Shape)?;

    let size = board_size as i64;
    match numbers[..] {
        [x, y] => {
            if (0..size).contains(&x) && (0..size).contains(&y) {
                Ok(Action::Move(Position::new(x as i32, y as i32)))
            } else {
                Err(ProtocolError::MoveOutOfRange)
            }
        }
        [x, y, flag] => {
            let orientation = Orientation::from_flag(flag);
            match orientation {
                Some(orientation)
                    if (0..size - 1).contains(&x) && (0..size - 1).contains(&y) =>
                {
                    Ok(Action::PlaceWall(WallPlacement::new(
                        x as i32,
                        y as i32,
                        orientation,
                    )))
                }
                _ => Err(ProtocolError::WallOutOfRange),
            }
        }
        _ => Err(ProtocolError::Shape),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules;

    #[test]
    fn handshake_lists_every_pawn() {
        let state = MatchState::two_player();
        assert_eq!(handshake_message(&state, 1), "2\n1\n9\n4 0 10\n4 8 10");
    }

    #[test]
    fn tick_lists_walls() {
        let mut state = MatchState::two_player();
        state.tick_id = 3;
        rules::place_wall(&mut state, 1, WallPlacement::new(2, 5, Orientation::Vertical));
        rules::move_with_pawn(&mut state, 0, Position::new(4, 1));
        assert_eq!(
            tick_message(&state),
            "3\n4 1 10\n4 8 9\n1\n2 5 1 1"
        );
    }

    #[test]
    fn tick_shows_eliminated_pawns() {
        let mut state = MatchState::four_player();
        rules::eliminate(&mut state, 2);
        let msg = tick_message(&state);
        assert_eq!(msg.lines().nth(3), Some("-1 -1 5"));
        assert_eq!(msg.lines().last(), Some("0"));
    }

    #[test]
    fn parses_moves_and_walls() {
        assert_eq!(
            parse_response("4 5", 9),
            Ok(Action::Move(Position::new(4, 5)))
        );
        assert_eq!(
            parse_response("  0 7 0 ", 9),
            Ok(Action::PlaceWall(WallPlacement::new(
                0,
                7,
                Orientation::Horizontal
            )))
        );
        assert_eq!(
            parse_response("3 3 1", 9),
            Ok(Action::PlaceWall(WallPlacement::new(
                3,
                3,
                Orientation::Vertical
            )))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_response("garbage", 9), Err(ProtocolError::Shape));
        assert_eq!(parse_response("", 9), Err(ProtocolError::Shape));
        assert_eq!(parse_response("1 2 3 4", 9), Err(ProtocolError::Shape));
        assert_eq!(parse_response("1.5 2", 9), Err(ProtocolError::Shape));
        assert_eq!(parse_response("9 0", 9), Err(ProtocolError::MoveOutOfRange));
        assert_eq!(parse_response("-1 0", 9), Err(ProtocolError::MoveOutOfRange));
        assert_eq!(parse_response("8 0 1", 9), Err(ProtocolError::WallOutOfRange));
        assert_eq!(parse_response("0 0 2", 9), Err(ProtocolError::WallOutOfRange));
    }
}
