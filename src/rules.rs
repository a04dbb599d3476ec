//! Legality engine.
//!
//! Pure queries over a [`MatchState`] (move generation, wall validation, path search) and the
//! three mutations the orchestrator applies once an action has been validated.
//!
//! Wall validation never touches the live occlusion grid: connectivity is checked on a copy with
//! the candidate wall applied.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::board::{
    Action, Direction, GoalSide, MatchState, OcclusionGrid, Orientation, PlayerId, Position, Wall,
    WallPlacement,
};
use crate::error::RefereeError;

/// How many random slots are tried before giving up on a default wall.
pub const RANDOM_WALL_ATTEMPTS: usize = 200;

/// Why a wall cannot be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WallRejection {
    #[error("player does not have enough walls")]
    NotEnoughWalls,
    #[error("wall is out of bounds")]
    OutOfBounds,
    #[error("the new ({0}) wall intersects a previous ({0}) wall")]
    Overlaps(Orientation),
    #[error("the new ({new}) wall intersects a previous ({existing}) wall")]
    Crosses {
        new: Orientation,
        existing: Orientation,
    },
    #[error("the new wall cuts off the only remaining path of player {player} to the {goal}")]
    CutsOffPath { player: PlayerId, goal: GoalSide },
}

/// Why an action of a player is not legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidAction {
    #[error("you can't move to {0}")]
    IllegalMove(Position),
    #[error("invalid wall: {0}")]
    InvalidWall(#[from] WallRejection),
}

/// Outcome of a wall check; the outer `Result` of the checking functions carries internal errors.
pub type WallCheck = Result<(), WallRejection>;

/// Legal destinations of the current player's pawn.
pub fn possible_moves(state: &MatchState) -> Vec<Position> {
    match state.current_player() {
        Some(player) => pawn_moves(state, player),
        None => vec![],
    }
}

/// Legal destinations of `player`'s pawn, including straight and diagonal jumps.
pub fn pawn_moves(state: &MatchState, player: PlayerId) -> Vec<Position> {
    let from = state.pawn(player);
    if from.is_eliminated() {
        return vec![];
    }
    let grid = state.grid();
    let mut moves = Vec::with_capacity(5);
    let push = |moves: &mut Vec<Position>, to: Position| {
        if !state.is_occupied(to) && !moves.contains(&to) {
            moves.push(to);
        }
    };

    for dir in Direction::ALL {
        if !grid.is_open(from, dir) {
            continue;
        }
        let next = from.step(dir);
        if !state.is_occupied(next) {
            push(&mut moves, next);
        } else if grid.is_open(next, dir) {
            push(&mut moves, next.step(dir));
        } else {
            for side in dir.perpendicular() {
                if grid.is_open(next, side) {
                    push(&mut moves, next.step(side));
                }
            }
        }
    }
    moves
}

/// Can the current player place `wall`? Never mutates `state`.
pub fn wall_is_valid(state: &MatchState, wall: &WallPlacement) -> Result<WallCheck, RefereeError> {
    match state.current_player() {
        Some(player) => check_wall(state, player, wall),
        None => Err(RefereeError::NoPlayerAlive),
    }
}

/// Can `player` place `wall`? Never mutates `state`.
pub fn check_wall(
    state: &MatchState,
    player: PlayerId,
    wall: &WallPlacement,
) -> Result<WallCheck, RefereeError> {
    if state.owned_walls()[player] == 0 {
        return Ok(Err(WallRejection::NotEnoughWalls));
    }

    let slots = state.board_size() as i32 - 1;
    if wall.x < 0 || wall.x >= slots || wall.y < 0 || wall.y >= slots {
        return Ok(Err(WallRejection::OutOfBounds));
    }

    let grid = state.grid();
    let (x, y) = (wall.x as usize, wall.y as usize);
    let overlaps = match wall.orientation {
        Orientation::Horizontal => grid.cell(x, y).bottom || grid.cell(x + 1, y).bottom,
        Orientation::Vertical => grid.cell(x, y).right || grid.cell(x, y + 1).right,
    };
    if overlaps {
        return Ok(Err(WallRejection::Overlaps(wall.orientation)));
    }

    let crossing = match wall.orientation {
        Orientation::Horizontal => grid.cell(x, y).wall_vertical.then_some(Orientation::Vertical),
        Orientation::Vertical => grid
            .cell(x, y)
            .wall_horizontal
            .then_some(Orientation::Horizontal),
    };
    if let Some(existing) = crossing {
        return Ok(Err(WallRejection::Crosses {
            new: wall.orientation,
            existing,
        }));
    }

    let preview = grid.with_wall(wall);
    for other in state.active_players() {
        let goal = state.goal(other);
        if distance_on(&preview, state.pawn(other), goal)?.is_none() {
            return Ok(Err(WallRejection::CutsOffPath {
                player: other,
                goal,
            }));
        }
    }

    Ok(Ok(()))
}

/// Is `action` legal for `player`?
pub fn validate_action(
    state: &MatchState,
    player: PlayerId,
    action: &Action,
) -> Result<Result<(), InvalidAction>, RefereeError> {
    match action {
        Action::Move(to) => {
            if pawn_moves(state, player).contains(to) {
                Ok(Ok(()))
            } else {
                Ok(Err(InvalidAction::IllegalMove(*to)))
            }
        }
        Action::PlaceWall(wall) => Ok(check_wall(state, player, wall)?.map_err(Into::into)),
    }
}

/// Shortest number of steps from `from` to `goal` over open edges, ignoring pawns.
///
/// `None` when the pawn is eliminated or no path exists.
///
/// # Errors
/// [`RefereeError::SearchDepthExceeded`] if the search goes deeper than the number of cells.
pub fn distance_on(
    grid: &OcclusionGrid,
    from: Position,
    goal: GoalSide,
) -> Result<Option<u32>, RefereeError> {
    let Some(start) = grid.index(from) else {
        return Ok(None);
    };
    let size = grid.size();
    let max_depth = size * size;
    let mut visited = vec![false; size * size];
    visited[start] = true;

    let mut current = vec![from];
    let mut depth = 0;
    while !current.is_empty() {
        if depth > max_depth {
            return Err(RefereeError::SearchDepthExceeded { max_depth });
        }
        let mut next = Vec::new();
        for pos in current {
            if goal.reached(pos, size) {
                return Ok(Some(depth as u32));
            }
            for dir in Direction::ALL {
                if !grid.is_open(pos, dir) {
                    continue;
                }
                let neighbour = pos.step(dir);
                if let Some(i) = grid.index(neighbour) {
                    if !visited[i] {
                        visited[i] = true;
                        next.push(neighbour);
                    }
                }
            }
        }
        current = next;
        depth += 1;
    }
    Ok(None)
}

/// Distance of `player`'s pawn to its goal side.
pub fn goal_distance(state: &MatchState, player: PlayerId) -> Result<Option<u32>, RefereeError> {
    distance_on(state.grid(), state.pawn(player), state.goal(player))
}

/// Distance of every pawn to its goal side, indexed by player.
pub fn goal_distances(state: &MatchState) -> Result<Vec<Option<u32>>, RefereeError> {
    (0..state.player_count())
        .map(|player| goal_distance(state, player))
        .collect()
}

/// Every wall `player` could place right now, in slot order.
pub fn valid_walls(
    state: &MatchState,
    player: PlayerId,
) -> Result<Vec<WallPlacement>, RefereeError> {
    if state.owned_walls()[player] == 0 {
        return Ok(vec![]);
    }
    let slots = state.board_size() as i32 - 1;
    let mut walls = Vec::new();
    for orientation in [Orientation::Horizontal, Orientation::Vertical] {
        for y in 0..slots {
            for x in 0..slots {
                let wall = WallPlacement::new(x, y, orientation);
                if check_wall(state, player, &wall)?.is_ok() {
                    walls.push(wall);
                }
            }
        }
    }
    Ok(walls)
}

/// A random valid wall for `player`.
///
/// Up to [`RANDOM_WALL_ATTEMPTS`] random slots are tried first; if they all miss, the choice is
/// made among [`valid_walls`], so `None` means no wall can be placed at all.
pub fn random_wall<R: Rng + ?Sized>(
    state: &MatchState,
    player: PlayerId,
    rng: &mut R,
) -> Result<Option<WallPlacement>, RefereeError> {
    if state.owned_walls()[player] == 0 {
        return Ok(None);
    }
    let slots = state.board_size() as i32 - 1;
    for _ in 0..RANDOM_WALL_ATTEMPTS {
        let orientation = if rng.gen_bool(0.5) {
            Orientation::Vertical
        } else {
            Orientation::Horizontal
        };
        let wall = WallPlacement::new(
            rng.gen_range(0..slots),
            rng.gen_range(0..slots),
            orientation,
        );
        if check_wall(state, player, &wall)?.is_ok() {
            return Ok(Some(wall));
        }
    }
    Ok(valid_walls(state, player)?.choose(rng).copied())
}

/// Whether `player` has at least one legal move or a valid wall.
pub fn can_act(state: &MatchState, player: PlayerId) -> Result<bool, RefereeError> {
    if !pawn_moves(state, player).is_empty() {
        return Ok(true);
    }
    Ok(!valid_walls(state, player)?.is_empty())
}

/// The action played in place of an invalid or missing response: a random legal move, else a
/// random valid wall.
///
/// # Errors
/// [`RefereeError::NoDefaultAction`] when neither exists.
pub fn default_action<R: Rng + ?Sized>(
    state: &MatchState,
    player: PlayerId,
    rng: &mut R,
) -> Result<Action, RefereeError> {
    if let Some(to) = pawn_moves(state, player).choose(rng) {
        return Ok(Action::Move(*to));
    }
    random_wall(state, player, rng)?
        .map(Action::PlaceWall)
        .ok_or(RefereeError::NoDefaultAction(player))
}

/// Apply a validated wall placement of `player`.
pub fn place_wall(state: &mut MatchState, player: PlayerId, wall: WallPlacement) {
    state.grid.apply(&wall);
    state.owned_walls[player] = state.owned_walls[player].saturating_sub(1);
    state.walls.push(Wall {
        x: wall.x,
        y: wall.y,
        orientation: wall.orientation,
        owner: player,
    });
}

/// Apply a validated pawn move of `player`.
pub fn move_with_pawn(state: &mut MatchState, player: PlayerId, to: Position) {
    state.pawns[player] = to;
}

/// Take `player`'s pawn out of the game for good.
pub fn eliminate(state: &mut MatchState, player: PlayerId) {
    state.pawns[player] = Position::ELIMINATED;
}

/// Apply a validated action of `player`.
pub fn apply_action(state: &mut MatchState, player: PlayerId, action: Action) {
    match action {
        Action::Move(to) => move_with_pawn(state, player, to),
        Action::PlaceWall(wall) => place_wall(state, player, wall),
    }
}
