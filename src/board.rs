//! Board and match state.
//!
//! The board is a square grid of `board_size` cells. Walls live in the `(board_size - 1)²` slots
//! between cells. Every cell caches which of its four edges are blocked
//! ([`OcclusionGrid`]), so move generation and path search never replay the wall log.
//!
//! Coordinates are `(x, y)`: `x` is the column, `y` the row, `(0, 0)` is the top-left cell.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RefereeError;

/// Index of a player, also the index of its pawn.
pub type PlayerId = usize;

/// A cell coordinate, or [`Position::ELIMINATED`] for a pawn out of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// column
    pub x: i32,
    /// row
    pub y: i32,
}

impl Position {
    /// Sentinel for a pawn that no longer takes part in the match.
    pub const ELIMINATED: Position = Position { x: -1, y: -1 };

    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }

    /// True for the elimination sentinel.
    pub fn is_eliminated(&self) -> bool {
        *self == Self::ELIMINATED
    }

    /// The neighbouring coordinate in `dir` (not bound-checked).
    pub fn step(self, dir: Direction) -> Position {
        let (dx, dy) = dir.offset();
        Position::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The four orthogonal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// towards `y = 0`
    Up,
    /// towards `x = board_size - 1`
    Right,
    /// towards `y = board_size - 1`
    Down,
    /// towards `x = 0`
    Left,
}

impl Direction {
    /// Directions in the order moves are generated.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// `(dx, dy)` of a single step.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }

    /// The two directions orthogonal to this one.
    pub fn perpendicular(self) -> [Direction; 2] {
        match self {
            Direction::Up | Direction::Down => [Direction::Left, Direction::Right],
            Direction::Left | Direction::Right => [Direction::Up, Direction::Down],
        }
    }
}

/// Orientation of a wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// blocks vertical movement, spans two cells horizontally
    Horizontal,
    /// blocks horizontal movement, spans two cells vertically
    Vertical,
}

impl Orientation {
    /// Parse the wire flag (`0` horizontal, `1` vertical).
    pub fn from_flag(flag: i64) -> Option<Orientation> {
        match flag {
            0 => Some(Orientation::Horizontal),
            1 => Some(Orientation::Vertical),
            _ => None,
        }
    }

    /// The wire flag (`0` horizontal, `1` vertical).
    pub fn flag(self) -> u8 {
        match self {
            Orientation::Horizontal => 0,
            Orientation::Vertical => 1,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Horizontal => write!(f, "horizontal"),
            Orientation::Vertical => write!(f, "vertical"),
        }
    }
}

/// A wall candidate: slot coordinate and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WallPlacement {
    /// slot column, in `[0, board_size - 2]` when valid
    pub x: i32,
    /// slot row, in `[0, board_size - 2]` when valid
    pub y: i32,
    /// orientation
    pub orientation: Orientation,
}

impl WallPlacement {
    /// Create a wall candidate.
    pub const fn new(x: i32, y: i32, orientation: Orientation) -> Self {
        WallPlacement { x, y, orientation }
    }
}

/// A wall that was placed during the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wall {
    /// slot column
    pub x: i32,
    /// slot row
    pub y: i32,
    /// orientation
    pub orientation: Orientation,
    /// who placed it
    pub owner: PlayerId,
}

/// One action of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// move the pawn to the given cell
    Move(Position),
    /// place a wall
    PlaceWall(WallPlacement),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(to) => write!(f, "move to {to}"),
            Action::PlaceWall(w) => write!(f, "{} wall at ({}, {})", w.orientation, w.x, w.y),
        }
    }
}

/// Occlusion flags of one cell.
///
/// Edge flags are `true` when movement across that edge is blocked. `wall_vertical` and
/// `wall_horizontal` mark that the slot anchored at this cell already holds a wall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cell {
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
    pub left: bool,
    pub wall_vertical: bool,
    pub wall_horizontal: bool,
}

impl Cell {
    /// Is the edge towards `dir` blocked?
    pub fn blocks(&self, dir: Direction) -> bool {
        match dir {
            Direction::Up => self.top,
            Direction::Right => self.right,
            Direction::Down => self.bottom,
            Direction::Left => self.left,
        }
    }
}

/// Per-cell occlusion flags, derived from the wall log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcclusionGrid {
    size: usize,
    cells: Vec<Cell>,
}

impl OcclusionGrid {
    /// An empty board; border cells have their outward edge blocked.
    pub fn new(size: usize) -> Self {
        let mut cells = vec![Cell::default(); size * size];
        for y in 0..size {
            for x in 0..size {
                let cell = &mut cells[y * size + x];
                cell.left = x == 0;
                cell.right = x == size - 1;
                cell.top = y == 0;
                cell.bottom = y == size - 1;
            }
        }
        OcclusionGrid { size, cells }
    }

    /// Side of the board.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Is `pos` a cell of the board?
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as usize) < self.size && (pos.y as usize) < self.size
    }

    pub(crate) fn index(&self, pos: Position) -> Option<usize> {
        self.contains(pos)
            .then(|| pos.y as usize * self.size + pos.x as usize)
    }

    /// Flags of the cell at `pos`, `None` outside the board.
    pub fn at(&self, pos: Position) -> Option<&Cell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    /// Flags of the cell at `(x, y)`.
    ///
    /// # Panics
    /// If the coordinate is outside the board.
    pub fn cell(&self, x: usize, y: usize) -> &Cell {
        assert!(x < self.size && y < self.size, "cell ({x}, {y}) out of board");
        &self.cells[y * self.size + x]
    }

    fn cell_mut(&mut self, x: usize, y: usize) -> &mut Cell {
        &mut self.cells[y * self.size + x]
    }

    /// Can a pawn on `pos` cross the edge towards `dir`?
    pub fn is_open(&self, pos: Position, dir: Direction) -> bool {
        self.at(pos).is_some_and(|cell| !cell.blocks(dir))
    }

    /// Apply a wall whose slot is known to be inside the board.
    pub fn apply(&mut self, wall: &WallPlacement) {
        let (x, y) = (wall.x as usize, wall.y as usize);
        match wall.orientation {
            Orientation::Vertical => {
                self.cell_mut(x, y).wall_vertical = true;
                self.cell_mut(x, y).right = true;
                self.cell_mut(x, y + 1).right = true;
                self.cell_mut(x + 1, y).left = true;
                self.cell_mut(x + 1, y + 1).left = true;
            }
            Orientation::Horizontal => {
                self.cell_mut(x, y).wall_horizontal = true;
                self.cell_mut(x, y).bottom = true;
                self.cell_mut(x + 1, y).bottom = true;
                self.cell_mut(x, y + 1).top = true;
                self.cell_mut(x + 1, y + 1).top = true;
            }
        }
    }

    /// A copy of this grid with `wall` applied; `self` is left untouched.
    pub fn with_wall(&self, wall: &WallPlacement) -> OcclusionGrid {
        let mut preview = self.clone();
        preview.apply(wall);
        preview
    }
}

/// The board edge a pawn has to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalSide {
    /// row `0`
    Top,
    /// column `board_size - 1`
    Right,
    /// row `board_size - 1`
    Bottom,
    /// column `0`
    Left,
}

impl GoalSide {
    /// Does a pawn on `pos` stand on this side?
    pub fn reached(self, pos: Position, board_size: usize) -> bool {
        if pos.is_eliminated() {
            return false;
        }
        let last = board_size as i32 - 1;
        match self {
            GoalSide::Top => pos.y == 0,
            GoalSide::Right => pos.x == last,
            GoalSide::Bottom => pos.y == last,
            GoalSide::Left => pos.x == 0,
        }
    }

    /// Goals of the standard 2 and 4 player layouts, indexed by player.
    pub fn standard_layout(player_count: usize) -> Option<Vec<GoalSide>> {
        match player_count {
            2 => Some(vec![GoalSide::Bottom, GoalSide::Top]),
            4 => Some(vec![
                GoalSide::Bottom,
                GoalSide::Left,
                GoalSide::Top,
                GoalSide::Right,
            ]),
            _ => None,
        }
    }
}

impl fmt::Display for GoalSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalSide::Top => write!(f, "top side"),
            GoalSide::Right => write!(f, "right side"),
            GoalSide::Bottom => write!(f, "bottom side"),
            GoalSide::Left => write!(f, "left side"),
        }
    }
}

/// Per-player rules of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// goal side of every player, indexed by [`PlayerId`]
    pub goals: Vec<GoalSide>,
    /// whether a player without any legal action is eliminated (otherwise it only skips)
    pub eliminate_stuck: bool,
}

impl Variant {
    /// Standard layout: elimination is only enabled with 4 players.
    pub fn standard(player_count: usize) -> Result<Variant, RefereeError> {
        let goals = GoalSide::standard_layout(player_count).ok_or_else(|| {
            RefereeError::InvalidInitialState(format!(
                "number of players can be 2 or 4, but it was {player_count}"
            ))
        })?;
        Ok(Variant {
            goals,
            eliminate_stuck: player_count == 4,
        })
    }

    /// Number of players.
    pub fn player_count(&self) -> usize {
        self.goals.len()
    }
}

/// The authoritative state of a running match.
///
/// Only [`crate::rules`] mutates it, and only with pre-validated actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchState {
    pub(crate) board_size: usize,
    pub(crate) max_ticks: u32,
    pub(crate) tick_id: u32,
    pub(crate) current_player: Option<PlayerId>,
    pub(crate) pawns: Vec<Position>,
    pub(crate) walls: Vec<Wall>,
    pub(crate) owned_walls: Vec<u32>,
    pub(crate) grid: OcclusionGrid,
    pub(crate) variant: Variant,
}

/// Side of the preset boards.
pub const PRESET_BOARD_SIZE: usize = 9;

impl MatchState {
    /// Create a validated initial state.
    ///
    /// # Errors
    /// When the player count is not 2 or 4, when pawns and goals disagree in number, or when a
    /// pawn is outside the board or shares its cell.
    pub fn new(
        board_size: usize,
        max_ticks: u32,
        pawns: Vec<Position>,
        walls_per_player: u32,
        variant: Variant,
    ) -> Result<MatchState, RefereeError> {
        let invalid = |msg: String| Err(RefereeError::InvalidInitialState(msg));

        let count = variant.player_count();
        if count != 2 && count != 4 {
            return invalid(format!(
                "number of players can be 2 or 4, but it was {count}"
            ));
        }
        if pawns.len() != count {
            return invalid(format!(
                "{} pawn positions given for {count} players",
                pawns.len()
            ));
        }
        if board_size < 3 {
            return invalid(format!("board size {board_size} is too small"));
        }
        let grid = OcclusionGrid::new(board_size);
        for (player, pawn) in pawns.iter().enumerate() {
            if !grid.contains(*pawn) {
                return invalid(format!("pawn of player {player} is outside the board"));
            }
            if pawns[..player].contains(pawn) {
                return invalid(format!("pawn of player {player} shares cell {pawn}"));
            }
        }

        Ok(Self::unchecked(
            board_size,
            max_ticks,
            pawns,
            walls_per_player,
            variant,
        ))
    }

    fn unchecked(
        board_size: usize,
        max_ticks: u32,
        pawns: Vec<Position>,
        walls_per_player: u32,
        variant: Variant,
    ) -> MatchState {
        MatchState {
            board_size,
            max_ticks,
            tick_id: 0,
            current_player: None,
            owned_walls: vec![walls_per_player; pawns.len()],
            pawns,
            walls: vec![],
            grid: OcclusionGrid::new(board_size),
            variant,
        }
    }

    /// 9×9, two pawns facing each other, 10 walls each, 100 ticks.
    pub fn two_player() -> MatchState {
        Self::unchecked(
            PRESET_BOARD_SIZE,
            100,
            vec![Position::new(4, 0), Position::new(4, 8)],
            10,
            Variant {
                goals: vec![GoalSide::Bottom, GoalSide::Top],
                eliminate_stuck: false,
            },
        )
    }

    /// 9×9, one pawn in the middle of every side, 5 walls each, 200 ticks.
    pub fn four_player() -> MatchState {
        Self::unchecked(
            PRESET_BOARD_SIZE,
            200,
            vec![
                Position::new(4, 0),
                Position::new(8, 4),
                Position::new(4, 8),
                Position::new(0, 4),
            ],
            5,
            Variant {
                goals: vec![
                    GoalSide::Bottom,
                    GoalSide::Left,
                    GoalSide::Top,
                    GoalSide::Right,
                ],
                eliminate_stuck: true,
            },
        )
    }

    pub fn board_size(&self) -> usize {
        self.board_size
    }

    pub fn max_ticks(&self) -> u32 {
        self.max_ticks
    }

    pub fn tick_id(&self) -> u32 {
        self.tick_id
    }

    /// `None` before the first tick.
    pub fn current_player(&self) -> Option<PlayerId> {
        self.current_player
    }

    pub fn player_count(&self) -> usize {
        self.pawns.len()
    }

    pub fn pawns(&self) -> &[Position] {
        &self.pawns
    }

    pub fn pawn(&self, player: PlayerId) -> Position {
        self.pawns[player]
    }

    pub fn walls(&self) -> &[Wall] {
        &self.walls
    }

    pub fn owned_walls(&self) -> &[u32] {
        &self.owned_walls
    }

    pub fn grid(&self) -> &OcclusionGrid {
        &self.grid
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn goal(&self, player: PlayerId) -> GoalSide {
        self.variant.goals[player]
    }

    /// A player is active until its pawn is eliminated.
    pub fn is_active(&self, player: PlayerId) -> bool {
        !self.pawns[player].is_eliminated()
    }

    pub fn active_players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        (0..self.player_count()).filter(|&p| self.is_active(p))
    }

    /// The player whose pawn stands on `pos`.
    pub fn occupant(&self, pos: Position) -> Option<PlayerId> {
        if pos.is_eliminated() {
            return None;
        }
        self.pawns.iter().position(|p| *p == pos)
    }

    pub fn is_occupied(&self, pos: Position) -> bool {
        self.occupant(pos).is_some()
    }

    /// Players standing on their goal side.
    pub fn players_on_goal(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.active_players()
            .filter(|&p| self.goal(p).reached(self.pawn(p), self.board_size))
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.board_size;
        for y in 0..size {
            for x in 0..size {
                let top = if self.grid.cell(x, y).top { '-' } else { ' ' };
                write!(f, "+{top}")?;
            }
            writeln!(f, "+")?;
            for x in 0..size {
                let left = if self.grid.cell(x, y).left { '|' } else { ' ' };
                match self.occupant(Position::new(x as i32, y as i32)) {
                    Some(player) => write!(f, "{left}{player}")?,
                    None => write!(f, "{left}.")?,
                }
            }
            writeln!(f, "|")?;
        }
        writeln!(f, "{}+", "+-".repeat(size))?;
        match self.current_player {
            Some(player) => {
                writeln!(f, "Current player: {player}")?;
                write!(f, "Owned walls: {}", self.owned_walls[player])
            }
            None => write!(f, "Current player: -"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borders_are_blocked() {
        let grid = OcclusionGrid::new(9);
        assert!(grid.cell(0, 0).top && grid.cell(0, 0).left);
        assert!(grid.cell(8, 8).bottom && grid.cell(8, 8).right);
        assert!(!grid.cell(4, 4).top && !grid.cell(4, 4).right);
        assert!(!grid.is_open(Position::new(0, 3), Direction::Left));
        assert!(grid.is_open(Position::new(0, 3), Direction::Right));
    }

    #[test]
    fn vertical_wall_touches_four_cells() {
        let mut grid = OcclusionGrid::new(9);
        grid.apply(&WallPlacement::new(2, 3, Orientation::Vertical));
        assert!(grid.cell(2, 3).wall_vertical);
        assert!(!grid.cell(2, 3).wall_horizontal);
        assert!(grid.cell(2, 3).right && grid.cell(2, 4).right);
        assert!(grid.cell(3, 3).left && grid.cell(3, 4).left);
        assert!(!grid.cell(2, 5).right);
        assert!(!grid.cell(2, 2).right);
    }

    #[test]
    fn horizontal_wall_touches_four_cells() {
        let mut grid = OcclusionGrid::new(9);
        grid.apply(&WallPlacement::new(2, 3, Orientation::Horizontal));
        assert!(grid.cell(2, 3).wall_horizontal);
        assert!(grid.cell(2, 3).bottom && grid.cell(3, 3).bottom);
        assert!(grid.cell(2, 4).top && grid.cell(3, 4).top);
        assert!(!grid.cell(4, 3).bottom);
    }

    #[test]
    fn with_wall_returns_a_copy() {
        let grid = OcclusionGrid::new(5);
        let preview = grid.with_wall(&WallPlacement::new(0, 0, Orientation::Horizontal));
        assert_ne!(grid, preview);
        assert_eq!(grid, OcclusionGrid::new(5));
    }

    #[test]
    fn goal_sides() {
        assert!(GoalSide::Bottom.reached(Position::new(3, 8), 9));
        assert!(!GoalSide::Bottom.reached(Position::new(3, 7), 9));
        assert!(GoalSide::Left.reached(Position::new(0, 5), 9));
        assert!(GoalSide::Right.reached(Position::new(8, 0), 9));
        assert!(!GoalSide::Top.reached(Position::ELIMINATED, 9));
    }

    #[test]
    fn new_rejects_bad_layouts() {
        let variant = Variant::standard(2).unwrap();
        let same_cell = vec![Position::new(1, 1), Position::new(1, 1)];
        assert!(MatchState::new(9, 10, same_cell, 3, variant.clone()).is_err());

        let outside = vec![Position::new(1, 1), Position::new(9, 1)];
        assert!(MatchState::new(9, 10, outside, 3, variant.clone()).is_err());

        let missing = vec![Position::new(1, 1)];
        assert!(MatchState::new(9, 10, missing, 3, variant).is_err());

        assert!(Variant::standard(3).is_err());
    }

    #[test]
    fn presets() {
        let two = MatchState::two_player();
        assert_eq!(two.player_count(), 2);
        assert_eq!(two.owned_walls(), &[10, 10]);
        assert!(!two.variant().eliminate_stuck);

        let four = MatchState::four_player();
        assert_eq!(four.player_count(), 4);
        assert_eq!(four.max_ticks(), 200);
        assert_eq!(four.goal(1), GoalSide::Left);
        assert!(four.variant().eliminate_stuck);
        assert_eq!(four.occupant(Position::new(0, 4)), Some(3));
    }

    #[test]
    fn render_shows_pawns_and_walls() {
        let mut state = MatchState::two_player();
        state.grid.apply(&WallPlacement::new(0, 0, Orientation::Horizontal));
        let text = state.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+-+-+-+-+-+-+-+-+-+");
        assert_eq!(lines[1], "|. . . . 0 . . . .|");
        assert_eq!(lines[2], "+-+-+ + + + + + + +");
        assert_eq!(lines[17], "|. . . . 1 . . . .|");
        assert_eq!(lines[18], "+-+-+-+-+-+-+-+-+-+");
        assert_eq!(lines[19], "Current player: -");
    }
}
