//! The level boundary.
//!
//! Level geometry lives outside the ECS core. The World only needs a handle
//! to "the current level" (to key per-level entity populations and to answer
//! tile lookups for gameplay Systems), expressed through the [`Level`] trait.
//! [`GridLevel`] is a plain rectangular implementation good enough for tools
//! and tests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::component::Component;

// ---------------------------------------------------------------------------
// Coordinate / Tile
// ---------------------------------------------------------------------------

/// Integer tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// What occupies a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Floor,
    Wall,
    Door,
    Pit,
    Exit,
    Skip,
}

impl TileKind {
    /// Whether an entity may stand on this tile.
    pub fn is_accessible(self) -> bool {
        matches!(self, Self::Floor | Self::Door | Self::Pit | Self::Exit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub coordinate: Coordinate,
    pub kind: TileKind,
}

// ---------------------------------------------------------------------------
// Position component
// ---------------------------------------------------------------------------

/// World-space position of an entity, in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The tile coordinate this position falls into.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.x.floor() as i32, self.y.floor() as i32)
    }
}

impl From<Coordinate> for Position {
    fn from(c: Coordinate) -> Self {
        Self::new(c.x as f32, c.y as f32)
    }
}

impl Component for Position {}

// ---------------------------------------------------------------------------
// Level
// ---------------------------------------------------------------------------

/// A loadable level as seen by the ECS core.
///
/// The name identifies the level: two handles with the same name share one
/// shelved entity population.
pub trait Level {
    fn name(&self) -> &str;

    fn tile_at(&self, coordinate: Coordinate) -> Option<Tile>;

    fn start_tile(&self) -> Option<Tile>;

    fn end_tile(&self) -> Option<Tile>;
}

// ---------------------------------------------------------------------------
// GridLevel
// ---------------------------------------------------------------------------

/// A rectangular level stored row-major, `y` growing downwards from row 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLevel {
    name: String,
    width: usize,
    tiles: Vec<TileKind>,
    start: Option<Coordinate>,
}

impl GridLevel {
    /// A `width` x `height` level filled with floor.
    pub fn new(name: impl Into<String>, width: usize, height: usize) -> Self {
        Self {
            name: name.into(),
            width,
            tiles: vec![TileKind::Floor; width * height],
            start: None,
        }
    }

    /// Parse an ASCII layout: `.` floor, `#` wall, `D` door, `P` pit,
    /// `E` exit, `S` floor marked as start, anything else is skipped space.
    /// Rows may differ in length; short rows are padded with skipped space.
    /// Indentation shared by every row is ignored, so leading spaces inside
    /// the layout stay skipped columns.
    pub fn from_ascii(name: impl Into<String>, layout: &str) -> Self {
        let lines: Vec<&str> = layout
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .collect();
        let indent = lines
            .iter()
            .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
            .min()
            .unwrap_or(0);
        let rows: Vec<Vec<char>> = lines
            .iter()
            .map(|l| l.chars().skip(indent).collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut level = Self {
            name: name.into(),
            width,
            tiles: vec![TileKind::Skip; width * rows.len()],
            start: None,
        };
        for (y, row) in rows.iter().enumerate() {
            for (x, &ch) in row.iter().enumerate() {
                let kind = match ch {
                    '.' => TileKind::Floor,
                    '#' => TileKind::Wall,
                    'D' => TileKind::Door,
                    'P' => TileKind::Pit,
                    'E' => TileKind::Exit,
                    'S' => {
                        level.start = Some(Coordinate::new(x as i32, y as i32));
                        TileKind::Floor
                    }
                    _ => TileKind::Skip,
                };
                level.tiles[y * width + x] = kind;
            }
        }
        level
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.tiles.len() / self.width
        }
    }

    /// Overwrite one tile. Returns `false` if the coordinate is outside.
    pub fn set_tile(&mut self, coordinate: Coordinate, kind: TileKind) -> bool {
        match self.offset(coordinate) {
            Some(i) => {
                self.tiles[i] = kind;
                true
            }
            None => false,
        }
    }

    pub fn set_start(&mut self, coordinate: Coordinate) {
        self.start = Some(coordinate);
    }

    fn offset(&self, c: Coordinate) -> Option<usize> {
        if c.x < 0 || c.y < 0 {
            return None;
        }
        let (x, y) = (c.x as usize, c.y as usize);
        if x >= self.width || y >= self.height() {
            return None;
        }
        Some(y * self.width + x)
    }
}

impl Level for GridLevel {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile_at(&self, coordinate: Coordinate) -> Option<Tile> {
        self.offset(coordinate).map(|i| Tile {
            coordinate,
            kind: self.tiles[i],
        })
    }

    fn start_tile(&self) -> Option<Tile> {
        if let Some(start) = self.start {
            return self.tile_at(start);
        }
        // First accessible tile in reading order.
        self.tiles
            .iter()
            .position(|k| k.is_accessible())
            .and_then(|i| {
                let c = Coordinate::new((i % self.width) as i32, (i / self.width) as i32);
                self.tile_at(c)
            })
    }

    fn end_tile(&self) -> Option<Tile> {
        self.tiles
            .iter()
            .position(|k| *k == TileKind::Exit)
            .and_then(|i| {
                let c = Coordinate::new((i % self.width) as i32, (i / self.width) as i32);
                self.tile_at(c)
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
