use serde::{Deserialize, Serialize};

/// Side length of one map metatile in pixels.
pub const METATILE_SIZE: i32 = 16;

/// One logical tick is one hardware frame at 60 fps.
pub const MS_PER_TICK: f64 = 1000.0 / 60.0;

pub fn ticks_from_millis(delta_ms: f64) -> f64 {
    delta_ms / MS_PER_TICK
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Pixel position of the tile's center (sprites anchor at tile center).
    pub fn world_center(self) -> Vec2 {
        Vec2 {
            x: (self.x * METATILE_SIZE + METATILE_SIZE / 2) as f32,
            y: (self.y * METATILE_SIZE + METATILE_SIZE / 2) as f32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }

    pub fn step_from(self, tile: TilePos) -> TilePos {
        match self {
            Self::Up => TilePos::new(tile.x, tile.y - 1),
            Self::Down => TilePos::new(tile.x, tile.y + 1),
            Self::Left => TilePos::new(tile.x - 1, tile.y),
            Self::Right => TilePos::new(tile.x + 1, tile.y),
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}
