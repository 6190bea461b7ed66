use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

#[derive(Serialize, Deserialize, Clone, Debug, Default, Copy, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

/// Identifier handed to each accepted connection, in order of arrival.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// One movement step in this direction. Map y grows downwards.
    pub fn step(self, unit: f32) -> Vector2 {
        match self {
            Direction::Up => Vector2::new(0.0, -unit),
            Direction::Down => Vector2::new(0.0, unit),
            Direction::Left => Vector2::new(-unit, 0.0),
            Direction::Right => Vector2::new(unit, 0.0),
        }
    }
}

/// Held-key flags, one per direction. Used for edge detection and animation,
/// never as a velocity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectionFlags {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DirectionFlags {
    pub fn get(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn set(&mut self, direction: Direction, held: bool) {
        match direction {
            Direction::Up => self.up = held,
            Direction::Down => self.down = held,
            Direction::Left => self.left = held,
            Direction::Right => self.right = held,
        }
    }

    pub fn clear(&mut self) {
        *self = DirectionFlags::default();
    }
}

/// Seat in a session, decided purely by arrival order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    First,
    Second,
}

impl Role {
    pub fn index(self) -> usize {
        match self {
            Role::First => 0,
            Role::Second => 1,
        }
    }
}

// Game rules configuration
#[derive(Clone, Debug, PartialEq)]
pub struct GameRules {
    pub map_width: f32,
    pub map_height: f32,
    /// Movement unit and player sprite size.
    pub tile_size: f32,
    /// Distance of spawn points and line jumps from the map edge.
    pub edge_margin: f32,
    pub max_health: i32,
    pub teleport_cooldown_ms: f32,
    /// Growth and fade rate of teleport/death effects, in units per ms.
    pub effect_speed: f32,
    pub respawn_delay_ms: f32,
    pub kills_to_win: u32,
    pub damage_roll: RangeInclusive<u32>,
    pub textures: [String; 2],
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            map_width: 1280.0,
            map_height: 1280.0,
            tile_size: 64.0,
            edge_margin: 32.0,
            max_health: 100,
            teleport_cooldown_ms: 1000.0,
            effect_speed: 0.5,
            respawn_delay_ms: 3000.0,
            kills_to_win: 10,
            damage_roll: 10..=19,
            textures: [
                "data/player1.png".to_string(),
                "data/player2.png".to_string(),
            ],
        }
    }
}

impl GameRules {
    /// Map bounds are inclusive on both ends.
    pub fn contains(&self, point: Vector2) -> bool {
        (0.0..=self.map_width).contains(&point.x) && (0.0..=self.map_height).contains(&point.y)
    }

    /// Role 0 starts in the top-right corner, role 1 mirrored bottom-left.
    pub fn spawn_point(&self, role: Role) -> Vector2 {
        match role {
            Role::First => Vector2::new(self.map_width - self.edge_margin, self.edge_margin),
            Role::Second => Vector2::new(self.edge_margin, self.map_height - self.edge_margin),
        }
    }

    pub fn texture(&self, role: Role) -> &str {
        &self.textures[role.index()]
    }

    pub fn line_count(&self) -> u32 {
        (self.map_height / self.tile_size) as u32
    }

    pub fn roll_damage<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.damage_roll.clone())
    }
}
