//! Closed enumerations and inline structs shared by the message catalog.

use crate::protocol::codec::{WireEnum, WireReader, WireValue, WireWriter};
use crate::protocol::error::ProtocolResult;
use serde::{Deserialize, Serialize};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $ordinal:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $ordinal,)+
        }

        impl WireEnum for $name {
            const NAME: &'static str = stringify!($name);
            const COUNT: u8 = [$($ordinal),+].len() as u8;

            fn ordinal(self) -> u8 {
                self as u8
            }

            fn from_ordinal(value: u8) -> Option<Self> {
                match value {
                    $($ordinal => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum! {
    /// Outcome of the move a bot submitted on its previous turn.
    pub enum MoveResult {
        Succeeded = 0,
        Failed = 1,
        /// Not allowed by the rules (diagonal when disabled, out of range).
        Invalid = 2,
        /// Not understood (malformed message, missing data).
        Error = 3,
    }
}

wire_enum! {
    pub enum TileType {
        /// Unknown; off the map or hidden behind a wall.
        Void = 0,
        Floor = 1,
        OpenDoor = 2,
        ClosedDoor = 3,
        Wall = 4,
    }
}

wire_enum! {
    pub enum Direction {
        North = 0,
        Northeast = 1,
        East = 2,
        Southeast = 3,
        South = 4,
        Southwest = 5,
        West = 6,
        Northwest = 7,
    }
}

impl Default for MoveResult {
    fn default() -> Self {
        MoveResult::Succeeded
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::North
    }
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::Northeast,
        Direction::East,
        Direction::Southeast,
        Direction::South,
        Direction::Southwest,
        Direction::West,
        Direction::Northwest,
    ];

    /// Unit step for this heading, y growing southward.
    pub fn offset(self) -> (i16, i16) {
        match self {
            Direction::North => (0, -1),
            Direction::Northeast => (1, -1),
            Direction::East => (1, 0),
            Direction::Southeast => (1, 1),
            Direction::South => (0, 1),
            Direction::Southwest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::Northwest => (-1, -1),
        }
    }

    pub fn is_diagonal(self) -> bool {
        let (dx, dy) = self.offset();
        dx != 0 && dy != 0
    }
}

/// Tile position relative to the bot. Embedded inline, no type byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub const WIRE_LEN: usize = 4;

    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

impl WireValue for Point {
    fn encoded_len(&self) -> usize {
        Self::WIRE_LEN
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()> {
        writer.write_i16(self.x)?;
        writer.write_i16(self.y)
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            x: reader.read_i16()?,
            y: reader.read_i16()?,
        })
    }
}
