//! Message catalog: the closed set of variants exchanged with a guest.
//!
//! | Variant | Tag | Body |
//! |---|---|---|
//! | `Error` | 1 | description: string |
//! | `InitialParameters` | 2 | 4 x u16, bool, 2 x byte |
//! | `PresentCircumstances` | 3 | u32, MoveResult, u16, list of TileType, byte |
//! | `Wait` | 4 | - |
//! | `Resign` | 5 | - |
//! | `MoveTo` | 6 | Direction, byte |
//! | `Open` | 7 | Point |
//! | `Close` | 8 | Point |
//!
//! Tag 0 is reserved as the stream terminator.

use crate::protocol::codec::{self, WireReader, WireValue, WireWriter};
use crate::protocol::enums::{Direction, MoveResult, Point, TileType};
use crate::protocol::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Stable tag byte identifying each variant on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Error = 1,
    InitialParameters = 2,
    PresentCircumstances = 3,
    Wait = 4,
    Resign = 5,
    MoveTo = 6,
    Open = 7,
    Close = 8,
}

impl MessageType {
    pub const TERMINATOR: u8 = 0;

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageType::Error),
            2 => Some(MessageType::InitialParameters),
            3 => Some(MessageType::PresentCircumstances),
            4 => Some(MessageType::Wait),
            5 => Some(MessageType::Resign),
            6 => Some(MessageType::MoveTo),
            7 => Some(MessageType::Open),
            8 => Some(MessageType::Close),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Host <-> module mishap report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub description: String,
}

impl ErrorMessage {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl WireValue for ErrorMessage {
    fn encoded_len(&self) -> usize {
        codec::string_len(&self.description)
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()> {
        writer.write_string(&self.description)
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            description: reader.read_string()?,
        })
    }
}

/// Setup message a bot may accept or reject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialParameters {
    /// Version of this message layout.
    pub params_version: u16,
    pub engine_version_major: u16,
    pub engine_version_minor: u16,
    pub engine_version_patch: u16,
    /// When false any diagonal move is Invalid.
    pub diagonal_movement: bool,
    pub player_stride: u8,
    pub player_open_reach: u8,
}

impl InitialParameters {
    pub const WIRE_LEN: usize = 11;
}

impl WireValue for InitialParameters {
    fn encoded_len(&self) -> usize {
        Self::WIRE_LEN
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()> {
        writer.write_u16(self.params_version)?;
        writer.write_u16(self.engine_version_major)?;
        writer.write_u16(self.engine_version_minor)?;
        writer.write_u16(self.engine_version_patch)?;
        writer.write_bool(self.diagonal_movement)?;
        writer.write_u8(self.player_stride)?;
        writer.write_u8(self.player_open_reach)
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            params_version: reader.read_u16()?,
            engine_version_major: reader.read_u16()?,
            engine_version_minor: reader.read_u16()?,
            engine_version_patch: reader.read_u16()?,
            diagonal_movement: reader.read_bool()?,
            player_stride: reader.read_u8()?,
            player_open_reach: reader.read_u8()?,
        })
    }
}

/// Per-turn view of the bot's immediate situation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentCircumstances {
    /// Milliseconds the bot spent on its previous tick; 0 on the first turn.
    pub last_tick_duration: u32,
    pub last_move_result: MoveResult,
    pub current_hit_points: u16,
    /// Row-major square centred on the bot, side `radius * 2 + 1`.
    pub surroundings: Vec<TileType>,
    pub surroundings_radius: u8,
}

impl PresentCircumstances {
    /// Tile at an offset from the bot, if inside the reported square.
    pub fn tile_at(&self, dx: i16, dy: i16) -> Option<TileType> {
        let radius = i32::from(self.surroundings_radius);
        let (dx, dy) = (i32::from(dx), i32::from(dy));
        if dx.abs() > radius || dy.abs() > radius {
            return None;
        }
        let side = radius * 2 + 1;
        let index = (dy + radius) * side + (dx + radius);
        self.surroundings.get(index as usize).copied()
    }
}

impl WireValue for PresentCircumstances {
    fn encoded_len(&self) -> usize {
        4 + 1 + 2 + codec::list_len(&self.surroundings) + 1
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()> {
        writer.write_u32(self.last_tick_duration)?;
        writer.write_enum(self.last_move_result)?;
        writer.write_u16(self.current_hit_points)?;
        writer.write_list(&self.surroundings)?;
        writer.write_u8(self.surroundings_radius)
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            last_tick_duration: reader.read_u32()?,
            last_move_result: reader.read_enum()?,
            current_hit_points: reader.read_u16()?,
            surroundings: reader.read_list()?,
            surroundings_radius: reader.read_u8()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTo {
    pub direction: Direction,
    /// Tiles to travel; beyond the player's stride the move is Invalid.
    pub distance: u8,
}

impl WireValue for MoveTo {
    fn encoded_len(&self) -> usize {
        2
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()> {
        writer.write_enum(self.direction)?;
        writer.write_u8(self.distance)
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            direction: reader.read_enum()?,
            distance: reader.read_u8()?,
        })
    }
}

/// Open or close target, relative to the bot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTile {
    pub target: Point,
}

impl WireValue for TargetTile {
    fn encoded_len(&self) -> usize {
        Point::WIRE_LEN
    }

    fn encode(&self, writer: &mut WireWriter<'_>) -> ProtocolResult<()> {
        self.target.encode(writer)
    }

    fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            target: Point::decode(reader)?,
        })
    }
}

/// One decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Error(ErrorMessage),
    InitialParameters(InitialParameters),
    PresentCircumstances(PresentCircumstances),
    Wait,
    Resign,
    MoveTo(MoveTo),
    Open(TargetTile),
    Close(TargetTile),
}

impl Message {
    pub fn error(description: impl Into<String>) -> Self {
        Message::Error(ErrorMessage::new(description))
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Error(_) => MessageType::Error,
            Message::InitialParameters(_) => MessageType::InitialParameters,
            Message::PresentCircumstances(_) => MessageType::PresentCircumstances,
            Message::Wait => MessageType::Wait,
            Message::Resign => MessageType::Resign,
            Message::MoveTo(_) => MessageType::MoveTo,
            Message::Open(_) => MessageType::Open,
            Message::Close(_) => MessageType::Close,
        }
    }

    pub fn tag(&self) -> u8 {
        self.message_type().tag()
    }

    /// Body size in bytes, excluding the tag. Recomputed on every call.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Message::Error(m) => m.encoded_len(),
            Message::InitialParameters(m) => m.encoded_len(),
            Message::PresentCircumstances(m) => m.encoded_len(),
            Message::Wait | Message::Resign => 0,
            Message::MoveTo(m) => m.encoded_len(),
            Message::Open(m) | Message::Close(m) => m.encoded_len(),
        }
    }

    pub fn encode(&self, writer: &mut WireWriter<'_>, include_tag: bool) -> ProtocolResult<()> {
        if include_tag {
            writer.write_u8(self.tag())?;
        }
        match self {
            Message::Error(m) => m.encode(writer),
            Message::InitialParameters(m) => m.encode(writer),
            Message::PresentCircumstances(m) => m.encode(writer),
            Message::Wait | Message::Resign => Ok(()),
            Message::MoveTo(m) => m.encode(writer),
            Message::Open(m) | Message::Close(m) => m.encode(writer),
        }
    }

    /// Encodes into a fresh buffer sized exactly for this message.
    pub fn to_bytes(&self, include_tag: bool) -> ProtocolResult<Vec<u8>> {
        let mut buf = vec![0u8; self.size_in_bytes() + usize::from(include_tag)];
        self.encode(&mut WireWriter::new(&mut buf), include_tag)?;
        Ok(buf)
    }

    /// Decodes an untagged body of the given variant.
    pub fn decode_body(message_type: MessageType, reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        Ok(match message_type {
            MessageType::Error => Message::Error(ErrorMessage::decode(reader)?),
            MessageType::InitialParameters => {
                Message::InitialParameters(InitialParameters::decode(reader)?)
            }
            MessageType::PresentCircumstances => {
                Message::PresentCircumstances(PresentCircumstances::decode(reader)?)
            }
            MessageType::Wait => Message::Wait,
            MessageType::Resign => Message::Resign,
            MessageType::MoveTo => Message::MoveTo(MoveTo::decode(reader)?),
            MessageType::Open => Message::Open(TargetTile::decode(reader)?),
            MessageType::Close => Message::Close(TargetTile::decode(reader)?),
        })
    }

    /// Reads a tag byte and the matching body.
    pub fn decode(reader: &mut WireReader<'_>) -> ProtocolResult<Self> {
        let tag = reader.read_u8()?;
        let message_type = MessageType::from_tag(tag).ok_or(ProtocolError::UnknownMessageType(tag))?;
        Self::decode_body(message_type, reader)
    }
}
