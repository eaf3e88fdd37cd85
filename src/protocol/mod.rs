//! BSCI binary wire protocol
//!
//! Compact, self-describing encoding shared by host and guest. Leaf-first:
//! the codec knows scalars, strings and lists; the message catalog builds the
//! closed variant set on top of it; framing packs ordered batches.

pub mod codec;
pub mod enums;
pub mod error;
pub mod framing;
pub mod messages;

pub use enums::{Direction, MoveResult, Point, TileType};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{pack, packed_size, unpack};
pub use messages::{
    ErrorMessage, InitialParameters, Message, MessageType, MoveTo, PresentCircumstances,
    TargetTile,
};
