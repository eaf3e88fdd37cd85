//! BSCI framing: `"BSCI" + u32 count + (tag + body)* + 0x00`.

use crate::protocol::codec::{WireReader, WireWriter};
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::messages::{Message, MessageType};

pub const MAGIC: &[u8; 4] = b"BSCI";

/// Magic, count and terminator.
const FRAME_OVERHEAD: usize = 4 + 4 + 1;

/// Exact size of the buffer `pack` will produce.
pub fn packed_size(messages: &[Message]) -> usize {
    messages.iter().map(Message::size_in_bytes).sum::<usize>() + messages.len() + FRAME_OVERHEAD
}

pub fn pack(messages: &[Message]) -> ProtocolResult<Vec<u8>> {
    let count = u32::try_from(messages.len()).map_err(|_| ProtocolError::LengthOverflow {
        len: messages.len(),
        max: u32::MAX as usize,
    })?;

    let mut buf = vec![0u8; packed_size(messages)];
    let mut writer = WireWriter::new(&mut buf);
    writer.write_bytes(MAGIC)?;
    writer.write_u32(count)?;
    for message in messages {
        message.encode(&mut writer, true)?;
    }
    writer.write_u8(MessageType::TERMINATOR)?;
    debug_assert_eq!(writer.remaining(), 0);
    Ok(buf)
}

pub fn unpack(buf: &[u8]) -> ProtocolResult<Vec<Message>> {
    let mut reader = WireReader::new(buf);
    let magic = reader.read_bytes(MAGIC.len()).map_err(|_| ProtocolError::HeaderInvalid)?;
    if magic != MAGIC {
        return Err(ProtocolError::HeaderInvalid);
    }

    let declared = reader.read_u32()?;
    if declared == 0 {
        return Ok(Vec::new());
    }

    let mut messages = Vec::new();
    while !reader.is_exhausted() {
        let tag = reader.read_u8()?;
        if tag == MessageType::TERMINATOR {
            break;
        }
        let message_type =
            MessageType::from_tag(tag).ok_or(ProtocolError::UnknownMessageType(tag))?;
        messages.push(Message::decode_body(message_type, &mut reader)?);
    }

    if messages.is_empty() {
        return Err(ProtocolError::EmptyResult);
    }
    if messages.len() != declared as usize {
        return Err(ProtocolError::CountMismatch {
            declared,
            decoded: messages.len() as u32,
        });
    }
    Ok(messages)
}
