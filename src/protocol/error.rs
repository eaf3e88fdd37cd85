use thiserror::Error;

/// Failures raised while encoding or decoding BSCI buffers.
///
/// Every variant aborts the whole operation; callers never see a partially
/// decoded message list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("packed message buffer has invalid header")]
    HeaderInvalid,

    #[error("unexpected number of messages in buffer (declared {declared}, decoded {decoded})")]
    CountMismatch { declared: u32, decoded: u32 },

    #[error("no messages in buffer")]
    EmptyResult,

    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("enum {value} out of range for {name}")]
    EnumOutOfRange { name: &'static str, value: u8 },

    #[error("read past end of buffer (needed {needed} bytes, {remaining} remaining)")]
    BufferUnderrun { needed: usize, remaining: usize },

    #[error("write past end of buffer (needed {needed} bytes, {remaining} remaining)")]
    BufferOverrun { needed: usize, remaining: usize },

    #[error("length {len} exceeds wire maximum of {max}")]
    LengthOverflow { len: usize, max: usize },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
