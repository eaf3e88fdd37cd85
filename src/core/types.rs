use crate::config::types::TimeLimits;
use crate::protocol::{InitialParameters, Message, PresentCircumstances, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Host->guest request contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HostRequest {
    /// Load (compile, validate) the guest program.
    InitModule {
        program: Vec<u8>,
        limits: TimeLimits,
    },
    /// Run the guest's setup with a seed and the game's initial parameters.
    Instantiate {
        rng_seed: u64,
        params: InitialParameters,
    },
    RunTick {
        circumstances: PresentCircumstances,
    },
}

impl HostRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            HostRequest::InitModule { .. } => "init_module",
            HostRequest::Instantiate { .. } => "instantiate",
            HostRequest::RunTick { .. } => "run_tick",
        }
    }
}

/// Severity attached to guest-originated log lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<GuestLogLevel> for log::Level {
    fn from(level: GuestLogLevel) -> Self {
        match level {
            GuestLogLevel::Debug => log::Level::Debug,
            GuestLogLevel::Info => log::Level::Info,
            GuestLogLevel::Warn => log::Level::Warn,
            GuestLogLevel::Error => log::Level::Error,
        }
    }
}

/// Guest->host response contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GuestResponse {
    InitModuleDone {
        success: bool,
        error: Option<String>,
    },
    InstantiateDone {
        success: bool,
    },
    RunTickDone {
        had_error: bool,
        /// Tag byte of the move the guest submitted
        move_type: u8,
        /// Untagged body of that move
        move_payload: Vec<u8>,
    },
    Log {
        level: GuestLogLevel,
        message: String,
    },
}

impl GuestResponse {
    pub fn init_ok() -> Self {
        GuestResponse::InitModuleDone {
            success: true,
            error: None,
        }
    }

    pub fn init_failed(error: impl Into<String>) -> Self {
        GuestResponse::InitModuleDone {
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn instantiated(success: bool) -> Self {
        GuestResponse::InstantiateDone { success }
    }

    /// Successful tick carrying an encoded move.
    pub fn tick_move(move_type: u8, move_payload: Vec<u8>) -> Self {
        GuestResponse::RunTickDone {
            had_error: false,
            move_type,
            move_payload,
        }
    }

    pub fn tick_message(message: &Message) -> ProtocolResult<Self> {
        Ok(Self::tick_move(message.tag(), message.to_bytes(false)?))
    }

    pub fn tick_error() -> Self {
        GuestResponse::RunTickDone {
            had_error: true,
            move_type: 0,
            move_payload: Vec::new(),
        }
    }
}
