//! Error taxonomy for the transport/framing/routing core (spec §7).
//!
//! One flat enum with `#[from]` conversions, following the teacher's
//! `src/error.rs` style: every recoverable failure is a named variant, never
//! a boxed/opaque error, so call sites can match on it to decide whether a
//! connection survives.

use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{source}")]
    IOError {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("channel communication error")]
    CommunicationError,

    // Framing errors
    #[error("Invalid Opcode")]
    InvalidOpcode,

    // Transport overflow errors (spec §7.1)
    #[error("receive buffer exceeded the cap of {cap} bytes")]
    ReceiveBufferOverflow { cap: usize },

    #[error("accumulated frame payload exceeded the cap of {cap} bytes")]
    PayloadAccumulatorOverflow { cap: usize },

    #[error("send buffer exceeded the cap of {cap} bytes")]
    SendBufferOverflow { cap: usize },

    // Payload decode errors (spec §7.3)
    #[error("failed to decode a protocol package from the frame body")]
    PackageDecodeError,

    #[error("failed to decode the inner message for cmd {cmd}")]
    MessageDecodeError { cmd: i32 },

    // Unknown command (spec §7.4)
    #[error("unregistered command {cmd}")]
    UnknownCommand { cmd: i32 },

    // Configuration loading (ambient, spec §6)
    #[error("failed to parse config: {message}")]
    ConfigParseError { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
