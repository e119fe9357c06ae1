//! `derbyproto`: the race wire vocabulary shared by server and clients.
//!
//! All values are carried by `derbyio` primitives (length-prefixed strings
//! and big-endian `i32`s). There is no outer framing: after the handshake
//! and roster strings, the server speaks in bursts of integers, and the
//! first integer of a burst tells the client what follows. `CODE_TURN`
//! stands alone, a value `>= 0` opens a progress row, and `CODE_RACE_OVER`
//! opens the final-ranking row.

pub mod race;

#[derive(Debug, Clone)]
pub enum ProtoError {
    UnknownCode(i32),
    BadControl(i32),
}

impl std::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtoError::UnknownCode(c) => write!(f, "unknown control code: {c}"),
            ProtoError::BadControl(c) => {
                write!(f, "bad progress-row trailer: expected 0, got {c}")
            }
        }
    }
}

impl std::error::Error for ProtoError {}
