//! Remote-bus wire format.
//!
//! A `RemoteAdapter` (in `onewire-core`) is "just another adapter type
//! whose transaction interpreter issues RPCs instead of wire pulses" —
//! these are the request/response shapes it speaks on the wire.

use crate::errno::Errno;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Opcode {
    Read = 2,
    Write = 3,
    Dir = 4,
    Present = 6,
    DirAll = 7,
    Get = 8,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Request {
    pub opcode: Opcode,
    pub path: String,
    pub size: u32,
    pub offset: u32,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Response {
    pub status: Errno,
    pub size: u32,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: Vec<u8>) -> Self {
        let size = payload.len() as u32;
        Self {
            status: Errno::Success,
            size,
            payload,
        }
    }

    pub fn err(status: Errno) -> Self {
        Self {
            status,
            size: 0,
            payload: Vec::new(),
        }
    }
}
