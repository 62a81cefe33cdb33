pub mod codec;
pub mod errno;
pub mod wire;

pub use codec::{CodecError, receive_message, send_message};
pub use errno::Errno;
pub use wire::{Opcode, Request, Response};
