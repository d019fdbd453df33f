//! Protocol module containing message types, the line codec, and the command id counter.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_line, encode_line, ProtocolError};
pub use messages::*;
pub use sequence::SequenceCounter;
