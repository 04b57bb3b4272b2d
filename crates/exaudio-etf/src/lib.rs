//! exaudio ETF - codec for the port protocol spoken with the controlling VM
//!
//! The parent process sends Erlang external term format tuples:
//! - `{}` - empty command
//! - `{"key"}` - bare command
//! - `{"key", value}` - command with nil, integer, binary or integer list
//!
//! Replies are always `{"key"}` with a binary key.

pub mod decode;
pub mod encode;
pub mod term;

pub use decode::{decode_message, DecodeError, DecodeErrorKind};
pub use encode::{encode_ack, encode_ack_to_vec, EncodeError};
pub use term::{CommandMessage, Key, Value, KEY_MAX};
