//! # Formats
//!
//! Wire encodings for payloads travelling through the broker.

pub mod codec;

pub use codec::{Format, JsonMarshaler, Marshaler, Message, MessageType, Payload, marshaler_for};
