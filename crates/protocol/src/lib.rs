//! Wire types exchanged with the interactive remote channel.

pub mod domain;
pub mod error;
pub mod protocol;

use error::ProtocolError;
use protocol::{ChannelEvent, ClientCall};

/// Decodes one inbound frame (`{"method": ..., "params": ...}`).
pub fn decode_event(frame: &str) -> Result<ChannelEvent, ProtocolError> {
    serde_json::from_str(frame).map_err(ProtocolError::MalformedFrame)
}

pub fn encode_call(call: &ClientCall) -> Result<String, ProtocolError> {
    serde_json::to_string(call).map_err(|source| ProtocolError::Encode {
        method: call.method(),
        source,
    })
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
