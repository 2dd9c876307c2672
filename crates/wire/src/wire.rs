// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON text-frame codec for agent events.

use crate::event::AgentEvent;
use thiserror::Error;

/// Maximum encoded event size (manifests for large apps run to a few MiB)
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Errors that can occur encoding or decoding agent events
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Encode an event as a JSON text frame.
pub fn encode(event: &AgentEvent) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(event)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: json.len(), max: MAX_MESSAGE_SIZE });
    }
    Ok(json)
}

/// Decode a JSON text frame into an event.
pub fn decode(text: &str) -> Result<AgentEvent, ProtocolError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size: text.len(), max: MAX_MESSAGE_SIZE });
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
