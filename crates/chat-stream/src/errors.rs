use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ChatError {
    /// A frame on the wire could not be decoded. Fatal to the current stream.
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// A frame referenced a part that does not exist or can no longer change.
    #[error("Assembler integrity error: {0}")]
    AssemblerIntegrity(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Caller misuse, such as submitting while a turn is still in flight.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The server reported an error through an error frame.
    #[error("Stream error: {0}")]
    Stream(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::AssemblerIntegrity("unknown tool call c9".to_string());
        assert_eq!(err.to_string(), "Assembler integrity error: unknown tool call c9");
    }
}
