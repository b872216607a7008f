//! # Footswitch Box Protocol
//!
//! The footswitch box answers a two byte hello with an ASCII banner `FOOT<N>` where `N` is the
//! number of buttons it has. After that it streams one ASCII digit per button, `'0'` for released
//! and anything else for pressed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Hello bytes written to the box
pub const HANDSHAKE: [u8; 2] = [16, 128];

/// Token the box's banner must contain
pub const RESPONSE_TOKEN: &str = "FOOT";

/// How long the box is given to answer the hello
pub const HANDSHAKE_WINDOW_MS: u64 = 500;

/// Default serial baud rate
pub const DEFAULT_BAUD: u32 = 57600;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Handshake response {0:?} does not contain the footswitch token")]
    NoToken(String),

    #[error("Handshake response {0:?} has no button count after the token")]
    NoButtonCount(String),

    #[error("Expected {expected} button states but got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("Byte {0:#04x} is not a button state digit")]
    InvalidState(u8),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse the button count out of a handshake response.
pub fn parse_handshake(response: &[u8]) -> Result<usize, ProtocolError> {
    let text = String::from_utf8_lossy(response);

    let start = text
        .find(RESPONSE_TOKEN)
        .ok_or_else(|| ProtocolError::NoToken(text.to_string()))?;

    text[start + RESPONSE_TOKEN.len()..]
        .chars()
        .next()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as usize)
        .ok_or_else(|| ProtocolError::NoButtonCount(text.to_string()))
}

/// Map one frame of button state digits into pressed flags.
pub fn parse_states(frame: &[u8], num_buttons: usize) -> Result<Vec<bool>, ProtocolError> {
    if frame.len() != num_buttons {
        return Err(ProtocolError::WrongLength {
            expected: num_buttons,
            got: frame.len(),
        });
    }

    frame
        .iter()
        .map(|b| match b {
            b'0' => Ok(false),
            b'1'..=b'9' => Ok(true),
            other => Err(ProtocolError::InvalidState(*other)),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_handshake() {
        assert_eq!(parse_handshake(b"FOOT3"), Ok(3));
        assert_eq!(parse_handshake(b"\r\nFOOT2\r\n"), Ok(2));
        assert!(matches!(
            parse_handshake(b"HELLO"),
            Err(ProtocolError::NoToken(_))
        ));
        assert!(matches!(
            parse_handshake(b"FOOT"),
            Err(ProtocolError::NoButtonCount(_))
        ));
        assert!(matches!(
            parse_handshake(b"FOOTx"),
            Err(ProtocolError::NoButtonCount(_))
        ));
    }

    #[test]
    fn test_parse_states() {
        assert_eq!(parse_states(b"101", 3), Ok(vec![true, false, true]));
        assert_eq!(parse_states(b"000", 3), Ok(vec![false, false, false]));
        assert_eq!(
            parse_states(b"10", 3),
            Err(ProtocolError::WrongLength {
                expected: 3,
                got: 2
            })
        );
        assert_eq!(parse_states(b"1a0", 3), Err(ProtocolError::InvalidState(b'a')));
    }
}
