//! OBD-II Protocol Definitions and ELM327 AT Handshake

use serde::{Deserialize, Serialize};

/// Reset the adapter
pub const AT_RESET: &str = "atz";

/// Disable command echo
pub const AT_ECHO_OFF: &str = "ate0";

/// Supported OBD-II protocols
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObdProtocol {
    /// Automatic protocol detection
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    #[default]
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Get the ELM327 AT command for this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "atsp0",
            ObdProtocol::J1850Pwm => "atsp1",
            ObdProtocol::J1850Vpw => "atsp2",
            ObdProtocol::Iso9141_2 => "atsp3",
            ObdProtocol::Iso14230_4Kwp => "atsp4",
            ObdProtocol::Iso14230_4KwpFast => "atsp5",
            ObdProtocol::Iso15765_4Can11bit500 => "atsp6",
            ObdProtocol::Iso15765_4Can29bit500 => "atsp7",
            ObdProtocol::Iso15765_4Can11bit250 => "atsp8",
            ObdProtocol::Iso15765_4Can29bit250 => "atsp9",
        }
    }

    /// Reset, echo off and protocol select as one CR-joined batch with a
    /// single trailing CR
    pub fn init_sequence(&self) -> Vec<u8> {
        let mut batch = [AT_RESET, AT_ECHO_OFF, self.to_elm_command()].join("\r");
        batch.push('\r');
        batch.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_init_sequence() {
        assert_eq!(ObdProtocol::default().init_sequence(), b"atz\rate0\ratsp6\r");
    }

    #[test]
    fn test_auto_protocol_command() {
        assert_eq!(ObdProtocol::Auto.to_elm_command(), "atsp0");
    }
}
