//! OBD-II PID Definitions
//!
//! The mode 01 PIDs this crate knows how to decode, with their request
//! commands and response prefixes.

use serde::{Deserialize, Serialize};

use crate::mode;

/// Decoded Mode 01 PIDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Commanded throttle actuator (0x4C)
    CommandedThrottle = 0x4C,
}

impl Pid {
    /// Every decoded PID
    pub const ALL: [Pid; 5] = [
        Pid::CoolantTemp,
        Pid::Rpm,
        Pid::Speed,
        Pid::ThrottlePosition,
        Pid::CommandedThrottle,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }

    /// Request command sent to the adapter, e.g. `010C`
    pub fn command(&self) -> String {
        format!("{:02X}{:02X}", mode::CURRENT_DATA, self.as_hex())
    }

    /// Response prefix the adapter answers with, e.g. `410C`
    pub fn response_prefix(&self) -> String {
        format!("{:02X}{:02X}", mode::CURRENT_DATA + mode::RESPONSE_OFFSET, self.as_hex())
    }

    /// Human readable name
    pub fn name(&self) -> &'static str {
        match self {
            Pid::CoolantTemp => "Engine coolant temperature",
            Pid::Rpm => "Engine RPM",
            Pid::Speed => "Vehicle speed",
            Pid::ThrottlePosition => "Throttle position",
            Pid::CommandedThrottle => "Commanded throttle actuator",
        }
    }

    /// Physical unit of the decoded value
    pub fn unit(&self) -> &'static str {
        match self {
            Pid::CoolantTemp => "°C",
            Pid::Rpm => "rpm",
            Pid::Speed => "km/h",
            Pid::ThrottlePosition | Pid::CommandedThrottle => "%",
        }
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_and_prefixes() {
        assert_eq!(Pid::Rpm.command(), "010C");
        assert_eq!(Pid::Rpm.response_prefix(), "410C");
        assert_eq!(Pid::CommandedThrottle.command(), "014C");
        assert_eq!(Pid::CommandedThrottle.response_prefix(), "414C");
        assert_eq!(Pid::CoolantTemp.response_prefix(), "4105");
    }
}
