//! Command Schedule
//!
//! A fixed, cyclically repeating list of commands. How often a PID appears in
//! the cycle sets its sampling rate relative to the others.

use obd_protocol::{Pid, DELIMITER, PROMPT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Schedule construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Command schedule is empty")]
    Empty,
    #[error("Invalid command {0:?}")]
    InvalidCommand(String),
}

/// Weighted schedule configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Commands sampled at the full rate
    pub fast: Vec<String>,
    /// Commands sampled once per cycle
    pub slow: Vec<String>,
    /// How many times the fast block repeats per cycle
    pub fast_repeats: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        // RPM, speed and throttle far more often than coolant temperature
        Self {
            fast: [Pid::Rpm, Pid::Speed, Pid::CommandedThrottle, Pid::ThrottlePosition]
                .iter()
                .map(Pid::command)
                .collect(),
            slow: vec![Pid::CoolantTemp.command()],
            fast_repeats: 10,
        }
    }
}

/// Cyclic command schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSchedule {
    commands: Vec<String>,
    cursor: usize,
}

impl CommandSchedule {
    /// Create a schedule cycling through `commands` in order
    pub fn new(commands: Vec<String>) -> Result<Self, ScheduleError> {
        if commands.is_empty() {
            return Err(ScheduleError::Empty);
        }
        if let Some(bad) = commands.iter().find(|c| !is_valid_command(c)) {
            return Err(ScheduleError::InvalidCommand(bad.clone()));
        }
        Ok(Self {
            commands,
            cursor: 0,
        })
    }

    /// Expand a weighted configuration into a cycle
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ScheduleError> {
        let schedule = Self::new(expand(config))?;
        info!("Command schedule created with {} commands per cycle", schedule.len());
        Ok(schedule)
    }

    /// Next command and its index in the cycle
    pub fn next_command(&mut self) -> (usize, &str) {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.commands.len();
        (index, &self.commands[index])
    }

    /// Commands per cycle
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Always false; a schedule holds at least one command
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Full cycle in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Fraction of the cycle spent on `command`
    pub fn share(&self, command: &str) -> f64 {
        let hits = self.commands.iter().filter(|c| c.eq_ignore_ascii_case(command)).count();
        hits as f64 / self.commands.len() as f64
    }
}

impl Default for CommandSchedule {
    fn default() -> Self {
        Self {
            commands: expand(&ScheduleConfig::default()),
            cursor: 0,
        }
    }
}

fn expand(config: &ScheduleConfig) -> Vec<String> {
    let mut commands = Vec::with_capacity(config.fast.len() * config.fast_repeats + config.slow.len());
    for _ in 0..config.fast_repeats {
        commands.extend(config.fast.iter().cloned());
    }
    commands.extend(config.slow.iter().cloned());
    commands
}

fn is_valid_command(command: &str) -> bool {
    !command.is_empty()
        && command.is_ascii()
        && !command.bytes().any(|b| b == DELIMITER || b == PROMPT || b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cycle() {
        let schedule = CommandSchedule::default();
        assert_eq!(schedule.len(), 41);
        assert_eq!(&schedule.commands()[..4], ["010C", "010D", "014C", "0111"]);
        assert_eq!(schedule.commands()[40], "0105");
        assert_eq!(schedule, CommandSchedule::from_config(&ScheduleConfig::default()).unwrap());
    }

    #[test]
    fn test_coolant_sampled_a_tenth_as_often() {
        let schedule = CommandSchedule::default();
        assert!((schedule.share("010C") / schedule.share("0105") - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycles_forever() {
        let mut schedule = CommandSchedule::new(vec!["010C".into(), "0105".into()]).unwrap();
        let seen: Vec<String> = (0..5).map(|_| schedule.next_command().1.to_string()).collect();
        assert_eq!(seen, ["010C", "0105", "010C", "0105", "010C"]);
        assert_eq!(schedule.next_command().0, 1);
    }

    #[test]
    fn test_rejects_bad_schedules() {
        assert_eq!(CommandSchedule::new(vec![]), Err(ScheduleError::Empty));
        assert_eq!(
            CommandSchedule::new(vec!["010C\r".into()]),
            Err(ScheduleError::InvalidCommand("010C\r".into()))
        );
        let empty = ScheduleConfig {
            fast: vec![],
            slow: vec![],
            fast_repeats: 10,
        };
        assert_eq!(CommandSchedule::from_config(&empty), Err(ScheduleError::Empty));
    }
}
