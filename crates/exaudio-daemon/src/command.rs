//! Mapping decoded messages to daemon commands

use exaudio_core::Direction;
use exaudio_etf::{CommandMessage, Value};
use thiserror::Error;

/// Which device an assignment command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The default recorded by the last scan
    Default,
    /// A raw fingerprint as sent by the parent
    Id(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `{}`
    Empty,
    Scan,
    Assign { direction: Direction, target: Target },
    Dump,
    LogOn,
    LogOff,
    Exit,
    /// Any key this daemon does not handle
    Unknown(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("{key} takes no value or an integer, got {value}")]
    BadValue { key: &'static str, value: String },
}

impl TryFrom<&CommandMessage> for Command {
    type Error = CommandError;

    fn try_from(message: &CommandMessage) -> Result<Self, Self::Error> {
        if message.is_empty() {
            return Ok(Command::Empty);
        }
        let key = match message.key.as_str() {
            Some(key) => key,
            None => return Ok(Command::Unknown(message.key.to_string())),
        };

        let command = match key {
            "scan" => Command::Scan,
            "dump" => Command::Dump,
            "log-on" => Command::LogOn,
            "log-off" => Command::LogOff,
            "exit" => Command::Exit,
            other => match other.parse::<Direction>() {
                Ok(direction) => assign(direction, message.value.as_ref())?,
                Err(_) => Command::Unknown(other.to_string()),
            },
        };
        Ok(command)
    }
}

fn assign(direction: Direction, value: Option<&Value>) -> Result<Command, CommandError> {
    let target = match value {
        None | Some(Value::Nil) => Target::Default,
        Some(Value::Integer(id)) => Target::Id(*id),
        Some(other) => {
            return Err(CommandError::BadValue {
                key: direction.as_str(),
                value: format!("{other:?}"),
            })
        }
    };
    Ok(Command::Assign { direction, target })
}
