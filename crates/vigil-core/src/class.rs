//! Event classes index the policy table.
//!
//! Codes below [`SYSCALL_CLASSES`] are system-call numbers, the codes above
//! identify events which don't originate from an intercepted call.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

use crate::platform::syscalls;

/// Number of slots of the policy table.
pub const POLICY_TABLE_SIZE: usize = 1024;

/// Number of codes reserved for system calls.
pub const SYSCALL_CLASSES: u16 = 1000;

/// Event classes with no system-call counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum SpecialClass {
    Login = 1000,
    Netconf = 1001,
    Exit = 1002,
    Usermsg = 1003,
    Fork = 1004,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "EventClassRepr", into = "u16")]
pub struct EventClass(u16);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventClassError {
    #[error("event class {0} is outside the policy table")]
    OutOfRange(u32),
    #[error("unknown event class '{0}'")]
    Unknown(String),
}

impl EventClass {
    pub fn new(code: u16) -> Result<Self, EventClassError> {
        if (code as usize) < POLICY_TABLE_SIZE {
            Ok(Self(code))
        } else {
            Err(EventClassError::OutOfRange(code as u32))
        }
    }

    pub const fn special(class: SpecialClass) -> Self {
        Self(class as u16)
    }

    pub const fn code(self) -> u16 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<SpecialClass> for EventClass {
    fn from(class: SpecialClass) -> Self {
        Self::special(class)
    }
}

impl From<EventClass> for u16 {
    fn from(class: EventClass) -> Self {
        class.0
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= SYSCALL_CLASSES {
            return match SpecialClass::iter().find(|c| *c as u16 == self.0) {
                Some(special) => write!(f, "{special}"),
                None => write!(f, "{}", self.0),
            };
        }
        match syscalls::NAMES.iter().find(|(_, nr)| *nr == self.0) {
            Some((name, _)) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Accepts a special class name, a known system-call name or a numeric code.
impl FromStr for EventClass {
    type Err = EventClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u32>() {
            return u16::try_from(code)
                .map_err(|_| EventClassError::OutOfRange(code))
                .and_then(EventClass::new);
        }
        if let Ok(special) = SpecialClass::from_str(s) {
            return Ok(special.into());
        }
        syscalls::NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, nr)| EventClass(*nr))
            .ok_or_else(|| EventClassError::Unknown(s.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventClassRepr {
    Code(u16),
    Name(String),
}

impl TryFrom<EventClassRepr> for EventClass {
    type Error = EventClassError;

    fn try_from(repr: EventClassRepr) -> Result<Self, Self::Error> {
        match repr {
            EventClassRepr::Code(code) => EventClass::new(code),
            EventClassRepr::Name(name) => name.parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_class() {
        assert_eq!("open".parse::<EventClass>().unwrap().code(), 2);
        assert_eq!("login".parse::<EventClass>().unwrap().code(), 1000);
        assert_eq!("59".parse::<EventClass>().unwrap().to_string(), "execve");
        assert_eq!(EventClass::special(SpecialClass::Exit).to_string(), "exit");
        assert_eq!(EventClass::new(1010).unwrap().to_string(), "1010");
        assert_eq!(
            "4096".parse::<EventClass>(),
            Err(EventClassError::OutOfRange(4096))
        );
        assert!(matches!(
            "frobnicate".parse::<EventClass>(),
            Err(EventClassError::Unknown(_))
        ));
    }

    #[test]
    fn deserialize_from_name_or_code() {
        let classes: Vec<EventClass> = serde_json::from_str(r#"["usermsg", 257]"#).unwrap();
        assert_eq!(classes[0], SpecialClass::Usermsg.into());
        assert_eq!(classes[1].to_string(), "openat");
    }
}
