use std::{fmt, ops, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Set of response flags produced by a policy slot or by a filter.
///
/// Only [`Actions::LOG`] has a meaning for the filter evaluator, the other
/// bits are carried unchanged to the record consumer.
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ActionsRepr", into = "u32")]
pub struct Actions(u32);

impl Actions {
    pub const NONE: Actions = Actions(0);
    /// Emit an audit record for the event.
    pub const LOG: Actions = Actions(0x1);
    /// Record full argument detail.
    pub const VERBOSE: Actions = Actions(0x2);
    /// Ask the consumer to hold the process until the record is acknowledged.
    pub const SUSPEND: Actions = Actions(0x4);

    const NAMES: [(&'static str, Actions); 3] = [
        ("log", Actions::LOG),
        ("verbose", Actions::VERBOSE),
        ("suspend", Actions::SUSPEND),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Actions) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn logs(self) -> bool {
        self.contains(Actions::LOG)
    }

    /// Flip only the log bit, leaving every other action bit untouched.
    pub fn toggle_log(self) -> Self {
        Self(self.0 ^ Actions::LOG.0)
    }

    pub fn without_log(self) -> Self {
        Self(self.0 & !Actions::LOG.0)
    }
}

impl ops::BitOr for Actions {
    type Output = Actions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Actions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

impl From<Actions> for u32 {
    fn from(actions: Actions) -> Self {
        actions.0
    }
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.0, self)
    }
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }

        let mut names = Vec::new();
        let mut known = 0;
        for (name, flag) in Actions::NAMES {
            if self.contains(flag) {
                names.push(name.to_string());
            }
            known |= flag.0;
        }

        let unknown = self.0 & !known;
        if unknown != 0 {
            names.push(format!("{unknown:#x}"));
        }

        write!(f, "{}", names.join("|"))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown action '{0}'")]
pub struct ParseActionsError(String);

/// Parses a `|` or `,` separated list of action names (`log|verbose`),
/// `none`, or a raw numeric bitmask.
impl FromStr for Actions {
    type Err = ParseActionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x") {
            return u32::from_str_radix(hex, 16)
                .map(Actions)
                .map_err(|_| ParseActionsError(s.to_string()));
        }
        if let Ok(bits) = s.parse::<u32>() {
            return Ok(Actions(bits));
        }

        let mut actions = Actions::NONE;
        for item in s.split(['|', ',']).map(str::trim) {
            if item.is_empty() || item.eq_ignore_ascii_case("none") {
                continue;
            }
            let (_, flag) = Actions::NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(item))
                .ok_or_else(|| ParseActionsError(item.to_string()))?;
            actions |= *flag;
        }

        Ok(actions)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ActionsRepr {
    Bits(u32),
    Names(String),
}

impl TryFrom<ActionsRepr> for Actions {
    type Error = ParseActionsError;

    fn try_from(repr: ActionsRepr) -> Result<Self, Self::Error> {
        match repr {
            ActionsRepr::Bits(bits) => Ok(Actions(bits)),
            ActionsRepr::Names(names) => names.parse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("log|verbose".parse(), Ok(Actions::LOG | Actions::VERBOSE));
        assert_eq!("none".parse(), Ok(Actions::NONE));
        assert_eq!("0x5".parse(), Ok(Actions::LOG | Actions::SUSPEND));
        assert!("loud".parse::<Actions>().is_err());
    }

    #[test]
    fn toggle_only_touches_log() {
        let actions = Actions::VERBOSE | Actions::SUSPEND;
        assert_eq!(actions.toggle_log(), actions | Actions::LOG);
        assert_eq!(actions.toggle_log().toggle_log(), actions);
        assert_eq!((actions | Actions::LOG).without_log(), actions);
        assert_eq!(actions.without_log(), actions);
    }

    #[test]
    fn display() {
        assert_eq!((Actions::LOG | Actions::VERBOSE).to_string(), "log|verbose");
        assert_eq!(Actions::from_bits(0x11).to_string(), "log|0x10");
        assert_eq!(Actions::NONE.to_string(), "none");
    }
}
