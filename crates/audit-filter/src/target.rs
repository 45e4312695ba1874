//! Target resolution.
//!
//! A target code selects one attribute of the event being evaluated. Codes
//! are grouped in bands, each band with its own resolution rule:
//!
//! - process attributes are always available;
//! - call attributes need call data in the event, any code of the band
//!   without a dedicated meaning selects a captured argument by position;
//! - file attributes need a path-like parent target and read the object the
//!   path denotes (or its parent directory for entries not yet created);
//! - socket attributes need a path-like parent target denoting a socket;
//! - netlink attributes need a captured network-configuration message.
//!
//! A code which can't be resolved in the current context is a configuration
//! error ([FilterError::InvalidTarget]), never a silent non-match.

use std::{borrow::Cow, fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use vigil_core::{CapturedArg, EventContext, PathLookup};

use crate::{
    FilterError,
    capture::ArgumentCapture,
    fs::{FileAttributes, FileSystem},
};

pub mod codes {
    pub const PROCESS_BASE: u32 = 0x0000;
    pub const PROCESS_UID: u32 = 0x0001;
    pub const PROCESS_GID: u32 = 0x0002;
    pub const PROCESS_DUMPABLE: u32 = 0x0003;
    pub const PROCESS_EXIT_CODE: u32 = 0x0004;
    pub const PROCESS_LOGIN_UID: u32 = 0x0005;
    pub const PROCESS_EUID: u32 = 0x0006;
    pub const PROCESS_EGID: u32 = 0x0007;
    pub const PROCESS_PID: u32 = 0x0008;

    pub const CALL_BASE: u32 = 0x1000;
    pub const CALL_USERMSG_EVNAME: u32 = 0x1FFD;
    pub const CALL_RESULT: u32 = 0x1FFE;
    pub const CALL_MINOR: u32 = 0x1FFF;

    pub const FILE_BASE: u32 = 0x2000;
    pub const FILE_DEV: u32 = 0x2001;
    pub const FILE_INO: u32 = 0x2002;
    pub const FILE_MODE: u32 = 0x2003;
    pub const FILE_UID: u32 = 0x2004;
    pub const FILE_GID: u32 = 0x2005;
    pub const FILE_RDEV_MAJOR: u32 = 0x2006;
    pub const FILE_RDEV_MINOR: u32 = 0x2007;

    pub const SOCKET_BASE: u32 = 0x3000;
    pub const SOCKET_FAMILY: u32 = 0x3001;
    pub const SOCKET_TYPE: u32 = 0x3002;

    pub const NETLINK_BASE: u32 = 0x4000;
    pub const NETLINK_TYPE: u32 = 0x4001;
    pub const NETLINK_FLAGS: u32 = 0x4002;
    pub const NETLINK_FAMILY: u32 = 0x4003;

    pub const BAND_SIZE: u32 = 0x1000;

    /// Code selecting captured argument `position`.
    pub const fn call_arg(position: u32) -> u32 {
        CALL_BASE + position
    }
}

use codes::*;

const NAMES: &[(&str, u32)] = &[
    ("process.uid", PROCESS_UID),
    ("process.gid", PROCESS_GID),
    ("process.dumpable", PROCESS_DUMPABLE),
    ("process.exit_code", PROCESS_EXIT_CODE),
    ("process.login_uid", PROCESS_LOGIN_UID),
    ("process.euid", PROCESS_EUID),
    ("process.egid", PROCESS_EGID),
    ("process.pid", PROCESS_PID),
    ("call.usermsg_evname", CALL_USERMSG_EVNAME),
    ("call.result", CALL_RESULT),
    ("call.minor", CALL_MINOR),
    ("file.dev", FILE_DEV),
    ("file.ino", FILE_INO),
    ("file.mode", FILE_MODE),
    ("file.uid", FILE_UID),
    ("file.gid", FILE_GID),
    ("file.rdev_major", FILE_RDEV_MAJOR),
    ("file.rdev_minor", FILE_RDEV_MINOR),
    ("socket.family", SOCKET_FAMILY),
    ("socket.type", SOCKET_TYPE),
    ("netlink.type", NETLINK_TYPE),
    ("netlink.flags", NETLINK_FLAGS),
    ("netlink.family", NETLINK_FAMILY),
];

const ARG_PREFIX: &str = "call.arg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetBand {
    Process,
    Call,
    File,
    Socket,
    Netlink,
}

impl TargetBand {
    pub fn of(code: u32) -> Option<Self> {
        match code / BAND_SIZE {
            0 => Some(TargetBand::Process),
            1 => Some(TargetBand::Call),
            2 => Some(TargetBand::File),
            3 => Some(TargetBand::Socket),
            4 => Some(TargetBand::Netlink),
            _ => None,
        }
    }
}

/// Numeric selector of an event attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TargetCodeRepr", into = "u32")]
pub struct TargetCode(pub u32);

impl TargetCode {
    pub fn band(self) -> Option<TargetBand> {
        TargetBand::of(self.0)
    }

    pub fn name(self) -> Option<Cow<'static, str>> {
        if let Some((name, _)) = NAMES.iter().find(|(_, code)| *code == self.0) {
            return Some(Cow::Borrowed(name));
        }
        match self.band() {
            Some(TargetBand::Call) => Some(Cow::Owned(format!(
                "{ARG_PREFIX}{}",
                self.0 - CALL_BASE
            ))),
            _ => None,
        }
    }
}

impl From<TargetCode> for u32 {
    fn from(code: TargetCode) -> Self {
        code.0
    }
}

impl fmt::Display for TargetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("unknown target '{0}'")]
pub struct ParseTargetError(String);

impl FromStr for TargetCode {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((_, code)) = NAMES.iter().find(|(name, _)| *name == s) {
            return Ok(TargetCode(*code));
        }
        if let Some(position) = s.strip_prefix(ARG_PREFIX) {
            return position
                .parse::<u32>()
                .ok()
                .map(call_arg)
                .filter(|code| TargetBand::of(*code) == Some(TargetBand::Call))
                .map(TargetCode)
                .ok_or_else(|| ParseTargetError(s.to_string()));
        }
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed
            .map(TargetCode)
            .map_err(|_| ParseTargetError(s.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetCodeRepr {
    Code(u32),
    Name(String),
}

impl TryFrom<TargetCodeRepr> for TargetCode {
    type Error = ParseTargetError;

    fn try_from(repr: TargetCodeRepr) -> Result<Self, Self::Error> {
        match repr {
            TargetCodeRepr::Code(code) => Ok(TargetCode(code)),
            TargetCodeRepr::Name(name) => name.parse(),
        }
    }
}

/// A typed value extracted from the event. It lives only for the evaluation
/// which resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Integer {
        /// Raw bits, to be read as `i64` when `signed`.
        value: u64,
        signed: bool,
    },
    String(String),
    Path {
        name: String,
        lookup: Option<PathLookup>,
        /// Argument position the path was captured from.
        origin: Option<u32>,
    },
}

impl Target {
    pub fn unsigned(value: u64) -> Self {
        Target::Integer {
            value,
            signed: false,
        }
    }

    pub fn signed(value: i64) -> Self {
        Target::Integer {
            value: value as u64,
            signed: true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Target::Integer { signed: true, .. } => "signed integer",
            Target::Integer { signed: false, .. } => "unsigned integer",
            Target::String(_) => "string",
            Target::Path { .. } => "path",
        }
    }

    /// String view of string-like targets.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Target::String(s) => Some(s),
            Target::Path { name, .. } => Some(name),
            Target::Integer { .. } => None,
        }
    }

    fn from_argument(arg: CapturedArg, position: u32) -> Self {
        match arg {
            CapturedArg::Signed(value) => Target::signed(value),
            CapturedArg::Unsigned(value) => Target::unsigned(value),
            CapturedArg::String(value) => Target::String(value),
            CapturedArg::Path { name, lookup } => Target::Path {
                name,
                lookup,
                origin: Some(position),
            },
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Integer { value, signed: true } => write!(f, "{}", *value as i64),
            Target::Integer { value, signed: false } => write!(f, "{value}"),
            Target::String(s) => write!(f, "{s:?}"),
            Target::Path { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Produces targets for the evaluator.
pub struct Resolver<'a> {
    pub(crate) capture: &'a dyn ArgumentCapture,
    pub(crate) fs: &'a dyn FileSystem,
}

impl<'a> Resolver<'a> {
    pub fn new(capture: &'a dyn ArgumentCapture, fs: &'a dyn FileSystem) -> Self {
        Self { capture, fs }
    }

    pub fn resolve(
        &self,
        code: u32,
        event: &EventContext,
        parent: Option<&Target>,
    ) -> Result<Target, FilterError> {
        let not_applicable = FilterError::InvalidTarget(code);

        match TargetBand::of(code).ok_or(not_applicable.clone())? {
            TargetBand::Process => {
                let process = &event.process;
                let target = match code {
                    PROCESS_UID => Target::unsigned(process.uid.into()),
                    PROCESS_GID => Target::unsigned(process.gid.into()),
                    PROCESS_EUID => Target::unsigned(process.euid.into()),
                    PROCESS_EGID => Target::unsigned(process.egid.into()),
                    PROCESS_DUMPABLE => Target::unsigned(process.dumpable.into()),
                    PROCESS_EXIT_CODE => Target::signed(event.exit_code),
                    PROCESS_LOGIN_UID => Target::unsigned(process.login_uid.into()),
                    PROCESS_PID => Target::unsigned(process.pid.into()),
                    _ => return Err(not_applicable),
                };
                Ok(target)
            }
            TargetBand::Call => {
                let call = event.call.as_ref().ok_or(not_applicable.clone())?;
                match code {
                    CALL_MINOR => Ok(Target::unsigned(call.minor.into())),
                    CALL_RESULT => call.result.map(Target::signed).ok_or(not_applicable),
                    CALL_USERMSG_EVNAME => call
                        .evname
                        .clone()
                        .map(Target::String)
                        .ok_or(not_applicable),
                    _ => {
                        let position = code - CALL_BASE;
                        self.capture
                            .argument(event, position)
                            .map(|arg| Target::from_argument(arg, position))
                            .map_err(|err| FilterError::from_capture(code, err))
                    }
                }
            }
            TargetBand::File => {
                let attrs = self.existing_object(parent).ok_or(not_applicable.clone())?;
                let value = match code {
                    FILE_DEV => attrs.object.dev,
                    FILE_INO => attrs.object.ino,
                    FILE_MODE => attrs.mode.into(),
                    FILE_UID => attrs.uid.into(),
                    FILE_GID => attrs.gid.into(),
                    FILE_RDEV_MAJOR if attrs.is_device() => attrs.rdev_major(),
                    FILE_RDEV_MINOR if attrs.is_device() => attrs.rdev_minor(),
                    _ => return Err(not_applicable),
                };
                Ok(Target::unsigned(value))
            }
            TargetBand::Socket => {
                let socket = match parent {
                    Some(Target::Path {
                        lookup: Some(lookup),
                        ..
                    }) => lookup.socket.ok_or(not_applicable.clone())?,
                    _ => return Err(not_applicable),
                };
                match code {
                    SOCKET_FAMILY => Ok(Target::unsigned(socket.family.into())),
                    SOCKET_TYPE => Ok(Target::unsigned(socket.kind.into())),
                    _ => Err(not_applicable),
                }
            }
            TargetBand::Netlink => {
                let msg = event.netlink.as_ref().ok_or(not_applicable.clone())?;
                let value = match code {
                    NETLINK_TYPE => msg.msg_type().map(u64::from),
                    NETLINK_FLAGS => msg.flags().map(u64::from),
                    NETLINK_FAMILY => msg.family().map(u64::from),
                    _ => None,
                };
                value.map(Target::unsigned).ok_or(not_applicable)
            }
        }
    }

    /// Object denoted by a resolved path-like parent target, falling back to
    /// the immediate parent directory for entries which don't exist yet.
    fn existing_object(&self, parent: Option<&Target>) -> Option<FileAttributes> {
        let name = match parent {
            Some(Target::Path {
                name,
                lookup: Some(_),
                ..
            }) => name,
            _ => return None,
        };
        let path = Path::new(name);
        self.fs
            .lookup(path)
            .or_else(|| path.parent().and_then(|dir| self.fs.lookup(dir)))
    }
}

#[cfg(test)]
mod tests {
    use vigil_core::{CallData, NetlinkMessage, ProcessInfo, SocketInfo};

    use super::*;
    use crate::{
        capture::{CaptureError, CapturedArguments},
        fs::MemoryFileSystem,
    };

    fn event() -> EventContext {
        EventContext {
            process: ProcessInfo {
                pid: 42,
                uid: 1000,
                gid: 100,
                login_uid: 500,
                dumpable: true,
                ..Default::default()
            },
            exit_code: -2,
            call: Some(CallData {
                major: 2,
                minor: 0x40,
                result: Some(-13),
                evname: None,
                args: vec![
                    CapturedArg::path("/etc/newfile", Some(PathLookup::negative())),
                    CapturedArg::Signed(-1),
                ],
            }),
            netlink: None,
            tag: None,
        }
    }

    fn path(name: &str) -> Target {
        Target::Path {
            name: name.to_string(),
            lookup: Some(PathLookup::negative()),
            origin: None,
        }
    }

    #[test]
    fn names_round_trip() {
        for name in ["process.uid", "call.minor", "call.arg3", "file.mode", "netlink.family"] {
            let code: TargetCode = name.parse().unwrap();
            assert_eq!(code.to_string(), name);
        }
        assert_eq!("0x2003".parse(), Ok(TargetCode(FILE_MODE)));
        assert!("call.arg9999".parse::<TargetCode>().is_err());
        assert!("process.color".parse::<TargetCode>().is_err());
    }

    #[test]
    fn process_and_call_attributes() {
        let fs = MemoryFileSystem::new();
        let resolver = Resolver::new(&CapturedArguments, &fs);
        let event = event();

        assert_eq!(
            resolver.resolve(PROCESS_UID, &event, None),
            Ok(Target::unsigned(1000))
        );
        assert_eq!(
            resolver.resolve(PROCESS_DUMPABLE, &event, None),
            Ok(Target::unsigned(1))
        );
        assert_eq!(
            resolver.resolve(PROCESS_EXIT_CODE, &event, None),
            Ok(Target::signed(-2))
        );
        assert_eq!(
            resolver.resolve(CALL_MINOR, &event, None),
            Ok(Target::unsigned(0x40))
        );
        assert_eq!(
            resolver.resolve(CALL_RESULT, &event, None),
            Ok(Target::signed(-13))
        );
        assert_eq!(
            resolver.resolve(call_arg(1), &event, None),
            Ok(Target::signed(-1))
        );
        assert_eq!(
            resolver.resolve(call_arg(0), &event, None),
            Ok(Target::Path {
                name: "/etc/newfile".to_string(),
                lookup: Some(PathLookup::negative()),
                origin: Some(0),
            })
        );
        assert_eq!(
            resolver.resolve(call_arg(5), &event, None),
            Err(FilterError::InvalidTarget(call_arg(5)))
        );
        assert_eq!(
            resolver.resolve(CALL_USERMSG_EVNAME, &event, None),
            Err(FilterError::InvalidTarget(CALL_USERMSG_EVNAME))
        );
        assert_eq!(
            resolver.resolve(0x0FFF, &event, None),
            Err(FilterError::InvalidTarget(0x0FFF))
        );
        assert_eq!(
            resolver.resolve(0x9000, &event, None),
            Err(FilterError::InvalidTarget(0x9000))
        );
    }

    #[test]
    fn call_attributes_need_call_data() {
        let fs = MemoryFileSystem::new();
        let resolver = Resolver::new(&CapturedArguments, &fs);
        let event = EventContext::default();

        assert_eq!(
            resolver.resolve(CALL_MINOR, &event, None),
            Err(FilterError::InvalidTarget(CALL_MINOR))
        );
    }

    #[test]
    fn capture_failures_surface() {
        struct Interrupting;

        impl ArgumentCapture for Interrupting {
            fn argument(&self, _: &EventContext, _: u32) -> Result<CapturedArg, CaptureError> {
                Err(CaptureError::Interrupted)
            }
        }

        let fs = MemoryFileSystem::new();
        let resolver = Resolver::new(&Interrupting, &fs);
        assert_eq!(
            resolver.resolve(call_arg(0), &event(), None),
            Err(FilterError::Interrupted)
        );
    }

    #[test]
    fn file_attributes() {
        let fs = MemoryFileSystem::new()
            .file("/etc/passwd")
            .owned_by("/etc", 0, 42)
            .device("/dev/tty1", 4, 1);
        let resolver = Resolver::new(&CapturedArguments, &fs);
        let event = event();

        let passwd = fs.object("/etc/passwd").unwrap();
        assert_eq!(
            resolver.resolve(FILE_INO, &event, Some(&path("/etc/passwd"))),
            Ok(Target::unsigned(passwd.ino))
        );
        // not created yet: the parent directory is used
        assert_eq!(
            resolver.resolve(FILE_GID, &event, Some(&path("/etc/newfile"))),
            Ok(Target::unsigned(42))
        );
        assert_eq!(
            resolver.resolve(FILE_RDEV_MINOR, &event, Some(&path("/dev/tty1"))),
            Ok(Target::unsigned(1))
        );
        assert_eq!(
            resolver.resolve(FILE_RDEV_MAJOR, &event, Some(&path("/etc/passwd"))),
            Err(FilterError::InvalidTarget(FILE_RDEV_MAJOR))
        );
        assert_eq!(
            resolver.resolve(FILE_MODE, &event, Some(&path("/nowhere/at/all"))),
            Err(FilterError::InvalidTarget(FILE_MODE))
        );
        assert_eq!(
            resolver.resolve(FILE_MODE, &event, None),
            Err(FilterError::InvalidTarget(FILE_MODE))
        );
        assert_eq!(
            resolver.resolve(FILE_MODE, &event, Some(&Target::unsigned(3))),
            Err(FilterError::InvalidTarget(FILE_MODE))
        );

        // never resolved at capture time
        let unresolved = Target::Path {
            name: "/etc/passwd".to_string(),
            lookup: None,
            origin: Some(0),
        };
        assert_eq!(
            resolver.resolve(FILE_INO, &event, Some(&unresolved)),
            Err(FilterError::InvalidTarget(FILE_INO))
        );
    }

    #[test]
    fn socket_attributes() {
        let fs = MemoryFileSystem::new();
        let resolver = Resolver::new(&CapturedArguments, &fs);
        let socket = Target::Path {
            name: "socket:[1234]".to_string(),
            lookup: Some(PathLookup {
                object: None,
                socket: Some(SocketInfo { family: 2, kind: 1 }),
            }),
            origin: Some(0),
        };

        assert_eq!(
            resolver.resolve(SOCKET_FAMILY, &event(), Some(&socket)),
            Ok(Target::unsigned(2))
        );
        assert_eq!(
            resolver.resolve(SOCKET_TYPE, &event(), Some(&path("/etc/passwd"))),
            Err(FilterError::InvalidTarget(SOCKET_TYPE))
        );
    }

    #[test]
    fn netlink_attributes() {
        let fs = MemoryFileSystem::new();
        let resolver = Resolver::new(&CapturedArguments, &fs);
        let event = EventContext::with_netlink(
            ProcessInfo::default(),
            NetlinkMessage::build(24, 0x0405, 10),
        );

        assert_eq!(
            resolver.resolve(NETLINK_TYPE, &event, None),
            Ok(Target::unsigned(24))
        );
        assert_eq!(
            resolver.resolve(NETLINK_FAMILY, &event, None),
            Ok(Target::unsigned(10))
        );

        let short = EventContext::with_netlink(
            ProcessInfo::default(),
            NetlinkMessage::from_bytes(vec![0; 16]),
        );
        assert_eq!(
            resolver.resolve(NETLINK_FLAGS, &short, None),
            Ok(Target::unsigned(0))
        );
        assert_eq!(
            resolver.resolve(NETLINK_FAMILY, &short, None),
            Err(FilterError::InvalidTarget(NETLINK_FAMILY))
        );
        assert_eq!(
            resolver.resolve(NETLINK_TYPE, &EventContext::default(), None),
            Err(FilterError::InvalidTarget(NETLINK_TYPE))
        );
    }
}
