use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Everything known about one audited event at the moment a policy decision
/// has to be taken.
///
/// The interception layer fills this in: process credentials are always
/// present, call data only for intercepted system calls and user messages,
/// the network message only for network-configuration events. The `tag`
/// field is written by the filter evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    pub process: ProcessInfo,
    #[serde(default)]
    pub exit_code: i64,
    #[serde(default)]
    pub call: Option<CallData>,
    #[serde(default)]
    pub netlink: Option<NetlinkMessage>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl EventContext {
    pub fn with_call(process: ProcessInfo, call: CallData) -> Self {
        Self {
            process,
            call: Some(call),
            ..Default::default()
        }
    }

    pub fn with_netlink(process: ProcessInfo, netlink: NetlinkMessage) -> Self {
        Self {
            process,
            netlink: Some(netlink),
            ..Default::default()
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl Display for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[pid {} uid {}]", self.process.pid, self.process.uid)?;
        if let Some(call) = &self.call {
            write!(f, " {call}")?;
        }
        if let Some(netlink) = &self.netlink {
            write!(f, " netlink({} bytes)", netlink.len())?;
        }
        Ok(())
    }
}

/// Credentials and state of the process which generated the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
    #[serde(default)]
    pub euid: u32,
    #[serde(default)]
    pub egid: u32,
    /// Audit-session login id, set once at login and inherited by children.
    #[serde(default)]
    pub login_uid: u32,
    #[serde(default)]
    pub dumpable: bool,
}

/// Data captured from an intercepted system call (or user message).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallData {
    /// System call number.
    pub major: u32,
    /// Sub-operation code of multiplexed calls (socketcall, ipc, ...).
    #[serde(default)]
    pub minor: u32,
    /// Return value, only known once the call has completed.
    #[serde(default)]
    pub result: Option<i64>,
    /// Event name carried by user-space messages.
    #[serde(default)]
    pub evname: Option<String>,
    #[serde(default)]
    pub args: Vec<CapturedArg>,
}

impl Display for CallData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call {}/{} (", self.major, self.minor)?;
        for (index, arg) in self.args.iter().enumerate() {
            if index != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")?;
        if let Some(result) = self.result {
            write!(f, " = {result}")?;
        }
        Ok(())
    }
}

/// A system-call argument already materialized by the capture layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum CapturedArg {
    Signed(i64),
    Unsigned(u64),
    String(String),
    Path {
        name: String,
        /// Outcome of the path lookup performed at capture time. `None` means
        /// the path was never resolved.
        #[serde(default)]
        lookup: Option<PathLookup>,
    },
}

impl CapturedArg {
    pub fn path(name: impl Into<String>, lookup: Option<PathLookup>) -> Self {
        CapturedArg::Path {
            name: name.into(),
            lookup,
        }
    }
}

impl Display for CapturedArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapturedArg::Signed(value) => write!(f, "{value}"),
            CapturedArg::Unsigned(value) => write!(f, "{value:#x}"),
            CapturedArg::String(value) => write!(f, "{value:?}"),
            CapturedArg::Path { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Result of resolving a path argument.
///
/// A lookup can succeed without finding an object: paths naming entries
/// which are about to be created resolve to a negative entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathLookup {
    #[serde(default)]
    pub object: Option<ObjectId>,
    /// Present when the object is a socket.
    #[serde(default)]
    pub socket: Option<SocketInfo>,
}

impl PathLookup {
    pub fn negative() -> Self {
        Self::default()
    }

    pub fn object(object: ObjectId) -> Self {
        Self {
            object: Some(object),
            socket: None,
        }
    }
}

/// Identity of a filesystem object: two names denote the same object when
/// device and inode match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub dev: u64,
    pub ino: u64,
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}", self.dev, self.ino)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketInfo {
    pub family: u16,
    pub kind: u16,
}

/// Size of `struct nlmsghdr`.
pub const NLMSG_HDRLEN: usize = 16;

/// A captured network-configuration (netlink) message in its raw form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetlinkMessage(Vec<u8>);

impl NetlinkMessage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Build a message with a header and the address family as first
    /// payload byte.
    pub fn build(msg_type: u16, flags: u16, family: u8) -> Self {
        let mut bytes = Vec::with_capacity(NLMSG_HDRLEN + 4);
        bytes.extend_from_slice(&((NLMSG_HDRLEN + 4) as u32).to_ne_bytes());
        bytes.extend_from_slice(&msg_type.to_ne_bytes());
        bytes.extend_from_slice(&flags.to_ne_bytes());
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        bytes.extend_from_slice(&0u32.to_ne_bytes());
        bytes.extend_from_slice(&[family, 0, 0, 0]);
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn msg_type(&self) -> Option<u16> {
        self.u16_at(4)
    }

    pub fn flags(&self) -> Option<u16> {
        self.u16_at(6)
    }

    pub fn family(&self) -> Option<u8> {
        self.0.get(NLMSG_HDRLEN).copied()
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        if self.0.len() < NLMSG_HDRLEN {
            return None;
        }
        let bytes = self.0.get(offset..offset + 2)?;
        Some(u16::from_ne_bytes([bytes[0], bytes[1]]))
    }
}
