//! Shared vocabulary of vigil: the [event context](event::EventContext) handed to the
//! policy engine for every audited event, the [action](action::Actions) bitmask
//! it returns, the [event classes](class::EventClass) indexing the policy table and
//! typed access to [configuration sections](config::SectionConfig).

pub mod action;
pub mod class;
pub mod config;
pub mod event;

// Only the x86_64 tables are bundled.
#[path = "platform/linux-x86_64.rs"]
pub mod platform;

pub use action::Actions;
pub use class::{EventClass, SpecialClass};
pub use event::{
    CallData, CapturedArg, EventContext, NetlinkMessage, ObjectId, PathLookup, ProcessInfo,
    SocketInfo,
};
