//! audit-filter decides, for every audited event, whether and how it has to be reported.
//!
//! Policies are expressed as graphs of filter nodes: predicates comparing an
//! attribute of the event with a literal, combined with `AND`, `OR` and `NOT`.
//! `APPLY` nodes select which attribute the predicates below them look at.
//!
//! ```
//! use audit_filter::{AuditEngine, FilterDefinition, PolicySet};
//! use vigil_core::{Actions, EventContext, ProcessInfo};
//!
//! let definitions: Vec<FilterDefinition> = serde_yaml::from_str(r#"
//! - { id: 1, op: eq, value: 0 }
//! - { id: 2, op: apply, target: process.uid, predicate: 1, tag: root }
//! "#).unwrap();
//!
//! let engine = AuditEngine::default();
//! for definition in &definitions {
//!     engine.create_filter(definition).unwrap();
//! }
//! engine
//!     .set_policy(&PolicySet {
//!         class: "exit".parse().unwrap(),
//!         action: Actions::NONE,
//!         filter: Some(2),
//!     })
//!     .unwrap();
//!
//! let mut event = EventContext {
//!     process: ProcessInfo { uid: 0, ..Default::default() },
//!     ..Default::default()
//! };
//! let action = engine.policy_action_for("exit".parse().unwrap(), &mut event).unwrap();
//!
//! assert_eq!(action, Actions::LOG);
//! assert_eq!(event.tag(), Some("root"));
//! ```
//!
//! Filters are reference counted: the registry, the policy table and parent
//! nodes each hold one reference, and a node is freed when the last one goes
//! away. Neither freeing nor evaluating a graph recurses, so arbitrarily deep
//! graphs are safe to load.

pub mod capture;
pub mod definition;
pub mod engine;
mod error;
pub mod evaluator;
pub mod fileset;
pub mod fs;
pub mod policy;
pub mod store;
pub mod target;
pub mod wire;

pub use capture::{ArgumentCapture, CapturedArguments};
pub use definition::{FilterBody, FilterDefinition, Literal, Op};
pub use engine::AuditEngine;
pub use error::FilterError;
pub use evaluator::Decision;
pub use fs::{FileSystem, HostFileSystem};
pub use policy::{PolicyEntry, PolicySet};
pub use store::FilterSummary;
pub use target::TargetCode;
