//! Per event class default action and optional root filter.

use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_core::{Actions, EventClass, class::POLICY_TABLE_SIZE};

use crate::store::FilterRef;

/// Request to configure one slot of the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
    pub class: EventClass,
    #[serde(default)]
    pub action: Actions,
    /// Root filter id, `None` for action-only slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<u16>,
}

impl fmt::Display for PolicySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.class, self.action)?;
        if let Some(filter) = self.filter {
            write!(f, " filter #{filter}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicySlot {
    pub action: Actions,
    pub filter: Option<FilterRef>,
}

impl PolicySlot {
    fn is_default(&self) -> bool {
        self.action.is_empty() && self.filter.is_none()
    }
}

/// Snapshot of a configured slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEntry {
    pub class: EventClass,
    pub action: Actions,
    pub filter: Option<u16>,
}

/// One slot per event class. Each slot referencing a filter holds one
/// reference to it.
pub struct PolicyTable {
    slots: Vec<PolicySlot>,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyTable {
    pub fn new() -> Self {
        Self {
            slots: vec![PolicySlot::default(); POLICY_TABLE_SIZE],
        }
    }

    /// Configure `class`. The reference previously held by the slot, if any,
    /// is released.
    pub fn set(&mut self, class: EventClass, action: Actions, filter: Option<FilterRef>) {
        let slot = &mut self.slots[class.index()];
        slot.action = action;
        slot.filter = filter;
    }

    pub fn slot(&self, class: EventClass) -> &PolicySlot {
        &self.slots[class.index()]
    }

    pub fn entry(&self, class: EventClass) -> PolicyEntry {
        let slot = self.slot(class);
        PolicyEntry {
            class,
            action: slot.action,
            filter: slot.filter.as_ref().map(|node| node.id()),
        }
    }

    /// Non-default slots in class order.
    pub fn entries(&self) -> Vec<PolicyEntry> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_default())
            .filter_map(|(index, _)| {
                let class = u16::try_from(index).ok().and_then(|code| EventClass::new(code).ok())?;
                Some(self.entry(class))
            })
            .collect()
    }

    /// Remove `node` from every slot referencing it. Returns how many slots
    /// were detached.
    pub fn detach(&mut self, node: &FilterRef) -> usize {
        let mut detached = 0;
        for slot in &mut self.slots {
            if slot.filter.as_ref().is_some_and(|f| f.ptr_eq(node)) {
                slot.filter = None;
                detached += 1;
            }
        }
        detached
    }

    /// Reset every slot to action none without filter.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = PolicySlot::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use vigil_core::SpecialClass;

    use super::*;
    use crate::{
        definition::{FilterBody, FilterDefinition},
        store::FilterStore,
    };

    #[test]
    fn slots_hold_references() {
        let mut store = FilterStore::new();
        store
            .create(&FilterDefinition::new(1, FilterBody::True))
            .unwrap();

        let open: EventClass = "open".parse().unwrap();
        let login = EventClass::special(SpecialClass::Login);
        let mut table = PolicyTable::new();

        table.set(open, Actions::NONE, Some(store.lookup_and_retain(1).unwrap()));
        table.set(login, Actions::LOG, Some(store.lookup_and_retain(1).unwrap()));
        assert_eq!(store.lookup_and_retain(1).unwrap().refcount(), 4);

        assert_eq!(
            table.entries(),
            vec![
                PolicyEntry {
                    class: open,
                    action: Actions::NONE,
                    filter: Some(1)
                },
                PolicyEntry {
                    class: login,
                    action: Actions::LOG,
                    filter: Some(1)
                },
            ]
        );

        let node = store.destroy(1).unwrap();
        assert_eq!(table.detach(&node), 2);
        assert_eq!(node.refcount(), 1);
        assert_eq!(table.entry(login).filter, None);
        assert_eq!(table.entry(login).action, Actions::LOG);
    }

    #[test]
    fn clear_resets_everything() {
        let mut table = PolicyTable::new();
        let exit = EventClass::special(SpecialClass::Exit);
        table.set(exit, Actions::LOG | Actions::VERBOSE, None);
        assert_eq!(table.entries().len(), 1);

        table.clear();
        assert!(table.entries().is_empty());
        assert_eq!(table.entry(exit).action, Actions::NONE);
    }

    #[test]
    fn parse_yaml_policy() {
        let sets: Vec<PolicySet> = serde_yaml::from_str(
            r#"
- { class: open, action: none, filter: 12 }
- { class: login, action: log }
- { class: 59, action: log|suspend }
"#,
        )
        .unwrap();

        assert_eq!(sets[0].class, "open".parse().unwrap());
        assert_eq!(sets[0].filter, Some(12));
        assert_eq!(sets[1].class, EventClass::special(SpecialClass::Login));
        assert_eq!(sets[1].filter, None);
        assert_eq!(sets[2].class.code(), 59);
        assert_eq!(sets[2].action, Actions::LOG | Actions::SUSPEND);
    }
}
