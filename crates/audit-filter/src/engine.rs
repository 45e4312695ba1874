use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vigil_core::{Actions, EventClass, EventContext};

use crate::{
    FilterError,
    capture::{ArgumentCapture, CapturedArguments},
    definition::FilterDefinition,
    evaluator::{Decision, Evaluator},
    fileset::Fileset,
    fs::{FileSystem, HostFileSystem},
    policy::{PolicyEntry, PolicySet, PolicyTable},
    store::{FilterRef, FilterStore, FilterSummary},
    target::Resolver,
    wire,
};

/// Everything guarded by the engine lock.
#[derive(Default)]
struct Registry {
    store: FilterStore,
    policy: PolicyTable,
    fileset: Fileset,
}

/// Filter registry and policy table shared by management and evaluation.
///
/// Management operations take the writer side of the lock, evaluations the
/// reader side, so an evaluation never observes a half-applied change.
pub struct AuditEngine {
    registry: RwLock<Registry>,
    capture: Box<dyn ArgumentCapture>,
    fs: Box<dyn FileSystem>,
}

impl Default for AuditEngine {
    fn default() -> Self {
        Self::new(Box::new(CapturedArguments), Box::new(HostFileSystem))
    }
}

impl AuditEngine {
    pub fn new(capture: Box<dyn ArgumentCapture>, fs: Box<dyn FileSystem>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            capture,
            fs,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_filter(&self, definition: &FilterDefinition) -> Result<u16, FilterError> {
        self.write().store.create(definition)
    }

    /// Create a filter from its binary definition record.
    pub fn create_filter_raw(&self, record: &[u8]) -> Result<u16, FilterError> {
        let definition = wire::decode_filter(record)?;
        self.create_filter(&definition)
    }

    /// Drop the registry reference to `id` and detach it from the policy
    /// table. Parents still referencing the node keep it alive.
    pub fn destroy_filter(&self, id: u16) -> Result<(), FilterError> {
        let mut registry = self.write();
        let node = registry.store.destroy(id)?;
        let detached = registry.policy.detach(&node);
        if detached > 0 {
            log::debug!("filter {id} detached from {detached} policy slots");
        }
        Ok(())
    }

    /// Release every filter held by the registry. Policy slots keep their
    /// filters.
    pub fn clear_filters(&self) {
        self.write().store.clear_all();
    }

    pub fn describe_filter(&self, id: u16) -> Result<FilterDefinition, FilterError> {
        self.read().store.describe(id)
    }

    pub fn filters(&self) -> Vec<FilterSummary> {
        self.read().store.list()
    }

    pub fn set_policy(&self, set: &PolicySet) -> Result<(), FilterError> {
        let mut registry = self.write();
        let filter = set
            .filter
            .map(|id| registry.store.lookup_and_retain(id))
            .transpose()?;
        registry.policy.set(set.class, set.action, filter);
        log::debug!("policy {set}");
        Ok(())
    }

    /// Configure a policy slot from its binary record.
    pub fn set_policy_raw(&self, record: &[u8]) -> Result<(), FilterError> {
        let set = wire::decode_policy_set(record)?;
        self.set_policy(&set)
    }

    pub fn clear_policy(&self) {
        self.write().policy.clear();
    }

    pub fn policy(&self, class: EventClass) -> PolicyEntry {
        self.read().policy.entry(class)
    }

    /// Slots with a non-default configuration.
    pub fn policies(&self) -> Vec<PolicyEntry> {
        self.read().policy.entries()
    }

    /// Evaluate filter `id` against `event`.
    pub fn evaluate(&self, id: u16, event: &mut EventContext) -> Result<Decision, FilterError> {
        let registry = self.read();
        let root = registry.store.lookup_and_retain(id)?;
        self.run(&registry, &root, event)
    }

    /// Action for an event of `class`: the slot's filter decision when the
    /// slot has one, the slot's action otherwise.
    pub fn policy_action_for(
        &self,
        class: EventClass,
        event: &mut EventContext,
    ) -> Result<Actions, FilterError> {
        let registry = self.read();
        let slot = registry.policy.slot(class);
        match &slot.filter {
            Some(root) => self
                .run(&registry, root, event)
                .map(|decision| decision.actions),
            None => Ok(slot.action),
        }
    }

    fn run(
        &self,
        registry: &Registry,
        root: &FilterRef,
        event: &mut EventContext,
    ) -> Result<Decision, FilterError> {
        let resolver = Resolver::new(self.capture.as_ref(), self.fs.as_ref());
        let outcome = Evaluator::new(resolver, &registry.fileset).evaluate(root, event);
        registry.fileset.invalidate();
        outcome
    }
}
