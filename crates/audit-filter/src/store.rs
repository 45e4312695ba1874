//! Registry of reference-counted filter nodes.
//!
//! Nodes form a DAG: a composite node owns one reference to each of its
//! children, the registry owns one reference to every node it created and the
//! policy table owns one reference per slot pointing at a node. Children must
//! exist before their parents are created, so the graph can't contain cycles.
//!
//! A node is freed exactly when its last reference is dropped. Dropping is
//! iterative: a dying node moves the references it owns to a work list
//! instead of dropping them in place, so releasing a deep graph doesn't grow
//! the native stack.

use std::{collections::HashMap, fmt, mem, ops::Deref, sync::Arc};

use vigil_core::Actions;

use crate::{
    FilterError,
    definition::{Comparison, FilterBody, FilterDefinition, Literal, Op},
    fileset::FilesetEntry,
    target::TargetCode,
};

/// One element of the policy expression graph.
pub struct FilterNode {
    id: u16,
    tag: Option<String>,
    kind: NodeKind,
}

pub(crate) enum NodeKind {
    And { left: FilterRef, right: FilterRef },
    Or { left: FilterRef, right: FilterRef },
    Not { inner: FilterRef },
    Apply { target: u32, predicate: FilterRef },
    Return(Actions),
    True,
    False,
    Compare { cmp: Comparison, value: u64 },
    Mask { value: u64, mask: u64 },
    Streq(String),
    Prefix(Arc<FilesetEntry>),
}

impl NodeKind {
    fn take_children(&mut self, pending: &mut Vec<FilterRef>) {
        match mem::replace(self, NodeKind::False) {
            NodeKind::And { left, right } | NodeKind::Or { left, right } => {
                pending.push(left);
                pending.push(right);
            }
            NodeKind::Not { inner } => pending.push(inner),
            NodeKind::Apply { predicate, .. } => pending.push(predicate),
            other => *self = other,
        }
    }
}

impl FilterNode {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub(crate) fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn op(&self) -> Op {
        match &self.kind {
            NodeKind::And { .. } => Op::And,
            NodeKind::Or { .. } => Op::Or,
            NodeKind::Not { .. } => Op::Not,
            NodeKind::Apply { .. } => Op::Apply,
            NodeKind::Return(_) => Op::Return,
            NodeKind::True => Op::True,
            NodeKind::False => Op::False,
            NodeKind::Compare { cmp, .. } => cmp.op(),
            NodeKind::Mask { .. } => Op::Mask,
            NodeKind::Streq(_) => Op::Streq,
            NodeKind::Prefix(_) => Op::Prefix,
        }
    }

    /// Leaves are evaluated without pushing a frame.
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self.kind,
            NodeKind::And { .. } | NodeKind::Or { .. } | NodeKind::Not { .. } | NodeKind::Apply { .. }
        )
    }

    /// Introspection: the definition this node was created from.
    pub fn definition(&self) -> FilterDefinition {
        let body = match &self.kind {
            NodeKind::And { left, right } => FilterBody::And {
                left: left.id,
                right: right.id,
            },
            NodeKind::Or { left, right } => FilterBody::Or {
                left: left.id,
                right: right.id,
            },
            NodeKind::Not { inner } => FilterBody::Not { inner: inner.id },
            NodeKind::Apply { target, predicate } => FilterBody::Apply {
                target: TargetCode(*target),
                predicate: predicate.id,
            },
            NodeKind::Return(action) => FilterBody::Return { action: *action },
            NodeKind::True => FilterBody::True,
            NodeKind::False => FilterBody::False,
            NodeKind::Compare { cmp, value } => FilterBody::comparison(*cmp, Literal(*value)),
            NodeKind::Mask { value, mask } => FilterBody::Mask {
                value: Literal(*value),
                mask: Literal(*mask),
            },
            NodeKind::Streq(value) => FilterBody::Streq {
                value: value.clone(),
            },
            NodeKind::Prefix(entry) => FilterBody::Prefix {
                path: entry.name().to_string(),
            },
        };

        FilterDefinition {
            id: self.id,
            tag: self.tag.clone(),
            body,
        }
    }
}

impl fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.definition())
    }
}

impl Drop for FilterNode {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.kind.take_children(&mut pending);

        while let Some(child) = pending.pop() {
            // Only the last owner gets the node back; everybody else just
            // decrements the count.
            if let Some(mut node) = Arc::into_inner(child.0) {
                node.kind.take_children(&mut pending);
                log::trace!("freeing filter {}", node.id);
            }
        }
    }
}

/// Counted reference to a filter node. Cloning retains, dropping releases.
#[derive(Clone)]
pub struct FilterRef(Arc<FilterNode>);

impl FilterRef {
    /// Number of live references to the node.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn ptr_eq(&self, other: &FilterRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Release this reference. Same as dropping it.
    pub fn release(self) {}

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> std::sync::Weak<FilterNode> {
        Arc::downgrade(&self.0)
    }
}

impl Deref for FilterRef {
    type Target = FilterNode;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for FilterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (refcount {})", self.0, self.refcount())
    }
}

/// Overview of a registered node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSummary {
    pub definition: FilterDefinition,
    pub refcount: usize,
}

/// Registry of filter nodes, keyed by id.
#[derive(Default)]
pub struct FilterStore {
    nodes: HashMap<u16, FilterRef>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a node from its definition. The registry holds the initial
    /// reference.
    ///
    /// Child references acquired before a later validation step fails are
    /// released on the way out.
    pub fn create(&mut self, definition: &FilterDefinition) -> Result<u16, FilterError> {
        definition.validate()?;

        let id = definition.id;
        if self.nodes.contains_key(&id) {
            return Err(FilterError::AlreadyExists(id));
        }

        let kind = match &definition.body {
            FilterBody::And { left, right } => NodeKind::And {
                left: self.child(*left)?,
                right: self.child(*right)?,
            },
            FilterBody::Or { left, right } => NodeKind::Or {
                left: self.child(*left)?,
                right: self.child(*right)?,
            },
            FilterBody::Not { inner } => NodeKind::Not {
                inner: self.child(*inner)?,
            },
            FilterBody::Apply { target, predicate } => NodeKind::Apply {
                target: target.0,
                predicate: self.child(*predicate)?,
            },
            FilterBody::Return { action } => NodeKind::Return(*action),
            FilterBody::True => NodeKind::True,
            FilterBody::False => NodeKind::False,
            FilterBody::Eq { value } => compare(Comparison::Eq, *value),
            FilterBody::Ne { value } => compare(Comparison::Ne, *value),
            FilterBody::Lt { value } => compare(Comparison::Lt, *value),
            FilterBody::Le { value } => compare(Comparison::Le, *value),
            FilterBody::Gt { value } => compare(Comparison::Gt, *value),
            FilterBody::Ge { value } => compare(Comparison::Ge, *value),
            FilterBody::Mask { value, mask } => NodeKind::Mask {
                value: value.0,
                mask: mask.0,
            },
            FilterBody::Streq { value } => NodeKind::Streq(copy_string(value)?),
            FilterBody::Prefix { path } => {
                NodeKind::Prefix(Arc::new(FilesetEntry::new(copy_string(path)?)))
            }
        };

        let tag = definition.tag.as_deref().map(copy_string).transpose()?;

        self.nodes
            .try_reserve(1)
            .map_err(|_| FilterError::OutOfMemory)?;
        self.nodes
            .insert(id, FilterRef(Arc::new(FilterNode { id, tag, kind })));

        log::debug!("created filter {definition}");

        Ok(id)
    }

    pub fn lookup_and_retain(&self, id: u16) -> Result<FilterRef, FilterError> {
        self.nodes.get(&id).cloned().ok_or(FilterError::NotFound(id))
    }

    /// Drop the registry reference to `id`. The node survives as long as a
    /// parent or the policy table still holds it.
    pub fn destroy(&mut self, id: u16) -> Result<FilterRef, FilterError> {
        let node = self.nodes.remove(&id).ok_or(FilterError::NotFound(id))?;
        log::debug!("destroyed filter {id} (refcount now {})", node.refcount() - 1);
        Ok(node)
    }

    /// Release every reference the registry holds.
    pub fn clear_all(&mut self) {
        log::debug!("clearing {} filters", self.nodes.len());
        self.nodes.clear();
    }

    pub fn describe(&self, id: u16) -> Result<FilterDefinition, FilterError> {
        self.nodes
            .get(&id)
            .map(|node| node.definition())
            .ok_or(FilterError::NotFound(id))
    }

    /// Registered nodes sorted by id.
    pub fn list(&self) -> Vec<FilterSummary> {
        let mut summaries: Vec<FilterSummary> = self
            .nodes
            .values()
            .map(|node| FilterSummary {
                definition: node.definition(),
                refcount: node.refcount(),
            })
            .collect();
        summaries.sort_by_key(|s| s.definition.id);
        summaries
    }

    fn child(&self, id: u16) -> Result<FilterRef, FilterError> {
        self.lookup_and_retain(id)
            .map_err(|_| FilterError::InvalidReference(id))
    }
}

fn compare(cmp: Comparison, value: Literal) -> NodeKind {
    NodeKind::Compare {
        cmp,
        value: value.0,
    }
}

fn copy_string(s: &str) -> Result<String, FilterError> {
    let mut copy = String::new();
    copy.try_reserve_exact(s.len())
        .map_err(|_| FilterError::OutOfMemory)?;
    copy.push_str(s);
    Ok(copy)
}
