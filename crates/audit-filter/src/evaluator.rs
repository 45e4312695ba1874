//! Iterative evaluation of a filter graph against one event.
//!
//! The walk never recurses: combinators and `APPLY` nodes push a [Frame] on
//! an explicit stack and are resumed when their child has an outcome. The
//! stack lives inline for shallow graphs and spills to the heap for deep
//! ones, so the depth of a graph only costs memory.
//!
//! Targets resolved by `APPLY` nodes live on a second stack. A frame records
//! the target in scope when it was entered; popping it discards every target
//! resolved below it.

use smallvec::SmallVec;
use vigil_core::{Actions, CapturedArg, EventContext};

use crate::{
    FilterError,
    definition::MAX_TAG_LEN,
    fileset::{Fileset, PathMatch},
    store::{FilterNode, NodeKind},
    target::{Resolver, Target},
};

/// Frames kept inline before spilling to the heap.
const INLINE_FRAMES: usize = 16;
const INLINE_TARGETS: usize = 4;

/// Outcome of a successful evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub actions: Actions,
    pub tag: Option<String>,
}

impl Decision {
    pub fn logs(&self) -> bool {
        self.actions.logs()
    }
}

/// Saved state of a combinator or `APPLY` node waiting for its child.
struct Frame<'n> {
    node: &'n FilterNode,
    /// Target in scope when the node was entered.
    target: Option<usize>,
    tag: Option<&'n str>,
    /// The right child of an `AND`/`OR` is being evaluated.
    on_right: bool,
}

pub struct Evaluator<'a> {
    resolver: Resolver<'a>,
    fileset: &'a Fileset,
}

impl<'a> Evaluator<'a> {
    pub fn new(resolver: Resolver<'a>, fileset: &'a Fileset) -> Self {
        Self { resolver, fileset }
    }

    /// Evaluate the graph rooted at `root`.
    ///
    /// On success the tag of a logged event, if any, is stored in `event`
    /// and path arguments matched through a hard link are renamed to the
    /// configured name. On error `event` is left untouched.
    pub fn evaluate<'n>(
        &self,
        root: &'n FilterNode,
        event: &mut EventContext,
    ) -> Result<Decision, FilterError> {
        let mut frames: SmallVec<[Frame<'n>; INLINE_FRAMES]> = SmallVec::new();
        let mut targets: SmallVec<[Target; INLINE_TARGETS]> = SmallVec::new();
        let mut renames: Vec<(u32, &'n str)> = Vec::new();

        let mut current: Option<usize> = None;
        let mut result = Actions::NONE;
        let mut tag: Option<&'n str> = None;
        let mut next = Some(root);

        log::trace!("evaluating filter {} on {event}", root.id());

        while let Some(mut node) = next.take() {
            let mut settled = false;

            // chains of OR with a predicate on the left
            while let NodeKind::Or { left, right } = node.kind() {
                if !left.is_leaf() {
                    break;
                }
                result |= self.leaf(left, current.map(|i| &mut targets[i]), &mut renames)?;
                if result.logs() {
                    tag = left.tag().or(node.tag()).or(tag);
                    settled = true;
                    break;
                }
                tag = node.tag().or(tag);
                node = &**right;
            }

            if !settled {
                match node.kind() {
                    NodeKind::And { left, .. }
                    | NodeKind::Or { left, .. }
                    | NodeKind::Not { inner: left } => {
                        push(&mut frames, node, current, node.tag().or(tag))?;
                        tag = None;
                        next = Some(&**left);
                        continue;
                    }
                    NodeKind::Apply { target, predicate } => {
                        let resolved =
                            self.resolver
                                .resolve(*target, event, current.map(|i| &targets[i]))?;
                        push(&mut frames, node, current, node.tag().or(tag))?;
                        targets
                            .try_reserve(1)
                            .map_err(|_| FilterError::OutOfMemory)?;
                        targets.push(resolved);
                        current = Some(targets.len() - 1);
                        tag = None;
                        next = Some(&**predicate);
                        continue;
                    }
                    _ => {
                        result |= self.leaf(node, current.map(|i| &mut targets[i]), &mut renames)?;
                        if result.logs() {
                            tag = node.tag().or(tag);
                        }
                    }
                }
            }

            // unwind until a right child has to be evaluated
            while next.is_none() {
                let Some(frame) = frames.last_mut() else {
                    break;
                };

                current = frame.target;
                targets.truncate(current.map_or(0, |i| i + 1));

                let parent = frame.node;
                if !frame.on_right {
                    match parent.kind() {
                        NodeKind::Or { right, .. } if !result.logs() => {
                            // the left side didn't match, its tag explains nothing
                            frame.on_right = true;
                            tag = None;
                            next = Some(&**right);
                            continue;
                        }
                        NodeKind::And { right, .. } if result.logs() => {
                            frame.on_right = true;
                            frame.tag = tag.or(frame.tag);
                            tag = None;
                            result = result.without_log();
                            next = Some(&**right);
                            continue;
                        }
                        _ => {}
                    }
                }

                let Some(frame) = frames.pop() else {
                    break;
                };
                if let NodeKind::Not { .. } = frame.node.kind() {
                    tag = None;
                    result = result.toggle_log();
                }
                if tag.is_none() {
                    tag = frame.tag;
                }
            }
        }

        // a tag only explains logged events
        let tag = tag.filter(|_| result.logs()).map(truncate_tag);
        if let Some(tag) = tag {
            event.tag = Some(tag.to_string());
        }
        for (position, name) in renames {
            rename_argument(event, position, name);
        }

        log::trace!("filter {} returned {result} ({tag:?})", root.id());

        Ok(Decision {
            actions: result,
            tag: tag.map(str::to_string),
        })
    }

    /// Bits produced by a predicate or constant node.
    fn leaf<'n>(
        &self,
        node: &'n FilterNode,
        target: Option<&mut Target>,
        renames: &mut Vec<(u32, &'n str)>,
    ) -> Result<Actions, FilterError> {
        let mismatch = |found: &'static str| FilterError::TypeMismatch {
            op: node.op(),
            found,
        };
        let found = |target: &Option<&mut Target>| target.as_ref().map_or("absent", |t| t.kind());

        let matched = match node.kind() {
            NodeKind::True => true,
            NodeKind::False => false,
            NodeKind::Return(action) => return Ok(*action),
            NodeKind::Compare { cmp, value } => match target {
                Some(Target::Integer { value: v, signed: true }) => {
                    cmp.apply(*v as i64, *value as i64)
                }
                Some(Target::Integer { value: v, signed: false }) => cmp.apply(*v, *value),
                other => return Err(mismatch(found(&other))),
            },
            NodeKind::Mask { value, mask } => match target {
                Some(Target::Integer { value: v, .. }) => *v & *mask == *value,
                other => return Err(mismatch(found(&other))),
            },
            NodeKind::Streq(expected) => match target.as_deref().and_then(Target::as_str) {
                Some(s) => s == expected.as_str(),
                None => return Err(mismatch(found(&target))),
            },
            NodeKind::Prefix(entry) => match target {
                Some(Target::Path {
                    name,
                    lookup,
                    origin,
                }) => {
                    let candidate_object = lookup.as_ref().map(|lookup| lookup.object);
                    match self
                        .fileset
                        .matches(entry, name, candidate_object, self.resolver.fs)
                    {
                        PathMatch::None => false,
                        PathMatch::Name => true,
                        PathMatch::HardLink => {
                            log::trace!("{name} is a hard link of {}", entry.name());
                            name.clear();
                            name.push_str(entry.name());
                            if let Some(position) = origin {
                                renames.push((*position, entry.name()));
                            }
                            true
                        }
                    }
                }
                other => return Err(mismatch(found(&other))),
            },
            NodeKind::And { .. } | NodeKind::Or { .. } | NodeKind::Not { .. } | NodeKind::Apply { .. } => {
                return Err(mismatch("combinator"));
            }
        };

        Ok(if matched { Actions::LOG } else { Actions::NONE })
    }
}

fn push<'n>(
    frames: &mut SmallVec<[Frame<'n>; INLINE_FRAMES]>,
    node: &'n FilterNode,
    target: Option<usize>,
    tag: Option<&'n str>,
) -> Result<(), FilterError> {
    frames
        .try_reserve(1)
        .map_err(|_| FilterError::OutOfMemory)?;
    frames.push(Frame {
        node,
        target,
        tag,
        on_right: false,
    });
    Ok(())
}

fn truncate_tag(tag: &str) -> &str {
    let mut end = tag.len().min(MAX_TAG_LEN);
    while !tag.is_char_boundary(end) {
        end -= 1;
    }
    &tag[..end]
}

fn rename_argument(event: &mut EventContext, position: u32, canonical: &str) {
    let arg = event
        .call
        .as_mut()
        .and_then(|call| call.args.get_mut(position as usize));
    if let Some(CapturedArg::Path { name, .. }) = arg {
        *name = canonical.to_string();
    }
}
