//! Management-side description of a filter node.
//!
//! A [FilterDefinition] is what user-space tooling hands to the store to
//! create a node, and what introspection hands back. Children are referenced
//! by id and must already exist when the definition is submitted.

use std::fmt;

use serde::{Deserialize, Serialize};
use vigil_core::Actions;

use crate::{FilterError, target::TargetCode};

/// Maximum length in bytes of a node tag.
pub const MAX_TAG_LEN: usize = 16;

/// Closed set of filter operators with their 16-bit wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Op {
    And = 1,
    Or = 2,
    Not = 3,
    Apply = 4,
    Return = 5,
    True = 6,
    False = 7,
    Eq = 8,
    Ne = 9,
    Lt = 10,
    Le = 11,
    Gt = 12,
    Ge = 13,
    Mask = 14,
    Streq = 15,
    Prefix = 16,
}

impl Op {
    const ALL: [Op; 16] = [
        Op::And,
        Op::Or,
        Op::Not,
        Op::Apply,
        Op::Return,
        Op::True,
        Op::False,
        Op::Eq,
        Op::Ne,
        Op::Lt,
        Op::Le,
        Op::Gt,
        Op::Ge,
        Op::Mask,
        Op::Streq,
        Op::Prefix,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::Apply => "APPLY",
            Op::Return => "RETURN",
            Op::True => "TRUE",
            Op::False => "FALSE",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Le => "LE",
            Op::Gt => "GT",
            Op::Ge => "GE",
            Op::Mask => "MASK",
            Op::Streq => "STREQ",
            Op::Prefix => "PREFIX",
        }
    }
}

impl TryFrom<u16> for Op {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Op::ALL.into_iter().find(|op| op.code() == code).ok_or(code)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Relational operators applied to integer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn apply<T: PartialEq + PartialOrd>(&self, first: T, second: T) -> bool {
        match self {
            Comparison::Eq => first == second,
            Comparison::Ne => first != second,
            Comparison::Lt => first < second,
            Comparison::Le => first <= second,
            Comparison::Gt => first > second,
            Comparison::Ge => first >= second,
        }
    }

    pub fn op(self) -> Op {
        match self {
            Comparison::Eq => Op::Eq,
            Comparison::Ne => Op::Ne,
            Comparison::Lt => Op::Lt,
            Comparison::Le => Op::Le,
            Comparison::Gt => Op::Gt,
            Comparison::Ge => Op::Ge,
        }
    }
}

/// A 64-bit literal. It's stored as raw bits and interpreted as signed or
/// unsigned depending on the target it's compared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LiteralRepr", into = "u64")]
pub struct Literal(pub u64);

impl Literal {
    pub fn signed(value: i64) -> Self {
        Self(value as u64)
    }
}

impl From<Literal> for u64 {
    fn from(literal: Literal) -> Self {
        literal.0
    }
}

impl From<u64> for Literal {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LiteralRepr {
    Unsigned(u64),
    Signed(i64),
}

impl From<LiteralRepr> for Literal {
    fn from(repr: LiteralRepr) -> Self {
        match repr {
            LiteralRepr::Unsigned(value) => Literal(value),
            LiteralRepr::Signed(value) => Literal::signed(value),
        }
    }
}

/// Operator together with its operator-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FilterBody {
    And { left: u16, right: u16 },
    Or { left: u16, right: u16 },
    Not { inner: u16 },
    Apply { target: TargetCode, predicate: u16 },
    Return { action: Actions },
    True,
    False,
    Eq { value: Literal },
    Ne { value: Literal },
    Lt { value: Literal },
    Le { value: Literal },
    Gt { value: Literal },
    Ge { value: Literal },
    Mask { value: Literal, mask: Literal },
    Streq { value: String },
    Prefix { path: String },
}

impl FilterBody {
    pub fn op(&self) -> Op {
        match self {
            FilterBody::And { .. } => Op::And,
            FilterBody::Or { .. } => Op::Or,
            FilterBody::Not { .. } => Op::Not,
            FilterBody::Apply { .. } => Op::Apply,
            FilterBody::Return { .. } => Op::Return,
            FilterBody::True => Op::True,
            FilterBody::False => Op::False,
            FilterBody::Eq { .. } => Op::Eq,
            FilterBody::Ne { .. } => Op::Ne,
            FilterBody::Lt { .. } => Op::Lt,
            FilterBody::Le { .. } => Op::Le,
            FilterBody::Gt { .. } => Op::Gt,
            FilterBody::Ge { .. } => Op::Ge,
            FilterBody::Mask { .. } => Op::Mask,
            FilterBody::Streq { .. } => Op::Streq,
            FilterBody::Prefix { .. } => Op::Prefix,
        }
    }

    pub(crate) fn comparison(cmp: Comparison, value: Literal) -> Self {
        match cmp {
            Comparison::Eq => FilterBody::Eq { value },
            Comparison::Ne => FilterBody::Ne { value },
            Comparison::Lt => FilterBody::Lt { value },
            Comparison::Le => FilterBody::Le { value },
            Comparison::Gt => FilterBody::Gt { value },
            Comparison::Ge => FilterBody::Ge { value },
        }
    }
}

impl fmt::Display for FilterBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterBody::And { left, right } | FilterBody::Or { left, right } => {
                write!(f, "{} {left} {right}", self.op())
            }
            FilterBody::Not { inner } => write!(f, "NOT {inner}"),
            FilterBody::Apply { target, predicate } => write!(f, "APPLY {target} {predicate}"),
            FilterBody::Return { action } => write!(f, "RETURN {action}"),
            FilterBody::True | FilterBody::False => write!(f, "{}", self.op()),
            FilterBody::Eq { value }
            | FilterBody::Ne { value }
            | FilterBody::Lt { value }
            | FilterBody::Le { value }
            | FilterBody::Gt { value }
            | FilterBody::Ge { value } => write!(f, "{} {:#x}", self.op(), value.0),
            FilterBody::Mask { value, mask } => write!(f, "MASK {:#x}/{:#x}", value.0, mask.0),
            FilterBody::Streq { value } => write!(f, "STREQ {value:?}"),
            FilterBody::Prefix { path } => write!(f, "PREFIX {path:?}"),
        }
    }
}

/// Definition of a filter node as submitted by the management surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(flatten)]
    pub body: FilterBody,
}

impl FilterDefinition {
    pub fn new(id: u16, body: FilterBody) -> Self {
        Self { id, tag: None, body }
    }

    pub fn tagged(id: u16, tag: impl Into<String>, body: FilterBody) -> Self {
        Self {
            id,
            tag: Some(tag.into()),
            body,
        }
    }

    pub fn op(&self) -> Op {
        self.body.op()
    }

    /// Checks constraints which don't depend on the store content.
    pub(crate) fn validate(&self) -> Result<(), FilterError> {
        if self.id == 0 {
            return Err(FilterError::InvalidDefinition(
                "filter id 0 is reserved".to_string(),
            ));
        }
        if let Some(tag) = &self.tag {
            if tag.len() > MAX_TAG_LEN {
                return Err(FilterError::InvalidDefinition(format!(
                    "tag '{tag}' longer than {MAX_TAG_LEN} bytes"
                )));
            }
        }
        if let FilterBody::Prefix { path } = &self.body {
            if path.is_empty() {
                return Err(FilterError::InvalidDefinition(
                    "empty PREFIX path".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FilterDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.body)?;
        if let Some(tag) = &self.tag {
            write!(f, " [{tag}]")?;
        }
        Ok(())
    }
}
