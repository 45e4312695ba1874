//! Binary records of the management surface.
//!
//! Both records are little-endian and fixed-size, except for the trailing
//! string data of `STREQ` and `PREFIX` definitions which the union points to
//! through a [BufferIndex].
//!
//! ```text
//! filter definition          policy set
//! 0   id        u16          0  class   u16
//! 2   op        u16          2  pad     u16
//! 4   tag       [u8; 16]     4  action  u32
//! 20  union     [u8; 16]     8  filter  u16 (0 = none)
//! 36  string data            10 pad     u16
//! ```

use std::{
    marker::PhantomData,
    str::{Utf8Error, from_utf8},
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use vigil_core::{Actions, EventClass};

use crate::{
    FilterError,
    definition::{FilterBody, FilterDefinition, Literal, MAX_TAG_LEN, Op},
    policy::PolicySet,
    target::TargetCode,
};

pub const FILTER_HEADER_LEN: usize = 2 + 2 + MAX_TAG_LEN + UNION_LEN;
pub const POLICY_SET_LEN: usize = 12;
const UNION_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {len} bytes, expected at least {needed}")]
    Truncated { needed: usize, len: usize },
    #[error("unknown operator {0}")]
    UnknownOp(u16),
    #[error("event class {0} is outside the policy table")]
    UnknownClass(u16),
    #[error("index [{start}-{end}] is out of string data (len {len})")]
    IndexOutsideBuffer { start: usize, end: usize, len: usize },
    #[error("not a valid string {bytes:?}")]
    NotAString {
        #[source]
        error: Utf8Error,
        bytes: Vec<u8>,
    },
}

/// Points to a sub-slice of the string data trailing a record.
#[derive(Debug)]
pub struct BufferIndex<T: ?Sized> {
    start: u16,
    len: u16,
    _data: PhantomData<T>,
}

impl<T: ?Sized> BufferIndex<T> {
    pub fn new(start: u16, len: u16) -> Self {
        Self {
            start,
            len,
            _data: PhantomData,
        }
    }

    pub fn bytes<'a>(&self, buffer: &'a Bytes) -> Result<&'a [u8], DecodeError> {
        let start = self.start as usize;
        let end = start + self.len as usize;
        if end <= buffer.len() {
            Ok(&buffer[start..end])
        } else {
            Err(DecodeError::IndexOutsideBuffer {
                start,
                end,
                len: buffer.len(),
            })
        }
    }
}

impl BufferIndex<str> {
    pub fn string(&self, buffer: &Bytes) -> Result<String, DecodeError> {
        let bytes = self.bytes(buffer)?;
        let s = from_utf8(bytes).map_err(|error| DecodeError::NotAString {
            error,
            bytes: bytes.to_vec(),
        })?;
        Ok(s.to_string())
    }
}

fn ensure_len(buf: &[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.len() < needed {
        Err(DecodeError::Truncated {
            needed,
            len: buf.len(),
        })
    } else {
        Ok(())
    }
}

/// Parse a filter definition record. Payload validation is left to the store.
pub fn decode_filter(record: &[u8]) -> Result<FilterDefinition, DecodeError> {
    ensure_len(record, FILTER_HEADER_LEN)?;
    let mut buf = Bytes::copy_from_slice(record);

    let id = buf.get_u16_le();
    let op_code = buf.get_u16_le();
    let op = Op::try_from(op_code).map_err(DecodeError::UnknownOp)?;

    let raw_tag = buf.copy_to_bytes(MAX_TAG_LEN);
    let tag_len = raw_tag.iter().position(|b| *b == 0).unwrap_or(MAX_TAG_LEN);
    let tag = match tag_len {
        0 => None,
        len => Some(BufferIndex::<str>::new(0, len as u16).string(&raw_tag)?),
    };

    let mut union = buf.copy_to_bytes(UNION_LEN);
    // what is left is the string data
    let data = buf;

    let body = match op {
        Op::And | Op::Or | Op::Not => {
            let left = union.get_u16_le();
            let right = union.get_u16_le();
            match op {
                Op::And => FilterBody::And { left, right },
                Op::Or => FilterBody::Or { left, right },
                _ => FilterBody::Not { inner: left },
            }
        }
        Op::Apply => FilterBody::Apply {
            target: TargetCode(union.get_u16_le().into()),
            predicate: union.get_u16_le(),
        },
        Op::Return => FilterBody::Return {
            action: Actions::from_bits(union.get_u32_le()),
        },
        Op::True => FilterBody::True,
        Op::False => FilterBody::False,
        Op::Eq => FilterBody::Eq { value: Literal(union.get_u64_le()) },
        Op::Ne => FilterBody::Ne { value: Literal(union.get_u64_le()) },
        Op::Lt => FilterBody::Lt { value: Literal(union.get_u64_le()) },
        Op::Le => FilterBody::Le { value: Literal(union.get_u64_le()) },
        Op::Gt => FilterBody::Gt { value: Literal(union.get_u64_le()) },
        Op::Ge => FilterBody::Ge { value: Literal(union.get_u64_le()) },
        Op::Mask => FilterBody::Mask {
            value: Literal(union.get_u64_le()),
            mask: Literal(union.get_u64_le()),
        },
        Op::Streq | Op::Prefix => {
            let index = BufferIndex::<str>::new(union.get_u16_le(), union.get_u16_le());
            let value = index.string(&data)?;
            if op == Op::Streq {
                FilterBody::Streq { value }
            } else {
                FilterBody::Prefix { path: value }
            }
        }
    };

    Ok(FilterDefinition { id, tag, body })
}

/// Build the record `decode_filter` accepts.
pub fn encode_filter(definition: &FilterDefinition) -> Result<Bytes, FilterError> {
    definition.validate()?;

    let mut buf = BytesMut::with_capacity(FILTER_HEADER_LEN);
    buf.put_u16_le(definition.id);
    buf.put_u16_le(definition.op().code());

    let tag = definition.tag.as_deref().unwrap_or_default().as_bytes();
    buf.put_slice(tag);
    buf.put_bytes(0, MAX_TAG_LEN - tag.len());

    let mut union = BytesMut::with_capacity(UNION_LEN);
    let mut data: &[u8] = &[];
    match &definition.body {
        FilterBody::And { left, right } | FilterBody::Or { left, right } => {
            union.put_u16_le(*left);
            union.put_u16_le(*right);
        }
        FilterBody::Not { inner } => union.put_u16_le(*inner),
        FilterBody::Apply { target, predicate } => {
            let code = u16::try_from(target.0).map_err(|_| FilterError::InvalidTarget(target.0))?;
            union.put_u16_le(code);
            union.put_u16_le(*predicate);
        }
        FilterBody::Return { action } => union.put_u32_le(action.bits()),
        FilterBody::True | FilterBody::False => {}
        FilterBody::Eq { value }
        | FilterBody::Ne { value }
        | FilterBody::Lt { value }
        | FilterBody::Le { value }
        | FilterBody::Gt { value }
        | FilterBody::Ge { value } => union.put_u64_le(value.0),
        FilterBody::Mask { value, mask } => {
            union.put_u64_le(value.0);
            union.put_u64_le(mask.0);
        }
        FilterBody::Streq { value: s } | FilterBody::Prefix { path: s } => {
            let len = u16::try_from(s.len()).map_err(|_| {
                FilterError::InvalidDefinition(format!("string of {} bytes too long", s.len()))
            })?;
            union.put_u16_le(0);
            union.put_u16_le(len);
            data = s.as_bytes();
        }
    }
    buf.put_slice(&union);
    buf.put_bytes(0, UNION_LEN - union.len());
    buf.put_slice(data);

    Ok(buf.freeze())
}

pub fn decode_policy_set(record: &[u8]) -> Result<PolicySet, DecodeError> {
    ensure_len(record, POLICY_SET_LEN)?;
    let mut buf = record;

    let code = buf.get_u16_le();
    let class = EventClass::new(code).map_err(|_| DecodeError::UnknownClass(code))?;
    buf.advance(2);
    let action = Actions::from_bits(buf.get_u32_le());
    let filter = match buf.get_u16_le() {
        0 => None,
        id => Some(id),
    };

    Ok(PolicySet {
        class,
        action,
        filter,
    })
}

pub fn encode_policy_set(set: &PolicySet) -> Bytes {
    let mut buf = BytesMut::with_capacity(POLICY_SET_LEN);
    buf.put_u16_le(set.class.code());
    buf.put_u16_le(0);
    buf.put_u32_le(set.action.bits());
    buf.put_u16_le(set.filter.unwrap_or(0));
    buf.put_u16_le(0);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::codes;

    #[test]
    fn filter_record_layout() {
        let def = FilterDefinition::tagged(
            7,
            "creat",
            FilterBody::Apply {
                target: TargetCode(codes::CALL_MINOR),
                predicate: 3,
            },
        );
        let record = encode_filter(&def).unwrap();

        assert_eq!(record.len(), FILTER_HEADER_LEN);
        assert_eq!(&record[0..4], &[7, 0, 4, 0]);
        assert_eq!(&record[4..9], b"creat");
        assert!(record[9..20].iter().all(|b| *b == 0));
        assert_eq!(&record[20..24], &[0xff, 0x1f, 3, 0]);
        assert_eq!(decode_filter(&record), Ok(def));
    }

    #[test]
    fn string_payload() {
        let def = FilterDefinition::new(
            2,
            FilterBody::Prefix {
                path: "/etc/ssh".to_string(),
            },
        );
        let record = encode_filter(&def).unwrap();
        assert_eq!(&record[FILTER_HEADER_LEN..], b"/etc/ssh");
        assert_eq!(decode_filter(&record), Ok(def));
    }

    #[test]
    fn full_length_tag() {
        let def = FilterDefinition::tagged(3, "sixteen-bytes-ok", FilterBody::True);
        let record = encode_filter(&def).unwrap();
        assert_eq!(decode_filter(&record).unwrap().tag.as_deref(), Some("sixteen-bytes-ok"));
    }

    #[test]
    fn malformed_records() {
        assert_eq!(
            decode_filter(&[1, 0, 6, 0]),
            Err(DecodeError::Truncated {
                needed: FILTER_HEADER_LEN,
                len: 4
            })
        );

        let mut record = encode_filter(&FilterDefinition::new(1, FilterBody::True))
            .unwrap()
            .to_vec();
        record[2] = 99;
        assert_eq!(decode_filter(&record), Err(DecodeError::UnknownOp(99)));

        let mut record = encode_filter(&FilterDefinition::new(
            1,
            FilterBody::Streq {
                value: "abc".to_string(),
            },
        ))
        .unwrap()
        .to_vec();
        record.truncate(FILTER_HEADER_LEN + 2);
        assert!(matches!(
            decode_filter(&record),
            Err(DecodeError::IndexOutsideBuffer { start: 0, end: 3, len: 2 })
        ));

        let last = record.len() - 1;
        record[last] = 0xff;
        record.push(b'c');
        assert!(matches!(
            decode_filter(&record),
            Err(DecodeError::NotAString { .. })
        ));
    }

    #[test]
    fn policy_set_record() {
        let set = PolicySet {
            class: "open".parse().unwrap(),
            action: Actions::LOG,
            filter: Some(12),
        };
        let record = encode_policy_set(&set);
        assert_eq!(&record[..], &[2, 0, 0, 0, 1, 0, 0, 0, 12, 0, 0, 0]);
        assert_eq!(decode_policy_set(&record), Ok(set));

        let none = [3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode_policy_set(&none).unwrap().filter, None);
        assert_eq!(
            decode_policy_set(&[0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnknownClass(1024))
        );
    }
}
