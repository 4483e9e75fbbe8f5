//! Object encoder.
//!
//! Encoding happens in two passes over a transient arena:
//!
//! 1. Every value is interned bottom-up. Scalars are keyed by their encoded
//!    bytes and containers by their kind plus child ids, so structurally
//!    equal subtrees collapse into one stored object.
//! 2. Unique objects are numbered in depth-first discovery order from the
//!    root (the root is object 0) and written out, followed by the offset
//!    table and trailer.

use super::{width_for, write_uint, Trailer, HEADER};
use crate::value::{date_to_mac_seconds, Uid, Value};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

const UNNUMBERED: usize = usize::MAX;

/// A unique object in the arena
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    /// Fully encoded scalar object
    Scalar(Vec<u8>),
    Array(Vec<usize>),
    Set(Vec<usize>),
    Dictionary(Vec<usize>, Vec<usize>),
}

impl Node {
    fn children(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        let (first, second): (&[usize], &[usize]) = match self {
            Node::Scalar(_) => (&[], &[]),
            Node::Array(refs) | Node::Set(refs) => (refs, &[]),
            Node::Dictionary(keys, values) => (keys, values),
        };
        first.iter().chain(second).copied()
    }
}

/// Encoder for one value graph.
///
/// A writer is consumed by [`Writer::encode`]; its unique-object table does
/// not outlive the call.
///
/// The encoder puts no bound on nesting. Output nested deeper than
/// [`DEFAULT_MAX_DEPTH`](super::DEFAULT_MAX_DEPTH) levels is only readable
/// with a raised [`DecoderConfig::max_depth`](super::DecoderConfig::max_depth).
#[derive(Debug, Default)]
pub struct Writer {
    nodes: Vec<Node>,
    index: HashMap<Node, usize>,
}

impl Writer {
    /// Creates an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `root` as a complete binary property list
    pub fn encode(mut self, root: &Value) -> Vec<u8> {
        let root = self.intern(root);
        self.finish(root)
    }

    /// Returns the arena id of `value`, adding it and its children if new
    fn intern(&mut self, value: &Value) -> usize {
        let node = match value {
            Value::Array(items) => Node::Array(items.iter().map(|v| self.intern(v)).collect()),
            Value::Set(set) => {
                let mut refs = Vec::with_capacity(set.len());
                let mut seen = HashSet::with_capacity(set.len());
                for item in set {
                    let id = self.intern(item);
                    // NaN members share one encoding
                    if seen.insert(id) {
                        refs.push(id);
                    }
                }
                Node::Set(refs)
            }
            Value::Dictionary(dict) => {
                let (keys, values) = dict
                    .iter()
                    .map(|(k, v)| (self.intern(k), self.intern(v)))
                    .unzip();
                Node::Dictionary(keys, values)
            }
            Value::Null => Node::Scalar(vec![0x0F]),
            Value::Boolean(false) => Node::Scalar(vec![0x08]),
            Value::Boolean(true) => Node::Scalar(vec![0x09]),
            Value::Integer(i) => Node::Scalar(encode_integer(*i)),
            Value::Real(r) => Node::Scalar(encode_real(*r)),
            Value::Date(date) => Node::Scalar(encode_date(date)),
            Value::Data(bytes) => Node::Scalar(encode_data(bytes)),
            Value::String(s) => Node::Scalar(encode_string(s)),
            Value::Uid(uid) => Node::Scalar(encode_uid(*uid)),
        };

        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let id = self.nodes.len();
        self.index.insert(node.clone(), id);
        self.nodes.push(node);
        id
    }

    fn finish(self, root: usize) -> Vec<u8> {
        // arena id -> object number, in depth-first discovery order
        let mut numbers = vec![UNNUMBERED; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if numbers[id] != UNNUMBERED {
                continue;
            }
            numbers[id] = order.len();
            order.push(id);
            stack.extend(self.nodes[id].children().rev());
        }

        let count = order.len();
        let ref_size = width_for(count.saturating_sub(1) as u64);

        let mut out = HEADER.to_vec();
        let mut offsets = Vec::with_capacity(count);
        for &id in &order {
            offsets.push(out.len() as u64);
            match &self.nodes[id] {
                Node::Scalar(bytes) => out.extend_from_slice(bytes),
                Node::Array(refs) => {
                    write_marker(&mut out, 0xA0, refs.len());
                    write_refs(&mut out, refs, &numbers, ref_size);
                }
                Node::Set(refs) => {
                    write_marker(&mut out, 0xC0, refs.len());
                    write_refs(&mut out, refs, &numbers, ref_size);
                }
                Node::Dictionary(keys, values) => {
                    write_marker(&mut out, 0xD0, keys.len());
                    write_refs(&mut out, keys, &numbers, ref_size);
                    write_refs(&mut out, values, &numbers, ref_size);
                }
            }
            trace!("Wrote object {} at offset {}", numbers[id], offsets[numbers[id]]);
        }

        // Offsets only depend on the reference width, which only depends on
        // the highest object number, so the offset width is final here.
        let offset_size = width_for(offsets.last().copied().unwrap_or(0));
        let offset_table_offset = out.len() as u64;
        for &offset in &offsets {
            write_uint(&mut out, offset, offset_size);
        }

        let trailer = Trailer {
            offset_size: offset_size as u8,
            object_ref_size: ref_size as u8,
            offset_count: count as u64,
            top_object: 0,
            offset_table_offset,
        };
        trailer.write(&mut out);

        debug!(
            "Encoded {} unique objects into {} bytes (offset size {}, reference size {})",
            count,
            out.len(),
            offset_size,
            ref_size
        );
        out
    }
}

fn write_refs(out: &mut Vec<u8>, refs: &[usize], numbers: &[usize], width: usize) {
    for &id in refs {
        write_uint(out, numbers[id] as u64, width);
    }
}

/// Writes a marker with an inline size, or an escape followed by the size
fn write_marker(out: &mut Vec<u8>, kind: u8, len: usize) {
    if len < 0x0F {
        out.push(kind | len as u8);
    } else {
        out.push(kind | 0x0F);
        write_unsigned(out, len as u64);
    }
}

/// Writes a non-negative integer object in its narrowest width
fn write_unsigned(out: &mut Vec<u8>, value: u64) {
    let width = width_for(value);
    out.push(0x10 | width.trailing_zeros() as u8);
    write_uint(out, value, width);
}

fn encode_integer(value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    match u64::try_from(value) {
        Ok(unsigned) if unsigned <= u64::from(u32::MAX) => write_unsigned(&mut out, unsigned),
        // negative and large values take the signed 8-byte slot
        _ => {
            out.push(0x13);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
    out
}

/// Uses a 32-bit real when the value survives the round trip exactly
fn encode_real(value: f64) -> Vec<u8> {
    let single = value as f32;
    let mut out = Vec::with_capacity(9);
    if f64::from(single) == value {
        out.push(0x22);
        out.extend_from_slice(&single.to_be_bytes());
    } else {
        out.push(0x23);
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

fn encode_date(date: &DateTime<Utc>) -> Vec<u8> {
    let mut out = vec![0x33];
    out.extend_from_slice(&date_to_mac_seconds(date).to_be_bytes());
    out
}

fn encode_data(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 9);
    write_marker(&mut out, 0x40, bytes.len());
    out.extend_from_slice(bytes);
    out
}

fn encode_string(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2 + 9);
    if s.is_ascii() {
        write_marker(&mut out, 0x50, s.len());
        out.extend_from_slice(s.as_bytes());
    } else {
        let units: Vec<u16> = s.encode_utf16().collect();
        write_marker(&mut out, 0x60, units.len());
        for unit in units {
            out.extend_from_slice(&unit.to_be_bytes());
        }
    }
    out
}

fn encode_uid(uid: Uid) -> Vec<u8> {
    let width = width_for(uid.get());
    let mut out = vec![0x80 | (width - 1) as u8];
    write_uint(&mut out, uid.get(), width);
    out
}
