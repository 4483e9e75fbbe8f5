//! Object decoder.
//!
//! A [`Reader`] is built once per buffer. It parses the trailer and offset
//! table up front and then resolves object numbers on demand, re-entering
//! the decoder for every reference held by a container.

use super::{read_uint, Marker, Size, Trailer};
use crate::error::{Error, Result};
use crate::value::{date_from_mac_seconds, Dictionary, Set, Uid, Value};
use tracing::{debug, trace};

/// Default maximum container nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default maximum number of elements (or pairs) in one container
pub const DEFAULT_MAX_CONTAINER_LEN: usize = 1 << 24;

/// Default maximum number of container slots expanded by one decode
pub const DEFAULT_MAX_TOTAL_ITEMS: usize = 1 << 24;

/// Resource limits applied while decoding
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum container nesting depth
    pub max_depth: usize,
    /// Maximum elements in an array or set, or pairs in a dictionary
    pub max_container_len: usize,
    /// Maximum container slots expanded across the whole decode.
    ///
    /// Shared objects are expanded once per reference, so a small file can
    /// describe a very large tree. This bounds that fan-out.
    pub max_total_items: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_container_len: DEFAULT_MAX_CONTAINER_LEN,
            max_total_items: DEFAULT_MAX_TOTAL_ITEMS,
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the maximum container length
    pub fn max_container_len(mut self, len: usize) -> Self {
        self.max_container_len = len;
        self
    }

    /// Sets the maximum number of expanded container slots
    pub fn max_total_items(mut self, items: usize) -> Self {
        self.max_total_items = items;
        self
    }
}

/// Bounds-checked view over the object area
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let remaining = self.data.len().saturating_sub(self.pos);
        if len > remaining {
            return Err(Error::invalid(
                self.pos,
                format!("truncated object: need {} bytes, {} remain", len, remaining),
            ));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Per-call traversal state
struct Walk {
    /// Objects currently being decoded, indexed by object number
    active: Vec<bool>,
    depth: usize,
    items: usize,
}

/// Decoder for one binary property list buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    /// Header and object bodies, up to the offset table
    objects: &'a [u8],
    trailer: Trailer,
    offsets: Vec<u64>,
    config: DecoderConfig,
}

impl<'a> Reader<'a> {
    /// Creates a reader with default limits
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Self::with_config(data, DecoderConfig::default())
    }

    /// Creates a reader with custom limits
    pub fn with_config(data: &'a [u8], config: DecoderConfig) -> Result<Self> {
        let trailer = Trailer::parse(data)?;
        let offsets = trailer.read_offsets(data)?;

        debug!(
            "Parsed trailer: {} objects, offset size {}, reference size {}, top object {}",
            trailer.offset_count, trailer.offset_size, trailer.object_ref_size, trailer.top_object
        );

        // read_offsets guarantees the table lies inside `data`
        let objects = &data[..trailer.offset_table_offset as usize];

        Ok(Self {
            objects,
            trailer,
            offsets,
            config,
        })
    }

    /// Returns the parsed trailer
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    /// Returns the offset table
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Decodes the root object
    pub fn read_root(&self) -> Result<Value> {
        self.read_object(self.trailer.top_object)
    }

    /// Decodes the object with the given object number, with its children
    pub fn read_object(&self, number: u64) -> Result<Value> {
        let mut walk = Walk {
            active: vec![false; self.offsets.len()],
            depth: 0,
            items: 0,
        };
        self.resolve(number, self.objects.len(), &mut walk)
    }

    /// Decodes the object a reference points to.
    ///
    /// `referenced_at` is the byte offset of the reference, for diagnostics.
    fn resolve(&self, number: u64, referenced_at: usize, walk: &mut Walk) -> Result<Value> {
        let index = usize::try_from(number)
            .ok()
            .filter(|&index| index < self.offsets.len())
            .ok_or_else(|| {
                Error::invalid(
                    referenced_at,
                    format!(
                        "reference to object {} outside the offset table ({} entries)",
                        number,
                        self.offsets.len()
                    ),
                )
            })?;

        if walk.active[index] {
            return Err(Error::invalid(
                referenced_at,
                format!("reference cycle through object {}", number),
            ));
        }
        if walk.depth >= self.config.max_depth {
            return Err(Error::invalid(
                referenced_at,
                format!("nesting deeper than {} levels", self.config.max_depth),
            ));
        }

        walk.active[index] = true;
        walk.depth += 1;
        let result = self.decode_at(self.offsets[index] as usize, walk);
        walk.depth -= 1;
        walk.active[index] = false;
        result
    }

    /// Decodes exactly one object starting at `offset`
    fn decode_at(&self, offset: usize, walk: &mut Walk) -> Result<Value> {
        let mut cursor = Cursor::new(self.objects, offset);
        let marker = Marker::parse(cursor.byte()?, offset)?;
        trace!("Decoding {:?} at offset {}", marker, offset);

        let value = match marker {
            Marker::Fill => Value::Null,
            Marker::False => Value::Boolean(false),
            Marker::True => Value::Boolean(true),
            Marker::Integer(size) => {
                let exponent = read_size(&mut cursor, size)?;
                Value::Integer(read_integer(&mut cursor, exponent, offset)?)
            }
            Marker::Real(size) => {
                let exponent = read_size(&mut cursor, size)?;
                Value::Real(read_real(&mut cursor, exponent, offset)?)
            }
            Marker::Date => {
                let bytes = cursor.take(8)?;
                let seconds = f64::from_bits(read_uint(bytes));
                let date = date_from_mac_seconds(seconds).ok_or_else(|| {
                    Error::invalid(offset, format!("date {} is out of range", seconds))
                })?;
                Value::Date(date)
            }
            Marker::Data(size) => {
                let len = read_len(&mut cursor, size, offset)?;
                Value::Data(cursor.take(len)?.to_vec())
            }
            Marker::AsciiString(size) => {
                let len = read_len(&mut cursor, size, offset)?;
                Value::String(decode_ascii(cursor.take(len)?))
            }
            Marker::Utf16String(size) => {
                let units = read_len(&mut cursor, size, offset)?;
                let byte_len = units.checked_mul(2).ok_or_else(|| {
                    Error::invalid(offset, format!("string length {} overflows", units))
                })?;
                Value::String(decode_utf16(cursor.take(byte_len)?, offset)?)
            }
            Marker::Uid(extra) => {
                let width = usize::from(extra) + 1;
                if width > 8 {
                    return Err(Error::invalid(
                        offset,
                        format!("unsupported uid width of {} bytes", width),
                    ));
                }
                Value::Uid(Uid::new(read_uint(cursor.take(width)?)))
            }
            Marker::Array(size) => {
                let refs = self.read_refs(&mut cursor, size, 1, offset, walk)?;
                let mut elements = Vec::with_capacity(refs.len());
                for (at, number) in refs {
                    elements.push(self.resolve(number, at, walk)?);
                }
                Value::Array(elements)
            }
            Marker::Set(size) => {
                let refs = self.read_refs(&mut cursor, size, 1, offset, walk)?;
                let mut set = Set::new();
                for (at, number) in refs {
                    set.insert(self.resolve(number, at, walk)?);
                }
                Value::Set(set)
            }
            Marker::Dictionary(size) => {
                let refs = self.read_refs(&mut cursor, size, 2, offset, walk)?;
                let (keys, values) = refs.split_at(refs.len() / 2);
                let mut dict = Dictionary::new();
                for (&(key_at, key), &(value_at, value)) in keys.iter().zip(values) {
                    let key = self.resolve(key, key_at, walk)?;
                    let value = self.resolve(value, value_at, walk)?;
                    dict.insert(key, value);
                }
                Value::Dictionary(dict)
            }
        };

        Ok(value)
    }

    /// Reads a container body of `count * per_entry` object references.
    ///
    /// Returns each reference with the byte offset it was read from.
    fn read_refs(
        &self,
        cursor: &mut Cursor<'_>,
        size: Size,
        per_entry: usize,
        offset: usize,
        walk: &mut Walk,
    ) -> Result<Vec<(usize, u64)>> {
        let count = read_len(cursor, size, offset)?;
        if count > self.config.max_container_len {
            return Err(Error::invalid(
                offset,
                format!(
                    "container of {} entries exceeds the limit of {}",
                    count, self.config.max_container_len
                ),
            ));
        }

        let slots = count.saturating_mul(per_entry);
        walk.items = walk.items.saturating_add(slots);
        if walk.items > self.config.max_total_items {
            return Err(Error::invalid(
                offset,
                format!(
                    "decoded more than {} container entries",
                    self.config.max_total_items
                ),
            ));
        }

        let width = usize::from(self.trailer.object_ref_size);
        let start = cursor.pos;
        let body = cursor.take(slots.saturating_mul(width))?;
        Ok(body
            .chunks_exact(width)
            .enumerate()
            .map(|(i, chunk)| (start + i * width, read_uint(chunk)))
            .collect())
    }
}

/// Resolves a marker size, following an escaped size to its integer object.
///
/// The escaped size must be a plain integer; a second escape is rejected so
/// size reads never recurse.
fn read_size(cursor: &mut Cursor<'_>, size: Size) -> Result<u64> {
    match size {
        Size::Inline(n) => Ok(u64::from(n)),
        Size::Escaped => {
            let at = cursor.pos;
            match Marker::parse(cursor.byte()?, at)? {
                Marker::Integer(Size::Inline(exponent)) => {
                    let value = read_integer(cursor, u64::from(exponent), at)?;
                    u64::try_from(value)
                        .map_err(|_| Error::invalid(at, format!("negative size {}", value)))
                }
                other => Err(Error::invalid(
                    at,
                    format!("expected an integer size, found {:?}", other),
                )),
            }
        }
    }
}

/// Like [`read_size`], converted to a length
fn read_len(cursor: &mut Cursor<'_>, size: Size, offset: usize) -> Result<usize> {
    let len = read_size(cursor, size)?;
    usize::try_from(len).map_err(|_| Error::invalid(offset, format!("length {} is too large", len)))
}

/// Reads an integer of `1 << exponent` bytes.
///
/// 1, 2 and 4 byte integers are unsigned; 8 byte integers are signed.
fn read_integer(cursor: &mut Cursor<'_>, exponent: u64, offset: usize) -> Result<i64> {
    let value = match exponent {
        0 => i64::from(cursor.byte()?),
        1 => read_uint(cursor.take(2)?) as i64,
        2 => read_uint(cursor.take(4)?) as i64,
        3 => read_uint(cursor.take(8)?) as i64,
        _ => {
            return Err(Error::invalid(
                offset,
                format!("unsupported integer width: 2^{} bytes", exponent),
            ))
        }
    };
    Ok(value)
}

/// Reads a real of `1 << exponent` bytes; only 4 and 8 are valid
fn read_real(cursor: &mut Cursor<'_>, exponent: u64, offset: usize) -> Result<f64> {
    match exponent {
        2 => Ok(f64::from(f32::from_bits(read_uint(cursor.take(4)?) as u32))),
        3 => Ok(f64::from_bits(read_uint(cursor.take(8)?))),
        _ => Err(Error::invalid(
            offset,
            format!("unsupported real width: 2^{} bytes", exponent),
        )),
    }
}

/// Copies single-byte string content.
///
/// Valid UTF-8 (all ASCII included) is taken as is; anything else is read as
/// Latin-1 so no byte is lost.
fn decode_ascii(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn decode_utf16(bytes: &[u8], offset: usize) -> Result<String> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|e| Error::invalid(offset, format!("invalid UTF-16 string: {}", e)))
}
