//! Binary property list (`bplist00`) codec.
//!
//! ## Layout Overview
//!
//! A binary property list is laid out as:
//! - The 8-byte header `bplist00`
//! - The object bodies, each starting with a marker byte
//! - The offset table: one big-endian offset per object
//! - A 32-byte [`Trailer`] describing table widths and counts
//!
//! Containers never embed their children. They hold object numbers
//! (indices into the offset table), which lets equal objects be stored once.
//!
//! ## Marker Byte
//!
//! The high nibble of the marker selects the object type and the low nibble
//! carries a small size or width. A low nibble of `0xF` means the size follows
//! as a separate integer object.

mod reader;
mod trailer;
mod writer;

use crate::error::{Error, Result};
use std::io::{Read, Seek, SeekFrom};

pub use reader::{
    DecoderConfig, Reader, DEFAULT_MAX_CONTAINER_LEN, DEFAULT_MAX_DEPTH, DEFAULT_MAX_TOTAL_ITEMS,
};
pub use trailer::{Trailer, TRAILER_LEN};
pub use writer::Writer;

/// Signature every binary property list starts with
pub const MAGIC: &[u8; 7] = b"bplist0";

/// Full header written by the encoder
pub const HEADER: &[u8; 8] = b"bplist00";

/// Low nibble meaning "the size follows as an integer object"
const SIZE_ESCAPE: u8 = 0x0F;

/// Size carried by a marker's low nibble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Size {
    /// Size stored directly in the marker
    Inline(u8),
    /// Size stored in the integer object that follows the marker
    Escaped,
}

impl Size {
    fn from_nibble(extra: u8) -> Self {
        if extra == SIZE_ESCAPE {
            Size::Escaped
        } else {
            Size::Inline(extra)
        }
    }
}

/// Decoded marker byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Marker {
    /// `0x0F`, decoded as null
    Fill,
    /// `0x08`
    False,
    /// `0x09`
    True,
    /// `0x1n`, width is `1 << n` bytes
    Integer(Size),
    /// `0x2n`, width is `1 << n` bytes
    Real(Size),
    /// `0x33`
    Date,
    /// `0x4n`
    Data(Size),
    /// `0x5n`, one byte per character
    AsciiString(Size),
    /// `0x6n`, count of UTF-16 code units
    Utf16String(Size),
    /// `0x8n`, width is `n + 1` bytes
    Uid(u8),
    /// `0xAn`
    Array(Size),
    /// `0xCn`
    Set(Size),
    /// `0xDn`, count of key/value pairs
    Dictionary(Size),
}

impl Marker {
    /// Parses a marker byte found at `offset`.
    pub(crate) fn parse(byte: u8, offset: usize) -> Result<Self> {
        let format = byte >> 4;
        let extra = byte & 0x0F;
        let size = Size::from_nibble(extra);

        let marker = match (format, extra) {
            (0x0, 0x8) => Marker::False,
            (0x0, 0x9) => Marker::True,
            (0x0, 0xF) => Marker::Fill,
            (0x1, _) => Marker::Integer(size),
            (0x2, _) => Marker::Real(size),
            (0x3, 0x3) => Marker::Date,
            (0x4, _) => Marker::Data(size),
            (0x5, _) => Marker::AsciiString(size),
            (0x6, _) => Marker::Utf16String(size),
            (0x8, _) => Marker::Uid(extra),
            (0xA, _) => Marker::Array(size),
            (0xC, _) => Marker::Set(size),
            (0xD, _) => Marker::Dictionary(size),
            _ => {
                return Err(Error::invalid(
                    offset,
                    format!(
                        "invalid object marker {{format: {:#06b}, extra: {:#06b}}}",
                        format, extra
                    ),
                ))
            }
        };
        Ok(marker)
    }
}

/// Narrowest of 1, 2, 4 or 8 bytes that holds `value`
pub(crate) fn width_for(value: u64) -> usize {
    if value <= u64::from(u8::MAX) {
        1
    } else if value <= u64::from(u16::MAX) {
        2
    } else if value <= u64::from(u32::MAX) {
        4
    } else {
        8
    }
}

/// Reads a big-endian unsigned integer of 1 to 8 bytes
pub(crate) fn read_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

/// Appends the low `width` bytes of `value`, big-endian
pub(crate) fn write_uint(out: &mut Vec<u8>, value: u64, width: usize) {
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

/// Checks whether a stream holds a binary property list.
///
/// Reads at most 7 bytes from the start and seeks back to the start, so the
/// stream can be handed to either parser afterwards.
pub fn is_binary_plist<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    reader.seek(SeekFrom::Start(0))?;
    let mut header = Vec::with_capacity(MAGIC.len());
    reader
        .by_ref()
        .take(MAGIC.len() as u64)
        .read_to_end(&mut header)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(header == MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_marker_parse() {
        assert_eq!(Marker::parse(0x08, 0).unwrap(), Marker::False);
        assert_eq!(Marker::parse(0x09, 0).unwrap(), Marker::True);
        assert_eq!(Marker::parse(0x0F, 0).unwrap(), Marker::Fill);
        assert_eq!(Marker::parse(0x13, 0).unwrap(), Marker::Integer(Size::Inline(3)));
        assert_eq!(Marker::parse(0x33, 0).unwrap(), Marker::Date);
        assert_eq!(Marker::parse(0x5F, 0).unwrap(), Marker::AsciiString(Size::Escaped));
        assert_eq!(Marker::parse(0x81, 0).unwrap(), Marker::Uid(1));
        assert_eq!(Marker::parse(0xD2, 0).unwrap(), Marker::Dictionary(Size::Inline(2)));
    }

    #[test]
    fn test_marker_invalid() {
        for byte in [0x00, 0x01, 0x30, 0x34, 0x70, 0x90, 0xB0, 0xE0, 0xFF] {
            let err = Marker::parse(byte, 17).unwrap_err();
            assert!(err.is_invalid(), "{:#04x} should be invalid", byte);
            assert!(err.to_string().contains("offset 17"));
        }
    }

    #[test]
    fn test_width_for() {
        assert_eq!(width_for(0), 1);
        assert_eq!(width_for(255), 1);
        assert_eq!(width_for(256), 2);
        assert_eq!(width_for(65_536), 4);
        assert_eq!(width_for(u64::from(u32::MAX) + 1), 8);
    }

    #[test]
    fn test_uint_helpers() {
        let mut out = Vec::new();
        write_uint(&mut out, 0x0102, 2);
        write_uint(&mut out, 7, 1);
        assert_eq!(out, [0x01, 0x02, 0x07]);
        assert_eq!(read_uint(&[0x01, 0x02]), 0x0102);
        assert_eq!(read_uint(&[0xFF; 8]), u64::MAX);
    }

    #[test]
    fn test_sniffer_restores_position() {
        let mut cursor = Cursor::new(b"bplist00rest".to_vec());
        cursor.set_position(5);
        assert!(is_binary_plist(&mut cursor).unwrap());
        assert_eq!(cursor.position(), 0);

        let mut cursor = Cursor::new(b"<?xml version".to_vec());
        assert!(!is_binary_plist(&mut cursor).unwrap());
        assert_eq!(cursor.position(), 0);

        let mut cursor = Cursor::new(b"bpl".to_vec());
        assert!(!is_binary_plist(&mut cursor).unwrap());
    }
}
