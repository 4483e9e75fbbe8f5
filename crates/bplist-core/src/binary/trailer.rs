//! Trailer and offset table parsing.

use super::{read_uint, write_uint, HEADER, MAGIC};
use crate::error::{Error, Result};

/// Size of the fixed trailer at the end of every binary property list
pub const TRAILER_LEN: usize = 32;

/// Fixed-layout footer describing the offset table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Bytes per offset table entry
    pub offset_size: u8,
    /// Bytes per object reference inside containers
    pub object_ref_size: u8,
    /// Number of objects (entries in the offset table)
    pub offset_count: u64,
    /// Object number of the root object
    pub top_object: u64,
    /// Byte position of the offset table
    pub offset_table_offset: u64,
}

impl Trailer {
    /// Parses the trailer from the end of a complete property list.
    ///
    /// Fails with [`Error::NotBinary`] on a signature mismatch and with
    /// [`Error::InvalidPlist`] when the buffer is too short or the widths
    /// are unusable.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if !data.starts_with(MAGIC) {
            return Err(Error::NotBinary);
        }
        if data.len() < HEADER.len() + TRAILER_LEN {
            return Err(Error::invalid(
                data.len(),
                format!("file is too short ({} bytes)", data.len()),
            ));
        }

        let start = data.len() - TRAILER_LEN;
        let raw = &data[start..];
        let field = |at: usize| read_uint(&raw[at..at + 8]);

        let trailer = Self {
            offset_size: raw[6],
            object_ref_size: raw[7],
            offset_count: field(8),
            top_object: field(16),
            offset_table_offset: field(24),
        };

        for (name, width) in [
            ("offset size", trailer.offset_size),
            ("object reference size", trailer.object_ref_size),
        ] {
            if !(1..=8).contains(&width) {
                return Err(Error::invalid(
                    start,
                    format!("unsupported {} {} in trailer", name, width),
                ));
            }
        }

        if trailer.top_object >= trailer.offset_count {
            return Err(Error::invalid(
                start,
                format!(
                    "top object {} is outside the offset table ({} entries)",
                    trailer.top_object, trailer.offset_count
                ),
            ));
        }

        Ok(trailer)
    }

    /// Reads the offset table described by this trailer.
    ///
    /// Every offset must point into the object area between the header and
    /// the offset table.
    pub fn read_offsets(&self, data: &[u8]) -> Result<Vec<u64>> {
        let table_end = data.len().saturating_sub(TRAILER_LEN);
        let width = usize::from(self.offset_size);
        let table_start = usize::try_from(self.offset_table_offset)
            .ok()
            .filter(|&start| start >= HEADER.len() && start <= table_end)
            .ok_or_else(|| {
                Error::invalid(
                    table_end,
                    format!(
                        "offset table position {} is outside the file",
                        self.offset_table_offset
                    ),
                )
            })?;

        let available = ((table_end - table_start) / width) as u64;
        if available < self.offset_count {
            return Err(Error::invalid(
                table_start,
                format!(
                    "invalid offset count: expected {} entries, found room for {}",
                    self.offset_count, available
                ),
            ));
        }

        let count = self.offset_count as usize;
        let mut offsets = Vec::with_capacity(count);
        for (index, entry) in data[table_start..table_start + count * width]
            .chunks_exact(width)
            .enumerate()
        {
            let offset = read_uint(entry);
            if offset < HEADER.len() as u64 || offset >= table_start as u64 {
                return Err(Error::invalid(
                    table_start + index * width,
                    format!("object {} has out-of-range offset {}", index, offset),
                ));
            }
            offsets.push(offset);
        }

        Ok(offsets)
    }

    /// Appends the 32-byte encoded trailer
    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&[0u8; 6]);
        out.push(self.offset_size);
        out.push(self.object_ref_size);
        write_uint(out, self.offset_count, 8);
        write_uint(out, self.top_object, 8);
        write_uint(out, self.offset_table_offset, 8);
    }
}
