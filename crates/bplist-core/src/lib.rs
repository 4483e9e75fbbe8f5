//! # bplist-core
//!
//! A library for decoding and encoding binary property lists (`bplist00`).
//!
//! This crate provides the core functionality for:
//! - Parsing the trailer and offset table of a binary property list
//! - Decoding objects and resolving the references between them
//! - Encoding a value tree with shared objects stored once
//! - Falling back to a text (XML) parser when the input is not binary
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`value`]: The in-memory object model
//! - [`binary`]: Binary decoder and encoder
//! - [`text`]: Text-format collaborator seam and the XML implementation
//! - [`api`]: Top-level read/write functions and [`Codec`]
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use bplist_core::{Dictionary, Format, Value};
//!
//! let mut dict = Dictionary::new();
//! dict.insert("name", "demo");
//! dict.insert("count", 3);
//!
//! let bytes = bplist_core::to_bytes(&Value::Dictionary(dict), Format::Binary)?;
//! let decoded = bplist_core::from_bytes(&bytes)?;
//! assert_eq!(decoded.as_dictionary().and_then(|d| d.get_str("count")), Some(&Value::Integer(3)));
//! # Ok::<(), bplist_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`TextFormat`]: Substitute the text-format parser and writer
//! - [`DecoderConfig`]: Tune the limits applied to untrusted input
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod api;
pub mod binary;
pub mod error;
pub mod text;
pub mod value;

// Re-export primary types for convenience
pub use api::{from_bytes, from_file, from_reader, to_bytes, to_file, to_writer, Codec, Format};
pub use binary::{is_binary_plist, DecoderConfig, Reader, Trailer, Writer};
pub use error::{BoxError, Error, Result};
pub use text::{TextFormat, XmlFormat};
pub use value::{Dictionary, Set, Uid, Value};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
