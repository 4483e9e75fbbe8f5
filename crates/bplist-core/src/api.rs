//! Top-level read and write API.
//!
//! Reading sniffs the `bplist0` signature: binary input goes through
//! [`Reader`], anything else is handed to the text collaborator. Writing
//! picks the encoder from the requested [`Format`].

use crate::binary::{is_binary_plist, DecoderConfig, Reader, Writer};
use crate::error::{Error, Result};
use crate::text::{TextFormat, XmlFormat};
use crate::value::Value;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Output representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `bplist00` binary encoding
    #[default]
    Binary,
    /// Text encoding produced by the text collaborator (XML by default)
    Xml,
}

/// Reads and writes property lists with a configurable decoder and text
/// collaborator.
pub struct Codec {
    decoder: DecoderConfig,
    text: Box<dyn TextFormat>,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("decoder", &self.decoder)
            .finish_non_exhaustive()
    }
}

impl Codec {
    /// Creates a codec with default limits and XML as the text format
    pub fn new() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            text: Box::new(XmlFormat),
        }
    }

    /// Sets the decoder limits
    pub fn decoder_config(mut self, config: DecoderConfig) -> Self {
        self.decoder = config;
        self
    }

    /// Replaces the text-format collaborator
    pub fn text_format(mut self, text: impl TextFormat + 'static) -> Self {
        self.text = Box::new(text);
        self
    }

    /// Reads a property list from a seekable stream.
    ///
    /// The stream is read from its start regardless of its current position
    /// and is not closed.
    pub fn read<R: Read + Seek>(&self, mut reader: R) -> Result<Value> {
        let binary = is_binary_plist(&mut reader)?;
        reader.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        if binary {
            debug!("Decoding {} bytes as a binary plist", data.len());
            Reader::with_config(&data, self.decoder.clone())?.read_root()
        } else {
            debug!("No binary signature, falling back to the text parser");
            self.text.parse(&data).map_err(Error::TextParse)
        }
    }

    /// Reads a property list from memory
    pub fn read_bytes(&self, data: &[u8]) -> Result<Value> {
        self.read(Cursor::new(data))
    }

    /// Reads a property list from a file
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        self.read(file).map_err(|e| match e {
            Error::Io(source) => Error::file_read(path, source),
            other => other,
        })
    }

    /// Writes `value` to a sink in the requested format
    pub fn write<W: Write>(&self, value: &Value, mut writer: W, format: Format) -> Result<()> {
        match format {
            Format::Binary => {
                let data = Writer::new().encode(value);
                writer.write_all(&data)?;
            }
            Format::Xml => self.text.write(value, &mut writer).map_err(Error::TextWrite)?,
        }
        writer.flush()?;
        Ok(())
    }

    /// Encodes `value` into a new buffer
    pub fn write_bytes(&self, value: &Value, format: Format) -> Result<Vec<u8>> {
        match format {
            Format::Binary => Ok(Writer::new().encode(value)),
            Format::Xml => {
                let mut out = Vec::new();
                self.write(value, &mut out, format)?;
                Ok(out)
            }
        }
    }

    /// Writes `value` to a file, replacing its contents
    pub fn write_file(&self, value: &Value, path: impl AsRef<Path>, format: Format) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::file_write(path, e))?;
        self.write(value, BufWriter::new(file), format)
            .map_err(|e| match e {
                Error::Io(source) => Error::file_write(path, source),
                other => other,
            })
    }
}

/// Reads a property list from a seekable stream with default settings
pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Value> {
    Codec::default().read(reader)
}

/// Reads a property list from memory with default settings
pub fn from_bytes(data: &[u8]) -> Result<Value> {
    Codec::default().read_bytes(data)
}

/// Reads a property list from a file with default settings
pub fn from_file(path: impl AsRef<Path>) -> Result<Value> {
    Codec::default().read_file(path)
}

/// Writes `value` to a sink with default settings
pub fn to_writer<W: Write>(value: &Value, writer: W, format: Format) -> Result<()> {
    Codec::default().write(value, writer, format)
}

/// Encodes `value` into a new buffer with default settings
pub fn to_bytes(value: &Value, format: Format) -> Result<Vec<u8>> {
    Codec::default().write_bytes(value, format)
}

/// Writes `value` to a file with default settings
pub fn to_file(value: &Value, path: impl AsRef<Path>, format: Format) -> Result<()> {
    Codec::default().write_file(value, path, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::value::{Dictionary, Set, Uid};
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> Value {
        let shared = Value::Array(vec![Value::from("x"), Value::Real(0.25)]);
        let mut set = Set::new();
        set.insert(Value::from(1));
        set.insert(Value::from("one"));
        set.insert(shared.clone());

        let mut dict = Dictionary::new();
        dict.insert("flags", vec![Value::from(true), Value::from(false)]);
        dict.insert("small", 7);
        dict.insert("negative", -1_000_000_000_000i64);
        dict.insert("big", i64::MAX);
        dict.insert("ratio", 1.0 / 3.0);
        dict.insert("when", Utc.with_ymd_and_hms(2019, 3, 4, 5, 6, 7).unwrap());
        dict.insert("blob", (0..=255u8).collect::<Vec<u8>>());
        dict.insert("text", "a fairly long ASCII string over fifteen bytes");
        dict.insert("unicode", "caf\u{e9} \u{1F600}");
        dict.insert("set", set);
        dict.insert("uid", Uid::new(3));
        dict.insert("three", Value::Integer(3));
        dict.insert("shared-1", shared.clone());
        dict.insert("shared-2", shared);
        dict.insert(Value::Integer(10), Value::Null);
        dict.insert("empty", Dictionary::new());
        Value::Dictionary(dict)
    }

    #[test]
    fn test_round_trip() {
        let value = sample();
        let data = to_bytes(&value, Format::Binary).unwrap();
        assert!(data.starts_with(b"bplist00"));
        assert_eq!(from_bytes(&data).unwrap(), value);
    }

    #[test]
    fn test_sub_second_dates_round_trip() {
        let dates = [
            DateTime::from_timestamp(1_715_934_600, 123_000_000).unwrap(),
            DateTime::from_timestamp(1_715_934_600, 123_456_000).unwrap(),
            DateTime::from_timestamp(900_000_000, 654_321_000).unwrap(),
            DateTime::from_timestamp(978_307_199, 999_999_000).unwrap(),
        ];
        for date in dates {
            let value = Value::Date(date);
            let decoded = from_bytes(&to_bytes(&value, Format::Binary).unwrap()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_large_containers() {
        let set: Set = (0..50_000).map(Value::from).collect();
        let dict: Dictionary = (0..50_000)
            .map(|i| (format!("key-{}", i), i))
            .collect();
        let value = Value::Array(vec![Value::Set(set), Value::Dictionary(dict)]);

        let decoded = from_bytes(&to_bytes(&value, Format::Binary).unwrap()).unwrap();
        let items = decoded.as_array().unwrap();
        assert_eq!(items[0].as_set().unwrap().len(), 50_000);
        let dict = items[1].as_dictionary().unwrap();
        assert_eq!(dict.len(), 50_000);
        assert_eq!(dict.get_str("key-49999"), Some(&Value::Integer(49_999)));
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_reencode_is_stable() {
        let first = to_bytes(&sample(), Format::Binary).unwrap();
        let decoded = from_bytes(&first).unwrap();
        let second = to_bytes(&decoded, Format::Binary).unwrap();
        assert_eq!(from_bytes(&second).unwrap(), decoded);
    }

    #[test]
    fn test_uid_stays_distinct() {
        let value = Value::Array(vec![Value::Uid(Uid::new(3)), Value::Integer(3)]);
        let decoded = from_bytes(&to_bytes(&value, Format::Binary).unwrap()).unwrap();
        let items = decoded.as_array().unwrap();
        assert_eq!(items[0], Value::Uid(Uid::new(3)));
        assert_eq!(items[1], Value::Integer(3));
        assert_ne!(items[0], items[1]);
    }

    #[test]
    fn test_array_order_preserved() {
        let value = Value::Array(vec![Value::from(true), Value::from(false), Value::from("hi")]);
        let decoded = from_bytes(&to_bytes(&value, Format::Binary).unwrap()).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_boundaries() {
        assert!(from_bytes(b"bplist00").unwrap_err().to_string().contains("too short"));

        let err = from_bytes(b"<plist><array><string>oops").unwrap_err();
        assert!(matches!(err, Error::TextParse(_)));
        assert!(err.is_invalid());
    }

    #[test]
    fn test_binary_errors_are_not_retried_as_text() {
        let mut data = to_bytes(&Value::from("hello"), Format::Binary).unwrap();
        data[8] = 0x70;
        let err = from_bytes(&data).unwrap_err();
        assert!(matches!(err, Error::InvalidPlist { offset: 8, .. }));
    }

    #[test]
    fn test_reads_from_stream_start() {
        let data = to_bytes(&Value::from(42), Format::Binary).unwrap();
        let mut cursor = Cursor::new(data);
        cursor.set_position(11);
        assert_eq!(from_reader(&mut cursor).unwrap(), Value::Integer(42));
    }

    #[test]
    fn test_xml_fallback() {
        let mut dict = Dictionary::new();
        dict.insert("key", "value");
        dict.insert("list", vec![Value::from(1), Value::from(2)]);
        let value = Value::Dictionary(dict);

        let xml = to_bytes(&value, Format::Xml).unwrap();
        assert!(xml.starts_with(b"<?xml"));
        assert_eq!(from_bytes(&xml).unwrap(), value);
    }

    #[test]
    fn test_xml_write_failure_is_wrapped() {
        let err = to_bytes(&Value::Null, Format::Xml).unwrap_err();
        assert!(matches!(err, Error::TextWrite(_)));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.plist");
        let value = sample();

        to_file(&value, &path, Format::Binary).unwrap();
        assert_eq!(from_file(&path).unwrap(), value);

        let missing = dir.path().join("missing.plist");
        assert!(matches!(from_file(&missing), Err(Error::FileRead { .. })));
    }

    #[test]
    fn test_custom_text_format() {
        struct Fixed;

        impl TextFormat for Fixed {
            fn parse(&self, _data: &[u8]) -> std::result::Result<Value, BoxError> {
                Ok(Value::from("parsed"))
            }

            fn write(
                &self,
                _value: &Value,
                sink: &mut dyn Write,
            ) -> std::result::Result<(), BoxError> {
                sink.write_all(b"fixed")?;
                Ok(())
            }
        }

        let codec = Codec::new().text_format(Fixed);
        assert_eq!(codec.read_bytes(b"anything").unwrap(), Value::from("parsed"));
        assert_eq!(codec.write_bytes(&Value::Null, Format::Xml).unwrap(), b"fixed");
    }

    #[test]
    fn test_decoder_config_applies() {
        let nested = Value::Array(vec![Value::Array(vec![Value::Array(vec![])])]);
        let data = to_bytes(&nested, Format::Binary).unwrap();
        let codec = Codec::new().decoder_config(DecoderConfig::new().max_depth(2));
        assert!(codec.read_bytes(&data).unwrap_err().is_invalid());
        assert_eq!(Codec::new().read_bytes(&data).unwrap(), nested);
    }
}
