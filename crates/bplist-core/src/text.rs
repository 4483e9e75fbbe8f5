//! Text property list collaborator.
//!
//! The binary codec never interprets XML itself. When the signature check
//! fails, the top-level API hands the buffer to a [`TextFormat`], and
//! non-binary writes go through the same seam.
//!
//! [`XmlFormat`] is the default implementation, backed by the `plist` crate.

use crate::error::BoxError;
use crate::value::{Dictionary, Uid, Value};
use chrono::{DateTime, Utc};
use std::io::{Cursor, Write};
use std::time::SystemTime;

/// Parser and writer for a text property list representation
pub trait TextFormat: Send + Sync {
    /// Parses a complete text property list
    fn parse(&self, data: &[u8]) -> Result<Value, BoxError>;

    /// Writes `value` in this text representation
    fn write(&self, value: &Value, sink: &mut dyn Write) -> Result<(), BoxError>;
}

/// XML property lists, via the `plist` crate.
///
/// Parsing also accepts the ASCII (OpenStep) text form. Sets are written as
/// arrays; null values and non-string dictionary keys have no XML form and
/// are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlFormat;

impl TextFormat for XmlFormat {
    fn parse(&self, data: &[u8]) -> Result<Value, BoxError> {
        let parsed = plist::Value::from_reader(Cursor::new(data))?;
        from_plist(parsed)
    }

    fn write(&self, value: &Value, sink: &mut dyn Write) -> Result<(), BoxError> {
        to_plist(value)?.to_writer_xml(sink)?;
        Ok(())
    }
}

fn from_plist(value: plist::Value) -> Result<Value, BoxError> {
    let value = match value {
        plist::Value::Boolean(b) => Value::Boolean(b),
        plist::Value::Integer(i) => match i.as_signed() {
            Some(signed) => Value::Integer(signed),
            None => return Err(format!("integer {:?} does not fit in 64 signed bits", i).into()),
        },
        plist::Value::Real(r) => Value::Real(r),
        plist::Value::Date(date) => Value::Date(DateTime::<Utc>::from(SystemTime::from(date))),
        plist::Value::Data(bytes) => Value::Data(bytes),
        plist::Value::String(s) => Value::String(s),
        plist::Value::Uid(uid) => Value::Uid(Uid::new(uid.get())),
        plist::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(from_plist)
                .collect::<Result<_, _>>()?,
        ),
        plist::Value::Dictionary(dict) => {
            let mut out = Dictionary::new();
            for (key, value) in dict {
                out.insert(key, from_plist(value)?);
            }
            Value::Dictionary(out)
        }
        other => return Err(format!("unsupported text plist value: {:?}", other).into()),
    };
    Ok(value)
}

fn to_plist(value: &Value) -> Result<plist::Value, BoxError> {
    let value = match value {
        Value::Null => return Err("null values cannot be written as XML".into()),
        Value::Boolean(b) => plist::Value::Boolean(*b),
        Value::Integer(i) => plist::Value::Integer((*i).into()),
        Value::Real(r) => plist::Value::Real(*r),
        Value::Date(date) => plist::Value::Date(SystemTime::from(*date).into()),
        Value::Data(bytes) => plist::Value::Data(bytes.clone()),
        Value::String(s) => plist::Value::String(s.clone()),
        Value::Uid(uid) => plist::Value::Uid(plist::Uid::new(uid.get())),
        Value::Array(items) => {
            plist::Value::Array(items.iter().map(to_plist).collect::<Result<_, _>>()?)
        }
        Value::Set(set) => plist::Value::Array(set.iter().map(to_plist).collect::<Result<_, _>>()?),
        Value::Dictionary(dict) => {
            let mut out = plist::Dictionary::new();
            for (key, value) in dict.iter() {
                let key = key.as_str().ok_or_else(|| {
                    format!("{} dictionary keys cannot be written as XML", key.type_name())
                })?;
                out.insert(key.to_owned(), to_plist(value)?);
            }
            plist::Value::Dictionary(out)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>name</key>
    <string>demo</string>
    <key>count</key>
    <integer>3</integer>
    <key>flags</key>
    <array>
        <true/>
        <false/>
    </array>
</dict>
</plist>"#;

    #[test]
    fn test_parse_xml() {
        let value = XmlFormat.parse(SAMPLE.as_bytes()).unwrap();
        let dict = value.as_dictionary().unwrap();
        assert_eq!(dict.get_str("name"), Some(&Value::from("demo")));
        assert_eq!(dict.get_str("count"), Some(&Value::Integer(3)));
        assert_eq!(
            dict.get_str("flags"),
            Some(&Value::Array(vec![Value::from(true), Value::from(false)]))
        );
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(XmlFormat.parse(b"<plist><dict><key>unterminated").is_err());
    }

    #[test]
    fn test_xml_round_trip() {
        let mut dict = Dictionary::new();
        dict.insert("real", 2.5);
        dict.insert("data", vec![1u8, 2, 3]);
        dict.insert("date", Utc.with_ymd_and_hms(2020, 5, 17, 8, 30, 0).unwrap());
        dict.insert("negative", -42);
        let value = Value::Dictionary(dict);

        let mut xml = Vec::new();
        XmlFormat.write(&value, &mut xml).unwrap();
        assert!(String::from_utf8_lossy(&xml).contains("<key>negative</key>"));
        assert_eq!(XmlFormat.parse(&xml).unwrap(), value);
    }

    #[test]
    fn test_write_rejects_unrepresentable() {
        let mut sink = Vec::new();
        assert!(XmlFormat.write(&Value::Null, &mut sink).is_err());

        let dict: Dictionary = [(Value::Integer(1), Value::from("one"))].into_iter().collect();
        let err = XmlFormat
            .write(&Value::Dictionary(dict), &mut sink)
            .unwrap_err();
        assert!(err.to_string().contains("integer dictionary keys"));
    }
}
