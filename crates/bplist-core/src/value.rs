//! In-memory object model for property lists.
//!
//! A decoded property list is a fully materialized [`Value`] tree owned by the
//! caller. Sets and dictionaries compare without regard to order, and a
//! [`Uid`] never compares equal to an [`Value::Integer`] of the same number.

use chrono::{DateTime, Utc};
use indexmap::{Equivalent, IndexMap, IndexSet};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z (Mac absolute time)
pub const MAC_EPOCH_OFFSET: i64 = 978_307_200;

/// Converts seconds since the Mac epoch into a UTC timestamp.
///
/// The fraction is rounded to whole microseconds; finer digits of the stored
/// double are representation error. Returns `None` for non-finite values and
/// dates chrono cannot represent.
pub(crate) fn date_from_mac_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() || seconds.abs() >= 1e17 {
        return None;
    }
    let whole = seconds.floor();
    let mut micros = ((seconds - whole) * 1e6).round() as u32;
    let mut secs = (whole as i64).checked_add(MAC_EPOCH_OFFSET)?;
    if micros >= 1_000_000 {
        micros -= 1_000_000;
        secs = secs.checked_add(1)?;
    }
    DateTime::from_timestamp(secs, micros * 1_000)
}

/// Converts a UTC timestamp into seconds since the Mac epoch
pub(crate) fn date_to_mac_seconds(date: &DateTime<Utc>) -> f64 {
    (date.timestamp() - MAC_EPOCH_OFFSET) as f64 + f64::from(date.timestamp_subsec_nanos()) / 1e9
}

/// A typed object reference, as written by keyed archivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(u64);

impl Uid {
    /// Creates a new uid
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the wrapped number
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Uid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A property list value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The fill/null marker
    Null,
    /// `true` or `false`
    Boolean(bool),
    /// Signed integer; the wire width is chosen by the encoder
    Integer(i64),
    /// Floating point number, read from 32- or 64-bit reals
    Real(f64),
    /// UTC timestamp
    Date(DateTime<Utc>),
    /// Raw bytes
    Data(Vec<u8>),
    /// Text, stored as ASCII or UTF-16BE on the wire
    String(String),
    /// Ordered sequence
    Array(Vec<Value>),
    /// Unordered collection without duplicates
    Set(Set),
    /// Mapping from keys to values
    Dictionary(Dictionary),
    /// Typed object reference
    Uid(Uid),
}

impl Value {
    /// Short name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Date(_) => "date",
            Value::Data(_) => "data",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Dictionary(_) => "dictionary",
            Value::Uid(_) => "uid",
        }
    }

    /// Returns true for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean, if this is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is one
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the real, if this is one
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns the date, if this is one
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the bytes, if this is data
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the text, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the elements, if this is an array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the set, if this is one
    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the dictionary, if this is one
    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the uid, if this is one
    pub fn as_uid(&self) -> Option<Uid> {
        match self {
            Value::Uid(u) => Some(*u),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Data(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Set> for Value {
    fn from(value: Set) -> Self {
        Value::Set(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Value::Dictionary(value)
    }
}

impl From<Uid> for Value {
    fn from(value: Uid) -> Self {
        Value::Uid(value)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            // 0.0 == -0.0, so both hash alike
            Value::Real(r) => (if *r == 0.0 { 0 } else { r.to_bits() }).hash(state),
            Value::Date(d) => d.hash(state),
            Value::Data(d) => d.hash(state),
            Value::String(s) => s.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Set(set) => {
                set.len().hash(state);
                unordered_hash(set.iter()).hash(state);
            }
            Value::Dictionary(dict) => {
                dict.len().hash(state);
                unordered_hash(dict.iter()).hash(state);
            }
            Value::Uid(uid) => uid.hash(state),
        }
    }
}

/// Order-independent combination of element hashes
fn unordered_hash<T: Hash>(items: impl Iterator<Item = T>) -> u64 {
    items.fold(0u64, |acc, item| {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        acc.wrapping_add(hasher.finish())
    })
}

/// Hashed storage slot for a [`Value`].
///
/// Values compare with `==`, which is not reflexive for NaN reals. A NaN
/// never matches an existing slot, so every NaN inserted is kept.
#[derive(Clone, PartialEq, Hash)]
struct Key(Value);

impl Eq for Key {}

impl Equivalent<Key> for Value {
    fn equivalent(&self, key: &Key) -> bool {
        *self == key.0
    }
}

fn key_ref(key: &Key) -> &Value {
    &key.0
}

/// Unordered collection of values, deduplicated with `==`.
///
/// Iteration follows insertion order.
#[derive(Clone, Default)]
pub struct Set {
    items: IndexSet<Key>,
}

impl Set {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value; returns false if an equal value was already present
    pub fn insert(&mut self, value: Value) -> bool {
        self.items.insert(Key(value))
    }

    /// Returns true if an equal value is present
    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the set is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates the values in insertion order
    pub fn iter(&self) -> SetIter<'_> {
        SetIter(self.items.iter())
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl PartialEq for Set {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|item| other.contains(item))
    }
}

impl FromIterator<Value> for Set {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut set = Set::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl IntoIterator for Set {
    type Item = Value;
    type IntoIter = SetIntoIter;

    fn into_iter(self) -> Self::IntoIter {
        SetIntoIter(self.items.into_iter())
    }
}

impl<'a> IntoIterator for &'a Set {
    type Item = &'a Value;
    type IntoIter = SetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over a [`Set`]
pub struct SetIter<'a>(indexmap::set::Iter<'a, Key>);

impl<'a> Iterator for SetIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(key_ref)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl DoubleEndedIterator for SetIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(key_ref)
    }
}

impl ExactSizeIterator for SetIter<'_> {}

/// Owning iterator over a [`Set`]
pub struct SetIntoIter(indexmap::set::IntoIter<Key>);

impl Iterator for SetIntoIter {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|key| key.0)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

/// Mapping from keys to values.
///
/// Keys may be any [`Value`]. Insertion order is kept for iteration but is
/// not part of equality.
#[derive(Clone, Default)]
pub struct Dictionary {
    entries: IndexMap<Key, Value>,
}

impl Dictionary {
    /// Creates an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pair, returning the previous value for an equal key.
    ///
    /// A replaced entry keeps its original key and position.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(Key(key.into()), value.into())
    }

    /// Looks up the value for a key
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Looks up the value for a string key
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.get(&Value::from(key))
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (&k.0, v))
    }

    /// Iterates the keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &Value> + '_ {
        self.entries.keys().map(key_ref)
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}

impl IntoIterator for Dictionary {
    type Item = (Value, Value);
    type IntoIter = DictionaryIntoIter;

    fn into_iter(self) -> Self::IntoIter {
        DictionaryIntoIter(self.entries.into_iter())
    }
}

/// Owning iterator over the pairs of a [`Dictionary`]
pub struct DictionaryIntoIter(indexmap::map::IntoIter<Key, Value>);

impl Iterator for DictionaryIntoIter {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(key, value)| (key.0, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_is_not_integer() {
        assert_ne!(Value::Uid(Uid::new(7)), Value::Integer(7));
        assert_eq!(Value::from(Uid::new(7)).as_uid().map(Uid::get), Some(7));
    }

    #[test]
    fn test_set_deduplicates() {
        let mut set = Set::new();
        assert!(set.insert(Value::from("a")));
        assert!(!set.insert(Value::from("a")));
        assert!(set.insert(Value::Array(vec![Value::from(1)])));
        assert!(!set.insert(Value::Array(vec![Value::from(1)])));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_hashed_lookup_follows_equality() {
        let mut set = Set::new();
        assert!(set.insert(Value::Real(0.0)));
        assert!(!set.insert(Value::Real(-0.0)));
        assert!(set.contains(&Value::Real(-0.0)));

        let inner: Set = vec![Value::from(1), Value::from(2)].into_iter().collect();
        let reordered: Set = vec![Value::from(2), Value::from(1)].into_iter().collect();
        let mut dict = Dictionary::new();
        dict.insert(inner, "set key");
        assert_eq!(dict.get(&Value::Set(reordered)), Some(&Value::from("set key")));
        assert_eq!(dict.get(&Value::from(1)), None);
    }

    #[test]
    fn test_nan_members_are_kept() {
        let mut set = Set::new();
        assert!(set.insert(Value::Real(f64::NAN)));
        assert!(set.insert(Value::Real(f64::NAN)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_insertion_order_kept() {
        let dict: Dictionary = [("b", 1), ("a", 2), ("b", 3)].into_iter().collect();
        let keys: Vec<_> = dict.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(dict.get_str("b"), Some(&Value::Integer(3)));

        let set: Set = vec![Value::from("z"), Value::from("y")].into_iter().collect();
        let items: Vec<Value> = set.into_iter().collect();
        assert_eq!(items, [Value::from("z"), Value::from("y")]);
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let a: Set = vec![Value::from(1), Value::from(2)].into_iter().collect();
        let b: Set = vec![Value::from(2), Value::from(1)].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dictionary_insert_replaces() {
        let mut dict = Dictionary::new();
        assert_eq!(dict.insert("a", 1), None);
        assert_eq!(dict.insert("a", 2), Some(Value::Integer(1)));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get_str("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_dictionary_equality_ignores_order() {
        let a: Dictionary = [("a", 1), ("b", 2)].into_iter().collect();
        let b: Dictionary = [("b", 2), ("a", 1)].into_iter().collect();
        assert_eq!(a, b);

        let c: Dictionary = [("a", 1), ("b", 3)].into_iter().collect();
        assert_ne!(a, c);
    }

    #[test]
    fn test_mac_epoch_dates() {
        use chrono::TimeZone;

        let epoch = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(date_from_mac_seconds(0.0), Some(epoch));
        assert_eq!(date_to_mac_seconds(&epoch), 0.0);

        let unix = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(date_from_mac_seconds(-978_307_200.0), Some(unix));

        // stored doubles carry sub-microsecond noise
        let noisy = date_from_mac_seconds(737_634_600.123_000_026).unwrap();
        assert_eq!(noisy.timestamp_subsec_nanos(), 123_000_000);

        let half = date_from_mac_seconds(-0.5).unwrap();
        assert_eq!(half.timestamp(), MAC_EPOCH_OFFSET - 1);
        assert_eq!(half.timestamp_subsec_nanos(), 500_000_000);
        assert_eq!(date_to_mac_seconds(&half), -0.5);

        assert_eq!(date_from_mac_seconds(f64::INFINITY), None);
        assert_eq!(date_from_mac_seconds(1e300), None);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("x").as_integer(), None);
        assert_eq!(Value::from(vec![1u8, 2]).as_data(), Some(&[1u8, 2][..]));
        assert_eq!(Value::Null.type_name(), "null");
        assert!(Value::Null.is_null());
    }
}
