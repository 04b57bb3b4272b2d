//! Command message types and the term tags that carry them

/// External term format version byte
pub const MAGIC: u8 = 131;
/// Small integer, one unsigned byte follows
pub const SMALL_INT_TAG: u8 = 97;
/// Integer, four big-endian bytes follow
pub const INT_TAG: u8 = 98;
/// Small tuple, one arity byte follows
pub const TUPLE_TAG: u8 = 104;
/// Empty list
pub const NIL_TAG: u8 = 106;
/// Byte list, two big-endian length bytes follow
pub const STRING_TAG: u8 = 107;
/// List, four big-endian length bytes follow
pub const LIST_TAG: u8 = 108;
/// Binary, four big-endian length bytes follow
pub const BINARY_TAG: u8 = 109;

/// Longest key kept from a message; longer keys are truncated
pub const KEY_MAX: usize = 32;

/// Largest tuple a command may be
pub const MAX_ARITY: u8 = 2;

/// Bounded command key
///
/// Holds at most [`KEY_MAX`] bytes. Keys are usually ASCII but nothing
/// enforces that on the wire, so the raw bytes are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// Build a key, dropping anything past [`KEY_MAX`] bytes
    pub fn truncated(bytes: &[u8]) -> Self {
        let len = bytes.len().min(KEY_MAX);
        Self(bytes[..len].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The key as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::truncated(key.as_bytes())
    }
}

impl PartialEq<str> for Key {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Key {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Second element of a two-element command tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    Integer(i32),
    Blob(Vec<u8>),
    IntList(Vec<i32>),
}

/// One decoded command tuple: `{}`, `{key}` or `{key, value}`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandMessage {
    pub key: Key,
    pub arity: u8,
    pub value: Option<Value>,
}

impl CommandMessage {
    /// The empty tuple `{}`
    pub fn empty() -> Self {
        Self::default()
    }

    /// A one-element tuple `{key}`
    pub fn key_only(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            arity: 1,
            value: None,
        }
    }

    /// A two-element tuple `{key, value}`
    pub fn with_value(key: impl Into<Key>, value: Value) -> Self {
        Self {
            key: key.into(),
            arity: 2,
            value: Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.arity == 0
    }
}

impl std::fmt::Display for CommandMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.arity == 0 {
            return f.write_str("{}");
        }
        write!(f, "{{\"{}\"", self.key)?;
        match &self.value {
            None => {}
            Some(Value::Nil) => f.write_str(",[]")?,
            Some(Value::Integer(v)) => write!(f, ",{}", v)?,
            Some(Value::Blob(b)) => write!(f, ",<<{} bytes>>", b.len())?,
            Some(Value::IntList(list)) => {
                f.write_str(",[")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")?;
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_truncates() {
        let long = [b'x'; 40];
        let key = Key::truncated(&long);
        assert_eq!(key.len(), KEY_MAX);
        assert_eq!(key.as_bytes(), &long[..KEY_MAX]);
    }

    #[test]
    fn test_key_compares_with_str() {
        let key = Key::from("scan");
        assert_eq!(key, "scan");
        assert_eq!(key.as_str(), Some("scan"));
    }

    #[test]
    fn test_display() {
        assert_eq!(CommandMessage::empty().to_string(), "{}");
        assert_eq!(CommandMessage::key_only("scan").to_string(), "{\"scan\"}");
        assert_eq!(
            CommandMessage::with_value("store", Value::IntList(vec![-1, 1024])).to_string(),
            "{\"store\",[-1,1024]}"
        );
    }
}
