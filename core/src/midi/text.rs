use std::borrow::Cow;
use std::fmt;

/// Text carried by meta events and node identifiers.
///
/// Files are not required to hold valid UTF-8, so the bytes are kept as read
/// and written back unchanged. Conversion to a string is lossy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Text(Vec<u8>);

impl Text {
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn to_string_lossy(&self) -> Cow<str> {
    String::from_utf8_lossy(&self.0)
  }
}

impl From<&str> for Text {
  fn from(text: &str) -> Self {
    Text(text.as_bytes().to_vec())
  }
}

impl From<String> for Text {
  fn from(text: String) -> Self {
    Text(text.into_bytes())
  }
}

impl From<&[u8]> for Text {
  fn from(bytes: &[u8]) -> Self {
    Text(bytes.to_vec())
  }
}

impl From<Vec<u8>> for Text {
  fn from(bytes: Vec<u8>) -> Self {
    Text(bytes)
  }
}

impl PartialEq<str> for Text {
  fn eq(&self, other: &str) -> bool {
    self.0 == other.as_bytes()
  }
}

impl fmt::Display for Text {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.to_string_lossy())
  }
}
