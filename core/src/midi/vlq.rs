use crate::midi::{MidiFileError, Result};

/// Longest encoding of a `u64`, ten groups of seven bits.
pub const MAX_BYTES: usize = 10;

const CONTINUATION: u8 = 0b1000_0000;
const GROUP_MASK: u64 = 0b0111_1111;

/// MIDI variable length quantity: big-endian groups of seven bits, every byte
/// but the last one with the high bit set. Encodings are always minimal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLengthQuantity(Vec<u8>);

impl VariableLengthQuantity {
  pub fn new(value: u64) -> VariableLengthQuantity {
    VariableLengthQuantity(encode(value))
  }

  /// Decodes the quantity at the start of `bytes`, returning it with the number of bytes consumed.
  pub fn from_bytes(bytes: &[u8]) -> Result<(VariableLengthQuantity, usize)> {
    let (_, len) = decode(bytes)?;
    Ok((VariableLengthQuantity(bytes[..len].to_vec()), len))
  }

  pub fn value(&self) -> u64 {
    self
      .0
      .iter()
      .fold(0u64, |acc, byte| acc << 7 | (u64::from(*byte) & GROUP_MASK))
  }

  pub fn bytes(&self) -> &[u8] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<u64> for VariableLengthQuantity {
  fn from(value: u64) -> Self {
    VariableLengthQuantity::new(value)
  }
}

pub fn encode(value: u64) -> Vec<u8> {
  let mut out = Vec::with_capacity(4);
  write(value, &mut out);
  out
}

pub fn write(value: u64, out: &mut Vec<u8>) {
  let mut groups = [0u8; MAX_BYTES];
  let mut len = 0;
  let mut remaining = value;
  loop {
    groups[len] = (remaining & GROUP_MASK) as u8;
    len += 1;
    remaining >>= 7;
    if remaining == 0 {
      break;
    }
  }
  for i in (0..len).rev() {
    let continuation = if i > 0 { CONTINUATION } else { 0 };
    out.push(groups[i] | continuation);
  }
}

/// Reads a quantity from the start of `bytes`.
///
/// Non minimal encodings (a leading `0x80`) and values that do not fit in a
/// `u64` fail with `InvalidLength`; a quantity cut short by the end of the
/// input is `FileStructurallyUnsound`.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize)> {
  let mut value = 0u64;
  for (i, byte) in bytes.iter().enumerate() {
    if (i == 0 && *byte == CONTINUATION) || i >= MAX_BYTES || value > u64::max_value() >> 7 {
      return Err(MidiFileError::InvalidLength);
    }
    value = value << 7 | (u64::from(*byte) & GROUP_MASK);
    if byte & CONTINUATION == 0 {
      return Ok((value, i + 1));
    }
  }
  Err(MidiFileError::FileStructurallyUnsound)
}

#[cfg(test)]
mod test {

  use super::{decode, encode, VariableLengthQuantity};
  use crate::midi::MidiFileError;

  // Examples from the Standard MIDI Files 1.0 specification.
  const TABLE: [(u64, &[u8]); 12] = [
    (0x0000_0000, &[0x00]),
    (0x0000_0040, &[0x40]),
    (0x0000_007f, &[0x7f]),
    (0x0000_0080, &[0x81, 0x00]),
    (0x0000_2000, &[0xc0, 0x00]),
    (0x0000_3fff, &[0xff, 0x7f]),
    (0x0000_4000, &[0x81, 0x80, 0x00]),
    (0x0010_0000, &[0xc0, 0x80, 0x00]),
    (0x001f_ffff, &[0xff, 0xff, 0x7f]),
    (0x0020_0000, &[0x81, 0x80, 0x80, 0x00]),
    (0x0800_0000, &[0xc0, 0x80, 0x80, 0x00]),
    (0x0fff_ffff, &[0xff, 0xff, 0xff, 0x7f]),
  ];

  #[test]
  pub fn encode_reference_values() {
    for (value, bytes) in TABLE.iter() {
      assert_eq!(encode(*value), bytes.to_vec(), "encoding {:#x}", value);
    }
  }

  #[test]
  pub fn decode_reference_values() {
    for (value, bytes) in TABLE.iter() {
      assert_eq!(decode(bytes), Ok((*value, bytes.len())), "decoding {:#x}", value);
    }
  }

  #[test]
  pub fn two_megabytes() {
    assert_eq!(encode(2_097_152), vec![0x81, 0x80, 0x80, 0x00]);
    assert_eq!(decode(&[0x81, 0x80, 0x80, 0x00]), Ok((2_097_152, 4)));
  }

  #[test]
  pub fn beyond_four_bytes() {
    let bytes = encode(0x1000_0000);
    assert_eq!(bytes, vec![0x81, 0x80, 0x80, 0x80, 0x00]);
    assert_eq!(decode(&bytes), Ok((0x1000_0000, 5)));

    let bytes = encode(u64::max_value());
    assert_eq!(bytes.len(), 10);
    assert_eq!(bytes[0], 0x81);
    assert_eq!(decode(&bytes), Ok((u64::max_value(), 10)));
  }

  #[test]
  pub fn decode_stops_at_last_group() {
    assert_eq!(decode(&[0x83, 0x60, 0x90, 0x3c]), Ok((480, 2)));
  }

  #[test]
  pub fn decode_rejects_non_minimal() {
    assert_eq!(decode(&[0x80, 0x00]), Err(MidiFileError::InvalidLength));
  }

  #[test]
  pub fn decode_rejects_overflow() {
    let bytes = [0x82, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
    assert_eq!(decode(&bytes), Err(MidiFileError::InvalidLength));
    let bytes = [0xff; 11];
    assert_eq!(decode(&bytes), Err(MidiFileError::InvalidLength));
  }

  #[test]
  pub fn decode_truncated() {
    assert_eq!(decode(&[0x81, 0x80]), Err(MidiFileError::FileStructurallyUnsound));
    assert_eq!(decode(&[]), Err(MidiFileError::FileStructurallyUnsound));
  }

  #[test]
  pub fn quantity() {
    let quantity = VariableLengthQuantity::from(16_383);
    assert_eq!(quantity.bytes(), &[0xff, 0x7f]);
    assert_eq!(quantity.len(), 2);
    assert_eq!(quantity.value(), 16_383);

    let (parsed, len) = VariableLengthQuantity::from_bytes(&[0xff, 0x7f, 0x00]).unwrap();
    assert_eq!(len, 2);
    assert_eq!(parsed, quantity);
  }
}
