use crate::midi::{vlq, MidiFileError, Result};

/// Cursor over the bytes of a chunk.
///
/// Running out of bytes in the middle of a value is reported as
/// `FileStructurallyUnsound`.
pub struct Decoder<'a> {
  pos: usize,
  data: &'a [u8],
}

impl<'a> Decoder<'a> {
  pub fn new(data: &'a [u8]) -> Decoder<'a> {
    Decoder { pos: 0, data }
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn remaining(&self) -> usize {
    self.data.len() - self.pos
  }

  pub fn is_empty(&self) -> bool {
    self.pos >= self.data.len()
  }

  pub fn peek(&self) -> Option<u8> {
    self.data.get(self.pos).cloned()
  }

  pub fn next_byte(&mut self) -> Result<u8> {
    let byte = self.peek().ok_or(MidiFileError::FileStructurallyUnsound)?;
    self.pos += 1;
    Ok(byte)
  }

  /// A byte with the high bit clear.
  pub fn next_data(&mut self) -> Result<u8> {
    match self.peek() {
      Some(byte) if byte & 0b1000_0000 == 0 => {
        self.pos += 1;
        Ok(byte)
      }
      _ => Err(MidiFileError::FileStructurallyUnsound),
    }
  }

  pub fn next_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
    if self.remaining() < len {
      return Err(MidiFileError::FileStructurallyUnsound);
    }
    let bytes = &self.data[self.pos..self.pos + len];
    self.pos += len;
    Ok(bytes)
  }

  pub fn next_u16(&mut self) -> Result<u16> {
    let bytes = self.next_bytes(2)?;
    Ok(u16::from(bytes[0]) << 8 | u16::from(bytes[1]))
  }

  pub fn next_u32(&mut self) -> Result<u32> {
    let bytes = self.next_bytes(4)?;
    Ok(bytes.iter().fold(0u32, |acc, b| acc << 8 | u32::from(*b)))
  }

  /// A variable length quantity, returning its value and encoded size.
  pub fn next_vlq(&mut self) -> Result<(u64, usize)> {
    let (value, len) = vlq::decode(&self.data[self.pos..])?;
    self.pos += len;
    Ok((value, len))
  }
}
