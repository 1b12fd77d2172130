use crate::midi::{Decoder, MidiFileError, Result};
use crate::time::BarBeatTime;

#[inline]
fn u4(d: u8) -> u8 {
  d & 0x0f
}

#[inline]
fn u7(d: u8) -> u8 {
  d & 0x7f
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
  NoteOff,
  NoteOn,
  PolyphonicKeyPressure,
  ControlChange,
  ProgramChange,
  ChannelPressure,
  PitchBend,
}

impl ChannelKind {
  pub fn from_status(status: u8) -> Option<ChannelKind> {
    match status >> 4 {
      0x8 => Some(ChannelKind::NoteOff),
      0x9 => Some(ChannelKind::NoteOn),
      0xa => Some(ChannelKind::PolyphonicKeyPressure),
      0xb => Some(ChannelKind::ControlChange),
      0xc => Some(ChannelKind::ProgramChange),
      0xd => Some(ChannelKind::ChannelPressure),
      0xe => Some(ChannelKind::PitchBend),
      _ => None,
    }
  }

  pub fn nibble(&self) -> u8 {
    match self {
      ChannelKind::NoteOff => 0x8,
      ChannelKind::NoteOn => 0x9,
      ChannelKind::PolyphonicKeyPressure => 0xa,
      ChannelKind::ControlChange => 0xb,
      ChannelKind::ProgramChange => 0xc,
      ChannelKind::ChannelPressure => 0xd,
      ChannelKind::PitchBend => 0xe,
    }
  }

  /// Data bytes following the status byte.
  pub fn data_len(&self) -> usize {
    match self {
      ChannelKind::ProgramChange | ChannelKind::ChannelPressure => 1,
      _ => 2,
    }
  }
}

/// A channel voice message with its time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
  time: BarBeatTime,
  kind: ChannelKind,
  status: u8,
  data1: u8,
  data2: Option<u8>,
}

impl ChannelEvent {
  /// Validates the status and that the data bytes match its message kind.
  pub fn new(time: BarBeatTime, status: u8, data1: u8, data2: Option<u8>) -> Result<ChannelEvent> {
    let kind = ChannelKind::from_status(status).ok_or(MidiFileError::UnsupportedEvent)?;
    if kind.data_len() != 1 + data2.iter().count() {
      return Err(MidiFileError::InvalidLength);
    }
    Ok(ChannelEvent {
      time,
      kind,
      status,
      data1: u7(data1),
      data2: data2.map(u7),
    })
  }

  fn with_kind(time: BarBeatTime, kind: ChannelKind, channel: u8, data1: u8, data2: Option<u8>) -> ChannelEvent {
    ChannelEvent {
      time,
      kind,
      status: kind.nibble() << 4 | u4(channel),
      data1: u7(data1),
      data2: data2.map(u7),
    }
  }

  pub fn note_on(time: BarBeatTime, channel: u8, note: u8, velocity: u8) -> ChannelEvent {
    ChannelEvent::with_kind(time, ChannelKind::NoteOn, channel, note, Some(velocity))
  }

  pub fn note_off(time: BarBeatTime, channel: u8, note: u8, velocity: u8) -> ChannelEvent {
    ChannelEvent::with_kind(time, ChannelKind::NoteOff, channel, note, Some(velocity))
  }

  pub fn control_change(time: BarBeatTime, channel: u8, controller: u8, value: u8) -> ChannelEvent {
    ChannelEvent::with_kind(time, ChannelKind::ControlChange, channel, controller, Some(value))
  }

  pub fn program_change(time: BarBeatTime, channel: u8, program: u8) -> ChannelEvent {
    ChannelEvent::with_kind(time, ChannelKind::ProgramChange, channel, program, None)
  }

  pub fn time(&self) -> BarBeatTime {
    self.time
  }

  pub fn set_time(&mut self, time: BarBeatTime) {
    self.time = time;
  }

  pub fn kind(&self) -> ChannelKind {
    self.kind
  }

  pub fn channel(&self) -> u8 {
    u4(self.status)
  }

  pub fn status(&self) -> u8 {
    self.status
  }

  pub fn data1(&self) -> u8 {
    self.data1
  }

  pub fn data2(&self) -> Option<u8> {
    self.data2
  }

  pub fn encode(&self, out: &mut Vec<u8>) {
    out.push(self.status);
    out.push(self.data1);
    out.extend(self.data2.iter());
  }

  /// Decodes the data bytes following an already consumed `status`.
  pub fn decode(decoder: &mut Decoder, status: u8, time: BarBeatTime) -> Result<ChannelEvent> {
    let kind = ChannelKind::from_status(status).ok_or(MidiFileError::UnsupportedEvent)?;
    let data1 = decoder.next_data()?;
    let data2 = match kind.data_len() {
      2 => Some(decoder.next_data()?),
      _ => None,
    };
    Ok(ChannelEvent {
      time,
      kind,
      status,
      data1,
      data2,
    })
  }
}
