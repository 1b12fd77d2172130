use crate::midi::{vlq, Decoder, Event, MetaData, MetaEvent, MidiFileError, Result, Text};
use crate::time::BarBeatTime;

pub const HEADER_TAG: &[u8; 4] = b"MThd";
pub const TRACK_TAG: &[u8; 4] = b"MTrk";

/// Tag plus length field.
pub const CHUNK_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderChunk {
  pub format: u16,
  pub number_of_tracks: u16,
  /// Subbeats per quarter note.
  pub division: u16,
}

impl HeaderChunk {
  pub const LEN: usize = 14;
  const PAYLOAD_LEN: u32 = 6;

  pub fn decode(bytes: &[u8]) -> Result<HeaderChunk> {
    if bytes.len() != HeaderChunk::LEN {
      return Err(MidiFileError::InvalidLength);
    }
    let mut decoder = Decoder::new(bytes);
    if decoder.next_bytes(4)? != HEADER_TAG {
      return Err(MidiFileError::InvalidHeader);
    }
    if decoder.next_u32()? != HeaderChunk::PAYLOAD_LEN {
      return Err(MidiFileError::InvalidLength);
    }
    let format = decoder.next_u16()?;
    let number_of_tracks = decoder.next_u16()?;
    let division = decoder.next_u16()?;
    // Only metrical time is supported, SMPTE divisions have the high bit set
    if format > 2 || division == 0 || division & 0x8000 != 0 {
      return Err(MidiFileError::InvalidHeader);
    }
    Ok(HeaderChunk {
      format,
      number_of_tracks,
      division,
    })
  }

  pub fn encode(&self, out: &mut Vec<u8>) {
    out.extend_from_slice(HEADER_TAG);
    out.extend_from_slice(&HeaderChunk::PAYLOAD_LEN.to_be_bytes());
    out.extend_from_slice(&self.format.to_be_bytes());
    out.extend_from_slice(&self.number_of_tracks.to_be_bytes());
    out.extend_from_slice(&self.division.to_be_bytes());
  }
}

/// The events of one track, in file order, ending with an end of track event.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackChunk {
  pub events: Vec<Event>,
}

impl TrackChunk {
  pub fn new(events: Vec<Event>) -> TrackChunk {
    TrackChunk { events }
  }

  pub fn name(&self) -> Option<&Text> {
    self.events.iter().find_map(|event| match event {
      Event::Meta(MetaEvent {
        data: MetaData::SequenceTrackName(name),
        ..
      }) => Some(name),
      _ => None,
    })
  }

  /// Decodes a complete `MTrk` chunk, computing event times from the accumulated deltas.
  pub fn decode(bytes: &[u8], beats_per_bar: u16, division: u16) -> Result<TrackChunk> {
    if bytes.len() < CHUNK_PREFIX_LEN {
      return Err(MidiFileError::FileStructurallyUnsound);
    }
    let mut decoder = Decoder::new(bytes);
    if decoder.next_bytes(4)? != TRACK_TAG {
      return Err(MidiFileError::InvalidHeader);
    }
    if decoder.next_u32()? as usize != decoder.remaining() {
      return Err(MidiFileError::InvalidLength);
    }

    let mut events = Vec::new();
    let mut ticks = 0u64;
    let mut ended = false;
    while !decoder.is_empty() {
      if ended {
        return Err(MidiFileError::FileStructurallyUnsound);
      }
      let (delta, _) = decoder.next_vlq()?;
      ticks = ticks
        .checked_add(delta)
        .ok_or(MidiFileError::FileStructurallyUnsound)?;
      let time = BarBeatTime::from_ticks(ticks, beats_per_bar, division);
      let event = Event::decode(&mut decoder, time)?;
      ended = event.is_end_of_track();
      events.push(event);
    }

    if !ended {
      return Err(MidiFileError::MissingEvent);
    }
    Ok(TrackChunk { events })
  }

  /// Encodes the chunk. Deltas of events earlier than their predecessor are
  /// written as zero, and an end of track event is added when missing.
  pub fn encode(&self, beats_per_bar: u16, out: &mut Vec<u8>) -> Result<()> {
    let mut payload = Vec::new();
    let mut previous = 0u64;
    for event in self.events.iter() {
      let ticks = event.time().to_ticks(beats_per_bar);
      vlq::write(ticks.saturating_sub(previous), &mut payload);
      event.encode(&mut payload)?;
      previous = ticks;
    }
    if !self.events.last().map_or(false, Event::is_end_of_track) {
      vlq::write(0, &mut payload);
      let end = self.events.last().map(Event::time).unwrap_or_else(|| BarBeatTime::start(1));
      Event::from(MetaEvent::end_of_track(end)).encode(&mut payload)?;
    }
    if payload.len() > u32::max_value() as usize {
      return Err(MidiFileError::InvalidLength);
    }

    out.extend_from_slice(TRACK_TAG);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(())
  }
}
