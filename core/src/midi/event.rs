use crate::midi::meta::META_STATUS;
use crate::midi::node::NODE_EVENT_TYPE;
use crate::midi::{ChannelEvent, Decoder, MetaData, MetaEvent, MidiFileError, NodeEvent, Result};
use crate::time::BarBeatTime;

const SYSEX_START: u8 = 0xf0;
const SYSEX_ESCAPE: u8 = 0xf7;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  Meta(MetaEvent),
  Channel(ChannelEvent),
  Node(NodeEvent),
}

impl Event {
  pub fn time(&self) -> BarBeatTime {
    match self {
      Event::Meta(event) => event.time,
      Event::Channel(event) => event.time(),
      Event::Node(event) => event.time,
    }
  }

  pub fn set_time(&mut self, time: BarBeatTime) {
    match self {
      Event::Meta(event) => event.time = time,
      Event::Channel(event) => event.set_time(time),
      Event::Node(event) => event.time = time,
    }
  }

  pub fn is_track_name(&self) -> bool {
    match self {
      Event::Meta(MetaEvent {
        data: MetaData::SequenceTrackName(_),
        ..
      }) => true,
      _ => false,
    }
  }

  pub fn is_end_of_track(&self) -> bool {
    match self {
      Event::Meta(MetaEvent {
        data: MetaData::EndOfTrack,
        ..
      }) => true,
      _ => false,
    }
  }

  /// Tempo and time signature changes, which belong to the tempo track.
  pub fn is_tempo_map(&self) -> bool {
    match self {
      Event::Meta(MetaEvent {
        data: MetaData::Tempo(_),
        ..
      })
      | Event::Meta(MetaEvent {
        data: MetaData::TimeSignature(_),
        ..
      }) => true,
      _ => false,
    }
  }

  /// Appends the event bytes, without the delta time.
  pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
    match self {
      Event::Meta(event) => event.encode(out),
      Event::Channel(event) => event.encode(out),
      Event::Node(event) => event.encode(out)?,
    }
    Ok(())
  }

  /// Decodes the event starting at the decoder position, its delta time already consumed.
  pub fn decode(decoder: &mut Decoder, time: BarBeatTime) -> Result<Event> {
    match decoder.next_byte()? {
      META_STATUS => {
        let type_byte = decoder.next_byte()?;
        let (len, length_bytes) = decoder.next_vlq()?;
        if len > decoder.remaining() as u64 {
          return Err(MidiFileError::FileStructurallyUnsound);
        }
        let data = decoder.next_bytes(len as usize)?;
        match type_byte {
          NODE_EVENT_TYPE => NodeEvent::decode(data, length_bytes, time).map(Event::Node),
          _ => MetaData::decode(type_byte, data).map(|data| Event::Meta(MetaEvent::new(time, data))),
        }
      }
      SYSEX_START | SYSEX_ESCAPE => Err(MidiFileError::UnsupportedEvent),
      status => ChannelEvent::decode(decoder, status, time).map(Event::Channel),
    }
  }
}

impl From<MetaEvent> for Event {
  fn from(event: MetaEvent) -> Self {
    Event::Meta(event)
  }
}

impl From<ChannelEvent> for Event {
  fn from(event: ChannelEvent) -> Self {
    Event::Channel(event)
  }
}

impl From<NodeEvent> for Event {
  fn from(event: NodeEvent) -> Self {
    Event::Node(event)
  }
}
