use crate::midi::{vlq, MidiFileError, Result, Text};
use crate::time::signature::{CLOCKS_PER_CLICK, THIRTY_SECONDS_PER_QUARTER};
use crate::time::{BarBeatTime, Tempo, TimeSignature};

pub const META_STATUS: u8 = 0xff;

pub const TEXT: u8 = 0x01;
pub const COPYRIGHT_NOTICE: u8 = 0x02;
pub const SEQUENCE_TRACK_NAME: u8 = 0x03;
pub const INSTRUMENT_NAME: u8 = 0x04;
pub const MARKER: u8 = 0x06;
pub const PROGRAM_NAME: u8 = 0x08;
pub const DEVICE_NAME: u8 = 0x09;
pub const END_OF_TRACK: u8 = 0x2f;
pub const TEMPO: u8 = 0x51;
pub const TIME_SIGNATURE: u8 = 0x58;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaData {
  Text(Text),
  CopyrightNotice(Text),
  SequenceTrackName(Text),
  InstrumentName(Text),
  Marker(Text),
  ProgramName(Text),
  DeviceName(Text),
  EndOfTrack,
  Tempo(Tempo),
  TimeSignature(TimeSignature),
}

fn text(data: &[u8]) -> Text {
  Text::from(data)
}

impl MetaData {
  pub fn type_byte(&self) -> u8 {
    match self {
      MetaData::Text(_) => TEXT,
      MetaData::CopyrightNotice(_) => COPYRIGHT_NOTICE,
      MetaData::SequenceTrackName(_) => SEQUENCE_TRACK_NAME,
      MetaData::InstrumentName(_) => INSTRUMENT_NAME,
      MetaData::Marker(_) => MARKER,
      MetaData::ProgramName(_) => PROGRAM_NAME,
      MetaData::DeviceName(_) => DEVICE_NAME,
      MetaData::EndOfTrack => END_OF_TRACK,
      MetaData::Tempo(_) => TEMPO,
      MetaData::TimeSignature(_) => TIME_SIGNATURE,
    }
  }

  pub fn payload(&self) -> Vec<u8> {
    match self {
      MetaData::Text(text)
      | MetaData::CopyrightNotice(text)
      | MetaData::SequenceTrackName(text)
      | MetaData::InstrumentName(text)
      | MetaData::Marker(text)
      | MetaData::ProgramName(text)
      | MetaData::DeviceName(text) => text.as_bytes().to_vec(),
      MetaData::EndOfTrack => Vec::new(),
      MetaData::Tempo(tempo) => tempo.get_micros_per_quarter().to_be_bytes()[1..].to_vec(),
      MetaData::TimeSignature(signature) => vec![
        signature.get_beats_per_bar(),
        signature.exponent(),
        CLOCKS_PER_CLICK,
        THIRTY_SECONDS_PER_QUARTER,
      ],
    }
  }

  pub fn decode(type_byte: u8, data: &[u8]) -> Result<MetaData> {
    match type_byte {
      TEXT => Ok(MetaData::Text(text(data))),
      COPYRIGHT_NOTICE => Ok(MetaData::CopyrightNotice(text(data))),
      SEQUENCE_TRACK_NAME => Ok(MetaData::SequenceTrackName(text(data))),
      INSTRUMENT_NAME => Ok(MetaData::InstrumentName(text(data))),
      MARKER => Ok(MetaData::Marker(text(data))),
      PROGRAM_NAME => Ok(MetaData::ProgramName(text(data))),
      DEVICE_NAME => Ok(MetaData::DeviceName(text(data))),
      END_OF_TRACK => match data.len() {
        0 => Ok(MetaData::EndOfTrack),
        _ => Err(MidiFileError::InvalidLength),
      },
      TEMPO => match data {
        [a, b, c] => {
          let micros = u32::from(*a) << 16 | u32::from(*b) << 8 | u32::from(*c);
          if micros == 0 {
            Err(MidiFileError::UnsupportedEvent)
          } else {
            Ok(MetaData::Tempo(Tempo::from_micros_per_quarter(micros)))
          }
        }
        _ => Err(MidiFileError::InvalidLength),
      },
      TIME_SIGNATURE => match data {
        [numerator, exponent, _clocks, _thirty_seconds] => TimeSignature::from_exponent(*numerator, *exponent)
          .map(MetaData::TimeSignature)
          .ok_or(MidiFileError::UnsupportedEvent),
        _ => Err(MidiFileError::InvalidLength),
      },
      _ => Err(MidiFileError::UnsupportedEvent),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEvent {
  pub time: BarBeatTime,
  pub data: MetaData,
}

impl MetaEvent {
  pub fn new(time: BarBeatTime, data: MetaData) -> MetaEvent {
    MetaEvent { time, data }
  }

  pub fn track_name<T: Into<Text>>(time: BarBeatTime, name: T) -> MetaEvent {
    MetaEvent::new(time, MetaData::SequenceTrackName(name.into()))
  }

  pub fn end_of_track(time: BarBeatTime) -> MetaEvent {
    MetaEvent::new(time, MetaData::EndOfTrack)
  }

  /// `FF type len data`
  pub fn encode(&self, out: &mut Vec<u8>) {
    let payload = self.data.payload();
    out.push(META_STATUS);
    out.push(self.data.type_byte());
    vlq::write(payload.len() as u64, out);
    out.extend_from_slice(&payload);
  }
}

#[cfg(test)]
mod test {

  use super::{MetaData, MetaEvent};
  use crate::midi::MidiFileError;
  use crate::time::{BarBeatTime, Tempo, TimeSignature};

  fn encoded(data: MetaData) -> Vec<u8> {
    let mut out = Vec::new();
    MetaEvent::new(BarBeatTime::start(480), data).encode(&mut out);
    out
  }

  #[test]
  pub fn encode_track_name() {
    let bytes = encoded(MetaData::SequenceTrackName("Bass".into()));
    assert_eq!(bytes, vec![0xff, 0x03, 0x04, b'B', b'a', b's', b's']);
  }

  #[test]
  pub fn encode_end_of_track() {
    assert_eq!(encoded(MetaData::EndOfTrack), vec![0xff, 0x2f, 0x00]);
  }

  #[test]
  pub fn encode_tempo() {
    let bytes = encoded(MetaData::Tempo(Tempo::new(120)));
    assert_eq!(bytes, vec![0xff, 0x51, 0x03, 0x07, 0xa1, 0x20]);
  }

  #[test]
  pub fn encode_time_signature() {
    let bytes = encoded(MetaData::TimeSignature(TimeSignature::new(6, 8)));
    assert_eq!(bytes, vec![0xff, 0x58, 0x04, 6, 3, 24, 8]);
  }

  #[test]
  pub fn decode_known_types() {
    assert_eq!(
      MetaData::decode(0x51, &[0x07, 0xa1, 0x20]),
      Ok(MetaData::Tempo(Tempo::new(120)))
    );
    assert_eq!(
      MetaData::decode(0x58, &[3, 2, 24, 8]),
      Ok(MetaData::TimeSignature(TimeSignature::new(3, 4)))
    );
    assert_eq!(
      MetaData::decode(0x06, b"Verse"),
      Ok(MetaData::Marker("Verse".into()))
    );
    assert_eq!(MetaData::decode(0x2f, &[]), Ok(MetaData::EndOfTrack));
  }

  #[test]
  pub fn text_bytes_kept() {
    let data = [0x43, 0x61, 0xe9];
    let decoded = MetaData::decode(0x03, &data).unwrap();
    assert_eq!(decoded.payload(), data.to_vec());
    assert_eq!(encoded(decoded), vec![0xff, 0x03, 0x03, 0x43, 0x61, 0xe9]);
  }

  #[test]
  pub fn decode_length_checks() {
    assert_eq!(MetaData::decode(0x2f, &[0]), Err(MidiFileError::InvalidLength));
    assert_eq!(MetaData::decode(0x51, &[0x07, 0xa1]), Err(MidiFileError::InvalidLength));
    assert_eq!(MetaData::decode(0x58, &[4, 2, 24]), Err(MidiFileError::InvalidLength));
  }

  #[test]
  pub fn decode_unsupported() {
    assert_eq!(MetaData::decode(0x7f, &[]), Err(MidiFileError::UnsupportedEvent));
    assert_eq!(MetaData::decode(0x58, &[4, 9, 24, 8]), Err(MidiFileError::UnsupportedEvent));
    assert_eq!(MetaData::decode(0x51, &[0, 0, 0]), Err(MidiFileError::UnsupportedEvent));
  }
}
