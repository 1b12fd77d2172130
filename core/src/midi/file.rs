use std::convert::TryFrom;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, info};

use crate::midi::chunk::CHUNK_PREFIX_LEN;
use crate::midi::{Decoder, Event, HeaderChunk, MetaData, MetaEvent, MidiFileError, Result, TrackChunk};

/// Meter assumed when the first track has no time signature at its start.
pub const DEFAULT_BEATS_PER_BAR: u16 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct MidiFile {
  pub header: HeaderChunk,
  pub tracks: Vec<TrackChunk>,
}

impl MidiFile {
  /// The header track count saturates; `to_bytes` rejects more than `u16::MAX` tracks.
  pub fn new(format: u16, division: u16, tracks: Vec<TrackChunk>) -> MidiFile {
    MidiFile {
      header: HeaderChunk {
        format,
        number_of_tracks: u16::try_from(tracks.len()).unwrap_or(u16::MAX),
        division,
      },
      tracks,
    }
  }

  /// Beats per bar of the time signature at the start of the first track.
  pub fn beats_per_bar(&self) -> u16 {
    self
      .tracks
      .first()
      .and_then(|track| initial_beats_per_bar(&track.events))
      .unwrap_or(DEFAULT_BEATS_PER_BAR)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<MidiFile> {
    if bytes.len() < HeaderChunk::LEN {
      return Err(MidiFileError::FileStructurallyUnsound);
    }
    let header = HeaderChunk::decode(&bytes[..HeaderChunk::LEN])?;
    let chunks = split_chunks(&bytes[HeaderChunk::LEN..])?;

    if chunks.len() != usize::from(header.number_of_tracks) || (header.format == 0 && chunks.len() > 1) {
      return Err(MidiFileError::FileStructurallyUnsound);
    }

    let decode_all = |beats_per_bar: u16| {
      chunks
        .iter()
        .map(|chunk| TrackChunk::decode(chunk, beats_per_bar, header.division))
        .collect::<Result<Vec<TrackChunk>>>()
    };

    let mut tracks = decode_all(DEFAULT_BEATS_PER_BAR)?;
    let beats_per_bar = tracks
      .first()
      .and_then(|track| initial_beats_per_bar(&track.events))
      .unwrap_or(DEFAULT_BEATS_PER_BAR);
    if beats_per_bar != DEFAULT_BEATS_PER_BAR {
      tracks = decode_all(beats_per_bar)?;
    }

    debug!(
      "Decoded MIDI file with format {}, {} tracks and division {}",
      header.format, header.number_of_tracks, header.division
    );

    Ok(MidiFile { header, tracks })
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    let number_of_tracks = u16::try_from(self.tracks.len()).map_err(|_| MidiFileError::InvalidLength)?;
    let beats_per_bar = self.beats_per_bar();
    let mut out = Vec::new();
    let header = HeaderChunk {
      number_of_tracks,
      ..self.header
    };
    header.encode(&mut out);
    for track in self.tracks.iter() {
      track.encode(beats_per_bar, &mut out)?;
    }
    Ok(out)
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<MidiFile> {
    let path = path.as_ref();
    info!("Loading MIDI file from {} ...", path.display());
    let mut bytes = Vec::new();
    File::open(path)
      .and_then(|mut file| file.read_to_end(&mut bytes))
      .map_err(|err| MidiFileError::ReadFailure {
        reason: err.to_string(),
      })?;
    MidiFile::from_bytes(&bytes)
  }

  pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving MIDI file to {} ...", path.display());
    let bytes = self.to_bytes()?;
    File::create(path)
      .and_then(|mut file| file.write_all(&bytes))
      .map_err(|err| MidiFileError::WriteFailure {
        reason: err.to_string(),
      })
  }
}

fn initial_beats_per_bar(events: &[Event]) -> Option<u16> {
  events.iter().find_map(|event| match event {
    Event::Meta(MetaEvent {
      time,
      data: MetaData::TimeSignature(signature),
    }) if time.to_ticks(DEFAULT_BEATS_PER_BAR) == 0 => Some(u16::from(signature.get_beats_per_bar())),
    _ => None,
  })
}

/// Splits the bytes following the header into complete track chunks.
fn split_chunks(bytes: &[u8]) -> Result<Vec<&[u8]>> {
  let mut chunks = Vec::new();
  let mut decoder = Decoder::new(bytes);
  while !decoder.is_empty() {
    if decoder.remaining() < CHUNK_PREFIX_LEN {
      return Err(MidiFileError::FileStructurallyUnsound);
    }
    let start = decoder.position();
    decoder.next_bytes(4)?;
    let len = decoder.next_u32()? as usize;
    if len > decoder.remaining() {
      return Err(MidiFileError::InvalidLength);
    }
    decoder.next_bytes(len)?;
    chunks.push(&bytes[start..decoder.position()]);
  }
  Ok(chunks)
}

#[cfg(test)]
mod test {

  use std::env;

  use super::MidiFile;
  use crate::midi::{ChannelEvent, Event, MetaData, MetaEvent, MidiFileError, TrackChunk};
  use crate::time::{BarBeatTime, Tempo, TimeSignature};

  fn sample(beats_per_bar: u8) -> MidiFile {
    let start = BarBeatTime::start(96);
    let later = BarBeatTime::new(3, 2, 1, 96);
    let tempo = TrackChunk::new(vec![
      Event::from(MetaEvent::new(
        start,
        MetaData::TimeSignature(TimeSignature::new(beats_per_bar, 4)),
      )),
      Event::from(MetaEvent::new(start, MetaData::Tempo(Tempo::new(90)))),
      Event::from(MetaEvent::end_of_track(start)),
    ]);
    let notes = TrackChunk::new(vec![
      Event::from(MetaEvent::track_name(start, "Keys")),
      Event::from(ChannelEvent::note_on(later, 2, 64, 90)),
      Event::from(MetaEvent::end_of_track(later)),
    ]);
    MidiFile::new(1, 96, vec![tempo, notes])
  }

  #[test]
  pub fn bytes_round_trip() {
    let file = sample(4);
    let bytes = file.to_bytes().unwrap();
    assert_eq!(&bytes[..4], b"MThd");
    assert_eq!(MidiFile::from_bytes(&bytes), Ok(file));
  }

  #[test]
  pub fn beats_per_bar_from_first_track() {
    let file = sample(3);
    assert_eq!(file.beats_per_bar(), 3);
    let decoded = MidiFile::from_bytes(&file.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded.tracks[1].events[1].time(), BarBeatTime::new(3, 2, 1, 96));
  }

  #[test]
  pub fn too_short() {
    assert_eq!(
      MidiFile::from_bytes(b"MThd\0\0\0\x06\0\x01\0\x01\0"),
      Err(MidiFileError::FileStructurallyUnsound)
    );
  }

  #[test]
  pub fn track_count_mismatch() {
    let mut bytes = sample(4).to_bytes().unwrap();
    bytes[11] = 3;
    assert_eq!(MidiFile::from_bytes(&bytes), Err(MidiFileError::FileStructurallyUnsound));
  }

  #[test]
  pub fn truncated_chunk() {
    let mut bytes = sample(4).to_bytes().unwrap();
    bytes.truncate(bytes.len() - 1);
    assert_eq!(MidiFile::from_bytes(&bytes), Err(MidiFileError::InvalidLength));
    let mut bytes = sample(4).to_bytes().unwrap();
    bytes.extend_from_slice(b"MTr");
    assert_eq!(MidiFile::from_bytes(&bytes), Err(MidiFileError::FileStructurallyUnsound));
  }

  #[test]
  pub fn too_many_tracks() {
    let tracks = vec![TrackChunk::new(Vec::new()); usize::from(u16::MAX) + 1];
    let file = MidiFile::new(1, 96, tracks);
    assert_eq!(file.header.number_of_tracks, u16::MAX);
    assert_eq!(file.to_bytes(), Err(MidiFileError::InvalidLength));

    let tracks = vec![TrackChunk::new(vec![Event::from(MetaEvent::end_of_track(BarBeatTime::start(96)))]); 3];
    let bytes = MidiFile::new(1, 96, tracks).to_bytes().unwrap();
    assert_eq!(&bytes[10..12], &[0, 3]);
  }

  #[test]
  pub fn file_round_trip() {
    let path = env::temp_dir().join(format!("groove-core-{}.mid", uuid::Uuid::new_v4()));
    let file = sample(4);
    file.write_file(&path).unwrap();
    assert_eq!(MidiFile::from_file(&path), Ok(file));
    drop(std::fs::remove_file(&path));
  }

  #[test]
  pub fn missing_file() {
    match MidiFile::from_file("/does/not/exist.mid") {
      Err(MidiFileError::ReadFailure { .. }) => {}
      other => panic!("unexpected {:?}", other),
    }
  }
}
