use failure::Fail;

pub mod channel;
pub mod chunk;
pub mod decoder;
pub mod event;
pub mod file;
pub mod meta;
pub mod node;
pub mod text;
pub mod vlq;

pub use self::channel::{ChannelEvent, ChannelKind};
pub use self::chunk::{HeaderChunk, TrackChunk};
pub use self::decoder::Decoder;
pub use self::event::Event;
pub use self::file::MidiFile;
pub use self::meta::{MetaData, MetaEvent};
pub use self::node::{NodeData, NodeEvent, NodeIdentifier, Placement, Point};
pub use self::text::Text;
pub use self::vlq::VariableLengthQuantity;

#[derive(Debug, Fail, Clone, PartialEq)]
pub enum MidiFileError {
  #[fail(display = "Invalid chunk header")]
  InvalidHeader,

  #[fail(display = "Invalid length")]
  InvalidLength,

  #[fail(display = "Unsupported event")]
  UnsupportedEvent,

  #[fail(display = "File structurally unsound")]
  FileStructurallyUnsound,

  #[fail(display = "Missing event")]
  MissingEvent,

  #[fail(display = "Failed to read the MIDI file: {}", reason)]
  ReadFailure { reason: String },

  #[fail(display = "Failed to write the MIDI file: {}", reason)]
  WriteFailure { reason: String },
}

pub type Result<T> = std::result::Result<T, MidiFileError>;
