use std::fmt;

use uuid::Uuid;

use crate::midi::meta::META_STATUS;
use crate::midi::{vlq, Decoder, MidiFileError, Result, Text};
use crate::time::BarBeatTime;

pub const NODE_EVENT_TYPE: u8 = 0x07;

/// The length of a node event must be encoded in at most this many bytes.
pub const MAX_LENGTH_BYTES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

impl Point {
  pub fn new(x: f64, y: f64) -> Point {
    Point { x, y }
  }
}

/// Where a node enters the scene and the direction it travels in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
  pub position: Point,
  pub vector: Point,
}

impl Placement {
  pub fn new(position: Point, vector: Point) -> Placement {
    Placement { position, vector }
  }

  /// UTF-8 text of the form `{{x, y}, {dx, dy}}`.
  pub fn to_bytes(&self) -> Vec<u8> {
    self.to_string().into_bytes()
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Placement> {
    let text = std::str::from_utf8(bytes).map_err(|_| MidiFileError::FileStructurallyUnsound)?;
    let values = text
      .replace('{', "")
      .replace('}', "")
      .split(',')
      .map(|value| value.trim().parse::<f64>())
      .collect::<std::result::Result<Vec<f64>, _>>()
      .map_err(|_| MidiFileError::FileStructurallyUnsound)?;

    match values.as_slice() {
      [x, y, dx, dy] => Ok(Placement::new(Point::new(*x, *y), Point::new(*dx, *dy))),
      _ => Err(MidiFileError::FileStructurallyUnsound),
    }
  }
}

impl fmt::Display for Placement {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(
      f,
      "{{{{{}, {}}}, {{{}, {}}}}}",
      self.position.x, self.position.y, self.vector.x, self.vector.y
    )
  }
}

/// Identifies a node by the loop that generated it and its own uuid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentifier {
  pub loop_id: Text,
  pub node_id: Uuid,
}

impl NodeIdentifier {
  pub fn new<T: Into<Text>>(loop_id: T, node_id: Uuid) -> NodeIdentifier {
    NodeIdentifier {
      loop_id: loop_id.into(),
      node_id,
    }
  }

  /// `u32 len, loop id, ':', 16 uuid bytes`
  pub fn to_bytes(&self) -> Vec<u8> {
    let loop_id = self.loop_id.as_bytes();
    let mut out = Vec::with_capacity(4 + loop_id.len() + 17);
    out.extend_from_slice(&(loop_id.len() as u32).to_be_bytes());
    out.extend_from_slice(loop_id);
    out.push(b':');
    out.extend_from_slice(self.node_id.as_bytes());
    out
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<NodeIdentifier> {
    let mut decoder = Decoder::new(bytes);
    let len = decoder.next_u32()? as usize;
    let loop_id = decoder.next_bytes(len)?;
    if decoder.next_byte()? != b':' {
      return Err(MidiFileError::FileStructurallyUnsound);
    }
    let node_id = Uuid::from_slice(decoder.next_bytes(16)?)
      .map_err(|_| MidiFileError::FileStructurallyUnsound)?;
    if !decoder.is_empty() {
      return Err(MidiFileError::InvalidLength);
    }
    Ok(NodeIdentifier {
      loop_id: Text::from(loop_id),
      node_id,
    })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
  Add {
    identifier: NodeIdentifier,
    placement: Placement,
  },
  Remove {
    identifier: NodeIdentifier,
  },
}

impl NodeData {
  pub fn identifier(&self) -> &NodeIdentifier {
    match self {
      NodeData::Add { identifier, .. } | NodeData::Remove { identifier } => identifier,
    }
  }

  /// `u32 len, identifier` followed for additions by `u8 len, placement`.
  pub fn to_bytes(&self) -> Result<Vec<u8>> {
    let identifier = self.identifier().to_bytes();
    let mut out = Vec::with_capacity(identifier.len() + 64);
    out.extend_from_slice(&(identifier.len() as u32).to_be_bytes());
    out.extend_from_slice(&identifier);
    if let NodeData::Add { placement, .. } = self {
      let placement = placement.to_bytes();
      if placement.len() > usize::from(u8::max_value()) {
        return Err(MidiFileError::InvalidLength);
      }
      out.push(placement.len() as u8);
      out.extend_from_slice(&placement);
    }
    Ok(out)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<NodeData> {
    let mut decoder = Decoder::new(bytes);
    let len = decoder.next_u32()? as usize;
    let identifier = NodeIdentifier::from_bytes(decoder.next_bytes(len)?)?;
    if decoder.is_empty() {
      return Ok(NodeData::Remove { identifier });
    }
    let len = usize::from(decoder.next_byte()?);
    let placement = Placement::from_bytes(decoder.next_bytes(len)?)?;
    if !decoder.is_empty() {
      return Err(MidiFileError::InvalidLength);
    }
    Ok(NodeData::Add {
      identifier,
      placement,
    })
  }
}

/// Addition or removal of a node, stored as meta event `0x07`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEvent {
  pub time: BarBeatTime,
  pub data: NodeData,
}

impl NodeEvent {
  pub fn add(time: BarBeatTime, identifier: NodeIdentifier, placement: Placement) -> NodeEvent {
    NodeEvent {
      time,
      data: NodeData::Add {
        identifier,
        placement,
      },
    }
  }

  pub fn remove(time: BarBeatTime, identifier: NodeIdentifier) -> NodeEvent {
    NodeEvent {
      time,
      data: NodeData::Remove { identifier },
    }
  }

  /// `FF 07 len data`, failing with `InvalidLength` when `len` needs more than two bytes.
  pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
    let data = self.data.to_bytes()?;
    let len = vlq::encode(data.len() as u64);
    if len.len() > MAX_LENGTH_BYTES {
      return Err(MidiFileError::InvalidLength);
    }
    out.push(META_STATUS);
    out.push(NODE_EVENT_TYPE);
    out.extend_from_slice(&len);
    out.extend_from_slice(&data);
    Ok(())
  }

  /// Decodes the payload of a node event whose length took `length_bytes` bytes.
  pub fn decode(data: &[u8], length_bytes: usize, time: BarBeatTime) -> Result<NodeEvent> {
    if length_bytes > MAX_LENGTH_BYTES {
      return Err(MidiFileError::InvalidLength);
    }
    Ok(NodeEvent {
      time,
      data: NodeData::from_bytes(data)?,
    })
  }
}
