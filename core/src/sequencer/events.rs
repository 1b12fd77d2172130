use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::sequencer::track::TrackId;
use crate::time::{BarBeatTime, Tempo, TimeSignature};

/// Notifications published by the sequencer to its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
  DidStart,

  DidStop,

  DidReset,

  DidJog(BarBeatTime),

  TempoChanged(Tempo),

  TimeSignatureChanged(TimeSignature),

  TrackAdded(TrackId),

  TrackRemoved(TrackId),

  MuteChanged(TrackId, bool),

  SoloChanged(TrackId, bool),
}

/// Fans out sequencer events to every live subscriber.
#[derive(Clone, Default)]
pub struct EventBus {
  subscribers: Arc<Mutex<Vec<Sender<SequencerEvent>>>>,
}

impl EventBus {
  pub fn new() -> EventBus {
    EventBus::default()
  }

  pub fn subscribe(&self) -> Receiver<SequencerEvent> {
    let (tx, rx) = crossbeam_channel::unbounded();
    self.subscribers.lock().push(tx);
    rx
  }

  /// Subscribers whose receiver was dropped are forgotten.
  pub fn publish(&self, event: SequencerEvent) {
    self
      .subscribers
      .lock()
      .retain(|tx| tx.send(event.clone()).is_ok());
  }

  pub fn subscribers(&self) -> usize {
    self.subscribers.lock().len()
  }
}
