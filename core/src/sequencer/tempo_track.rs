use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::midi::{Event, MetaData, MetaEvent, TrackChunk};
use crate::sequencer::container::EventContainer;
use crate::sequencer::dispatch::{CallbackId, Registrar};
use crate::time::{BarBeatTime, Tempo, TimeSignature};

pub const TEMPO_TRACK_NAME: &str = "Tempo";

fn same_kind(a: &MetaData, b: &MetaData) -> bool {
  match (a, b) {
    (MetaData::Tempo(_), MetaData::Tempo(_)) => true,
    (MetaData::TimeSignature(_), MetaData::TimeSignature(_)) => true,
    _ => false,
  }
}

/// The tempo map: tempo and time signature changes over time.
///
/// When the playback reaches a change the listener is called with it, which is
/// how tempo automation reaches the clock.
pub struct TempoTrack {
  callback_id: CallbackId,
  container: Arc<RwLock<EventContainer>>,
  registrar: Registrar,
}

impl TempoTrack {
  pub fn new<F>(start: BarBeatTime, registrar: Registrar, listener: F) -> TempoTrack
  where
    F: Fn(BarBeatTime, &MetaData) + Send + 'static,
  {
    let container = Arc::new(RwLock::new(EventContainer::new(TEMPO_TRACK_NAME, start)));
    let events = container.clone();
    let callback_id = CallbackId::new();
    registrar.register(callback_id, &[], move |time| {
      let changes: Vec<MetaData> = events
        .read()
        .events_for_time(&time)
        .into_iter()
        .filter(|event| event.is_tempo_map())
        .filter_map(|event| match event {
          Event::Meta(meta) => Some(meta.data.clone()),
          _ => None,
        })
        .collect();
      for data in changes.iter() {
        listener(time, data);
      }
    });

    TempoTrack {
      callback_id,
      container,
      registrar,
    }
  }

  pub fn insert_tempo(&self, time: BarBeatTime, tempo: Tempo) {
    self.insert(MetaEvent::new(time, MetaData::Tempo(tempo)));
  }

  pub fn insert_time_signature(&self, time: BarBeatTime, signature: TimeSignature) {
    self.insert(MetaEvent::new(time, MetaData::TimeSignature(signature)));
  }

  /// Inserts a tempo map event, replacing the one of the same kind at the same time.
  /// Other events are ignored.
  pub fn insert(&self, event: MetaEvent) {
    let time = event.time;
    {
      let mut container = self.container.write();
      let removed = container.remove_where(|other| match other {
        Event::Meta(other) => other.time == time && same_kind(&other.data, &event.data),
        _ => false,
      });
      let event = Event::from(event);
      if !event.is_tempo_map() {
        return;
      }
      if removed > 0 {
        debug!("Replacing tempo map event at {}", time);
      }
      container.append(event);
    }
    self.registrar.add_times(self.callback_id, &[time]);
  }

  pub fn add_events<I>(&self, events: I)
  where
    I: IntoIterator<Item = Event>,
  {
    for event in events {
      if let Event::Meta(meta) = event {
        self.insert(meta);
      }
    }
  }

  /// Removes every change, keeping the registration.
  pub fn clear(&self) {
    let start = self.container.read().end_of_track();
    let start = BarBeatTime::start(start.get_subbeat_divisor());
    *self.container.write() = EventContainer::new(TEMPO_TRACK_NAME, start);
  }

  /// Moves the changes to the same ticks under a meter of `to` beats per bar.
  pub fn retime(&self, from: u16, to: u16) {
    if from == to {
      return;
    }
    let convert = move |time: BarBeatTime| time.with_beats_per_bar(from, to);
    self.container.write().retime(convert);
    let times: Vec<BarBeatTime> = self
      .registrar
      .times(self.callback_id)
      .into_iter()
      .map(convert)
      .collect();
    self.registrar.set_times(self.callback_id, &times);
  }

  pub fn tempo_at(&self, time: BarBeatTime) -> Option<Tempo> {
    self.latest(time, |data| match data {
      MetaData::Tempo(tempo) => Some(*tempo),
      _ => None,
    })
  }

  pub fn time_signature_at(&self, time: BarBeatTime) -> Option<TimeSignature> {
    self.latest(time, |data| match data {
      MetaData::TimeSignature(signature) => Some(*signature),
      _ => None,
    })
  }

  fn latest<T, F>(&self, time: BarBeatTime, select: F) -> Option<T>
  where
    F: Fn(&MetaData) -> Option<T>,
  {
    self
      .container
      .read()
      .general_events()
      .iter()
      .filter(|event| event.time() <= time)
      .filter_map(|event| match event {
        Event::Meta(meta) => select(&meta.data).map(|value| (meta.time, value)),
        _ => None,
      })
      .max_by_key(|(time, _)| *time)
      .map(|(_, value)| value)
  }

  pub fn events(&self) -> Vec<Event> {
    self.container.read().events().cloned().collect()
  }

  pub fn chunk(&self) -> TrackChunk {
    let container = self.container.read();
    let mut events: Vec<Event> = container.events().cloned().collect();
    events.sort_by_key(Event::time);
    TrackChunk::new(events)
  }
}

impl Drop for TempoTrack {
  fn drop(&mut self) {
    self.registrar.deregister(self.callback_id);
  }
}

#[cfg(test)]
mod test {

  use std::sync::Arc;

  use parking_lot::Mutex;

  use super::TempoTrack;
  use crate::midi::MetaData;
  use crate::sequencer::dispatch::Registrar;
  use crate::time::{BarBeatTime, Tempo, TimeSignature};

  fn time(literal: &str) -> BarBeatTime {
    literal.parse().unwrap()
  }

  fn tempo_track(registrar: &Registrar) -> (TempoTrack, Arc<Mutex<Vec<MetaData>>>) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let listened = changes.clone();
    let track = TempoTrack::new(BarBeatTime::start(480), registrar.clone(), move |_, data| {
      listened.lock().push(data.clone())
    });
    (track, changes)
  }

  #[test]
  pub fn same_time_and_kind_is_replaced() {
    let registrar = Registrar::new();
    let (track, _) = tempo_track(&registrar);
    track.insert_tempo(time("1.1.1"), Tempo::new(100));
    track.insert_time_signature(time("1.1.1"), TimeSignature::new(3, 4));
    track.insert_tempo(time("1.1.1"), Tempo::new(140));
    track.insert_tempo(time("3.1.1"), Tempo::new(90));

    // name, three changes, end of track
    assert_eq!(track.events().len(), 5);
    assert_eq!(track.tempo_at(time("2.1.1")), Some(Tempo::new(140)));
    assert_eq!(track.tempo_at(time("3.1.1")), Some(Tempo::new(90)));
    assert_eq!(track.time_signature_at(time("5.1.1")), Some(TimeSignature::new(3, 4)));
  }

  #[test]
  pub fn automation() {
    let registrar = Registrar::new();
    let (track, changes) = tempo_track(&registrar);
    track.insert_tempo(time("2.1.1"), Tempo::new(100));
    registrar.dispatch(time("1.1.1"));
    assert!(changes.lock().is_empty());
    registrar.dispatch(time("2.1.1"));
    assert_eq!(*changes.lock(), vec![MetaData::Tempo(Tempo::new(100))]);
  }

  #[test]
  pub fn clear() {
    let registrar = Registrar::new();
    let (track, _) = tempo_track(&registrar);
    track.insert_tempo(time("2.1.1"), Tempo::new(100));
    track.clear();
    assert_eq!(track.tempo_at(time("4.1.1")), None);
    assert_eq!(track.events().len(), 2);
  }

  #[test]
  pub fn retime() {
    let registrar = Registrar::new();
    let (track, changes) = tempo_track(&registrar);
    track.insert_tempo(time("1.4.1"), Tempo::new(100));
    track.retime(4, 3);
    assert_eq!(track.tempo_at(time("1.3.1")), None);
    assert_eq!(track.tempo_at(time("2.1.1")), Some(Tempo::new(100)));

    registrar.dispatch(time("1.4.1"));
    assert!(changes.lock().is_empty());
    registrar.dispatch(time("2.1.1"));
    assert_eq!(*changes.lock(), vec![MetaData::Tempo(Tempo::new(100))]);
  }

  #[test]
  pub fn chunk_is_sorted() {
    let registrar = Registrar::new();
    let (track, _) = tempo_track(&registrar);
    track.insert_tempo(time("3.1.1"), Tempo::new(100));
    track.insert_tempo(time("1.1.1"), Tempo::new(120));
    let chunk = track.chunk();
    assert_eq!(chunk.name().unwrap().to_string(), "Tempo");
    let times: Vec<BarBeatTime> = chunk.events.iter().map(|event| event.time()).collect();
    assert_eq!(times, vec![time("1.1.1"), time("1.1.1"), time("3.1.1"), time("3.1.1")]);
  }
}
