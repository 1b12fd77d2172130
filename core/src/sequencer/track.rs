use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::color::TrackColor;
use crate::midi::{
  ChannelEvent, ChannelKind, Event, MetaData, MetaEvent, NodeData, NodeEvent, NodeIdentifier, Point, Text, TrackChunk,
};
use crate::sequencer::container::EventContainer;
use crate::sequencer::dispatch::{CallbackId, Registrar};
use crate::time::BarBeatTime;

/// Receives the note events of the tracks being played.
pub trait PlaybackSink: Send + Sync {
  fn note_on(&self, channel: u8, note: u8, velocity: u8);
  fn note_off(&self, channel: u8, note: u8, velocity: u8);
}

/// Receives the node additions and removals of the tracks being played.
pub trait PlacementSink: Send + Sync {
  fn place(&self, id: &NodeIdentifier, position: Point, vector: Point);
  fn remove(&self, id: &NodeIdentifier);
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct TrackId(Uuid);

impl TrackId {
  pub fn new() -> TrackId {
    TrackId(Uuid::new_v4())
  }
}

impl Default for TrackId {
  fn default() -> Self {
    TrackId::new()
  }
}

struct TrackState {
  container: EventContainer,
  color: TrackColor,
  ended: bool,
  recording: bool,
  muted: bool,
  soloed: bool,
  silenced: bool,
  recorded_times: Vec<BarBeatTime>,
}

impl TrackState {
  fn is_audible(&self) -> bool {
    !self.muted && !self.silenced
  }
}

/// Forwards the events of a track to the sinks as their times are reached.
struct TrackPlayer {
  state: Arc<RwLock<TrackState>>,
  playback: Arc<dyn PlaybackSink>,
  placement: Arc<dyn PlacementSink>,
}

impl TrackPlayer {
  fn dispatch(&self, time: BarBeatTime) {
    let (events, audible) = {
      let state = self.state.read();
      if state.ended {
        return;
      }
      let events: Vec<Event> = state
        .container
        .events_for_time(&time)
        .into_iter()
        .cloned()
        .collect();
      (events, state.is_audible())
    };

    for event in events {
      match event {
        Event::Channel(channel) => {
          if audible {
            self.play(&channel);
          }
        }
        Event::Node(node) => self.place(&node),
        Event::Meta(MetaEvent {
          data: MetaData::EndOfTrack,
          time: end,
        }) => {
          let mut state = self.state.write();
          if !state.recording && end == time {
            debug!("Track '{}' ended at {}", state.container.track_name(), time);
            state.ended = true;
          }
        }
        Event::Meta(_) => {}
      }
    }
  }

  fn play(&self, event: &ChannelEvent) {
    let channel = event.channel();
    let note = event.data1();
    match (event.kind(), event.data2()) {
      (ChannelKind::NoteOn, Some(0)) => self.playback.note_off(channel, note, 0),
      (ChannelKind::NoteOn, Some(velocity)) => self.playback.note_on(channel, note, velocity),
      (ChannelKind::NoteOff, Some(velocity)) => self.playback.note_off(channel, note, velocity),
      (kind, _) => warn!("Skipping {:?} event at {}, only notes are played", kind, event.time()),
    }
  }

  fn place(&self, event: &NodeEvent) {
    trace!("Node event at {}: {:?}", event.time, event.data);
    match &event.data {
      NodeData::Add {
        identifier,
        placement,
      } => self.placement.place(identifier, placement.position, placement.vector),
      NodeData::Remove { identifier } => self.placement.remove(identifier),
    }
  }
}

/// A musical track.
///
/// Registers its event times with the [`Registrar`] and forwards the events to
/// the sinks when they are dispatched. Dropping the track deregisters it.
pub struct Track {
  id: TrackId,
  callback_id: CallbackId,
  state: Arc<RwLock<TrackState>>,
  registrar: Registrar,
}

impl Track {
  pub fn new<T: Into<Text>>(
    name: T,
    color: TrackColor,
    start: BarBeatTime,
    registrar: Registrar,
    playback: Arc<dyn PlaybackSink>,
    placement: Arc<dyn PlacementSink>,
  ) -> Track {
    let state = Arc::new(RwLock::new(TrackState {
      container: EventContainer::new(name, start),
      color,
      ended: false,
      recording: false,
      muted: false,
      soloed: false,
      silenced: false,
      recorded_times: Vec::new(),
    }));

    let player = TrackPlayer {
      state: state.clone(),
      playback,
      placement,
    };
    let callback_id = CallbackId::new();
    registrar.register(callback_id, &[], move |time| player.dispatch(time));

    Track {
      id: TrackId::new(),
      callback_id,
      state,
      registrar,
    }
  }

  pub fn id(&self) -> TrackId {
    self.id
  }

  pub fn name(&self) -> String {
    self.state.read().container.track_name().to_string()
  }

  pub fn set_name<T: Into<Text>>(&self, name: T) {
    self.state.write().container.set_track_name(name);
  }

  pub fn color(&self) -> TrackColor {
    self.state.read().color
  }

  pub fn set_color(&self, color: TrackColor) {
    self.state.write().color = color;
  }

  /// Appends events and registers the times at which they have to be dispatched.
  pub fn add_events<I>(&self, events: I)
  where
    I: IntoIterator<Item = Event>,
  {
    let times = {
      let mut state = self.state.write();
      let mut times = Vec::new();
      for event in events {
        if let Event::Channel(_) | Event::Node(_) = event {
          times.push(event.time());
        }
        state.container.append(event);
      }
      state.container.validate();
      times.push(state.container.end_of_track());
      times
    };
    self.registrar.add_times(self.callback_id, &times);
  }

  pub fn events(&self) -> Vec<Event> {
    self.state.read().container.events().cloned().collect()
  }

  pub fn end_of_track(&self) -> BarBeatTime {
    self.state.read().container.end_of_track()
  }

  pub fn registered_times(&self) -> Vec<BarBeatTime> {
    self.registrar.times(self.callback_id)
  }

  /// Invokes the track behaviour for `time` on the calling thread.
  pub fn dispatch_now(&self, time: BarBeatTime) {
    self.registrar.dispatch_one(self.callback_id, time);
  }

  pub fn is_ended(&self) -> bool {
    self.state.read().ended
  }

  pub fn is_recording(&self) -> bool {
    self.state.read().recording
  }

  /// Recorded events are scheduled for playback once recording stops.
  pub fn set_recording(&self, recording: bool) {
    let times = {
      let mut state = self.state.write();
      state.recording = recording;
      if recording {
        Vec::new()
      } else {
        let mut times: Vec<BarBeatTime> = state.recorded_times.drain(..).collect();
        times.push(state.container.end_of_track());
        times
      }
    };
    if !times.is_empty() {
      self.registrar.add_times(self.callback_id, &times);
    }
  }

  /// Appends an event observed while recording. Returns false when not recording.
  pub fn record(&self, event: Event) -> bool {
    let mut state = self.state.write();
    if !state.recording {
      return false;
    }
    if let Event::Channel(_) | Event::Node(_) = event {
      state.recorded_times.push(event.time());
    }
    state.container.append(event);
    true
  }

  pub fn is_muted(&self) -> bool {
    self.state.read().muted
  }

  pub fn set_muted(&self, muted: bool) {
    self.state.write().muted = muted;
  }

  pub fn is_soloed(&self) -> bool {
    self.state.read().soloed
  }

  pub fn set_soloed(&self, soloed: bool) {
    self.state.write().soloed = soloed;
  }

  /// Silenced while another track is soloed.
  pub fn set_silenced(&self, silenced: bool) {
    self.state.write().silenced = silenced;
  }

  pub fn is_audible(&self) -> bool {
    self.state.read().is_audible()
  }

  /// Moves every event to the bar, beat and subbeat at the same tick under a
  /// meter of `to` beats per bar, and registers the moved times.
  pub fn retime(&self, from: u16, to: u16) {
    if from == to {
      return;
    }
    let convert = move |time: BarBeatTime| time.with_beats_per_bar(from, to);
    {
      let mut state = self.state.write();
      state.container.retime(convert);
      for time in state.recorded_times.iter_mut() {
        *time = convert(*time);
      }
    }
    let times: Vec<BarBeatTime> = self
      .registrar
      .times(self.callback_id)
      .into_iter()
      .map(convert)
      .collect();
    self.registrar.set_times(self.callback_id, &times);
  }

  /// Clears the ended state when the playback moves before the end of the track.
  pub fn jogged(&self, to: BarBeatTime) {
    let mut state = self.state.write();
    if state.ended && to < state.container.end_of_track() {
      state.ended = false;
    }
  }

  /// The events as a track chunk, sorted by time and framed by the track name
  /// and the end of track. A recording track ends no earlier than `now`.
  pub fn chunk(&self, now: BarBeatTime) -> TrackChunk {
    let state = self.state.read();
    let mut general: Vec<Event> = state.container.general_events().to_vec();
    general.sort_by_key(Event::time);

    let start = BarBeatTime::start(now.get_subbeat_divisor());
    let end = match state.recording {
      true => state.container.end_of_track().max(now),
      false => state.container.end_of_track(),
    };

    let mut events = Vec::with_capacity(general.len() + 2);
    events.push(Event::from(MetaEvent::track_name(start, state.container.track_name())));
    events.extend(general);
    events.push(Event::from(MetaEvent::end_of_track(end)));
    TrackChunk::new(events)
  }
}

impl Drop for Track {
  fn drop(&mut self) {
    self.registrar.deregister(self.callback_id);
  }
}

#[cfg(test)]
pub mod test {

  use std::sync::Arc;

  use parking_lot::Mutex;
  use uuid::Uuid;

  use super::{PlacementSink, PlaybackSink, Track};
  use crate::color::TrackColor;
  use crate::midi::{ChannelEvent, Event, MetaEvent, NodeEvent, NodeIdentifier, Placement, Point};
  use crate::sequencer::dispatch::Registrar;
  use crate::time::BarBeatTime;

  #[derive(Debug, Clone, PartialEq)]
  pub enum Output {
    NoteOn(u8, u8, u8),
    NoteOff(u8, u8, u8),
    Place(NodeIdentifier, Point, Point),
    Remove(NodeIdentifier),
  }

  #[derive(Default)]
  pub struct RecordingSink {
    pub outputs: Mutex<Vec<Output>>,
  }

  impl RecordingSink {
    pub fn take(&self) -> Vec<Output> {
      self.outputs.lock().drain(..).collect()
    }
  }

  impl PlaybackSink for RecordingSink {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
      self.outputs.lock().push(Output::NoteOn(channel, note, velocity));
    }

    fn note_off(&self, channel: u8, note: u8, velocity: u8) {
      self.outputs.lock().push(Output::NoteOff(channel, note, velocity));
    }
  }

  impl PlacementSink for RecordingSink {
    fn place(&self, id: &NodeIdentifier, position: Point, vector: Point) {
      self.outputs.lock().push(Output::Place(id.clone(), position, vector));
    }

    fn remove(&self, id: &NodeIdentifier) {
      self.outputs.lock().push(Output::Remove(id.clone()));
    }
  }

  fn time(literal: &str) -> BarBeatTime {
    literal.parse().unwrap()
  }

  fn track(registrar: &Registrar) -> (Track, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let track = Track::new(
      "Piano",
      TrackColor::Celery,
      BarBeatTime::start(480),
      registrar.clone(),
      sink.clone(),
      sink.clone(),
    );
    (track, sink)
  }

  #[test]
  pub fn add_events_registers_times() {
    let registrar = Registrar::new();
    let (track, _sink) = track(&registrar);
    track.add_events(vec![
      Event::from(ChannelEvent::note_on(time("1.1.1"), 0, 60, 100)),
      Event::from(MetaEvent::track_name(time("1.1.1"), "Keys")),
      Event::from(ChannelEvent::note_off(time("1.2.1"), 0, 60, 0)),
    ]);
    assert_eq!(track.name(), "Keys");
    assert_eq!(track.registered_times(), vec![time("1.1.1"), time("1.2.1")]);
    assert_eq!(track.end_of_track(), time("1.2.1"));
  }

  #[test]
  pub fn dispatch_forwards_notes_and_nodes() {
    let registrar = Registrar::new();
    let (track, sink) = track(&registrar);
    let id = NodeIdentifier::new("loop", Uuid::nil());
    let placement = Placement::new(Point::new(1.0, 2.0), Point::new(3.0, 4.0));
    track.add_events(vec![
      Event::from(ChannelEvent::note_on(time("1.1.1"), 1, 60, 100)),
      Event::from(NodeEvent::add(time("1.1.1"), id.clone(), placement)),
      Event::from(ChannelEvent::note_on(time("1.2.1"), 1, 60, 0)),
      Event::from(ChannelEvent::control_change(time("1.2.1"), 1, 7, 100)),
      Event::from(NodeEvent::remove(time("1.3.1"), id.clone())),
    ]);

    registrar.dispatch(time("1.1.1"));
    registrar.dispatch(time("1.2.1"));
    registrar.dispatch(time("1.3.1"));
    assert_eq!(
      sink.take(),
      vec![
        Output::NoteOn(1, 60, 100),
        Output::Place(id.clone(), Point::new(1.0, 2.0), Point::new(3.0, 4.0)),
        Output::NoteOff(1, 60, 0),
        Output::Remove(id),
      ]
    );
  }

  #[test]
  pub fn end_of_track_and_jog() {
    let registrar = Registrar::new();
    let (track, sink) = track(&registrar);
    track.add_events(vec![
      Event::from(ChannelEvent::note_on(time("1.1.1"), 0, 60, 100)),
      Event::from(MetaEvent::end_of_track(time("2.1.1"))),
    ]);
    registrar.dispatch(time("2.1.1"));
    assert!(track.is_ended());

    registrar.dispatch(time("1.1.1"));
    assert!(sink.take().is_empty());

    track.jogged(time("3.1.1"));
    assert!(track.is_ended());
    track.jogged(time("1.1.1"));
    assert!(!track.is_ended());
    registrar.dispatch(time("1.1.1"));
    assert_eq!(sink.take().len(), 1);
  }

  #[test]
  pub fn mute_and_silence() {
    let registrar = Registrar::new();
    let (track, sink) = track(&registrar);
    track.add_events(vec![
      Event::from(ChannelEvent::note_on(time("1.1.1"), 0, 60, 100)),
      Event::from(MetaEvent::end_of_track(time("2.1.1"))),
    ]);
    track.set_muted(true);
    registrar.dispatch(time("1.1.1"));
    track.set_muted(false);
    track.set_silenced(true);
    registrar.dispatch(time("1.1.1"));
    assert!(sink.take().is_empty());
    track.set_silenced(false);
    assert!(track.is_audible());
    track.dispatch_now(time("1.1.1"));
    assert_eq!(sink.take().len(), 1);
  }

  #[test]
  pub fn recording() {
    let registrar = Registrar::new();
    let (track, sink) = track(&registrar);
    assert!(!track.record(Event::from(ChannelEvent::note_on(time("1.1.1"), 0, 60, 100))));

    track.set_recording(true);
    assert!(track.record(Event::from(ChannelEvent::note_on(time("2.1.1"), 0, 62, 90))));
    registrar.dispatch(time("2.1.1"));
    assert!(sink.take().is_empty());
    assert!(!track.is_ended());

    track.set_recording(false);
    assert_eq!(track.registered_times(), vec![time("2.1.1")]);
    registrar.dispatch(time("2.1.1"));
    assert_eq!(sink.take(), vec![Output::NoteOn(0, 62, 90)]);
  }

  #[test]
  pub fn chunk_with_live_end() {
    let registrar = Registrar::new();
    let (track, _sink) = track(&registrar);
    track.add_events(vec![
      Event::from(ChannelEvent::note_on(time("1.3.1"), 0, 62, 100)),
      Event::from(ChannelEvent::note_on(time("1.2.1"), 0, 60, 100)),
    ]);
    let chunk = track.chunk(time("4.1.1"));
    assert_eq!(chunk.name().unwrap().to_string(), "Piano");
    assert_eq!(chunk.events.len(), 4);
    assert_eq!(chunk.events[1].time(), time("1.2.1"));
    assert_eq!(chunk.events[3].time(), time("1.3.1"));

    track.set_recording(true);
    let chunk = track.chunk(time("4.1.1"));
    assert_eq!(chunk.events[3].time(), time("4.1.1"));
  }

  #[test]
  pub fn drop_deregisters() {
    let registrar = Registrar::new();
    let (track, sink) = track(&registrar);
    track.add_events(vec![Event::from(ChannelEvent::note_on(time("1.1.1"), 0, 60, 100))]);
    drop(track);
    registrar.dispatch(time("1.1.1"));
    assert!(sink.take().is_empty());
  }
}
