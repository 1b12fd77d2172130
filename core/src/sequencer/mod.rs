pub mod container;
pub mod dispatch;
pub mod events;
pub mod tempo_track;
pub mod track;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use failure::Fail;
use log::{debug, info, trace};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::color::TrackColor;
use crate::config::Config;
use crate::midi::{Event, MetaData, MidiFile, MidiFileError, Text};
use crate::time::{BarBeatTime, BarBeatTracker, ClockError, ClockSource, Pulse, Tempo, TimeSignature, TrackerLock};

pub use self::container::EventContainer;
pub use self::dispatch::{CallbackId, DispatcherError, Registrar, TimeDispatcher, TimePoster};
pub use self::events::{EventBus, SequencerEvent};
pub use self::tempo_track::TempoTrack;
pub use self::track::{PlacementSink, PlaybackSink, Track, TrackId};

pub const MIDI_FILE_FORMAT: u16 = 1;

#[derive(Debug, Fail)]
pub enum SequencerError {
  #[fail(display = "Invalid configuration: {}", reason)]
  InvalidConfig { reason: String },

  #[fail(display = "Invalid tempo: {} bpm", bpm)]
  InvalidTempo { bpm: u16 },

  #[fail(display = "Unknown track")]
  UnknownTrack,

  #[fail(display = "Unknown tracker")]
  UnknownTracker,

  #[fail(display = "{}", _0)]
  Clock(#[cause] ClockError),

  #[fail(display = "{}", _0)]
  Dispatcher(#[cause] DispatcherError),

  #[fail(display = "{}", _0)]
  File(#[cause] MidiFileError),
}

impl From<ClockError> for SequencerError {
  fn from(error: ClockError) -> Self {
    SequencerError::Clock(error)
  }
}

impl From<DispatcherError> for SequencerError {
  fn from(error: DispatcherError) -> Self {
    SequencerError::Dispatcher(error)
  }
}

impl From<MidiFileError> for SequencerError {
  fn from(error: MidiFileError) -> Self {
    SequencerError::File(error)
  }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct TrackerId(Uuid);

impl TrackerId {
  pub fn new() -> TrackerId {
    TrackerId(Uuid::new_v4())
  }
}

impl Default for TrackerId {
  fn default() -> Self {
    TrackerId::new()
  }
}

/// The authoritative tracker and the trackers depending on it.
///
/// Advanced by the clock thread, so every access goes through its lock.
struct Timeline {
  main: BarBeatTracker,
  trackers: HashMap<TrackerId, TrackerLock>,
  last_posted: Option<BarBeatTime>,
  poster: TimePoster,
}

impl Timeline {
  fn pulse(&mut self) {
    self.main.pulse();
    for tracker in self.trackers.values() {
      tracker.write().pulse();
    }
    let time = self.main.time();
    self.post(time);
  }

  fn post(&mut self, time: BarBeatTime) {
    self.poster.post(time);
    self.last_posted = Some(time);
  }

  /// Posts the current time unless it was the last one posted.
  fn post_current(&mut self) {
    let time = self.main.time();
    if self.last_posted != Some(time) {
      self.post(time);
    }
  }

  fn set_time(&mut self, time: BarBeatTime) {
    self.main.set_time(time);
    self.synchronize_all();
  }

  fn set_beats_per_bar(&mut self, beats_per_bar: u16) {
    self.main.set_beats_per_bar(beats_per_bar);
    self.synchronize_all();
  }

  fn reset(&mut self) {
    self.main.reset();
    self.synchronize_all();
  }

  fn synchronize_all(&mut self) {
    for tracker in self.trackers.values() {
      tracker.write().synchronize(&self.main);
    }
    self.last_posted = None;
  }
}

fn validate(config: &Config) -> Result<TimeSignature, SequencerError> {
  let sequencer = &config.sequencer;
  let invalid = |reason: &str| {
    Err(SequencerError::InvalidConfig {
      reason: reason.to_string(),
    })
  };
  if sequencer.resolution == 0 {
    return invalid("the resolution must be positive");
  }
  if sequencer.tempo == 0 {
    return invalid("the tempo must be positive");
  }
  if sequencer.beats_per_bar == 0 {
    return invalid("the beats per bar must be positive");
  }
  if !sequencer.beat_unit.is_power_of_two() {
    return invalid("the beat unit must be a power of two");
  }
  Ok(TimeSignature::new(sequencer.beats_per_bar, sequencer.beat_unit))
}

/// Coordinates the clock, the trackers and the tracks of one document.
///
/// Clock pulses advance the authoritative tracker on the clock thread, and the
/// times reached are dispatched to the tracks on the dispatcher thread.
pub struct Sequencer {
  resolution: u16,
  signature: TimeSignature,
  clock: ClockSource,
  timeline: Arc<Mutex<Timeline>>,
  registrar: Registrar,
  dispatcher: TimeDispatcher,
  tempo_track: TempoTrack,
  tracks: Vec<Track>,
  tracks_created: usize,
  bus: EventBus,
}

impl Sequencer {
  pub fn new(config: &Config) -> Result<Sequencer, SequencerError> {
    let signature = validate(config)?;
    let resolution = config.sequencer.resolution;
    let tempo = Tempo::new(config.sequencer.tempo);
    let start = BarBeatTime::start(resolution);

    let registrar = Registrar::new();
    let dispatcher = TimeDispatcher::new(registrar.clone())?;

    let timeline = Arc::new(Mutex::new(Timeline {
      main: BarBeatTracker::new(resolution, u16::from(signature.get_beats_per_bar())),
      trackers: HashMap::new(),
      last_posted: None,
      poster: dispatcher.poster(),
    }));

    let mut clock = ClockSource::new(resolution, tempo, config.clock.clone());
    let pulse_timeline = timeline.clone();
    clock.set_handler(move |pulse| match pulse {
      Pulse::Clock => pulse_timeline.lock().pulse(),
      Pulse::Start | Pulse::Stop => trace!("Clock {:?} (0x{:02x})", pulse, pulse.status()),
    });

    let bus = EventBus::new();
    let tempo_control = clock.tempo_control();
    let automation_bus = bus.clone();
    let tempo_track = TempoTrack::new(start, registrar.clone(), move |time, data| match data {
      MetaData::Tempo(tempo) => {
        if tempo_control.tempo() != *tempo {
          debug!("Tempo changed to {} bpm at {}", tempo.get_value(), time);
          tempo_control.set_tempo(*tempo);
          automation_bus.publish(SequencerEvent::TempoChanged(*tempo));
        }
      }
      MetaData::TimeSignature(signature) => {
        automation_bus.publish(SequencerEvent::TimeSignatureChanged(*signature));
      }
      _ => {}
    });
    tempo_track.insert_time_signature(start, signature);
    tempo_track.insert_tempo(start, tempo);

    info!(
      "Sequencer ready at {} ppqn, {} bpm and {}/{}",
      resolution,
      tempo.get_value(),
      signature.get_beats_per_bar(),
      signature.get_beat_unit()
    );

    Ok(Sequencer {
      resolution,
      signature,
      clock,
      timeline,
      registrar,
      dispatcher,
      tempo_track,
      tracks: Vec::new(),
      tracks_created: 0,
      bus,
    })
  }

  pub fn resolution(&self) -> u16 {
    self.resolution
  }

  pub fn start_time(&self) -> BarBeatTime {
    BarBeatTime::start(self.resolution)
  }

  pub fn current_time(&self) -> BarBeatTime {
    self.timeline.lock().main.time()
  }

  pub fn is_playing(&self) -> bool {
    self.clock.is_running()
  }

  pub fn tempo(&self) -> Tempo {
    self.clock.tempo()
  }

  pub fn time_signature(&self) -> TimeSignature {
    self.signature
  }

  /// Registration of callbacks for times reached by the playback.
  pub fn registrar(&self) -> Registrar {
    self.registrar.clone()
  }

  pub fn subscribe(&self) -> Receiver<SequencerEvent> {
    self.bus.subscribe()
  }

  /// Starts the clock. The events at the current time are dispatched right away.
  pub fn play(&mut self) -> Result<(), SequencerError> {
    if self.clock.is_running() {
      return Ok(());
    }
    info!("Playing from {} ...", self.current_time());
    self.timeline.lock().post_current();
    self.clock.start()?;
    self.bus.publish(SequencerEvent::DidStart);
    Ok(())
  }

  pub fn stop(&mut self) -> Result<(), SequencerError> {
    if !self.clock.is_running() {
      return Ok(());
    }
    self.clock.stop()?;
    info!("Stopped at {}", self.current_time());
    self.bus.publish(SequencerEvent::DidStop);
    Ok(())
  }

  /// Moves every tracker back to the start. The clock must be stopped.
  pub fn reset(&mut self) -> Result<(), SequencerError> {
    if self.clock.is_running() {
      return Err(ClockError::State { operation: "reset" }.into());
    }
    self.clock.reset()?;
    self.timeline.lock().reset();
    let start = self.start_time();
    for track in self.tracks.iter() {
      track.jogged(start);
    }
    debug!("Reset to {}", start);
    self.bus.publish(SequencerEvent::DidReset);
    Ok(())
  }

  pub fn jog(&mut self, to: BarBeatTime) {
    let mut timeline = self.timeline.lock();
    timeline.set_time(to);
    let time = timeline.main.time();
    for track in self.tracks.iter() {
      track.jogged(time);
    }
    if self.clock.is_running() {
      timeline.post(time);
    }
    drop(timeline);
    debug!("Jogged to {}", time);
    self.bus.publish(SequencerEvent::DidJog(time));
  }

  /// Drives the playback by `pulses` clock pulses on the calling thread and
  /// waits for the reached times to be dispatched. The clock must be stopped.
  pub fn advance(&mut self, pulses: u64) -> Result<(), SequencerError> {
    if self.clock.is_running() {
      return Err(ClockError::State { operation: "advance" }.into());
    }
    self.timeline.lock().post_current();
    self.clock.emit_pulses(pulses)?;
    self.dispatcher.flush();
    Ok(())
  }

  /// Blocks until the times reached so far have been dispatched.
  pub fn flush(&self) {
    self.dispatcher.flush();
  }

  /// Changes the clock tempo and records the change at the current time.
  pub fn set_tempo(&mut self, bpm: u16) -> Result<(), SequencerError> {
    if bpm == 0 {
      return Err(SequencerError::InvalidTempo { bpm });
    }
    let tempo = Tempo::new(bpm);
    self.clock.set_tempo(tempo);
    self.tempo_track.insert_tempo(self.current_time(), tempo);
    self.bus.publish(SequencerEvent::TempoChanged(tempo));
    Ok(())
  }

  /// Changes the meter of the whole document.
  ///
  /// The playback position and the events of every track keep their distance in
  /// ticks from the start, so they land on new bars and beats.
  pub fn set_time_signature(&mut self, signature: TimeSignature) {
    let beats_per_bar = u16::from(signature.get_beats_per_bar());
    let mut timeline = self.timeline.lock();
    let previous = timeline.main.beats_per_bar();
    if previous != beats_per_bar {
      debug!("Moving events from {} to {} beats per bar", previous, beats_per_bar);
      for track in self.tracks.iter() {
        track.retime(previous, beats_per_bar);
      }
      self.tempo_track.retime(previous, beats_per_bar);
    }
    timeline.set_beats_per_bar(beats_per_bar);
    drop(timeline);

    self.signature = signature;
    self.tempo_track.insert_time_signature(self.start_time(), signature);
    self.bus.publish(SequencerEvent::TimeSignatureChanged(signature));
  }

  pub fn tempo_track(&self) -> &TempoTrack {
    &self.tempo_track
  }

  pub fn tracks(&self) -> &[Track] {
    &self.tracks
  }

  pub fn track(&self, id: TrackId) -> Option<&Track> {
    self.tracks.iter().find(|track| track.id() == id)
  }

  fn existing_track(&self, id: TrackId) -> Result<&Track, SequencerError> {
    self.track(id).ok_or(SequencerError::UnknownTrack)
  }

  pub fn add_track<T: Into<Text>>(
    &mut self,
    name: T,
    playback: Arc<dyn PlaybackSink>,
    placement: Arc<dyn PlacementSink>,
  ) -> TrackId {
    let color = TrackColor::for_index(self.tracks_created);
    self.tracks_created += 1;
    let track = Track::new(
      name,
      color,
      self.start_time(),
      self.registrar.clone(),
      playback,
      placement,
    );
    track.set_silenced(self.tracks.iter().any(Track::is_soloed));
    let id = track.id();
    debug!("Adding track '{}'", track.name());
    self.tracks.push(track);
    self.bus.publish(SequencerEvent::TrackAdded(id));
    id
  }

  /// Once removed, the track will not receive any more events.
  pub fn remove_track(&mut self, id: TrackId) -> Result<(), SequencerError> {
    let index = self
      .tracks
      .iter()
      .position(|track| track.id() == id)
      .ok_or(SequencerError::UnknownTrack)?;
    let track = self.tracks.remove(index);
    debug!("Removing track '{}'", track.name());
    drop(track);
    self.update_silenced();
    self.bus.publish(SequencerEvent::TrackRemoved(id));
    Ok(())
  }

  pub fn set_mute(&mut self, id: TrackId, muted: bool) -> Result<(), SequencerError> {
    self.existing_track(id)?.set_muted(muted);
    self.bus.publish(SequencerEvent::MuteChanged(id, muted));
    Ok(())
  }

  pub fn set_solo(&mut self, id: TrackId, soloed: bool) -> Result<(), SequencerError> {
    self.existing_track(id)?.set_soloed(soloed);
    self.update_silenced();
    self.bus.publish(SequencerEvent::SoloChanged(id, soloed));
    Ok(())
  }

  fn update_silenced(&self) {
    let any_soloed = self.tracks.iter().any(Track::is_soloed);
    for track in self.tracks.iter() {
      track.set_silenced(any_soloed && !track.is_soloed());
    }
  }

  pub fn set_recording(&mut self, id: TrackId, recording: bool) -> Result<(), SequencerError> {
    self.existing_track(id)?.set_recording(recording);
    Ok(())
  }

  /// Records `event` into a track at the current time.
  pub fn record(&self, id: TrackId, mut event: Event) -> Result<bool, SequencerError> {
    let track = self.existing_track(id)?;
    event.set_time(self.current_time());
    Ok(track.record(event))
  }

  /// A tracker following the playback, starting aligned with it.
  pub fn new_tracker(&self) -> (TrackerId, TrackerLock) {
    let mut timeline = self.timeline.lock();
    let mut tracker = BarBeatTracker::new(self.resolution, timeline.main.beats_per_bar());
    tracker.synchronize(&timeline.main);
    let tracker = Arc::new(RwLock::new(tracker));
    let id = TrackerId::new();
    timeline.trackers.insert(id, tracker.clone());
    (id, tracker)
  }

  pub fn remove_tracker(&self, id: TrackerId) -> Result<(), SequencerError> {
    self
      .timeline
      .lock()
      .trackers
      .remove(&id)
      .map(|_| ())
      .ok_or(SequencerError::UnknownTracker)
  }

  /// Replaces the document with the contents of `file`.
  ///
  /// Tempo and time signature changes go to the tempo track. A first track with
  /// nothing else is not loaded as a track. Returns the ids of the loaded tracks.
  pub fn load(
    &mut self,
    file: &MidiFile,
    playback: Arc<dyn PlaybackSink>,
    placement: Arc<dyn PlacementSink>,
  ) -> Result<Vec<TrackId>, SequencerError> {
    if self.clock.is_running() {
      return Err(ClockError::State { operation: "load" }.into());
    }
    info!("Loading {} tracks ...", file.tracks.len());

    for track in self.tracks.drain(..) {
      self.bus.publish(SequencerEvent::TrackRemoved(track.id()));
    }
    self.tracks_created = 0;
    self.tempo_track.clear();

    let start = self.start_time();
    let resolution = self.resolution;
    let mut loaded = Vec::new();
    for (index, chunk) in file.tracks.iter().enumerate() {
      let events = chunk.events.iter().cloned().map(|mut event| {
        let time = event.time().with_divisor(resolution);
        event.set_time(time);
        event
      });
      let (tempo_map, events): (Vec<Event>, Vec<Event>) = events.partition(Event::is_tempo_map);
      self.tempo_track.add_events(tempo_map);

      let musical = events
        .iter()
        .any(|event| !event.is_track_name() && !event.is_end_of_track());
      if index == 0 && !musical && file.tracks.len() > 1 {
        continue;
      }

      let name = chunk
        .name()
        .cloned()
        .unwrap_or_else(|| Text::from(format!("Track {}", index + 1)));
      let id = self.add_track(name, playback.clone(), placement.clone());
      if let Some(track) = self.track(id) {
        track.add_events(events);
      }
      loaded.push(id);
    }

    let signature = match self.tempo_track.time_signature_at(start) {
      Some(signature) => signature,
      None => {
        let signature = TimeSignature::default();
        self.tempo_track.insert_time_signature(start, signature);
        signature
      }
    };
    let tempo = match self.tempo_track.tempo_at(start) {
      Some(tempo) => tempo,
      None => {
        let tempo = self.clock.tempo();
        self.tempo_track.insert_tempo(start, tempo);
        tempo
      }
    };

    self.signature = signature;
    self.timeline.lock().set_beats_per_bar(file.beats_per_bar());
    self.clock.set_tempo(tempo);
    self.clock.reset()?;
    self.bus.publish(SequencerEvent::TempoChanged(tempo));
    self.bus.publish(SequencerEvent::TimeSignatureChanged(signature));
    self.jog(start);
    Ok(loaded)
  }

  pub fn load_file<P: AsRef<Path>>(
    &mut self,
    path: P,
    playback: Arc<dyn PlaybackSink>,
    placement: Arc<dyn PlacementSink>,
  ) -> Result<Vec<TrackId>, SequencerError> {
    let file = MidiFile::from_file(path)?;
    self.load(&file, playback, placement)
  }

  /// The document as a MIDI file, the tempo track first.
  pub fn to_midi_file(&self) -> MidiFile {
    let now = self.current_time();
    let mut chunks = vec![self.tempo_track.chunk()];
    chunks.extend(self.tracks.iter().map(|track| track.chunk(now)));
    MidiFile::new(MIDI_FILE_FORMAT, self.resolution, chunks)
  }

  pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SequencerError> {
    self.to_midi_file().write_file(path)?;
    Ok(())
  }

  /// Stops the clock and dispatcher threads.
  pub fn shutdown(&mut self) -> Result<(), SequencerError> {
    self.clock.stop()?;
    self.dispatcher.stop()?;
    Ok(())
  }
}

impl Drop for Sequencer {
  fn drop(&mut self) {
    drop(self.shutdown());
  }
}
