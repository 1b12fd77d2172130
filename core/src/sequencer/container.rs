use std::collections::HashMap;
use std::iter;

use crate::midi::{Event, MetaData, MetaEvent, Text};
use crate::time::BarBeatTime;

/// Events of a track.
///
/// The track name and end of track events are singletons kept apart from the
/// general events, so there is always exactly one of each. The end of track
/// is never earlier than any general event.
#[derive(Debug, Clone)]
pub struct EventContainer {
  track_name: Event,
  end_of_track: Event,
  events: Vec<Event>,
  index: HashMap<BarBeatTime, Vec<usize>>,
}

impl EventContainer {
  pub fn new<T: Into<Text>>(name: T, start: BarBeatTime) -> EventContainer {
    EventContainer {
      track_name: Event::from(MetaEvent::track_name(start, name)),
      end_of_track: Event::from(MetaEvent::end_of_track(start)),
      events: Vec::new(),
      index: HashMap::new(),
    }
  }

  pub fn append(&mut self, event: Event) {
    if event.is_track_name() {
      self.track_name = event;
    } else if event.is_end_of_track() {
      let time = self.max_time().map_or(event.time(), |max| max.max(event.time()));
      self.end_of_track = Event::from(MetaEvent::end_of_track(time));
    } else {
      let time = event.time();
      self.index.entry(time).or_insert_with(Vec::new).push(self.events.len());
      self.events.push(event);
      if time > self.end_of_track() {
        self.end_of_track.set_time(time);
      }
    }
  }

  pub fn track_name(&self) -> Text {
    match &self.track_name {
      Event::Meta(MetaEvent {
        data: MetaData::SequenceTrackName(name),
        ..
      }) => name.clone(),
      _ => Text::default(),
    }
  }

  pub fn set_track_name<T: Into<Text>>(&mut self, name: T) {
    let time = self.track_name.time();
    self.track_name = Event::from(MetaEvent::track_name(time, name));
  }

  pub fn end_of_track(&self) -> BarBeatTime {
    self.end_of_track.time()
  }

  /// All events: track name, general events in insertion order, end of track.
  pub fn events(&self) -> impl Iterator<Item = &Event> {
    iter::once(&self.track_name)
      .chain(self.events.iter())
      .chain(iter::once(&self.end_of_track))
  }

  pub fn general_events(&self) -> &[Event] {
    &self.events
  }

  /// Count of all events, singletons included.
  pub fn len(&self) -> usize {
    self.events.len() + 2
  }

  /// Whether there are no general events.
  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  /// Events at `time`, general events first in insertion order.
  pub fn events_for_time(&self, time: &BarBeatTime) -> Vec<&Event> {
    let mut events: Vec<&Event> = Vec::new();
    if self.track_name.time() == *time {
      events.push(&self.track_name);
    }
    if let Some(indices) = self.index.get(time) {
      events.extend(indices.iter().map(|i| &self.events[*i]));
    }
    if self.end_of_track.time() == *time {
      events.push(&self.end_of_track);
    }
    events
  }

  /// Distinct times of the general events, ascending.
  pub fn times(&self) -> Vec<BarBeatTime> {
    let mut times: Vec<BarBeatTime> = self.index.keys().cloned().collect();
    times.sort();
    times
  }

  pub fn max_time(&self) -> Option<BarBeatTime> {
    self.events.iter().map(Event::time).max()
  }

  /// Moves the end of track to the latest general event when it lags behind.
  pub fn validate(&mut self) {
    if let Some(max) = self.max_time() {
      if max > self.end_of_track() {
        self.end_of_track.set_time(max);
      }
    }
  }

  /// Removes the general events matching `predicate`, returning how many were removed.
  pub fn remove_where<F>(&mut self, mut predicate: F) -> usize
  where
    F: FnMut(&Event) -> bool,
  {
    let before = self.events.len();
    self.events.retain(|event| !predicate(event));
    self.rebuild_index();
    before - self.events.len()
  }

  /// Moves every event, singletons included, to the time `f` maps it to.
  pub fn retime<F>(&mut self, f: F)
  where
    F: Fn(BarBeatTime) -> BarBeatTime,
  {
    let name_time = f(self.track_name.time());
    self.track_name.set_time(name_time);
    let end_time = f(self.end_of_track.time());
    self.end_of_track.set_time(end_time);
    for event in self.events.iter_mut() {
      let time = f(event.time());
      event.set_time(time);
    }
    self.rebuild_index();
    self.validate();
  }

  fn rebuild_index(&mut self) {
    self.index.clear();
    for (i, event) in self.events.iter().enumerate() {
      self.index.entry(event.time()).or_insert_with(Vec::new).push(i);
    }
  }
}
