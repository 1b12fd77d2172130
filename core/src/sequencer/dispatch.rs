use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use std::thread;
use std::thread::{JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use failure::Fail;
use log::{debug, info, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::time::BarBeatTime;

pub type Callback = Box<dyn FnMut(BarBeatTime) + Send>;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct CallbackId(Uuid);

impl CallbackId {
  pub fn new() -> CallbackId {
    CallbackId(Uuid::new_v4())
  }
}

impl Default for CallbackId {
  fn default() -> Self {
    CallbackId::new()
  }
}

struct Entry {
  order: u64,
  times: HashSet<BarBeatTime>,
  callback: Arc<Mutex<Callback>>,
}

#[derive(Default)]
struct Registry {
  next_order: u64,
  entries: HashMap<CallbackId, Entry>,
  by_time: HashMap<BarBeatTime, Vec<CallbackId>>,
}

impl Registry {
  fn add_times(&mut self, id: CallbackId, times: &[BarBeatTime]) {
    if let Some(entry) = self.entries.get_mut(&id) {
      for time in times {
        if entry.times.insert(*time) {
          self.by_time.entry(*time).or_insert_with(Vec::new).push(id);
        }
      }
    }
  }

  fn set_times(&mut self, id: CallbackId, times: &[BarBeatTime]) -> bool {
    let previous = match self.entries.get_mut(&id) {
      Some(entry) => mem::replace(&mut entry.times, HashSet::new()),
      None => return false,
    };
    self.unindex(&id, &previous);
    self.add_times(id, times);
    true
  }

  fn remove(&mut self, id: &CallbackId) -> bool {
    match self.entries.remove(id) {
      Some(entry) => {
        self.unindex(id, &entry.times);
        true
      }
      None => false,
    }
  }

  fn unindex(&mut self, id: &CallbackId, times: &HashSet<BarBeatTime>) {
    for time in times.iter() {
      let now_empty = match self.by_time.get_mut(time) {
        Some(ids) => {
          ids.retain(|other| other != id);
          ids.is_empty()
        }
        None => false,
      };
      if now_empty {
        self.by_time.remove(time);
      }
    }
  }

  /// Callbacks registered for `time`, in registration order.
  fn callbacks_for(&self, time: &BarBeatTime) -> Vec<(CallbackId, Arc<Mutex<Callback>>)> {
    let mut callbacks: Vec<(u64, CallbackId, Arc<Mutex<Callback>>)> = self
      .by_time
      .get(time)
      .map(|ids| {
        ids
          .iter()
          .filter_map(|id| {
            self
              .entries
              .get(id)
              .map(|entry| (entry.order, *id, entry.callback.clone()))
          })
          .collect()
      })
      .unwrap_or_default();
    callbacks.sort_by_key(|(order, _, _)| *order);
    callbacks
      .into_iter()
      .map(|(_, id, callback)| (id, callback))
      .collect()
  }
}

struct Shared {
  registry: Mutex<Registry>,
  in_flight: Mutex<()>,
  dispatching: Mutex<Option<ThreadId>>,
}

/// Registers callbacks to be invoked when the playback reaches given times.
///
/// Callbacks for the same time run in the order they were first registered.
/// Once [`Registrar::deregister`] returns the callback will not run again, even
/// if a dispatch was in progress on another thread.
///
/// A callback may dispatch again from inside itself. The nested dispatch runs
/// the other callbacks, but skips the ones already running on that thread.
#[derive(Clone)]
pub struct Registrar {
  shared: Arc<Shared>,
}

impl Registrar {
  pub fn new() -> Registrar {
    let shared = Shared {
      registry: Mutex::new(Registry::default()),
      in_flight: Mutex::new(()),
      dispatching: Mutex::new(None),
    };
    Registrar {
      shared: Arc::new(shared),
    }
  }

  /// Registers `callback` under `id`, replacing any previous registration with that id.
  pub fn register<F>(&self, id: CallbackId, times: &[BarBeatTime], callback: F)
  where
    F: FnMut(BarBeatTime) + Send + 'static,
  {
    let mut registry = self.shared.registry.lock();
    registry.remove(&id);
    let order = registry.next_order;
    registry.next_order += 1;
    let entry = Entry {
      order,
      times: HashSet::new(),
      callback: Arc::new(Mutex::new(Box::new(callback))),
    };
    registry.entries.insert(id, entry);
    registry.add_times(id, times);
  }

  /// Adds times to an existing registration, keeping its position in the order.
  pub fn add_times(&self, id: CallbackId, times: &[BarBeatTime]) -> bool {
    let mut registry = self.shared.registry.lock();
    let registered = registry.entries.contains_key(&id);
    registry.add_times(id, times);
    registered
  }

  /// Replaces the times of an existing registration, keeping its position in the order.
  pub fn set_times(&self, id: CallbackId, times: &[BarBeatTime]) -> bool {
    self.shared.registry.lock().set_times(id, times)
  }

  pub fn deregister(&self, id: CallbackId) -> bool {
    let removed = self.shared.registry.lock().remove(&id);
    let current = thread::current().id();
    let dispatching_here = *self.shared.dispatching.lock() == Some(current);
    if removed && !dispatching_here {
      // Wait for any dispatch in progress to complete
      drop(self.shared.in_flight.lock());
    }
    removed
  }

  pub fn is_registered(&self, id: CallbackId) -> bool {
    self.shared.registry.lock().entries.contains_key(&id)
  }

  pub fn times(&self, id: CallbackId) -> Vec<BarBeatTime> {
    let registry = self.shared.registry.lock();
    let mut times: Vec<BarBeatTime> = registry
      .entries
      .get(&id)
      .map(|entry| entry.times.iter().cloned().collect())
      .unwrap_or_default();
    times.sort();
    times
  }

  /// Invokes on the calling thread every callback registered for `time`.
  pub fn dispatch(&self, time: BarBeatTime) {
    let callbacks = self.shared.registry.lock().callbacks_for(&time);
    self.invoke(callbacks, time);
  }

  /// Invokes the callback registered under `id` as if `time` had been reached,
  /// whether or not `time` is one of its registered times.
  pub fn dispatch_one(&self, id: CallbackId, time: BarBeatTime) {
    let callback = self.shared.registry.lock().entries.get(&id).map(|entry| entry.callback.clone());
    if let Some(callback) = callback {
      self.invoke(vec![(id, callback)], time);
    }
  }

  fn invoke(&self, callbacks: Vec<(CallbackId, Arc<Mutex<Callback>>)>, time: BarBeatTime) {
    let current = thread::current().id();
    let nested = *self.shared.dispatching.lock() == Some(current);
    let _in_flight = if nested {
      None
    } else {
      let in_flight = self.shared.in_flight.lock();
      *self.shared.dispatching.lock() = Some(current);
      Some(in_flight)
    };

    for (id, callback) in callbacks {
      // A previous callback may have deregistered this one
      if !self.is_registered(id) {
        continue;
      }
      match callback.try_lock() {
        Some(mut callback) => (*callback)(time),
        None => warn!("Callback already running, skipping it at {}", time),
      }
    }

    if !nested {
      *self.shared.dispatching.lock() = None;
    }
  }
}

impl Default for Registrar {
  fn default() -> Self {
    Registrar::new()
  }
}

pub enum Protocol {
  Stop,

  Time(BarBeatTime),

  Flush(Sender<()>),
}

#[derive(Debug, Fail)]
pub enum DispatcherError {
  #[fail(display = "Failed to create the dispatcher thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the dispatcher thread")]
  Stop,
}

/// Sends reached times to the dispatcher thread without blocking.
#[derive(Clone)]
pub struct TimePoster {
  protocol_tx: Sender<Protocol>,
}

impl TimePoster {
  pub fn post(&self, time: BarBeatTime) {
    drop(self.protocol_tx.send(Protocol::Time(time)));
  }
}

struct DispatcherThread {
  registrar: Registrar,
}

impl DispatcherThread {
  fn handle_messages(&self, protocol_rx: Receiver<Protocol>) {
    for msg in protocol_rx.iter() {
      match msg {
        Protocol::Stop => break,

        Protocol::Time(time) => self.registrar.dispatch(time),

        Protocol::Flush(done_tx) => drop(done_tx.send(())),
      }
    }
  }
}

/// Runs the callbacks of a [`Registrar`] on a dedicated thread as times are posted.
pub struct TimeDispatcher {
  handler: Option<JoinHandle<()>>,
  protocol_tx: Sender<Protocol>,
  registrar: Registrar,
}

impl TimeDispatcher {
  pub fn new(registrar: Registrar) -> Result<TimeDispatcher, DispatcherError> {
    info!("Starting dispatcher ...");

    let (protocol_tx, protocol_rx) = crossbeam_channel::unbounded::<Protocol>();
    let dispatcher_thread = DispatcherThread {
      registrar: registrar.clone(),
    };

    thread::Builder::new()
      .name("dispatcher".into())
      .spawn(move || dispatcher_thread.handle_messages(protocol_rx))
      .map_err(|err| DispatcherError::Start {
        cause: err.to_string(),
      })
      .map(|handler| TimeDispatcher {
        handler: Some(handler),
        protocol_tx,
        registrar,
      })
  }

  pub fn registrar(&self) -> Registrar {
    self.registrar.clone()
  }

  pub fn poster(&self) -> TimePoster {
    TimePoster {
      protocol_tx: self.protocol_tx.clone(),
    }
  }

  pub fn post(&self, time: BarBeatTime) {
    drop(self.protocol_tx.send(Protocol::Time(time)));
  }

  /// Blocks until every time posted before the call has been dispatched.
  pub fn flush(&self) {
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    if self.protocol_tx.send(Protocol::Flush(done_tx)).is_ok() {
      drop(done_rx.recv());
    }
  }

  pub fn stop(&mut self) -> Result<(), DispatcherError> {
    match self.handler.take() {
      Some(handler) => {
        debug!("Stopping dispatcher ...");
        self
          .protocol_tx
          .send(Protocol::Stop)
          .map_err(|_| DispatcherError::Stop)
          .and_then(|()| handler.join().map_err(|_| DispatcherError::Stop))
      }
      None => Ok(()),
    }
  }
}

impl Drop for TimeDispatcher {
  fn drop(&mut self) {
    drop(self.stop());
  }
}

#[cfg(test)]
mod test {

  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Arc;
  use std::thread;
  use std::time::Duration;

  use parking_lot::Mutex;

  use super::{CallbackId, Registrar, TimeDispatcher};
  use crate::time::BarBeatTime;

  fn time(literal: &str) -> BarBeatTime {
    literal.parse().unwrap()
  }

  #[test]
  pub fn dispatch_in_registration_order() {
    let registrar = Registrar::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    for name in &["first", "second", "third"] {
      let calls = calls.clone();
      let name = name.to_string();
      registrar.register(CallbackId::new(), &[time("2.1.1")], move |_| {
        calls.lock().push(name.clone())
      });
    }
    registrar.dispatch(time("2.1.1"));
    registrar.dispatch(time("2.1.2"));
    assert_eq!(*calls.lock(), vec!["first", "second", "third"]);
  }

  #[test]
  pub fn add_times_keeps_order() {
    let registrar = Registrar::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let first = CallbackId::new();
    let calls1 = calls.clone();
    registrar.register(first, &[], move |_| calls1.lock().push(1));
    let calls2 = calls.clone();
    registrar.register(CallbackId::new(), &[time("3.1.1")], move |_| calls2.lock().push(2));
    assert!(registrar.add_times(first, &[time("3.1.1"), time("3.1.1")]));
    assert_eq!(registrar.times(first), vec![time("3.1.1")]);
    registrar.dispatch(time("3.1.1"));
    assert_eq!(*calls.lock(), vec![1, 2]);
  }

  #[test]
  pub fn deregister() {
    let registrar = Registrar::new();
    let calls = Arc::new(Mutex::new(0));
    let id = CallbackId::new();
    let counter = calls.clone();
    registrar.register(id, &[time("1.1.1"), time("1.2.1")], move |_| *counter.lock() += 1);
    registrar.dispatch(time("1.1.1"));
    assert!(registrar.deregister(id));
    assert!(!registrar.deregister(id));
    registrar.dispatch(time("1.2.1"));
    assert_eq!(*calls.lock(), 1);
    assert!(registrar.times(id).is_empty());
  }

  #[test]
  pub fn deregister_from_callback() {
    let registrar = Registrar::new();
    let calls = Arc::new(Mutex::new(0));
    let first = CallbackId::new();
    let second = CallbackId::new();
    let inner = registrar.clone();
    registrar.register(first, &[time("1.1.1")], move |_| {
      inner.deregister(second);
    });
    let counter = calls.clone();
    registrar.register(second, &[time("1.1.1")], move |_| *counter.lock() += 1);
    registrar.dispatch(time("1.1.1"));
    assert_eq!(*calls.lock(), 0);
  }

  #[test]
  pub fn deregister_waits_for_dispatch_on_other_thread() {
    let registrar = Registrar::new();
    let id = CallbackId::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(0);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let counter = calls.clone();
    registrar.register(id, &[time("1.1.1")], move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      drop(entered_tx.send(()));
      drop(release_rx.recv());
    });

    let dispatching = registrar.clone();
    let dispatch = thread::spawn(move || dispatching.dispatch(time("1.1.1")));
    entered_rx.recv().unwrap();

    let returned = Arc::new(AtomicBool::new(false));
    let deregistering = registrar.clone();
    let flag = returned.clone();
    let deregister = thread::spawn(move || {
      let removed = deregistering.deregister(id);
      flag.store(true, Ordering::SeqCst);
      removed
    });

    thread::sleep(Duration::from_millis(100));
    assert!(!returned.load(Ordering::SeqCst));
    assert!(!registrar.is_registered(id));

    release_tx.send(()).unwrap();
    dispatch.join().unwrap();
    assert!(deregister.join().unwrap());
    assert!(returned.load(Ordering::SeqCst));

    registrar.dispatch(time("1.1.1"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  pub fn dispatch_from_callback() {
    let registrar = Registrar::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let first = CallbackId::new();
    let inner = registrar.clone();
    let outer_calls = calls.clone();
    registrar.register(first, &[time("1.1.1")], move |t| {
      outer_calls.lock().push(t);
      inner.dispatch(time("1.2.1"));
      inner.dispatch(time("1.1.1"));
      inner.dispatch_one(first, time("1.3.1"));
    });
    let nested_calls = calls.clone();
    registrar.register(CallbackId::new(), &[time("1.2.1")], move |t| nested_calls.lock().push(t));

    registrar.dispatch(time("1.1.1"));
    assert_eq!(*calls.lock(), vec![time("1.1.1"), time("1.2.1")]);

    // Nothing is left held once the outer dispatch returns
    let other = registrar.clone();
    assert!(thread::spawn(move || other.deregister(first)).join().unwrap());
    registrar.dispatch(time("1.2.1"));
    assert_eq!(calls.lock().len(), 3);
  }

  #[test]
  pub fn set_times() {
    let registrar = Registrar::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let first = CallbackId::new();
    let calls1 = calls.clone();
    registrar.register(first, &[time("1.4.1")], move |_| calls1.lock().push(1));
    let calls2 = calls.clone();
    registrar.register(CallbackId::new(), &[time("2.1.1")], move |_| calls2.lock().push(2));

    assert!(registrar.set_times(first, &[time("2.1.1")]));
    assert_eq!(registrar.times(first), vec![time("2.1.1")]);
    registrar.dispatch(time("1.4.1"));
    assert!(calls.lock().is_empty());
    registrar.dispatch(time("2.1.1"));
    assert_eq!(*calls.lock(), vec![1, 2]);
    assert!(!registrar.set_times(CallbackId::new(), &[time("2.1.1")]));
  }

  #[test]
  pub fn dispatcher_thread() {
    let registrar = Registrar::new();
    let mut dispatcher = TimeDispatcher::new(registrar.clone()).unwrap();
    let reached = Arc::new(Mutex::new(Vec::new()));
    let sink = reached.clone();
    registrar.register(CallbackId::new(), &[time("1.1.2"), time("1.1.4")], move |t| {
      sink.lock().push(t)
    });
    let poster = dispatcher.poster();
    for subbeat in 1..=5 {
      poster.post(BarBeatTime::new(1, 1, subbeat, 480));
    }
    dispatcher.flush();
    assert_eq!(*reached.lock(), vec![time("1.1.2"), time("1.1.4")]);
    dispatcher.stop().unwrap();
    dispatcher.stop().unwrap();
  }
}
