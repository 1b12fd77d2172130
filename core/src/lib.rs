pub mod color;
pub mod config;
pub mod logging;
pub mod midi;
pub mod sequencer;
pub mod time;

pub use crate::config::Config;
pub use crate::sequencer::{Sequencer, SequencerError, SequencerEvent};
