pub mod bar_beat;
pub mod clock;
pub mod fraction;
pub mod realtime;
pub mod signature;
pub mod tempo;
pub mod tracker;

pub use self::bar_beat::{BarBeatTime, FormatError};
pub use self::clock::{ClockError, ClockSource, ClockTime, Pulse, TempoControl};
pub use self::fraction::Fraction;
pub use self::signature::TimeSignature;
pub use self::tempo::Tempo;
pub use self::tracker::{snapshot, BarBeatTracker, TrackerLock};
