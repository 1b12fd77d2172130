#[cfg(any(target_os = "macos", target_os = "windows"))]
use audio_thread_priority::{
  demote_current_thread_from_real_time, promote_current_thread_to_real_time, RtPriorityHandle,
};

use failure::Fail;

#[derive(Debug, Fail)]
#[fail(display = "Thread could not be promoted to real time")]
pub struct RealTimePriorityError;

/// Real-time scheduling for the calling thread, restored to normal priority on drop.
pub struct RealTimePriority {
  #[cfg(any(target_os = "macos", target_os = "windows"))]
  handle: Option<RtPriorityHandle>,
}

impl RealTimePriority {
  /// `buffer_frames` and `sample_rate` describe the period the thread has to meet.
  pub fn promote(buffer_frames: u32, sample_rate: u32) -> Result<RealTimePriority, RealTimePriorityError> {
    Self::promote_rt(buffer_frames, sample_rate)
  }

  #[cfg(any(target_os = "macos", target_os = "windows"))]
  fn promote_rt(buffer_frames: u32, sample_rate: u32) -> Result<RealTimePriority, RealTimePriorityError> {
    promote_current_thread_to_real_time(buffer_frames, sample_rate)
      .map(|handle| RealTimePriority {
        handle: Some(handle),
      })
      .map_err(|_err| RealTimePriorityError)
  }

  #[cfg(any(target_os = "macos", target_os = "windows"))]
  fn demote_rt(&mut self) {
    self.handle.take().into_iter().for_each(|handle| {
      drop(demote_current_thread_from_real_time(handle));
    });
  }

  // TODO request real-time scheduling through rtkit on linux
  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  fn promote_rt(_buffer_frames: u32, _sample_rate: u32) -> Result<RealTimePriority, RealTimePriorityError> {
    Ok(RealTimePriority {})
  }

  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  fn demote_rt(&mut self) {}
}

impl Drop for RealTimePriority {
  fn drop(&mut self) {
    self.demote_rt();
  }
}
