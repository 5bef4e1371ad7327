use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::frame::PendingFrame;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub published: u64,
    /// Frames that were overwritten before anyone took them.
    pub replaced: u64,
    pub taken: u64,
}

/// A single-slot mailbox between one producer and one consumer.
///
/// `publish` overwrites whatever is pending, so the consumer always gets the newest frame and
/// frames it did not keep up with are dropped instead of queueing up.
///
/// The lock only guards swapping the slot contents, frames are moved in and out whole.
#[derive(Debug)]
pub struct FrameRelay<T = PendingFrame> {
    slot: Mutex<Option<T>>,
    published: AtomicU64,
    replaced: AtomicU64,
    taken: AtomicU64,
}

impl<T> FrameRelay<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            published: AtomicU64::new(0),
            replaced: AtomicU64::new(0),
            taken: AtomicU64::new(0),
        }
    }

    /// Puts `frame` into the slot. Returns `true` if an unclaimed frame was discarded.
    pub fn publish(&self, frame: T) -> bool {
        // the displaced frame is dropped after the lock is released
        let displaced = self.slot.lock().replace(frame);

        self.published.fetch_add(1, Ordering::Relaxed);
        let replaced = displaced.is_some();
        if replaced {
            self.replaced.fetch_add(1, Ordering::Relaxed);
            trace!("Replaced a frame that was never taken");
        }
        replaced
    }

    /// Removes and returns the pending frame, if there is one. Never waits for a frame to arrive.
    pub fn take_if_present(&self) -> Option<T> {
        let frame = self.slot.lock().take();
        if frame.is_some() {
            self.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Discards the pending frame. Returns `true` if there was one.
    pub fn clear(&self) -> bool {
        self.slot.lock().take().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            published: self.published.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
        }
    }
}

impl<T> Default for FrameRelay<T> {
    fn default() -> Self {
        Self::new()
    }
}
