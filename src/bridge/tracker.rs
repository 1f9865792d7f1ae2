//! Bounded queue of frame segments handed to the terminal
//!
//! The terminal is supposed to unlink every frame it reads. One that never
//! reads (no `t=s` support, a failed map) would leave a full frame in
//! `/dev/shm` per page turn, so handed-off names are queued here and the
//! oldest are unlinked once the queue grows.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, info};

use super::segment::release_name;

/// Soft limit for queue size - cleanup starts when exceeded.
pub const SOFT_LIMIT: usize = 4;

/// Hard maximum queue size - the oldest go regardless of age.
pub const HARD_LIMIT: usize = 16;

/// Time the terminal gets to read a frame before a soft cleanup may unlink it.
const MIN_AGE: Duration = Duration::from_secs(1);

struct HandedFrame {
    path: String,
    size: usize,
    created: Instant,
}

/// Owns the names of presented frames until they are unlinked.
///
/// Everything still queued is unlinked on drop.
#[derive(Default)]
pub struct FrameTracker {
    queue: VecDeque<HandedFrame>,
    total_size: usize,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a handed-off frame and trims the queue.
    pub fn register(&mut self, path: String, size: usize) {
        debug!("handed off {path} ({size} bytes)");
        self.queue.push_back(HandedFrame {
            path,
            size,
            created: Instant::now(),
        });
        self.total_size = self.total_size.saturating_add(size);
        self.cleanup_if_needed();
    }

    fn cleanup_if_needed(&mut self) {
        let now = Instant::now();

        while self.queue.len() > SOFT_LIMIT {
            match self.queue.front() {
                Some(frame) if now.duration_since(frame.created) >= MIN_AGE => {
                    self.release_oldest("aged");
                }
                _ => break,
            }
        }

        while self.queue.len() > HARD_LIMIT {
            self.release_oldest("forced");
        }
    }

    fn release_oldest(&mut self, why: &str) {
        if let Some(frame) = self.queue.pop_front() {
            self.total_size = self.total_size.saturating_sub(frame.size);
            release_name(&frame.path);
            debug!("unlinked ({why}): {}", frame.path);
        }
    }

    /// Unlinks every queued frame.
    pub fn cleanup_all(&mut self) {
        let count = self.queue.len();
        let size = self.total_size;
        while let Some(frame) = self.queue.pop_front() {
            release_name(&frame.path);
        }
        self.total_size = 0;

        if count > 0 {
            info!("released {count} handed-off frames ({size} bytes)");
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }
}

impl Drop for FrameTracker {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::segment::{Segment, live_segments};
    use serial_test::serial;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn handed_frame(tracker: &mut FrameTracker) -> String {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!("/pagebridge_track{}_{}", std::process::id(), id);
        let name = Segment::create(&path, 100)
            .expect("failed to create segment")
            .hand_off();
        tracker.register(name.clone(), 100);
        name
    }

    fn exists(path: &str) -> bool {
        let c_path = CString::new(path).unwrap();
        let fd = unsafe { libc::shm_open(c_path.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }

    #[test]
    #[serial]
    fn hard_limit_bounds_unread_frames() {
        let before = live_segments();
        let mut tracker = FrameTracker::new();

        let names: Vec<String> = (0..50).map(|_| handed_frame(&mut tracker)).collect();

        assert_eq!(tracker.len(), HARD_LIMIT);
        assert_eq!(tracker.total_size(), HARD_LIMIT * 100);
        assert!(!exists(&names[0]));
        assert!(exists(&names[49]));
        assert_eq!(live_segments(), before + HARD_LIMIT);

        tracker.cleanup_all();
        assert_eq!(live_segments(), before);
        assert_eq!(tracker.total_size(), 0);
    }

    #[test]
    #[serial]
    fn young_frames_survive_the_soft_limit() {
        let mut tracker = FrameTracker::new();
        for _ in 0..SOFT_LIMIT + 3 {
            handed_frame(&mut tracker);
        }

        assert_eq!(tracker.len(), SOFT_LIMIT + 3);
    }

    #[test]
    #[serial]
    fn aged_frames_are_trimmed_to_the_soft_limit() {
        let mut tracker = FrameTracker::new();
        let first = handed_frame(&mut tracker);
        for _ in 0..SOFT_LIMIT + 2 {
            handed_frame(&mut tracker);
        }

        thread::sleep(Duration::from_millis(1100));
        handed_frame(&mut tracker);

        assert_eq!(tracker.len(), SOFT_LIMIT);
        assert!(!exists(&first));
    }

    #[test]
    #[serial]
    fn drop_unlinks_whatever_is_left() {
        let before = live_segments();
        let mut tracker = FrameTracker::new();
        let names: Vec<String> = (0..3).map(|_| handed_frame(&mut tracker)).collect();

        drop(tracker);

        assert!(names.iter().all(|name| !exists(name)));
        assert_eq!(live_segments(), before);
    }
}
