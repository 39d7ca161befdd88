//! Append-only frame store shared by one producer and one consumer.
//!
//! ## Design
//! - Frames are only ever appended; nothing is mutated or removed.
//! - The length is published through an atomic after the frame is stored, so a
//!   reader that observes `len() > i` can always fetch frame `i`.
//! - A `finished` flag (kept under the same mutex as the frames) tells waiters that
//!   the producer is gone and the length is frozen.
//! - A [`Condvar`] wakes waiters on every append and on finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::frame::Frame;

const WAIT_SLICE: Duration = Duration::from_millis(50);

pub struct FrameBuffer {
    inner: Mutex<BufferInner>,
    cv: Condvar,
    len: AtomicUsize,
}

struct BufferInner {
    frames: Vec<Arc<Frame>>,
    finished: bool,
}

/// Result of waiting for the buffer to reach a length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    /// The producer finished before the requested length was reached.
    Exhausted,
    Cancelled,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                frames: Vec::new(),
                finished: false,
            }),
            cv: Condvar::new(),
            len: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a frame and return the new length.
    ///
    /// Appends after [`finish`](Self::finish) are dropped; the buffer is frozen.
    pub fn push(&self, frame: Frame) -> usize {
        let mut g = self.lock();
        if g.finished {
            tracing::warn!("frame appended after buffer was finished; dropped");
            return g.frames.len();
        }
        g.frames.push(Arc::new(frame));
        let len = g.frames.len();
        self.len.store(len, Ordering::Release);
        drop(g);
        self.cv.notify_all();
        len
    }

    /// Mark the producer as done and wake all waiters. Idempotent.
    pub fn finish(&self) {
        let mut g = self.lock();
        g.finished = true;
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Published length; never decreases.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frame `index`, or `None` if it has not been published yet.
    pub fn get(&self, index: usize) -> Option<Arc<Frame>> {
        if index >= self.len() {
            return None;
        }
        self.lock().frames.get(index).cloned()
    }

    /// Block until at least `min_len` frames exist, the producer finishes short, or
    /// `cancel` fires.
    pub fn wait_for_len(&self, min_len: usize, cancel: &CancelToken) -> WaitOutcome {
        let mut g = self.lock();
        loop {
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if g.frames.len() >= min_len {
                return WaitOutcome::Ready;
            }
            if g.finished {
                return WaitOutcome::Exhausted;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner);
            g = ng;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(tag: &str) -> Frame {
        Frame::Glyphs {
            rows: vec![tag.to_string()],
        }
    }

    #[test]
    fn push_publishes_length_and_frames() {
        let buf = FrameBuffer::new();
        assert!(buf.is_empty());
        assert!(buf.get(0).is_none());

        assert_eq!(buf.push(frame("a")), 1);
        assert_eq!(buf.push(frame("b")), 2);
        assert_eq!(buf.len(), 2);
        assert_eq!(*buf.get(1).unwrap(), frame("b"));
        assert!(buf.get(2).is_none());
    }

    #[test]
    fn finished_buffer_is_frozen() {
        let buf = FrameBuffer::new();
        buf.push(frame("a"));
        buf.finish();
        buf.finish();
        assert!(buf.is_finished());
        assert_eq!(buf.push(frame("b")), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn wait_for_len_wakes_on_push() {
        let buf = FrameBuffer::shared();
        let producer = buf.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(frame("first"));
        });

        let outcome = buf.wait_for_len(1, &CancelToken::new());
        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(buf.len(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn wait_for_len_reports_exhausted_producer() {
        let buf = FrameBuffer::new();
        buf.push(frame("only"));
        buf.finish();
        assert_eq!(buf.wait_for_len(2, &CancelToken::new()), WaitOutcome::Exhausted);
        assert_eq!(buf.wait_for_len(1, &CancelToken::new()), WaitOutcome::Ready);
    }

    #[test]
    fn wait_for_len_respects_cancel() {
        let buf = FrameBuffer::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(buf.wait_for_len(1, &cancel), WaitOutcome::Cancelled);
    }

    #[test]
    fn concurrent_reader_never_sees_unpublished_frames() {
        let buf = FrameBuffer::shared();
        let producer = buf.clone();
        let handle = thread::spawn(move || {
            for i in 0..500 {
                producer.push(frame(&i.to_string()));
            }
            producer.finish();
        });

        let mut seen = 0;
        while !(buf.is_finished() && seen == buf.len()) {
            let len = buf.len();
            while seen < len {
                let f = buf.get(seen).expect("published frame must be readable");
                assert_eq!(*f, frame(&seen.to_string()));
                seen += 1;
            }
            assert!(buf.get(len.max(seen) + 1000).is_none());
        }
        handle.join().unwrap();
        assert_eq!(seen, 500);
    }
}
