//! Fragment hand-off between the emulation core and the output callback.
//!
//! The producer fills fixed-size interleaved `i16` fragments and trades them
//! into the queue; the output callback trades exhausted fragments back for
//! ready ones. Every exchange moves whole buffers, so neither side copies
//! samples while the lock is held, and the consumer path never allocates.
//!
//! ## Ownership
//! A fragment belongs to the queue's pool except while leased to the
//! producer (being filled) or checked out to the consumer (being played).
//! At most one fragment is checked out at a time; the consumer returns it
//! on the next [`FragmentQueue::dequeue`] or via
//! [`FragmentQueue::close_sink`]. A checked-out fragment that is dropped
//! instead of returned is replaced on the producer side, so the pool
//! self-heals.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Fixed-length buffer of interleaved signed 16-bit samples.
pub type Fragment = Box<[i16]>;

/// Bounded fragment queue with recycle semantics.
pub struct FragmentQueue {
    fragment_size: u32,
    stereo: bool,
    capacity: usize,
    inner: Mutex<QueueInner>,
    ignore_overflows: AtomicBool,
    overflows: AtomicU64,
}

struct QueueInner {
    ready: VecDeque<Fragment>,
    free: Vec<Fragment>,
}

impl FragmentQueue {
    /// Create a queue holding up to `capacity` ready fragments of
    /// `fragment_size` frames each.
    pub fn new(fragment_size: u32, capacity: u32, stereo: bool) -> Self {
        assert!(fragment_size > 0, "fragment size must be positive");
        assert!(capacity > 0, "queue capacity must be positive");

        let capacity = capacity as usize;
        let sample_len = fragment_size as usize * if stereo { 2 } else { 1 };
        let free = (0..capacity)
            .map(|_| vec![0i16; sample_len].into_boxed_slice())
            .collect();

        Self {
            fragment_size,
            stereo,
            capacity,
            inner: Mutex::new(QueueInner {
                ready: VecDeque::with_capacity(capacity),
                free,
            }),
            ignore_overflows: AtomicBool::new(false),
            overflows: AtomicU64::new(0),
        }
    }

    /// Frames per fragment (per channel).
    pub fn fragment_size(&self) -> u32 {
        self.fragment_size
    }

    /// Whether fragments carry two interleaved channels.
    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    /// Interleaved samples per fragment.
    pub fn sample_len(&self) -> usize {
        self.fragment_size as usize * if self.stereo { 2 } else { 1 }
    }

    /// Maximum ready fragments.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ready-fragment count (best-effort snapshot).
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().ready.len()
    }

    /// Toggle overflow tolerance.
    ///
    /// Overflows always drop the oldest ready fragment either way; the flag
    /// only controls whether they are logged. Used while the output device
    /// is disabled so production can continue without spamming the log.
    pub fn ignore_overflows(&self, ignore: bool) {
        self.ignore_overflows.store(ignore, Ordering::Relaxed);
    }

    /// Total fragments dropped due to overflow since creation.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Producer side: obtain an empty fragment to fill.
    ///
    /// Recycles from the pool when possible, allocates otherwise. Only the
    /// producer thread allocates; the consumer path never does.
    pub fn lease(&self) -> Fragment {
        let recycled = self.inner.lock().unwrap().free.pop();
        recycled.unwrap_or_else(|| vec![0i16; self.sample_len()].into_boxed_slice())
    }

    /// Producer side: submit a filled fragment and receive the next lease.
    ///
    /// When the ready queue is full, the oldest ready fragment is dropped to
    /// make room, keeping latency bounded when the consumer stalls.
    pub fn enqueue(&self, fragment: Fragment) -> Fragment {
        assert_eq!(
            fragment.len(),
            self.sample_len(),
            "fragment length does not match queue format"
        );

        let mut overflowed = false;
        let next = {
            let mut inner = self.inner.lock().unwrap();
            if inner.ready.len() >= self.capacity {
                if let Some(dropped) = inner.ready.pop_front() {
                    inner.free.push(dropped);
                    overflowed = true;
                }
            }
            inner.ready.push_back(fragment);
            inner.free.pop()
        };

        if overflowed {
            self.overflows.fetch_add(1, Ordering::Relaxed);
            if !self.ignore_overflows.load(Ordering::Relaxed) {
                tracing::info!(
                    capacity = self.capacity,
                    "audio fragment queue overflow"
                );
            }
        }

        next.unwrap_or_else(|| vec![0i16; self.sample_len()].into_boxed_slice())
    }

    /// Consumer side: return the previously checked-out fragment (if any)
    /// and take the next ready fragment. Never blocks, never allocates.
    pub fn dequeue(&self, recycle: Option<Fragment>) -> Option<Fragment> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(fragment) = recycle {
            inner.free.push(fragment);
        }
        inner.ready.pop_front()
    }

    /// Consumer side: return a checked-out fragment without taking another.
    pub fn recycle(&self, fragment: Fragment) {
        self.inner.lock().unwrap().free.push(fragment);
    }

    /// Consumer detach: return the outstanding fragment to the pool.
    pub fn close_sink(&self, recycle: Option<Fragment>) {
        if let Some(fragment) = recycle {
            self.recycle(fragment);
        }
    }
}
