//! Per-queue lock-free MPSC byte ring feeding the trace pipeline.
//!
//! A single contiguous buffer is shared by any number of [`Producer`]
//! handles and exactly one [`Consumer`] handle. Producers reserve space with
//! a CAS loop on a monotonic head counter, write their record, then publish
//! by advancing a separate commit counter only once every earlier
//! reservation has published -- this keeps the consumer from observing a
//! later writer's bytes before an earlier one has finished copying into the
//! buffer. The consumer owns the tail counter outright and requires no
//! synchronization to advance it.

mod semaphore;

use semaphore::Semaphore;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fraction of capacity that must remain occupied for a push to wake the
/// consumer, expressed as "signal once free space drops below this share of
/// capacity". Matches the framework default of 75% full.
const DEFAULT_WAKE_FREE_SPACE_RATIO: f64 = 0.25;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    #[error("record length is zero or exceeds the ring's capacity")]
    Invalid,
    #[error("handle is not a producer")]
    NotProducer,
    #[error("insufficient free space in ring")]
    NoSpace,
    #[error("ring is closed")]
    Closed,
}

/// Declares which CPU, if any, a trace pipeline worker reading this ring
/// should be pinned to. Recovered from the original `IRingTraceProducer`
/// interface's `getCpuAffinity`, where `NO_CPU_AFFINITY == -1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueAffinity {
    Any,
    Cpu(usize),
}

struct Inner {
    buf: UnsafeCell<Box<[u8]>>,
    capacity: usize,
    // Reservation counter: producers CAS this forward to claim space.
    head: AtomicUsize,
    // Publish counter: a producer advances this only after writing its
    // bytes and only once it is next in publish order.
    committed: AtomicUsize,
    // Owned exclusively by the consumer.
    tail: AtomicUsize,
    closed: AtomicBool,
    wake_threshold_used: usize,
    notify: Semaphore,
    consumer_taken: AtomicBool,
}

// SAFETY: all mutation of `buf` happens through disjoint byte ranges
// reserved via the `head`/`committed` CAS protocol before any thread reads
// or writes them; the consumer only touches bytes below `committed`, which
// by construction no producer still holds a reservation over.
unsafe impl Sync for Inner {}
unsafe impl Send for Inner {}

pub struct Ring {
    inner: Arc<Inner>,
}

impl Ring {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 4, "ring capacity must hold at least one record");
        let wake_threshold_used =
            ((capacity as f64) * (1.0 - DEFAULT_WAKE_FREE_SPACE_RATIO)) as usize;
        Self {
            inner: Arc::new(Inner {
                buf: UnsafeCell::new(vec![0u8; capacity].into_boxed_slice()),
                capacity,
                head: AtomicUsize::new(0),
                committed: AtomicUsize::new(0),
                tail: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                wake_threshold_used,
                notify: Semaphore::new(),
                consumer_taken: AtomicBool::new(false),
            }),
        }
    }

    pub fn producer(&self) -> Producer {
        Producer {
            inner: self.inner.clone(),
        }
    }

    /// Hands out the single consumer handle. Returns `None` if a consumer
    /// handle has already been taken, matching the "consumer is
    /// single-threaded by contract" invariant.
    pub fn consumer(&self) -> Option<Consumer> {
        if self
            .inner
            .consumer_taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            Some(Consumer {
                inner: self.inner.clone(),
            })
        } else {
            None
        }
    }

    pub fn free_space(&self) -> usize {
        free_space(&self.inner)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.post();
    }
}

fn free_space(inner: &Inner) -> usize {
    let committed = inner.committed.load(Ordering::Acquire);
    let tail = inner.tail.load(Ordering::Acquire);
    let used = committed.wrapping_sub(tail);
    inner.capacity - used
}

/// Reservation-accounted free space, used by producers to decide whether a
/// new record fits even while earlier reservations haven't published yet.
fn free_space_reserved(inner: &Inner) -> usize {
    let head = inner.head.load(Ordering::Relaxed);
    let tail = inner.tail.load(Ordering::Acquire);
    let used = head.wrapping_sub(tail);
    inner.capacity - used
}

#[derive(Clone)]
pub struct Producer {
    inner: Arc<Inner>,
}

const LEN_PREFIX_BYTES: usize = 4;

impl Producer {
    /// Pushes one record. `len = 0` is a documented no-op that returns ok
    /// without writing anything.
    pub fn push(&self, bytes: &[u8]) -> Result<(), PushError> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(PushError::Closed);
        }

        let total = LEN_PREFIX_BYTES + bytes.len();
        if total > self.inner.capacity {
            return Err(PushError::Invalid);
        }

        let start = loop {
            let head = self.inner.head.load(Ordering::Relaxed);
            if free_space_reserved(&self.inner) < total {
                return Err(PushError::NoSpace);
            }
            if self
                .inner
                .head
                .compare_exchange_weak(
                    head,
                    head.wrapping_add(total),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break head;
            }
        };

        // SAFETY: [start, start+total) was exclusively reserved above; no
        // other producer will touch this range, and the consumer cannot
        // reach it until `committed` passes `start + total`.
        unsafe {
            let buf = &mut *self.inner.buf.get();
            write_wrapping(buf, start, &(bytes.len() as u32).to_le_bytes());
            write_wrapping(buf, start + LEN_PREFIX_BYTES, bytes);
        }

        // Publish in reservation order: spin until prior reservations have
        // committed. Under the framework's expected load (bounded number of
        // producer threads, short critical section) this spin is brief.
        while self
            .inner
            .committed
            .compare_exchange_weak(
                start,
                start.wrapping_add(total),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_err()
        {
            std::hint::spin_loop();
        }

        if free_space(&self.inner) < self.inner.capacity - self.inner.wake_threshold_used {
            self.inner.notify.post();
        }

        Ok(())
    }

    pub fn free_space(&self) -> usize {
        free_space(&self.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

pub struct Consumer {
    inner: Arc<Inner>,
}

impl Consumer {
    /// Pops one record into `out`, returning the number of bytes written
    /// (`0` if the ring is empty). Errors if the record doesn't fit `out`.
    pub fn pop(&self, out: &mut [u8]) -> Result<usize, PushError> {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let committed = self.inner.committed.load(Ordering::Acquire);
        if tail == committed {
            return Ok(0);
        }

        // SAFETY: bytes in [tail, committed) are published and will not be
        // touched by any producer; only this consumer advances `tail`.
        let len = unsafe {
            let buf = &*self.inner.buf.get();
            let mut len_bytes = [0u8; LEN_PREFIX_BYTES];
            read_wrapping(buf, tail, &mut len_bytes);
            u32::from_le_bytes(len_bytes) as usize
        };

        if len > out.len() {
            return Err(PushError::Invalid);
        }

        unsafe {
            let buf = &*self.inner.buf.get();
            read_wrapping(buf, tail + LEN_PREFIX_BYTES, &mut out[..len]);
        }

        self.inner
            .tail
            .store(tail.wrapping_add(LEN_PREFIX_BYTES + len), Ordering::Release);
        Ok(len)
    }

    pub fn is_empty(&self) -> bool {
        let tail = self.inner.tail.load(Ordering::Relaxed);
        let committed = self.inner.committed.load(Ordering::Acquire);
        tail == committed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Blocks up to `timeout` for the "ring became non-empty, or was
    /// closed" signal. Callers still must recheck `is_empty`/`is_closed`
    /// after waking, same as any condition-variable wait.
    pub fn wait(&self, timeout: Duration) -> bool {
        if !self.is_empty() || self.is_closed() {
            return true;
        }
        self.inner.notify.wait_for(timeout)
    }

    pub fn free_space(&self) -> usize {
        free_space(&self.inner)
    }
}

fn write_wrapping(buf: &mut [u8], start: usize, bytes: &[u8]) {
    let capacity = buf.len();
    let mut pos = start % capacity;
    for &b in bytes {
        buf[pos] = b;
        pos = (pos + 1) % capacity;
    }
}

fn read_wrapping(buf: &[u8], start: usize, out: &mut [u8]) {
    let capacity = buf.len();
    let mut pos = start % capacity;
    for slot in out.iter_mut() {
        *slot = buf[pos];
        pos = (pos + 1) % capacity;
    }
}
