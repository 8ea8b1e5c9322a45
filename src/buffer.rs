//! Fragment reassembly buffer.
//!
//! Accumulates media-packet fragments per frame identifier, hands out
//! completed frames through a bounded FIFO, and evicts stale partial frames
//! so sustained loss cannot grow memory without bound.
//!
//! Two shared structures, each behind its own lock:
//!
//! - the partial-frame map, shared between the receive path
//!   ([`add_fragment`](FrameBuffer::add_fragment)) and the background sweep;
//! - the assembled-frame queue, shared between the receive path and the
//!   consumer ([`pop_next`](FrameBuffer::pop_next)).
//!
//! When the queue is full the incoming frame is dropped, never the receive
//! path blocked: an already-late frame is worth less than a future one.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Reassembly and queue limits.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Assembled-frame FIFO capacity.
    pub capacity: usize,
    /// Age beyond which a partial frame is evicted by the sweep.
    pub fragment_timeout: Duration,
    /// Period of the background sweep.
    pub cleanup_interval: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            fragment_timeout: Duration::from_secs(2),
            cleanup_interval: Duration::from_secs(1),
        }
    }
}

/// One frame currently being assembled.
///
/// Created on first fragment arrival, destroyed on assembly or eviction —
/// never both. Fragment indices are unique keys; a duplicate index never
/// overwrites the stored payload, so the received count can never exceed
/// the declared total.
struct PartialFrame {
    total: u16,
    received: HashMap<u16, Vec<u8>>,
    created: Instant,
}

struct Shared {
    fragments: Mutex<HashMap<u32, PartialFrame>>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
    fragment_timeout: Duration,
    stop: AtomicBool,
}

/// Thread-safe frame reassembly buffer with a time-driven sweep.
///
/// The sweep runs on its own thread from construction until
/// [`stop`](Self::stop) (or drop); it is driven by time, not traffic, so
/// partial frames of a stalled stream still get evicted.
pub struct FrameBuffer {
    shared: Arc<Shared>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FrameBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let shared = Arc::new(Shared {
            fragments: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            capacity: config.capacity.max(1),
            fragment_timeout: config.fragment_timeout,
            stop: AtomicBool::new(false),
        });

        let sweeper_shared = shared.clone();
        let interval = config.cleanup_interval;
        let sweeper = thread::spawn(move || {
            sweep_loop(sweeper_shared, interval);
        });

        Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Record one fragment. Returns the assembled frame when this fragment
    /// completes it, `None` otherwise.
    ///
    /// Duplicate fragments (same frame id and index) are ignored. A
    /// fragment whose index falls outside the frame's declared total is
    /// rejected up front. The first fragment seen for a frame id fixes the
    /// expected total; later fragments disagreeing with it are judged
    /// against the original.
    pub fn add_fragment(
        &self,
        frame_id: u32,
        fragment_index: u16,
        total_fragments: u16,
        payload: Vec<u8>,
    ) -> Option<Vec<u8>> {
        if total_fragments == 0 || fragment_index >= total_fragments {
            tracing::warn!(
                frame_id,
                fragment_index,
                total_fragments,
                "rejecting fragment with inconsistent indices"
            );
            return None;
        }

        let mut fragments = self.shared.fragments.lock();
        let entry = fragments.entry(frame_id).or_insert_with(|| PartialFrame {
            total: total_fragments,
            received: HashMap::new(),
            created: Instant::now(),
        });

        if fragment_index >= entry.total {
            tracing::warn!(frame_id, fragment_index, total = entry.total, "fragment index out of range");
            return None;
        }
        entry.received.entry(fragment_index).or_insert(payload);

        if entry.received.len() == entry.total as usize {
            let entry = fragments.remove(&frame_id)?;
            drop(fragments);
            let frame = assemble(frame_id, entry)?;
            self.push_assembled(frame.clone());
            return Some(frame);
        }
        None
    }

    /// Append an assembled frame, dropping it silently when the FIFO is full.
    fn push_assembled(&self, frame: Vec<u8>) {
        let mut queue = self.shared.queue.lock();
        if queue.len() >= self.shared.capacity {
            tracing::trace!(capacity = self.shared.capacity, "frame queue full, dropping frame");
            return;
        }
        queue.push_back(frame);
    }

    /// Oldest assembled frame, or `None` if the queue is empty. Non-blocking.
    pub fn pop_next(&self) -> Option<Vec<u8>> {
        self.shared.queue.lock().pop_front()
    }

    /// Queue occupancy as a fraction of capacity, in `[0, 1]`.
    pub fn buffer_health(&self) -> f64 {
        self.shared.queue.lock().len() as f64 / self.shared.capacity as f64
    }

    /// Number of frames currently mid-assembly.
    pub fn partial_count(&self) -> usize {
        self.shared.fragments.lock().len()
    }

    /// Run one eviction pass immediately, returning how many partial frames
    /// were evicted. The background sweep calls this on its own schedule.
    pub fn sweep_now(&self) -> usize {
        sweep(&self.shared)
    }

    /// Stop the background sweep. Idempotent; also called on drop.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.sweeper.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Poll the stop flag at a 20 ms granularity between sweeps so shutdown
/// is prompt even with long sweep intervals.
fn sweep_loop(shared: Arc<Shared>, interval: Duration) {
    const POLL: Duration = Duration::from_millis(20);
    let mut slept = Duration::ZERO;
    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        thread::sleep(POLL.min(interval));
        slept += POLL;
        if slept >= interval {
            slept = Duration::ZERO;
            sweep(&shared);
        }
    }
    tracing::debug!("reassembly sweep exited");
}

fn sweep(shared: &Shared) -> usize {
    let mut fragments = shared.fragments.lock();
    let before = fragments.len();
    fragments.retain(|frame_id, entry| {
        let stale = entry.created.elapsed() > shared.fragment_timeout;
        if stale {
            tracing::debug!(
                frame_id,
                received = entry.received.len(),
                total = entry.total,
                "evicting stale partial frame"
            );
        }
        !stale
    });
    before - fragments.len()
}

/// Concatenate payloads by ascending fragment index. Completion is checked
/// before this is called, so a missing index can only mean a corrupted
/// total-fragment count; the frame is dropped rather than emitted corrupt.
fn assemble(frame_id: u32, mut entry: PartialFrame) -> Option<Vec<u8>> {
    let mut frame = Vec::new();
    for index in 0..entry.total {
        match entry.received.remove(&index) {
            Some(chunk) => frame.extend_from_slice(&chunk),
            None => {
                tracing::warn!(frame_id, index, total = entry.total, "assembly missing fragment, dropping frame");
                return None;
            }
        }
    }
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_buffer() -> FrameBuffer {
        // Long sweep settings so the background thread stays out of the way.
        FrameBuffer::new(BufferConfig {
            capacity: 50,
            fragment_timeout: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
        })
    }

    #[test]
    fn in_order_assembly() {
        let buf = quiet_buffer();
        assert!(buf.add_fragment(1, 0, 3, vec![1, 2]).is_none());
        assert!(buf.add_fragment(1, 1, 3, vec![3, 4]).is_none());
        let frame = buf.add_fragment(1, 2, 3, vec![5]).unwrap();
        assert_eq!(frame, vec![1, 2, 3, 4, 5]);
        assert_eq!(buf.partial_count(), 0);
    }

    #[test]
    fn any_permutation_assembles_identically() {
        let chunks: [&[u8]; 4] = [b"aa", b"bb", b"cc", b"d"];
        let orders: [[u16; 4]; 5] = [
            [0, 1, 2, 3],
            [3, 2, 1, 0],
            [2, 0, 3, 1],
            [1, 3, 0, 2],
            [3, 0, 1, 2],
        ];
        for order in orders {
            let buf = quiet_buffer();
            let mut assembled = None;
            for &i in &order {
                let result = buf.add_fragment(7, i, 4, chunks[i as usize].to_vec());
                if let Some(frame) = result {
                    assert!(assembled.is_none(), "assembled more than once");
                    assembled = Some(frame);
                }
            }
            assert_eq!(assembled.unwrap(), b"aabbccd");
        }
    }

    #[test]
    fn duplicate_fragment_ignored() {
        let buf = quiet_buffer();
        assert!(buf.add_fragment(1, 0, 2, vec![1]).is_none());
        assert!(buf.add_fragment(1, 0, 2, vec![99]).is_none());
        let frame = buf.add_fragment(1, 1, 2, vec![2]).unwrap();
        // first payload wins
        assert_eq!(frame, vec![1, 2]);
    }

    #[test]
    fn index_out_of_declared_range_rejected() {
        let buf = quiet_buffer();
        assert!(buf.add_fragment(1, 2, 2, vec![1]).is_none());
        assert!(buf.add_fragment(1, 0, 0, vec![1]).is_none());
        assert_eq!(buf.partial_count(), 0);
    }

    #[test]
    fn bounded_queue_drops_newest() {
        let buf = FrameBuffer::new(BufferConfig {
            capacity: 2,
            fragment_timeout: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
        });
        for id in 1..=3u32 {
            buf.add_fragment(id, 0, 1, vec![id as u8]).unwrap();
        }
        assert_eq!(buf.pop_next(), Some(vec![1]));
        assert_eq!(buf.pop_next(), Some(vec![2]));
        assert_eq!(buf.pop_next(), None); // third was dropped
    }

    #[test]
    fn buffer_health_tracks_occupancy() {
        let buf = FrameBuffer::new(BufferConfig {
            capacity: 4,
            fragment_timeout: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
        });
        assert_eq!(buf.buffer_health(), 0.0);
        buf.add_fragment(1, 0, 1, vec![0]).unwrap();
        buf.add_fragment(2, 0, 1, vec![0]).unwrap();
        assert_eq!(buf.buffer_health(), 0.5);
    }

    #[test]
    fn stale_partial_evicted_and_never_assembles() {
        let buf = FrameBuffer::new(BufferConfig {
            capacity: 4,
            fragment_timeout: Duration::from_millis(10),
            cleanup_interval: Duration::from_secs(60),
        });
        assert!(buf.add_fragment(1, 0, 2, vec![1]).is_none());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(buf.sweep_now(), 1);
        assert_eq!(buf.partial_count(), 0);
        // the missing fragment arriving late starts a fresh entry instead
        // of completing the evicted one
        assert!(buf.add_fragment(1, 1, 2, vec![2]).is_none());
        assert_eq!(buf.partial_count(), 1);
    }

    #[test]
    fn background_sweep_evicts_without_traffic() {
        let buf = FrameBuffer::new(BufferConfig {
            capacity: 4,
            fragment_timeout: Duration::from_millis(20),
            cleanup_interval: Duration::from_millis(40),
        });
        assert!(buf.add_fragment(9, 0, 2, vec![1]).is_none());
        thread::sleep(Duration::from_millis(200));
        assert_eq!(buf.partial_count(), 0);
    }

    #[test]
    fn concurrent_adds_and_sweeps() {
        let buf = Arc::new(quiet_buffer());
        let writer = {
            let buf = buf.clone();
            thread::spawn(move || {
                for id in 0..500u32 {
                    buf.add_fragment(id, 0, 2, vec![0; 16]);
                    buf.add_fragment(id, 1, 2, vec![0; 16]);
                }
            })
        };
        for _ in 0..50 {
            buf.sweep_now();
        }
        writer.join().unwrap();
    }
}
