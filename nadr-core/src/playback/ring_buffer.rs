//! Lock-free SPSC byte ring
//!
//! Carries converted audio from the producer (scheduler thread) to the
//! consumer (transport pull). Size is always a power of two so cursor
//! arithmetic is a bitmask; one byte is sacrificed so that a full ring and an
//! empty ring are distinguishable:
//!
//! ```text
//! available = (write - read) & mask
//! free      = (read - write - 1) & mask
//! available + free == size - 1
//! ```
//!
//! Design:
//! - Producer only stores `write_pos`, consumer only stores `read_pos`
//! - Cursor loads of the other side use Acquire, own-cursor stores use Release
//! - Copies go through the fixed-cost [`copy`] primitive, at most two per call
//! - Direct regions expose contiguous ring memory for zero-copy access
//! - Every access runs inside a [`ReconfigureGate`] access; resize and clear
//!   run under its exclusive guard
//!
//! Nothing here blocks or logs. Short results (insufficient space or data) are
//! ordinary return values and bump counters that the monitor reports.

use crate::audio::copy::copy;
use crate::audio::types::AlignedBuffer;
use crate::error::{Error, Result};
use crate::playback::gate::{AccessGuard, ReconfigureGate};
use crate::playback::layout::StreamLayout;
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Ring memory plus the layout that describes it
///
/// Mutated only under the gate's exclusive guard.
struct RingStorage {
    buf: AlignedBuffer,
    base: NonNull<u8>,
    mask: usize,
    layout: StreamLayout,
}

impl RingStorage {
    fn new(size: usize, layout: StreamLayout) -> Self {
        let mut buf = AlignedBuffer::new(size, layout.silence);
        let base = NonNull::new(buf.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self {
            buf,
            base,
            mask: size - 1,
            layout,
        }
    }

    #[inline]
    fn size(&self) -> usize {
        self.mask + 1
    }
}

/// Delivery counters, owned by the ring and shared by both sides
#[derive(Debug, Default)]
pub struct RingCounters {
    pub bytes_pushed: AtomicU64,
    /// Pushes cut short by lack of space
    pub truncated_pushes: AtomicU64,
    pub pulls: AtomicU64,
    pub zero_copy_pulls: AtomicU64,
    pub copy_pulls: AtomicU64,
    /// Pulls answered with silence for any reason
    pub silence_pulls: AtomicU64,
    /// Silence because streaming data ran short
    pub underruns: AtomicU64,
    /// Silence because the ring was being reconfigured
    pub reconfigure_pulls: AtomicU64,
    /// Final short pulls: remaining audio padded with silence
    pub tail_pulls: AtomicU64,
    pub reconfigurations: AtomicU64,
    pub reconfigure_timeouts: AtomicU64,
}

impl RingCounters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            bytes_pushed: self.bytes_pushed.load(Ordering::Relaxed),
            truncated_pushes: self.truncated_pushes.load(Ordering::Relaxed),
            pulls: self.pulls.load(Ordering::Relaxed),
            zero_copy_pulls: self.zero_copy_pulls.load(Ordering::Relaxed),
            copy_pulls: self.copy_pulls.load(Ordering::Relaxed),
            silence_pulls: self.silence_pulls.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            reconfigure_pulls: self.reconfigure_pulls.load(Ordering::Relaxed),
            tail_pulls: self.tail_pulls.load(Ordering::Relaxed),
            reconfigurations: self.reconfigurations.load(Ordering::Relaxed),
            reconfigure_timeouts: self.reconfigure_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RingCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub bytes_pushed: u64,
    pub truncated_pushes: u64,
    pub pulls: u64,
    pub zero_copy_pulls: u64,
    pub copy_pulls: u64,
    pub silence_pulls: u64,
    pub underruns: u64,
    pub reconfigure_pulls: u64,
    pub tail_pulls: u64,
    pub reconfigurations: u64,
    pub reconfigure_timeouts: u64,
}

/// Ring buffer statistics
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RingBufferStats {
    pub size: usize,
    pub available: usize,
    pub free: usize,
    pub generation: u64,
    pub counters: CounterSnapshot,
}

impl RingBufferStats {
    /// Fill level as a percentage of usable capacity
    pub fn fill_percent(&self) -> f32 {
        let usable = self.size.saturating_sub(1);
        if usable == 0 {
            return 0.0;
        }
        (self.available as f32 / usable as f32) * 100.0
    }
}

/// The shared ring
///
/// Built with [`ByteRing::new`] and immediately [`split`](ByteRing::split)
/// into its producer and consumer halves.
pub struct ByteRing {
    storage: UnsafeCell<RingStorage>,
    write_pos: CachePadded<AtomicUsize>,
    read_pos: CachePadded<AtomicUsize>,
    /// Mirror of the storage mask, readable without an access
    mask: AtomicUsize,
    /// Mirror of the layout's silence byte, readable without an access
    silence: AtomicU8,
    gate: ReconfigureGate,
    counters: RingCounters,
    zero_copy: AtomicBool,
    /// Set when the session ends; producers stop delivering
    closed: AtomicBool,
    /// Producer has pushed the last byte of its source
    end_of_stream: AtomicBool,
}

// SAFETY: storage is only dereferenced inside a gate access (shared, with the
// producer and consumer touching disjoint byte ranges delimited by the atomic
// cursors) or under the gate's exclusive guard (no other access in flight and
// no outstanding handle).
unsafe impl Send for ByteRing {}
unsafe impl Sync for ByteRing {}

impl ByteRing {
    /// Create a ring of `size` bytes (power of two, at least 2)
    pub fn new(size: usize) -> Result<Self> {
        Self::with_layout(size, StreamLayout::unconfigured())
    }

    pub fn with_layout(size: usize, layout: StreamLayout) -> Result<Self> {
        validate_size(size)?;
        debug!("Creating byte ring: {} bytes", size);
        Ok(Self {
            storage: UnsafeCell::new(RingStorage::new(size, layout)),
            write_pos: CachePadded::new(AtomicUsize::new(0)),
            read_pos: CachePadded::new(AtomicUsize::new(0)),
            mask: AtomicUsize::new(size - 1),
            silence: AtomicU8::new(layout.silence),
            gate: ReconfigureGate::new(),
            counters: RingCounters::default(),
            zero_copy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            end_of_stream: AtomicBool::new(false),
        })
    }

    /// Split into producer, consumer, and reconfiguration handles
    pub fn split(self) -> (RingProducer, RingConsumer, RingControl) {
        let ring = Arc::new(self);
        (
            RingProducer {
                ring: Arc::clone(&ring),
            },
            RingConsumer {
                ring: Arc::clone(&ring),
            },
            RingControl { ring },
        )
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.mask.load(Ordering::Acquire) + 1
    }

    /// Bytes readable now
    #[inline]
    pub fn available(&self) -> usize {
        let mask = self.mask.load(Ordering::Acquire);
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Acquire);
        w.wrapping_sub(r) & mask
    }

    /// Bytes writable now
    #[inline]
    pub fn free_space(&self) -> usize {
        let mask = self.mask.load(Ordering::Acquire);
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Acquire);
        r.wrapping_sub(w).wrapping_sub(1) & mask
    }

    pub fn gate(&self) -> &ReconfigureGate {
        &self.gate
    }

    pub fn counters(&self) -> &RingCounters {
        &self.counters
    }

    pub fn zero_copy_enabled(&self) -> bool {
        self.zero_copy.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Silence byte of the current (or incoming) layout
    pub fn silence_byte(&self) -> u8 {
        self.silence.load(Ordering::Acquire)
    }

    /// Everything the producer will send is already in the ring
    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            size: self.size(),
            available: self.available(),
            free: self.free_space(),
            generation: self.gate.generation(),
            counters: self.counters.snapshot(),
        }
    }

    /// # Safety
    /// Caller holds a gate access or the exclusive guard.
    #[inline]
    unsafe fn storage(&self) -> &RingStorage {
        &*self.storage.get()
    }

    /// # Safety
    /// Caller holds the exclusive guard.
    #[allow(clippy::mut_from_ref)]
    unsafe fn storage_mut(&self) -> &mut RingStorage {
        &mut *self.storage.get()
    }

    /// Producer-side copy in. Caller holds an access as the single producer.
    fn push_inner(&self, data: &[u8]) -> usize {
        // SAFETY: access held by caller
        let st = unsafe { self.storage() };
        let size = st.size();
        let w = self.write_pos.load(Ordering::Relaxed);
        let r = self.read_pos.load(Ordering::Acquire);
        let free = r.wrapping_sub(w).wrapping_sub(1) & st.mask;

        let n = data.len().min(free);
        if n < data.len() {
            RingCounters::bump(&self.counters.truncated_pushes);
        }
        if n == 0 {
            return 0;
        }

        let first = n.min(size - w);
        // SAFETY: [w, w + first) and [0, n - first) lie in the free region,
        // which the consumer never reads until write_pos is published below.
        unsafe {
            copy(producer_slice(st, w, first), &data[..first]);
            if n > first {
                copy(producer_slice(st, 0, n - first), &data[first..n]);
            }
        }

        self.write_pos.store((w + n) & st.mask, Ordering::Release);
        self.counters
            .bytes_pushed
            .fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    /// Consumer-side copy out. Caller holds an access as the single consumer.
    fn pop_inner(&self, dest: &mut [u8]) -> usize {
        // SAFETY: access held by caller
        let st = unsafe { self.storage() };
        let size = st.size();
        let r = self.read_pos.load(Ordering::Relaxed);
        let w = self.write_pos.load(Ordering::Acquire);
        let available = w.wrapping_sub(r) & st.mask;

        let n = dest.len().min(available);
        if n == 0 {
            return 0;
        }

        let first = n.min(size - r);
        // SAFETY: [r, r + first) and [0, n - first) lie in the live region,
        // which the producer never writes until read_pos is published below.
        unsafe {
            copy(&mut dest[..first], consumer_slice(st, r, first));
            if n > first {
                copy(&mut dest[first..n], consumer_slice(st, 0, n - first));
            }
        }

        self.read_pos.store((r + n) & st.mask, Ordering::Release);
        n
    }

    /// Start of a contiguous writable run of at least `needed` bytes
    fn write_region_inner(&self, needed: usize) -> Option<usize> {
        // SAFETY: access held by caller
        let st = unsafe { self.storage() };
        let w = self.write_pos.load(Ordering::Relaxed);
        let r = self.read_pos.load(Ordering::Acquire);
        let free = r.wrapping_sub(w).wrapping_sub(1) & st.mask;
        let contiguous = free.min(st.size() - w);
        (needed > 0 && contiguous >= needed).then_some(w)
    }

    fn commit_write_inner(&self, n: usize) -> usize {
        // SAFETY: access held by caller
        let st = unsafe { self.storage() };
        let w = self.write_pos.load(Ordering::Relaxed);
        let r = self.read_pos.load(Ordering::Acquire);
        let free = r.wrapping_sub(w).wrapping_sub(1) & st.mask;
        let n = n.min(free).min(st.size() - w);
        self.write_pos.store((w + n) & st.mask, Ordering::Release);
        self.counters
            .bytes_pushed
            .fetch_add(n as u64, Ordering::Relaxed);
        n
    }

    /// Start of a contiguous readable run of at least `needed` bytes
    fn read_region_inner(&self, needed: usize) -> Option<usize> {
        // SAFETY: access held by caller
        let st = unsafe { self.storage() };
        let r = self.read_pos.load(Ordering::Relaxed);
        let w = self.write_pos.load(Ordering::Acquire);
        let available = w.wrapping_sub(r) & st.mask;
        let contiguous = available.min(st.size() - r);
        (needed > 0 && contiguous >= needed).then_some(r)
    }

    fn advance_read_inner(&self, n: usize) -> usize {
        // SAFETY: access held by caller
        let st = unsafe { self.storage() };
        let r = self.read_pos.load(Ordering::Relaxed);
        let w = self.write_pos.load(Ordering::Acquire);
        let n = n.min(w.wrapping_sub(r) & st.mask);
        self.read_pos.store((r + n) & st.mask, Ordering::Release);
        n
    }
}

fn validate_size(size: usize) -> Result<()> {
    if size < 2 || !size.is_power_of_two() {
        return Err(Error::InvalidState(format!(
            "ring size must be a power of two >= 2, got {}",
            size
        )));
    }
    Ok(())
}

/// # Safety
/// `[offset, offset + len)` is inside the ring and owned by the producer.
#[inline]
#[allow(clippy::mut_from_ref)]
unsafe fn producer_slice(st: &RingStorage, offset: usize, len: usize) -> &mut [u8] {
    std::slice::from_raw_parts_mut(st.base.as_ptr().add(offset), len)
}

/// # Safety
/// `[offset, offset + len)` is inside the ring and owned by the consumer.
#[inline]
unsafe fn consumer_slice(st: &RingStorage, offset: usize, len: usize) -> &[u8] {
    std::slice::from_raw_parts(st.base.as_ptr().add(offset), len)
}

/// Producer half (not cloneable)
pub struct RingProducer {
    ring: Arc<ByteRing>,
}

impl RingProducer {
    /// Open a write session; `None` while the ring is being reconfigured
    pub fn session(&mut self) -> Option<WriteSession<'_>> {
        let guard = self.ring.gate.enter()?;
        Some(WriteSession {
            ring: &self.ring,
            _guard: guard,
        })
    }

    /// Copy in as much of `data` as fits; 0 while reconfiguring
    pub fn push(&mut self, data: &[u8]) -> usize {
        self.session().map_or(0, |s| s.push(data))
    }

    pub fn available(&self) -> usize {
        self.ring.available()
    }

    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    /// Mark the source exhausted after its last push
    ///
    /// Lets the consumer flush a tail shorter than one pull instead of
    /// waiting for data that never comes.
    pub fn mark_end_of_stream(&self) {
        self.ring.end_of_stream.store(true, Ordering::Release);
    }

    /// More audio follows (next track)
    pub fn resume_stream(&self) {
        if self.ring.end_of_stream.load(Ordering::Relaxed) {
            self.ring.end_of_stream.store(false, Ordering::Release);
        }
    }

    pub fn ring(&self) -> &ByteRing {
        &self.ring
    }
}

/// One producer access
pub struct WriteSession<'a> {
    ring: &'a ByteRing,
    _guard: AccessGuard<'a>,
}

impl<'a> WriteSession<'a> {
    /// Copy in up to `data.len()` bytes, wrapping if needed
    ///
    /// Never blocks; returns fewer bytes than offered when space runs out.
    pub fn push(&self, data: &[u8]) -> usize {
        self.ring.push_inner(data)
    }

    /// Contiguous writable memory of exactly `needed` bytes, or `None` when
    /// free space is short or the run would cross the end of the ring
    pub fn direct_write_region(&mut self, needed: usize) -> Option<&mut [u8]> {
        let offset = self.ring.write_region_inner(needed)?;
        // SAFETY: access held; the run is free space owned by the producer
        // and the returned borrow ends before commit_write can be called.
        unsafe {
            let st = self.ring.storage();
            Some(producer_slice(st, offset, needed))
        }
    }

    /// Publish `n` bytes written through [`direct_write_region`]
    ///
    /// Clamped to the contiguous free run; returns the bytes committed.
    ///
    /// [`direct_write_region`]: WriteSession::direct_write_region
    pub fn commit_write(&mut self, n: usize) -> usize {
        self.ring.commit_write_inner(n)
    }

    pub fn available(&self) -> usize {
        self.ring.available()
    }

    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn layout(&self) -> &StreamLayout {
        // SAFETY: access held
        unsafe { &self.ring.storage().layout }
    }

    pub fn generation(&self) -> u64 {
        self.ring.gate.generation()
    }

    pub fn counters(&self) -> &RingCounters {
        &self.ring.counters
    }
}

/// Consumer half (not cloneable)
pub struct RingConsumer {
    ring: Arc<ByteRing>,
}

impl RingConsumer {
    /// Open a read session; `None` while the ring is being reconfigured
    pub fn session(&mut self) -> Option<ReadSession<'_>> {
        let guard = self.ring.gate.enter()?;
        Some(ReadSession {
            ring: &self.ring,
            _guard: guard,
        })
    }

    /// Copy out up to `dest.len()` bytes; 0 while reconfiguring
    pub fn pop(&mut self, dest: &mut [u8]) -> usize {
        self.session().map_or(0, |mut s| s.pop(dest))
    }

    pub fn available(&self) -> usize {
        self.ring.available()
    }

    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn ring(&self) -> &ByteRing {
        &self.ring
    }
}

/// One consumer access
pub struct ReadSession<'a> {
    ring: &'a ByteRing,
    _guard: AccessGuard<'a>,
}

impl<'a> ReadSession<'a> {
    /// Copy out up to `dest.len()` bytes, unwrapping if needed
    ///
    /// Takes `&mut self`: popping frees space, so no region returned by
    /// [`direct_read_region`](ReadSession::direct_read_region) may still be
    /// borrowed.
    pub fn pop(&mut self, dest: &mut [u8]) -> usize {
        self.ring.pop_inner(dest)
    }

    /// Contiguous readable memory of exactly `needed` bytes
    ///
    /// `None` is either an underrun or a run that wraps; compare
    /// [`available`](ReadSession::available) with `needed` to tell them apart.
    pub fn direct_read_region(&self, needed: usize) -> Option<&[u8]> {
        let offset = self.ring.read_region_inner(needed)?;
        // SAFETY: access held; the run is live data the producer cannot
        // overwrite until read_pos moves.
        unsafe {
            let st = self.ring.storage();
            Some(consumer_slice(st, offset, needed))
        }
    }

    /// Raw form of [`direct_read_region`](ReadSession::direct_read_region)
    /// for handles that outlive the session
    pub(crate) fn direct_read_ptr(&self, needed: usize) -> Option<NonNull<u8>> {
        let offset = self.ring.read_region_inner(needed)?;
        // SAFETY: access held; offset < size
        unsafe {
            let st = self.ring.storage();
            NonNull::new(st.base.as_ptr().add(offset))
        }
    }

    /// Flag a region handed out beyond this session
    pub(crate) fn mark_handle_outstanding(&self) {
        self.ring.gate.mark_handle_outstanding();
    }

    /// Release `n` bytes previously read in place; clamped to available
    ///
    /// Takes `&mut self` so the borrow of any region read in place has ended
    /// before the producer may reuse its bytes:
    ///
    /// ```compile_fail
    /// use nadr_core::playback::ByteRing;
    ///
    /// let (mut tx, mut rx, _) = ByteRing::new(16).unwrap().split();
    /// tx.push(&[1; 15]);
    /// let mut session = rx.session().unwrap();
    /// let region = session.direct_read_region(8).unwrap();
    /// session.advance_read(15);
    /// tx.push(&[9; 15]);
    /// assert_eq!(region, &[1; 8]);
    /// ```
    pub fn advance_read(&mut self, n: usize) -> usize {
        self.ring.advance_read_inner(n)
    }

    pub fn available(&self) -> usize {
        self.ring.available()
    }

    pub fn layout(&self) -> &StreamLayout {
        // SAFETY: access held
        unsafe { &self.ring.storage().layout }
    }

    pub fn generation(&self) -> u64 {
        self.ring.gate.generation()
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.ring.is_end_of_stream()
    }

    pub fn zero_copy_enabled(&self) -> bool {
        self.ring.zero_copy_enabled()
    }

    pub fn counters(&self) -> &'a RingCounters {
        &self.ring.counters
    }
}

/// Reconfiguration handle (cloneable)
///
/// Every mutation rendezvous with both sides through the gate, bounded by
/// the given timeout.
#[derive(Clone)]
pub struct RingControl {
    ring: Arc<ByteRing>,
}

impl RingControl {
    /// Install a new layout, reallocating only when the size changes
    ///
    /// Cursors reset and the whole ring is filled with the layout's silence
    /// byte. Returns the new generation.
    pub fn reconfigure(&self, size: usize, layout: StreamLayout, timeout: Duration) -> Result<u64> {
        validate_size(size)?;
        let guard = self.lock(timeout)?;

        // SAFETY: exclusive guard held
        let st = unsafe { self.ring.storage_mut() };
        if st.size() == size {
            st.buf.fill(layout.silence);
            st.layout = layout;
        } else {
            *st = RingStorage::new(size, layout);
        }
        self.ring.mask.store(size - 1, Ordering::Release);
        self.ring.silence.store(layout.silence, Ordering::Release);
        self.ring.write_pos.store(0, Ordering::Release);
        self.ring.read_pos.store(0, Ordering::Release);
        self.ring.end_of_stream.store(false, Ordering::Release);

        let generation = guard.bump_generation();
        RingCounters::bump(&self.ring.counters.reconfigurations);
        info!(
            "Ring reconfigured: {} bytes, prefill {} bytes, generation {}",
            size, layout.prefill_bytes, generation
        );
        Ok(generation)
    }

    /// Drop all buffered audio (stop/seek)
    ///
    /// Cursors reset and memory is refilled with silence. Returns the new
    /// generation.
    pub fn clear(&self, timeout: Duration) -> Result<u64> {
        let guard = self.lock(timeout)?;

        // SAFETY: exclusive guard held
        let st = unsafe { self.ring.storage_mut() };
        let silence = st.layout.silence;
        st.buf.fill(silence);
        self.ring.write_pos.store(0, Ordering::Release);
        self.ring.read_pos.store(0, Ordering::Release);
        self.ring.end_of_stream.store(false, Ordering::Release);

        let generation = guard.bump_generation();
        debug!("Ring cleared, generation {}", generation);
        Ok(generation)
    }

    /// Current layout, read under a short access
    ///
    /// `None` while a reconfiguration is in progress.
    pub fn layout(&self) -> Option<StreamLayout> {
        let _guard = self.ring.gate.enter()?;
        // SAFETY: access held
        Some(unsafe { self.ring.storage().layout })
    }

    pub fn set_zero_copy(&self, enabled: bool) {
        self.ring.zero_copy.store(enabled, Ordering::Relaxed);
    }

    /// Tell the producer side to stop delivering
    pub fn close(&self) {
        self.ring.closed.store(true, Ordering::Release);
    }

    pub fn reopen(&self) {
        self.ring.closed.store(false, Ordering::Release);
    }

    pub fn ring(&self) -> &ByteRing {
        &self.ring
    }

    pub fn stats(&self) -> RingBufferStats {
        self.ring.stats()
    }

    fn lock(&self, timeout: Duration) -> Result<crate::playback::gate::ExclusiveGuard<'_>> {
        self.ring.gate.lock(timeout).inspect_err(|_| {
            RingCounters::bump(&self.ring.counters.reconfigure_timeouts);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[test]
    fn test_ring_buffer_basic() {
        let (mut tx, mut rx, _) = ByteRing::new(16).unwrap().split();
        assert_eq!(tx.free_space(), 15);
        assert_eq!(rx.available(), 0);

        assert_eq!(tx.push(&[1, 2, 3, 4]), 4);
        assert_eq!(rx.available(), 4);

        let mut out = [0u8; 8];
        assert_eq!(rx.pop(&mut out), 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_one_byte_sacrificed() {
        let (mut tx, _rx, _) = ByteRing::new(8).unwrap().split();
        assert_eq!(tx.push(&[9u8; 20]), 7);
        assert_eq!(tx.free_space(), 0);
        assert_eq!(tx.available(), 7);
        assert_eq!(tx.ring().counters().snapshot().truncated_pushes, 1);
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(ByteRing::new(1000).is_err());
        assert!(ByteRing::new(1).is_err());
        assert!(ByteRing::new(0).is_err());
    }

    #[test]
    fn test_conservation_through_mixed_operations() {
        let (mut tx, mut rx, _) = ByteRing::new(64).unwrap().split();
        let mut out = [0u8; 64];
        for step in 0..500usize {
            let push_len = (step * 7) % 50;
            tx.push(&ramp(push_len, step as u8));
            assert_eq!(tx.available() + tx.free_space(), 63);

            let pop_len = (step * 5) % 45;
            rx.pop(&mut out[..pop_len]);
            assert_eq!(rx.available() + rx.free_space(), 63);
        }
    }

    #[test]
    fn test_direct_write_then_commit() {
        let (mut tx, mut rx, _) = ByteRing::new(32).unwrap().split();
        {
            let mut session = tx.session().unwrap();
            let region = session.direct_write_region(10).unwrap();
            region.copy_from_slice(&ramp(10, 1));
            assert_eq!(session.commit_write(10), 10);
        }
        let mut out = [0u8; 10];
        assert_eq!(rx.pop(&mut out), 10);
        assert_eq!(out.to_vec(), ramp(10, 1));
    }

    #[test]
    fn test_direct_read_and_advance() {
        let (mut tx, mut rx, _) = ByteRing::new(32).unwrap().split();
        tx.push(&ramp(12, 4));
        let mut session = rx.session().unwrap();
        assert_eq!(session.direct_read_region(12).unwrap(), &ramp(12, 4)[..]);
        assert!(session.direct_read_region(13).is_none());
        assert_eq!(session.advance_read(100), 12);
        assert_eq!(session.available(), 0);
    }

    #[test]
    fn test_reconfigure_resets_and_fills_silence() {
        let (mut tx, mut rx, control) = ByteRing::new(16).unwrap().split();
        tx.push(&[1u8; 10]);

        let mut layout = StreamLayout::unconfigured();
        layout.silence = 0x69;
        let generation = control
            .reconfigure(64, layout, Duration::from_millis(50))
            .unwrap();

        assert_eq!(generation, 1);
        assert_eq!(rx.available(), 0);
        assert_eq!(tx.free_space(), 63);
        assert_eq!(control.layout().unwrap().silence, 0x69);

        // The fresh ring is silence everywhere
        let mut session = tx.session().unwrap();
        let region = session.direct_write_region(63).unwrap();
        assert!(region.iter().all(|&b| b == 0x69));
    }

    #[test]
    fn test_clear_refused_while_access_in_flight() {
        let (mut tx, _rx, control) = ByteRing::new(16).unwrap().split();
        let session = tx.session().unwrap();
        let result = control.clear(Duration::from_millis(5));
        assert!(matches!(result, Err(Error::ReconfigureTimeout(_))));
        drop(session);

        assert_eq!(control.stats().counters.reconfigure_timeouts, 1);
        assert!(control.clear(Duration::from_millis(5)).is_ok());
    }

    #[test]
    fn test_stats_fill_percent() {
        let (mut tx, _rx, control) = ByteRing::new(128).unwrap().split();
        tx.push(&[0u8; 127]);
        let stats = control.stats();
        assert_eq!(stats.available, 127);
        assert!((stats.fill_percent() - 100.0).abs() < 0.01);
    }
}
