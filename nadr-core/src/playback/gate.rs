//! Reconfiguration rendezvous
//!
//! The ring is touched by three actors: the producer, the consumer, and an
//! infrequent reconfigurer (format change, stop, seek). Producer and consumer
//! wrap every ring access in an [`AccessGuard`]. The reconfigurer raises the
//! `reconfiguring` flag first so no new access can start, then waits for
//! in-flight accesses to exit and for any outstanding zero-copy handle to be
//! released before it mutates ring memory.
//!
//! The wait is bounded. On timeout the flag is dropped again, nothing is
//! mutated, and the caller gets [`Error::ReconfigureTimeout`].
//!
//! # Ordering
//!
//! `enter` increments `active_users` and then loads `reconfiguring`; `lock`
//! stores `reconfiguring` and then loads `active_users`. Both sides use SeqCst
//! so at least one of them observes the other.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Spins before falling back to short sleeps while waiting
const SPIN_LIMIT: u32 = 64;
const WAIT_SLEEP: Duration = Duration::from_micros(100);

#[derive(Debug, Default)]
pub struct ReconfigureGate {
    reconfiguring: AtomicBool,
    active_users: AtomicUsize,
    handle_outstanding: AtomicBool,
    generation: AtomicU64,
}

impl ReconfigureGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin one ring access; `None` while a reconfiguration is pending
    ///
    /// Never blocks.
    #[inline]
    pub fn enter(&self) -> Option<AccessGuard<'_>> {
        self.active_users.fetch_add(1, Ordering::SeqCst);
        if self.reconfiguring.load(Ordering::SeqCst) {
            self.active_users.fetch_sub(1, Ordering::Release);
            return None;
        }
        Some(AccessGuard { gate: self })
    }

    pub fn is_reconfiguring(&self) -> bool {
        self.reconfiguring.load(Ordering::Acquire)
    }

    /// Incremented by every completed reconfiguration
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn active_users(&self) -> usize {
        self.active_users.load(Ordering::Acquire)
    }

    /// Consumer handed out a direct ring region; set inside an access
    #[inline]
    pub fn mark_handle_outstanding(&self) {
        self.handle_outstanding.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn clear_handle_outstanding(&self) {
        self.handle_outstanding.store(false, Ordering::SeqCst);
    }

    pub fn handle_outstanding(&self) -> bool {
        self.handle_outstanding.load(Ordering::SeqCst)
    }

    /// Block new accesses and wait until the ring is quiescent
    ///
    /// Waits up to `timeout` for in-flight accesses and any outstanding
    /// handle. A second reconfigurer waits for the first within the same
    /// bound.
    pub fn lock(&self, timeout: Duration) -> Result<ExclusiveGuard<'_>> {
        let deadline = Instant::now() + timeout;

        let mut spins = 0;
        while self
            .reconfiguring
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if Instant::now() >= deadline {
                return Err(Error::ReconfigureTimeout(timeout));
            }
            backoff(&mut spins);
        }

        let mut spins = 0;
        loop {
            let quiescent = self.active_users.load(Ordering::SeqCst) == 0
                && !self.handle_outstanding.load(Ordering::SeqCst);
            if quiescent {
                return Ok(ExclusiveGuard { gate: self });
            }
            if Instant::now() >= deadline {
                self.reconfiguring.store(false, Ordering::SeqCst);
                return Err(Error::ReconfigureTimeout(timeout));
            }
            backoff(&mut spins);
        }
    }
}

fn backoff(spins: &mut u32) {
    if *spins < SPIN_LIMIT {
        *spins += 1;
        std::hint::spin_loop();
    } else {
        std::thread::sleep(WAIT_SLEEP);
    }
}

/// One producer or consumer access in flight
#[must_use]
pub struct AccessGuard<'a> {
    gate: &'a ReconfigureGate,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.gate.active_users.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive access for a reconfiguration
///
/// Dropping the guard reopens the gate. [`ExclusiveGuard::bump_generation`]
/// marks that ring contents were replaced, which invalidates pending reads.
#[must_use]
pub struct ExclusiveGuard<'a> {
    gate: &'a ReconfigureGate,
}

impl ExclusiveGuard<'_> {
    pub fn bump_generation(&self) -> u64 {
        self.gate.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.gate.reconfiguring.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_enter_refused_while_locked() {
        let gate = ReconfigureGate::new();
        {
            let _exclusive = gate.lock(Duration::from_millis(10)).unwrap();
            assert!(gate.enter().is_none());
            assert_eq!(gate.active_users(), 0);
        }
        assert!(gate.enter().is_some());
    }

    #[test]
    fn test_lock_waits_for_active_access() {
        let gate = ReconfigureGate::new();
        let _access = gate.enter().unwrap();

        let result = gate.lock(Duration::from_millis(20));
        assert!(matches!(result, Err(Error::ReconfigureTimeout(_))));
        // Timeout reopens the gate
        assert!(!gate.is_reconfiguring());
    }

    #[test]
    fn test_lock_waits_for_outstanding_handle() {
        let gate = Arc::new(ReconfigureGate::new());
        gate.mark_handle_outstanding();

        let releaser = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                gate.clear_handle_outstanding();
            })
        };

        let guard = gate.lock(Duration::from_secs(2)).unwrap();
        assert_eq!(guard.bump_generation(), 1);
        drop(guard);
        releaser.join().unwrap();
        assert_eq!(gate.generation(), 1);
    }

    #[test]
    fn test_outstanding_handle_times_out() {
        let gate = ReconfigureGate::new();
        gate.mark_handle_outstanding();
        assert!(gate.lock(Duration::from_millis(5)).is_err());
        assert_eq!(gate.generation(), 0);
    }
}
