//! 24-in-32 alignment detection
//!
//! Sample content wins over the out-of-band hint. Only when the inspected
//! containers are all zero (silence) does the hint apply, and if there is no
//! hint either the decision is deferred for about a second of samples before
//! defaulting to low alignment. Until content confirms a decision, detection
//! keeps running on every block.

use super::pack24::S24Alignment;
use nadr_common::params::{S24_DEFER_SAMPLES, S24_DETECT_SAMPLES};
use nadr_common::S24Hint;

/// How the current alignment was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Detection {
    /// Confirmed from sample content
    Detected(S24Alignment),
    /// Content silent, using the hint; still re-evaluating
    Hinted(S24Alignment),
    /// Content silent and no hint; provisional low alignment
    Deferred,
    /// Deferral budget spent without evidence
    Defaulted(S24Alignment),
}

impl Detection {
    pub fn alignment(self) -> S24Alignment {
        match self {
            Detection::Detected(a) | Detection::Hinted(a) | Detection::Defaulted(a) => a,
            Detection::Deferred => S24Alignment::Low,
        }
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, Detection::Detected(_))
    }
}

/// Per-stream detector, reset on every hint or format change
#[derive(Debug, Clone)]
pub struct S24Detector {
    hint: S24Hint,
    state: Detection,
    silent_samples: usize,
}

impl Default for S24Detector {
    fn default() -> Self {
        Self::new(S24Hint::Unknown)
    }
}

impl S24Detector {
    pub fn new(hint: S24Hint) -> Self {
        Self {
            hint,
            state: Self::from_hint(hint),
            silent_samples: 0,
        }
    }

    /// Forget the previous track's decision and adopt a new hint
    pub fn reset(&mut self, hint: S24Hint) {
        *self = Self::new(hint);
    }

    pub fn hint(&self) -> S24Hint {
        self.hint
    }

    pub fn state(&self) -> Detection {
        self.state
    }

    /// Inspect one block of 32-bit containers and return the alignment to use
    pub fn observe(&mut self, containers: &[u8]) -> S24Alignment {
        if self.state.is_confirmed() {
            return self.state.alignment();
        }

        let samples = containers.len() / 4;
        match inspect(containers) {
            Some(alignment) => {
                self.state = Detection::Detected(alignment);
                self.silent_samples = 0;
            }
            None => {
                self.silent_samples = self.silent_samples.saturating_add(samples);
                if self.silent_samples >= S24_DEFER_SAMPLES {
                    let alignment = hint_alignment(self.hint).unwrap_or(S24Alignment::Low);
                    self.state = Detection::Defaulted(alignment);
                }
            }
        }

        self.state.alignment()
    }

    fn from_hint(hint: S24Hint) -> Detection {
        match hint_alignment(hint) {
            Some(alignment) => Detection::Hinted(alignment),
            None => Detection::Deferred,
        }
    }
}

fn hint_alignment(hint: S24Hint) -> Option<S24Alignment> {
    match hint {
        S24Hint::LowAligned => Some(S24Alignment::Low),
        S24Hint::HighAligned => Some(S24Alignment::High),
        S24Hint::Unknown => None,
    }
}

/// Look at the first containers: byte 0 versus byte 3
///
/// `None` means every inspected byte 0 and byte 3 was zero.
fn inspect(containers: &[u8]) -> Option<S24Alignment> {
    let mut low_bits = 0u8;
    let mut high_bits = 0u8;
    for sample in containers.chunks_exact(4).take(S24_DETECT_SAMPLES) {
        low_bits |= sample[0];
        high_bits |= sample[3];
    }

    match (low_bits != 0, high_bits != 0) {
        (false, false) => None,
        (false, true) => Some(S24Alignment::High),
        // Low byte populated; a populated top byte is sign extension
        (true, _) => Some(S24Alignment::Low),
    }
}
