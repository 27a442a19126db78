// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Page codec primitives shared by every profile: bit-group extraction,
//! rollover-safe counter accumulation and page-change toggle tracking.

/// Extracts `len` bits starting at bit `lo` from a little-endian packed
/// group. Used for the sub-byte fields that span byte boundaries (radar
/// ranges and closing speeds, muscle oxygen hemoglobin fields).
pub const fn extract_bits(raw: u64, lo: u32, len: u32) -> u64 {
    (raw >> lo) & ((1u64 << len) - 1)
}

/// Widens a narrow wrapping hardware counter into a monotone 64-bit total.
///
/// Assumes at most one wrap between consecutive observations; more than one
/// wrap per observation interval is silently under-counted.
#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    modulus: u64,
    last: Option<u64>,
    total: u64,
}

impl Accumulator {
    /// Accumulator for a counter that wraps at `2^bits`.
    pub const fn new(bits: u32) -> Self {
        Self {
            modulus: 1u64 << bits,
            last: None,
            total: 0,
        }
    }

    /// Folds a raw counter reading into the total and returns the delta.
    /// The first observation seeds the counter and contributes zero.
    pub fn update(&mut self, raw: u64) -> u64 {
        debug_assert!(raw < self.modulus);
        let delta = match self.last {
            None => 0,
            Some(last) if raw >= last => raw - last,
            // Counter went backwards: exactly one wrap occurred.
            Some(last) => raw + self.modulus - last,
        };
        self.last = Some(raw);
        self.total += delta;
        delta
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

/// Tracks the page-change toggle bit. The *flip* of the bit, not its value,
/// signals that a page's payload is new; the first observation always
/// counts as new.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToggleTracker {
    last: Option<bool>,
}

impl ToggleTracker {
    /// Returns true when the payload should be treated as new.
    pub fn update(&mut self, bit: bool) -> bool {
        let fresh = match self.last {
            None => true,
            Some(prev) => prev != bit,
        };
        self.last = Some(bit);
        fresh
    }
}

/// The delta between two rotation-sensor observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationDelta {
    pub revolutions: u16,
    pub seconds: f32,
}

/// Consecutive (event time, cumulative revolution count) observations of a
/// rotation sensor. Event times tick at 1/1024 s and both fields wrap;
/// rate is derived from deltas, never from absolute values.
#[derive(Debug, Default, Clone, Copy)]
pub struct RotationEvents {
    prev: Option<(u16, u16)>,
}

impl RotationEvents {
    /// Returns the delta since the previous observation, or `None` when
    /// either counter did not advance (identical back-to-back pages must
    /// not produce a spurious zero-rate reading).
    pub fn update(&mut self, event_time: u16, count: u16) -> Option<RotationDelta> {
        let prev = self.prev.replace((event_time, count));
        let (prev_time, prev_count) = prev?;
        let dt = event_time.wrapping_sub(prev_time);
        let dc = count.wrapping_sub(prev_count);
        if dt == 0 || dc == 0 {
            return None;
        }
        Some(RotationDelta {
            revolutions: dc,
            seconds: dt as f32 / 1024.0,
        })
    }
}
