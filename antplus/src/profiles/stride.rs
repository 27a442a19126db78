// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Stride-based speed and distance monitor (SDM) profile. Distance is
//! accumulated in sixteenths of a meter (integer byte plus a fractional
//! nibble) and strides in a wrapping byte counter.

use packed_struct::prelude::*;

use crate::common::decoder::CommonState;
use crate::fields::{DecodeError, RawPage};
use crate::helpers::Accumulator;

pub const DEVICE_TYPE: u8 = 124;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum DataPageNumbers {
    MovementData = 0x01,
    SupplementaryData = 0x02,
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum UseState {
    Inactive = 0,
    Active = 1,
    Reserved2 = 2,
    Reserved3 = 3,
}

#[derive(Debug, Clone)]
pub struct StrideMonitor {
    pub speed_mps: Option<f32>,
    /// Strides per minute.
    pub cadence_spm: Option<f32>,
    /// Seconds between the last event and this transmission.
    pub update_latency_s: Option<f32>,
    pub use_state: Option<UseState>,
    distance_sixteenths: Accumulator,
    strides: Accumulator,
    elapsed: Accumulator,
}

impl Default for StrideMonitor {
    fn default() -> Self {
        Self {
            speed_mps: None,
            cadence_spm: None,
            update_latency_s: None,
            use_state: None,
            // Integer meters plus a 1/16 m nibble.
            distance_sixteenths: Accumulator::new(12),
            strides: Accumulator::new(8),
            elapsed: Accumulator::new(8),
        }
    }
}

impl StrideMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total distance in meters, rollover safe.
    pub fn distance_m(&self) -> f64 {
        self.distance_sixteenths.total() as f64 / 16.0
    }

    pub fn total_strides(&self) -> u64 {
        self.strides.total()
    }

    /// Whole seconds on the sensor's stopwatch, rollover safe.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.total()
    }

    fn observe_speed(&mut self, integer: u8, fractional: u8) -> bool {
        let speed = Some(integer as f32 + fractional as f32 / 256.0);
        let changed = self.speed_mps != speed;
        self.speed_mps = speed;
        changed
    }

    pub fn decode(&mut self, common: &mut CommonState, page: &RawPage) -> Result<bool, DecodeError> {
        let number = match DataPageNumbers::from_primitive(page[0]) {
            Some(number) => number,
            None => return Err(DecodeError::UnknownPage(page[0])),
        };
        match number {
            DataPageNumbers::MovementData => {
                // byte 1 fractional time (1/200 s), byte 2 whole seconds,
                // byte 3 distance meters, byte 4 high nibble fractional
                // distance, low nibble integer speed, byte 5 fractional
                // speed, byte 6 stride count, byte 7 update latency.
                let mut changed = self.elapsed.update(page[2] as u64) > 0;
                let sixteenths = (page[3] as u64) << 4 | (page[4] >> 4) as u64;
                changed |= self.distance_sixteenths.update(sixteenths) > 0;
                changed |= self.strides.update(page[6] as u64) > 0;
                changed |= self.observe_speed(page[4] & 0x0F, page[5]);
                self.update_latency_s = Some(page[7] as f32 / 32.0);
                Ok(changed)
            }
            DataPageNumbers::SupplementaryData => {
                // byte 3 integer cadence, byte 4 high nibble fractional
                // cadence, low nibble integer speed, byte 5 fractional
                // speed, byte 7 status.
                let cadence = Some(page[3] as f32 + (page[4] >> 4) as f32 / 16.0);
                let mut changed = self.cadence_spm != cadence;
                self.cadence_spm = cadence;
                changed |= self.observe_speed(page[4] & 0x0F, page[5]);
                let use_state = UseState::from_primitive(page[7] >> 6)
                    .unwrap_or(UseState::Reserved3);
                changed |= self.use_state != Some(use_state);
                self.use_state = Some(use_state);
                let stopped = use_state == UseState::Inactive;
                changed |= common.stop_indicated != Some(stopped);
                common.stop_indicated = Some(stopped);
                Ok(changed)
            }
        }
    }
}
