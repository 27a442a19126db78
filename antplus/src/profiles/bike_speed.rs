// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bike speed sensor profile. Uses the legacy common set (ids 1 through
//! 5); every page, background ones included, repeats the speed trailer
//! in bytes 4 through 7.

use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};
use crate::helpers::{Accumulator, RotationEvents};

pub const DEVICE_TYPE: u8 = 123;

/// Highest page id this profile transmits (default page plus the legacy
/// common set).
const MAX_PAGE_NUMBER: u8 = 5;

#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct SpeedSensorPage {
    #[packed_field(bytes = "0:3")]
    pub page_data: [u8; 4],
    /// 1/1024 s units, wraps at 64 s.
    #[packed_field(bytes = "4:5")]
    pub bike_speed_event_time: u16,
    #[packed_field(bytes = "6:7")]
    pub cumulative_wheel_revolutions: u16,
}

/// Accumulated speed sensor state. Speed and distance are derived from
/// counter deltas and the configured wheel circumference.
#[derive(Debug, Clone)]
pub struct BikeSpeed {
    wheel_circumference_m: f32,
    /// Meters per second from the most recent pair of advancing pages.
    pub speed_mps: Option<f32>,
    revolutions: Accumulator,
    events: RotationEvents,
}

impl BikeSpeed {
    pub fn new(wheel_circumference_m: f32) -> Self {
        Self {
            wheel_circumference_m,
            speed_mps: None,
            revolutions: Accumulator::new(16),
            events: RotationEvents::default(),
        }
    }

    /// Total distance in meters, rollover safe.
    pub fn distance_m(&self) -> f64 {
        self.revolutions.total() as f64 * self.wheel_circumference_m as f64
    }

    pub fn total_revolutions(&self) -> u64 {
        self.revolutions.total()
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let number = page[0] & 0x7F;
        if number > MAX_PAGE_NUMBER {
            return Err(DecodeError::UnknownPage(number));
        }
        let parsed = SpeedSensorPage::unpack(page)?;
        self.revolutions
            .update(parsed.cumulative_wheel_revolutions as u64);
        match self
            .events
            .update(parsed.bike_speed_event_time, parsed.cumulative_wheel_revolutions)
        {
            Some(delta) => {
                self.speed_mps =
                    Some(delta.revolutions as f32 * self.wheel_circumference_m / delta.seconds);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
