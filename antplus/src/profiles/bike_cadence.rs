// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bike cadence sensor profile. Same page scheme as the speed sensor
//! with a pedal trailer instead of a wheel trailer.

use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};
use crate::helpers::{Accumulator, RotationEvents};

pub const DEVICE_TYPE: u8 = 122;

const MAX_PAGE_NUMBER: u8 = 5;

#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct CadenceSensorPage {
    #[packed_field(bytes = "0:3")]
    pub page_data: [u8; 4],
    /// 1/1024 s units, wraps at 64 s.
    #[packed_field(bytes = "4:5")]
    pub cadence_event_time: u16,
    #[packed_field(bytes = "6:7")]
    pub cumulative_pedal_revolutions: u16,
}

#[derive(Debug, Clone)]
pub struct BikeCadence {
    /// Revolutions per minute from the most recent pair of advancing pages.
    pub cadence_rpm: Option<f32>,
    revolutions: Accumulator,
    events: RotationEvents,
}

impl Default for BikeCadence {
    fn default() -> Self {
        Self {
            cadence_rpm: None,
            revolutions: Accumulator::new(16),
            events: RotationEvents::default(),
        }
    }
}

impl BikeCadence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_revolutions(&self) -> u64 {
        self.revolutions.total()
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let number = page[0] & 0x7F;
        if number > MAX_PAGE_NUMBER {
            return Err(DecodeError::UnknownPage(number));
        }
        let parsed = CadenceSensorPage::unpack(page)?;
        self.revolutions
            .update(parsed.cumulative_pedal_revolutions as u64);
        match self
            .events
            .update(parsed.cadence_event_time, parsed.cumulative_pedal_revolutions)
        {
            Some(delta) => {
                self.cadence_rpm = Some(delta.revolutions as f32 * 60.0 / delta.seconds);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
