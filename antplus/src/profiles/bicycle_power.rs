// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bicycle power meter profile, power-only pages. Average power comes
//! from the accumulated-power and event-count deltas, which survives
//! dropped pages; instantaneous power does not.

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};
use crate::helpers::Accumulator;

pub const DEVICE_TYPE: u8 = 11;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum DataPageNumbers {
    PowerOnly = 0x10,
}

/// Pedal power contribution, when the sensor reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PedalPower {
    /// Share of total power in percent.
    pub percent: u8,
    /// Whether the share is known to be the right pedal's.
    pub right_pedal: bool,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct PowerOnly {
    #[new(value = "DataPageNumbers::PowerOnly.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    /// Increments per measurement, wraps at 256.
    #[packed_field(bytes = "1")]
    pub update_event_count: u8,
    /// Bit 7 flags pedal differentiation, bits 0..6 are the percent;
    /// 0xFF when unused.
    #[packed_field(bytes = "2")]
    pub pedal_power: u8,
    /// Crank rpm, 0xFF when invalid.
    #[packed_field(bytes = "3")]
    pub instantaneous_cadence: u8,
    /// Watts, wraps at 65536.
    #[packed_field(bytes = "4:5")]
    pub accumulated_power: u16,
    #[packed_field(bytes = "6:7")]
    pub instantaneous_power: u16,
}

#[derive(Debug, Clone)]
pub struct BicyclePower {
    pub instantaneous_power_w: Option<u16>,
    /// Watts averaged over the events since the previous page.
    pub average_power_w: Option<f32>,
    pub cadence_rpm: Option<u8>,
    pub pedal_power: Option<PedalPower>,
    events: Accumulator,
    accumulated_power: Accumulator,
}

impl Default for BicyclePower {
    fn default() -> Self {
        Self {
            instantaneous_power_w: None,
            average_power_w: None,
            cadence_rpm: None,
            pedal_power: None,
            events: Accumulator::new(8),
            accumulated_power: Accumulator::new(16),
        }
    }
}

impl BicyclePower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_events(&self) -> u64 {
        self.events.total()
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        if DataPageNumbers::from_primitive(page[0]) != Some(DataPageNumbers::PowerOnly) {
            return Err(DecodeError::UnknownPage(page[0]));
        }
        let parsed = PowerOnly::unpack(page)?;
        let event_delta = self.events.update(parsed.update_event_count as u64);
        let power_delta = self.accumulated_power.update(parsed.accumulated_power as u64);
        if event_delta == 0 {
            return Ok(false);
        }
        self.instantaneous_power_w = Some(parsed.instantaneous_power);
        self.average_power_w = Some(power_delta as f32 / event_delta as f32);
        self.cadence_rpm =
            (parsed.instantaneous_cadence != 0xFF).then_some(parsed.instantaneous_cadence);
        self.pedal_power = (parsed.pedal_power != 0xFF).then_some(PedalPower {
            percent: parsed.pedal_power & 0x7F,
            right_pedal: parsed.pedal_power & 0x80 != 0,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_only_layout() {
        let packed = PowerOnly::new(1, 0xFF, 90, 0x0145, 0x0140).pack().unwrap();
        assert_eq!(packed, [0x10, 0x01, 0xFF, 0x5A, 0x45, 0x01, 0x40, 0x01]);
    }

    #[test]
    fn average_power_from_deltas() {
        let mut state = BicyclePower::new();
        state
            .decode(&[0x10, 0x01, 0xFF, 0x5A, 0x45, 0x01, 0x40, 0x01])
            .unwrap();
        // Two events later, 640 watt-events accumulated: 320 W average.
        let changed = state
            .decode(&[0x10, 0x03, 0xFF, 0x5A, 0xC5, 0x03, 0x40, 0x01])
            .unwrap();
        assert!(changed);
        assert!((state.average_power_w.unwrap() - 320.0).abs() < 1e-3);
        assert_eq!(state.instantaneous_power_w, Some(320));
        assert_eq!(state.cadence_rpm, Some(90));
        assert_eq!(state.pedal_power, None);
    }

    #[test]
    fn retransmission_is_not_a_change() {
        let mut state = BicyclePower::new();
        let page = [0x10, 0x01, 0xFF, 0x5A, 0x45, 0x01, 0x40, 0x01];
        state.decode(&page).unwrap();
        assert!(!state.decode(&page).unwrap());
    }

    #[test]
    fn accumulated_power_wraps() {
        let mut state = BicyclePower::new();
        state
            .decode(&[0x10, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x40, 0x01])
            .unwrap();
        let changed = state
            .decode(&[0x10, 0x00, 0xFF, 0xFF, 0x3F, 0x00, 0x40, 0x01])
            .unwrap();
        assert!(changed);
        // 0xFFFF to 0x003F is 64 watt-events over one event.
        assert!((state.average_power_w.unwrap() - 64.0).abs() < 1e-3);
        assert_eq!(state.cadence_rpm, None);
    }

    #[test]
    fn pedal_power_differentiation() {
        let mut state = BicyclePower::new();
        state
            .decode(&[0x10, 0x01, 0xBC, 0x5A, 0x45, 0x01, 0x40, 0x01])
            .unwrap();
        state
            .decode(&[0x10, 0x02, 0xBC, 0x5A, 0x85, 0x02, 0x40, 0x01])
            .unwrap();
        let pedal = state.pedal_power.unwrap();
        assert_eq!(pedal.percent, 60);
        assert!(pedal.right_pedal);
    }

    #[test]
    fn unknown_page_is_an_error() {
        let mut state = BicyclePower::new();
        assert!(matches!(
            state.decode(&[0x11, 0, 0, 0, 0, 0, 0, 0]),
            Err(DecodeError::UnknownPage(0x11))
        ));
    }
}
