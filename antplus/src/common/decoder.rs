// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use packed_struct::prelude::*;

use crate::common::datapages::*;
use crate::fields::{DecodeError, RawPage};
use crate::helpers::{Accumulator, ToggleTracker};

/// Manufacturer identification accumulated from background pages. The
/// legacy set carries a byte-wide id and a 16-bit serial; the global set
/// widens both and adds hardware revision and model number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManufacturerInfo {
    pub manufacturer_id: u16,
    pub hardware_revision: Option<u8>,
    pub model_number: Option<u16>,
    pub serial_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProductInfo {
    pub software_version: u8,
    pub software_version_supplemental: Option<u8>,
    pub hardware_version: Option<u8>,
    pub model_number: Option<u8>,
    pub serial_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryState {
    /// Remaining charge in percent, when the sensor reports one.
    pub level_percent: Option<u8>,
    pub voltage: Option<f32>,
    pub status: BatteryStatusField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day: u8,
    pub day_of_week: DayOfWeek,
    pub month: u8,
    /// Years since 2000.
    pub year: u8,
}

/// Result of offering a page to the common decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonDecode {
    /// The page id belongs to the common set. `changed` is false for
    /// retransmissions that left the state untouched.
    Handled { changed: bool },
    /// Not a common page; the profile decoder should look at it.
    NotCommon,
}

/// Background-channel state shared by every profile. Pure state machine;
/// reporting of unrecognized pages is the caller's concern.
#[derive(Debug, Clone)]
pub struct CommonState {
    pub manufacturer: Option<ManufacturerInfo>,
    pub product: Option<ProductInfo>,
    pub battery: Option<BatteryState>,
    pub time_and_date: Option<WallTime>,
    /// From the legacy motion page or a profile's own use state;
    /// recomputed every observation, never toggle gated.
    pub stop_indicated: Option<bool>,
    operating_ticks: Accumulator,
    operating_secs: u64,
    legacy_toggles: [ToggleTracker; 5],
}

impl Default for CommonState {
    fn default() -> Self {
        Self {
            manufacturer: None,
            product: None,
            battery: None,
            time_and_date: None,
            stop_indicated: None,
            operating_ticks: Accumulator::new(24),
            operating_secs: 0,
            legacy_toggles: [ToggleTracker::default(); 5],
        }
    }
}

impl CommonState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total sensor operating time in seconds, rollover safe.
    pub fn operating_time_secs(&self) -> u64 {
        self.operating_secs
    }

    /// Feeds an operating-time counter carried on a profile's own page
    /// (the heart rate profile transmits one outside the common sets).
    /// Returns whether the counter advanced.
    pub fn accumulate_operating_time(&mut self, ticks: u32, secs_per_tick: u64) -> bool {
        let delta = self.operating_ticks.update(ticks as u64);
        self.operating_secs += delta * secs_per_tick;
        delta > 0
    }

    /// Offers a page from the legacy set (ids 1 through 5, toggle bit in
    /// byte 0). Static pages only update state when the toggle flipped.
    pub fn decode_legacy(&mut self, page: &RawPage) -> Result<CommonDecode, DecodeError> {
        let number = match LegacyPageNumbers::from_primitive(page[0] & 0x7F) {
            Some(number) => number,
            None => return Ok(CommonDecode::NotCommon),
        };
        let toggle = page[0] & 0x80 != 0;
        let fresh = self.legacy_toggles[(page[0] as usize & 0x7F) - 1].update(toggle);
        let changed = match number {
            LegacyPageNumbers::CumulativeOperatingTime => {
                let parsed = OperatingTimePage::unpack(page)?;
                self.accumulate_operating_time(parsed.cumulative_operating_time.into(), 2)
            }
            LegacyPageNumbers::ManufacturerInformation => {
                if !fresh {
                    return Ok(CommonDecode::Handled { changed: false });
                }
                let parsed = ManufacturerPage::unpack(page)?;
                let info = ManufacturerInfo {
                    manufacturer_id: parsed.manufacturer_id as u16,
                    serial_number: Some(parsed.serial_number as u32),
                    ..Default::default()
                };
                let changed = self.manufacturer != Some(info);
                self.manufacturer = Some(info);
                changed
            }
            LegacyPageNumbers::ProductInformation => {
                if !fresh {
                    return Ok(CommonDecode::Handled { changed: false });
                }
                let parsed = ProductPage::unpack(page)?;
                let info = ProductInfo {
                    software_version: parsed.software_version,
                    hardware_version: Some(parsed.hardware_version),
                    model_number: Some(parsed.model_number),
                    ..Default::default()
                };
                let changed = self.product != Some(info);
                self.product = Some(info);
                changed
            }
            LegacyPageNumbers::BatteryStatus => {
                if !fresh {
                    return Ok(CommonDecode::Handled { changed: false });
                }
                let parsed = BatteryPage::unpack(page)?;
                let state = BatteryState {
                    level_percent: level_percent(parsed.battery_level),
                    voltage: parsed
                        .descriptive_bit_field
                        .voltage(parsed.fractional_battery_voltage),
                    status: parsed.descriptive_bit_field.battery_status,
                };
                let changed = self.battery != Some(state);
                self.battery = Some(state);
                changed
            }
            LegacyPageNumbers::MotionIndication => {
                let parsed = MotionPage::unpack(page)?;
                let stopped = parsed.motion_flags.stop_indicated;
                let changed = self.stop_indicated != Some(stopped);
                self.stop_indicated = Some(stopped);
                changed
            }
        };
        Ok(CommonDecode::Handled { changed })
    }

    /// Offers a page from the global set (0x50 through 0x53). These pages
    /// carry no toggle; a retransmission is detected by value comparison.
    pub fn decode_global(&mut self, page: &RawPage) -> Result<CommonDecode, DecodeError> {
        let number = match GlobalPageNumbers::from_primitive(page[0]) {
            Some(number) => number,
            None => return Ok(CommonDecode::NotCommon),
        };
        let changed = match number {
            GlobalPageNumbers::ManufacturersInformation => {
                let parsed = ManufacturerIdPage::unpack(page)?;
                let serial_number = self.manufacturer.and_then(|info| info.serial_number);
                let info = ManufacturerInfo {
                    manufacturer_id: parsed.manufacturer_id,
                    hardware_revision: Some(parsed.hardware_revision),
                    model_number: Some(parsed.model_number),
                    serial_number,
                };
                let changed = self.manufacturer != Some(info);
                self.manufacturer = Some(info);
                changed
            }
            GlobalPageNumbers::ProductInformation => {
                let parsed = ProductIdPage::unpack(page)?;
                let supplemental = parsed.software_revision_supplemental;
                let info = ProductInfo {
                    software_version: parsed.software_revision_main,
                    software_version_supplemental: (supplemental != 0xFF).then_some(supplemental),
                    serial_number: Some(parsed.serial_number),
                    ..Default::default()
                };
                let changed = self.product != Some(info);
                self.product = Some(info);
                changed
            }
            GlobalPageNumbers::BatteryStatus => {
                let parsed = BatteryStatusPage::unpack(page)?;
                let per_tick = match parsed.descriptive_bit_field.operating_time_resolution {
                    OperatingTimeResolution::SixteenSecondResolution => 16,
                    OperatingTimeResolution::TwoSecondResolution => 2,
                };
                let advanced = self
                    .accumulate_operating_time(parsed.cumulative_operating_time.into(), per_tick);
                let state = BatteryState {
                    level_percent: None,
                    voltage: parsed
                        .descriptive_bit_field
                        .voltage(parsed.fractional_battery_voltage),
                    status: parsed.descriptive_bit_field.battery_status,
                };
                let changed = self.battery != Some(state);
                self.battery = Some(state);
                changed || advanced
            }
            GlobalPageNumbers::TimeAndDate => {
                let parsed = TimeAndDatePage::unpack(page)?;
                let time = WallTime {
                    seconds: parsed.seconds,
                    minutes: parsed.minutes,
                    hours: parsed.hours,
                    day: parsed.day.day.into(),
                    day_of_week: parsed.day.day_of_week,
                    month: parsed.month,
                    year: parsed.year,
                };
                let changed = self.time_and_date != Some(time);
                self.time_and_date = Some(time);
                changed
            }
        };
        Ok(CommonDecode::Handled { changed })
    }
}

fn level_percent(raw: u8) -> Option<u8> {
    (raw != 0xFF).then_some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_battery_page_updates_state() {
        let mut state = CommonState::new();
        let decode = state
            .decode_legacy(&[0x04, 50, 0xFF, 0x3F, 0x00, 0x00, 0xFF, 0x0F])
            .unwrap();
        assert_eq!(decode, CommonDecode::Handled { changed: true });
        let battery = state.battery.unwrap();
        assert_eq!(battery.level_percent, Some(50));
        assert_eq!(battery.voltage, None);
        assert_eq!(battery.status, BatteryStatusField::Ok);
    }

    #[test]
    fn legacy_static_page_is_toggle_gated() {
        let mut state = CommonState::new();
        let page = [0x02, 0x0F, 0x24, 0x01, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            state.decode_legacy(&page).unwrap(),
            CommonDecode::Handled { changed: true }
        );
        // Same toggle value again: retransmission, nothing new.
        assert_eq!(
            state.decode_legacy(&page).unwrap(),
            CommonDecode::Handled { changed: false }
        );
        // Toggle flipped but identical content: observed, not changed.
        let mut flipped = page;
        flipped[0] |= 0x80;
        assert_eq!(
            state.decode_legacy(&flipped).unwrap(),
            CommonDecode::Handled { changed: false }
        );
        assert_eq!(state.manufacturer.unwrap().manufacturer_id, 15);
        assert_eq!(state.manufacturer.unwrap().serial_number, Some(0x0124));
    }

    #[test]
    fn legacy_operating_time_accumulates_across_wrap() {
        let mut state = CommonState::new();
        // Seed near the top of the 24-bit counter.
        state
            .decode_legacy(&[0x01, 0xFE, 0xFF, 0xFF, 0, 0, 0, 0])
            .unwrap();
        assert_eq!(state.operating_time_secs(), 0);
        // Wraps to 1: three ticks of two seconds each.
        let decode = state
            .decode_legacy(&[0x01, 0x01, 0x00, 0x00, 0, 0, 0, 0])
            .unwrap();
        assert_eq!(decode, CommonDecode::Handled { changed: true });
        assert_eq!(state.operating_time_secs(), 6);
    }

    #[test]
    fn motion_page_is_recomputed_every_observation() {
        let mut state = CommonState::new();
        let stopped = [0x05, 0x01, 0xFF, 0xFF, 0, 0, 0, 0];
        let moving = [0x05, 0x00, 0xFF, 0xFF, 0, 0, 0, 0];
        assert_eq!(
            state.decode_legacy(&stopped).unwrap(),
            CommonDecode::Handled { changed: true }
        );
        assert_eq!(
            state.decode_legacy(&stopped).unwrap(),
            CommonDecode::Handled { changed: false }
        );
        // No toggle flip, yet the flag change is still observed.
        assert_eq!(
            state.decode_legacy(&moving).unwrap(),
            CommonDecode::Handled { changed: true }
        );
        assert_eq!(state.stop_indicated, Some(false));
    }

    #[test]
    fn unrecognized_id_is_not_common() {
        let mut state = CommonState::new();
        assert_eq!(
            state.decode_legacy(&[0x29, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            CommonDecode::NotCommon
        );
        assert_eq!(
            state.decode_global(&[0x29, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            CommonDecode::NotCommon
        );
    }

    #[test]
    fn global_pages_update_state() {
        let mut state = CommonState::new();
        state
            .decode_global(&[0x50, 0xFF, 0xFF, 0x0A, 0x02, 0x00, 0x24, 0x01])
            .unwrap();
        let info = state.manufacturer.unwrap();
        assert_eq!(info.manufacturer_id, 2);
        assert_eq!(info.hardware_revision, Some(10));
        assert_eq!(info.model_number, Some(292));

        state
            .decode_global(&[0x51, 0xFF, 0xFF, 0x0D, 0x02, 0x00, 0x24, 0x01])
            .unwrap();
        let product = state.product.unwrap();
        assert_eq!(product.software_version, 13);
        assert_eq!(product.software_version_supplemental, None);
        assert_eq!(product.serial_number, Some(19136514));

        // Value-identical retransmission is not a change.
        let decode = state
            .decode_global(&[0x51, 0xFF, 0xFF, 0x0D, 0x02, 0x00, 0x24, 0x01])
            .unwrap();
        assert_eq!(decode, CommonDecode::Handled { changed: false });
    }

    #[test]
    fn global_battery_page_accumulates_operating_time() {
        let mut state = CommonState::new();
        state
            .decode_global(&[0x52, 0xFF, 0xA1, 0x00, 0x00, 0x00, 0x8B, 0x32])
            .unwrap();
        // 16 s per tick (descriptive bit 7 clear), ten ticks later.
        let decode = state
            .decode_global(&[0x52, 0xFF, 0xA1, 0x0A, 0x00, 0x00, 0x8B, 0x32])
            .unwrap();
        assert_eq!(decode, CommonDecode::Handled { changed: true });
        assert_eq!(state.operating_time_secs(), 160);
        let battery = state.battery.unwrap();
        assert_eq!(battery.status, BatteryStatusField::Ok);
        let voltage = battery.voltage.unwrap();
        assert!((voltage - (2.0 + 0x8B as f32 / 256.0)).abs() < 1e-6);
    }
}
