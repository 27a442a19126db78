// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Heart rate monitor profile. Every page repeats the beat trailer in
//! bytes 4 through 7; the profile carries its own background pages
//! rather than either common set.

use std::collections::BTreeMap;

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

use crate::common::datapages::DescriptiveBitField;
use crate::common::decoder::{BatteryState, CommonState, ManufacturerInfo, ProductInfo};
use crate::fields::{DecodeError, RawPage};
use crate::helpers::{Accumulator, ToggleTracker};

use core::ops::RangeInclusive;

pub const DEVICE_TYPE: u8 = 120;

pub const DATA_PAGE_NUMBER_MASK: u8 = 0x7F;
pub const MANUFACTURER_SPECIFIC_RANGE: RangeInclusive<u8> = 112..=127;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum DataPageNumbers {
    DefaultDataPage = 0,
    CumulativeOperatingTime = 1,
    ManufacturerInformation = 2,
    ProductInformation = 3,
    PreviousHeartBeat = 4,
    SwimIntervalSummary = 5,
    Capabilities = 6,
    BatteryStatus = 7,
    DeviceInformation = 9,
}

impl From<DataPageNumbers> for Integer<u8, packed_bits::Bits<7>> {
    fn from(dp: DataPageNumbers) -> Self {
        (dp as u8).into()
    }
}

/// The last four bytes of every heart rate page.
#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "4")]
pub struct BeatTrailer {
    /// 1/1024 s units, wraps at 64 s.
    #[packed_field(bytes = "0:1")]
    pub beat_event_time: u16,
    #[packed_field(bytes = "2")]
    pub beat_count: u8,
    /// Beats per minute, 0 when invalid.
    #[packed_field(bytes = "3")]
    pub computed_heart_rate: u8,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct DefaultDataPage {
    #[new(value = "DataPageNumbers::DefaultDataPage.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(default)]
    #[packed_field(bytes = "1:3")]
    _reserved: ReservedOnes<packed_bits::Bits<24>>,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct CumulativeOperatingTime {
    #[new(value = "DataPageNumbers::CumulativeOperatingTime.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    /// Two-second ticks, wraps at 2^24.
    #[packed_field(bytes = "1:3")]
    pub cumulative_operating_time: Integer<u32, packed_bits::Bits<24>>,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct ManufacturerInformation {
    #[new(value = "DataPageNumbers::ManufacturerInformation.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[packed_field(bytes = "1")]
    pub manufacturer_id: u8,
    #[packed_field(bytes = "2:3")]
    pub serial_number: u16,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct ProductInformation {
    #[new(value = "DataPageNumbers::ProductInformation.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[packed_field(bytes = "1")]
    pub hardware_version: u8,
    #[packed_field(bytes = "2")]
    pub software_version: u8,
    #[packed_field(bytes = "3")]
    pub model_number: u8,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct PreviousHeartBeat {
    #[new(value = "DataPageNumbers::PreviousHeartBeat.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[packed_field(bytes = "1")]
    pub manufacturer_specific: u8,
    /// Event time of the beat before the one in the trailer.
    #[packed_field(bytes = "2:3")]
    pub previous_beat_event_time: u16,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct SwimIntervalSummary {
    #[new(value = "DataPageNumbers::SwimIntervalSummary.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[packed_field(bytes = "1")]
    pub interval_average_heart_rate: u8,
    #[packed_field(bytes = "2")]
    pub interval_maximum_heart_rate: u8,
    #[packed_field(bytes = "3")]
    pub session_average_heart_rate: u8,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct Features {
    #[packed_field(bits = "0")]
    pub extended_running_features: bool,
    #[packed_field(bits = "1")]
    pub extended_cycling_features: bool,
    #[packed_field(bits = "2")]
    pub extended_swimming_features: bool,
    #[packed_field(bits = "3")]
    pub gym_mode: bool,
    #[new(default)]
    #[packed_field(bits = "4:5")]
    _reserved: ReservedZeroes<packed_bits::Bits<2>>,
    #[packed_field(bits = "6")]
    pub manufacturer_specific_feature_0: bool,
    #[packed_field(bits = "7")]
    pub manufacturer_specific_feature_1: bool,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct Capabilities {
    #[new(value = "DataPageNumbers::Capabilities.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(default)]
    #[packed_field(bytes = "1")]
    _reserved: ReservedOnes<packed_bits::Bits<8>>,
    #[packed_field(bytes = "2")]
    pub features_supported: Features,
    #[packed_field(bytes = "3")]
    pub features_enabled: Features,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

// The descriptive byte matches the common battery pages; this profile
// transmits the resolution bit as zero.
#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct BatteryStatus {
    #[new(value = "DataPageNumbers::BatteryStatus.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[packed_field(bytes = "1")]
    pub battery_level: u8,
    #[packed_field(bytes = "2")]
    pub fractional_battery_voltage: u8,
    #[packed_field(bytes = "3")]
    pub descriptive_bit_field: DescriptiveBitField,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum HeartbeatEventType {
    MeasuredTimestamp = 0,
    ComputedTimestamp = 1,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct DeviceInformation {
    #[new(value = "DataPageNumbers::DeviceInformation.into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(default)]
    #[packed_field(bits = "8:13")]
    _reserved0: ReservedOnes<packed_bits::Bits<6>>,
    #[packed_field(bits = "14:15", ty = "enum")]
    pub heartbeat_event_type: HeartbeatEventType,
    #[new(default)]
    #[packed_field(bytes = "2:3")]
    _reserved1: ReservedOnes<packed_bits::Bits<16>>,
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

/// Pages 112 through 127; the payload is the manufacturer's business.
#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct ManufacturerSpecific {
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[packed_field(bytes = "1:3")]
    pub data: [u8; 3],
    #[packed_field(bytes = "4:7")]
    pub trailer: BeatTrailer,
}

/// Accumulated heart rate monitor state.
#[derive(Debug, Clone)]
pub struct HeartRate {
    /// Beats per minute as computed by the sensor, 0 until valid.
    pub computed_heart_rate: u8,
    /// Beat-to-beat interval in milliseconds, from the previous-beat page.
    pub rr_interval_ms: Option<f32>,
    pub features_supported: Option<Features>,
    pub features_enabled: Option<Features>,
    pub heartbeat_event_type: Option<HeartbeatEventType>,
    pub interval_average_heart_rate: Option<u8>,
    pub session_average_heart_rate: Option<u8>,
    beats: Accumulator,
    event_time: Accumulator,
    last_trailer: Option<BeatTrailer>,
    toggles: BTreeMap<u8, ToggleTracker>,
}

impl Default for HeartRate {
    fn default() -> Self {
        Self {
            computed_heart_rate: 0,
            rr_interval_ms: None,
            features_supported: None,
            features_enabled: None,
            heartbeat_event_type: None,
            interval_average_heart_rate: None,
            session_average_heart_rate: None,
            beats: Accumulator::new(8),
            event_time: Accumulator::new(16),
            last_trailer: None,
            toggles: BTreeMap::new(),
        }
    }
}

impl HeartRate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total beats observed, rollover safe.
    pub fn total_beats(&self) -> u64 {
        self.beats.total()
    }

    /// Total beat event time in seconds, rollover safe.
    pub fn total_beat_event_time_secs(&self) -> f64 {
        self.event_time.total() as f64 / 1024.0
    }

    pub fn last_trailer(&self) -> Option<BeatTrailer> {
        self.last_trailer
    }

    fn observe_trailer(&mut self, trailer: BeatTrailer) -> u64 {
        let beat_delta = self.beats.update(trailer.beat_count as u64);
        self.event_time.update(trailer.beat_event_time as u64);
        self.computed_heart_rate = trailer.computed_heart_rate;
        self.last_trailer = Some(trailer);
        beat_delta
    }

    fn fresh(&mut self, page_number: u8, toggle: bool) -> bool {
        self.toggles.entry(page_number).or_default().update(toggle)
    }

    pub fn decode(&mut self, common: &mut CommonState, page: &RawPage) -> Result<bool, DecodeError> {
        let number = page[0] & DATA_PAGE_NUMBER_MASK;
        let toggle = page[0] & !DATA_PAGE_NUMBER_MASK != 0;
        let old_rate = self.computed_heart_rate;
        if MANUFACTURER_SPECIFIC_RANGE.contains(&number) {
            let parsed = ManufacturerSpecific::unpack(page)?;
            let changed = self.observe_trailer(parsed.trailer) > 0;
            return Ok(changed || self.computed_heart_rate != old_rate);
        }
        let number = match DataPageNumbers::from_primitive(number) {
            Some(number) => number,
            None => return Err(DecodeError::UnknownPage(number)),
        };
        let mut changed = match number {
            DataPageNumbers::DefaultDataPage => {
                let parsed = DefaultDataPage::unpack(page)?;
                self.observe_trailer(parsed.trailer) > 0
            }
            DataPageNumbers::CumulativeOperatingTime => {
                let parsed = CumulativeOperatingTime::unpack(page)?;
                let advanced = common
                    .accumulate_operating_time(parsed.cumulative_operating_time.into(), 2);
                self.observe_trailer(parsed.trailer) > 0 || advanced
            }
            DataPageNumbers::ManufacturerInformation => {
                let parsed = ManufacturerInformation::unpack(page)?;
                if self.fresh(number as u8, toggle) {
                    common.manufacturer = Some(ManufacturerInfo {
                        manufacturer_id: parsed.manufacturer_id as u16,
                        serial_number: Some(parsed.serial_number as u32),
                        ..Default::default()
                    });
                }
                self.observe_trailer(parsed.trailer) > 0
            }
            DataPageNumbers::ProductInformation => {
                let parsed = ProductInformation::unpack(page)?;
                if self.fresh(number as u8, toggle) {
                    common.product = Some(ProductInfo {
                        software_version: parsed.software_version,
                        hardware_version: Some(parsed.hardware_version),
                        model_number: Some(parsed.model_number),
                        ..Default::default()
                    });
                }
                self.observe_trailer(parsed.trailer) > 0
            }
            DataPageNumbers::PreviousHeartBeat => {
                let parsed = PreviousHeartBeat::unpack(page)?;
                let beat_delta = self.observe_trailer(parsed.trailer);
                if beat_delta > 0 {
                    let interval = parsed
                        .trailer
                        .beat_event_time
                        .wrapping_sub(parsed.previous_beat_event_time);
                    self.rr_interval_ms = Some(interval as f32 * 1000.0 / 1024.0);
                }
                beat_delta > 0
            }
            DataPageNumbers::SwimIntervalSummary => {
                let parsed = SwimIntervalSummary::unpack(page)?;
                let summary_changed = self.fresh(number as u8, toggle)
                    && (self.interval_average_heart_rate
                        != Some(parsed.interval_average_heart_rate)
                        || self.session_average_heart_rate
                            != Some(parsed.session_average_heart_rate));
                if summary_changed {
                    self.interval_average_heart_rate = Some(parsed.interval_average_heart_rate);
                    self.session_average_heart_rate = Some(parsed.session_average_heart_rate);
                }
                self.observe_trailer(parsed.trailer) > 0 || summary_changed
            }
            DataPageNumbers::Capabilities => {
                let parsed = Capabilities::unpack(page)?;
                if self.fresh(number as u8, toggle) {
                    self.features_supported = Some(parsed.features_supported);
                    self.features_enabled = Some(parsed.features_enabled);
                }
                self.observe_trailer(parsed.trailer) > 0
            }
            DataPageNumbers::BatteryStatus => {
                let parsed = BatteryStatus::unpack(page)?;
                if self.fresh(number as u8, toggle) {
                    common.battery = Some(BatteryState {
                        level_percent: (parsed.battery_level != 0xFF)
                            .then_some(parsed.battery_level),
                        voltage: parsed
                            .descriptive_bit_field
                            .voltage(parsed.fractional_battery_voltage),
                        status: parsed.descriptive_bit_field.battery_status,
                    });
                }
                self.observe_trailer(parsed.trailer) > 0
            }
            DataPageNumbers::DeviceInformation => {
                let parsed = DeviceInformation::unpack(page)?;
                if self.fresh(number as u8, toggle) {
                    self.heartbeat_event_type = Some(parsed.heartbeat_event_type);
                }
                self.observe_trailer(parsed.trailer) > 0
            }
        };
        changed |= self.computed_heart_rate != old_rate;
        Ok(changed)
    }
}
