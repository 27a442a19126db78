// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Muscle oxygen monitor profile. The hemoglobin fields are packed
//! LSB-first across the last four bytes and do not byte align, so they
//! come out through the bit extraction helpers rather than a packed
//! struct.

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};
use crate::helpers::{extract_bits, Accumulator};
use crate::session::AckSender;
use crate::transport::{AckOutcome, CancelToken, Transport};

pub const DEVICE_TYPE: u8 = 31;

const TOTAL_HEMOGLOBIN_INVALID: u64 = 0xFFF;
const SATURATED_HEMOGLOBIN_INVALID: u64 = 0x3FF;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum DataPageNumbers {
    MeasurementData = 0x01,
    Commands = 0x10,
}

#[derive(Debug, Clone)]
pub enum Error {
    BytePatternError(packed_struct::PackingError),
}

impl From<packed_struct::PackingError> for Error {
    fn from(err: packed_struct::PackingError) -> Self {
        Self::BytePatternError(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementInterval {
    QuarterSecond,
    HalfSecond,
    OneSecond,
    TwoSeconds,
    Undefined(u8),
}

impl From<u8> for MeasurementInterval {
    fn from(field: u8) -> Self {
        match field {
            1 => MeasurementInterval::QuarterSecond,
            2 => MeasurementInterval::HalfSecond,
            3 => MeasurementInterval::OneSecond,
            4 => MeasurementInterval::TwoSeconds,
            other => MeasurementInterval::Undefined(other),
        }
    }
}

impl MeasurementInterval {
    pub fn secs(&self) -> Option<f32> {
        match self {
            MeasurementInterval::QuarterSecond => Some(0.25),
            MeasurementInterval::HalfSecond => Some(0.5),
            MeasurementInterval::OneSecond => Some(1.0),
            MeasurementInterval::TwoSeconds => Some(2.0),
            MeasurementInterval::Undefined(_) => None,
        }
    }
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum Command {
    SetTime = 0,
    StartSession = 1,
    StopSession = 2,
    Lap = 3,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct CommandPage {
    #[new(value = "DataPageNumbers::Commands.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[packed_field(bytes = "1", ty = "enum")]
    pub command: Command,
    #[new(default)]
    #[packed_field(bytes = "2")]
    _reserved0: ReservedOnes<packed_bits::Bits<8>>,
    /// Seconds since 1989-12-31T00:00 UTC; all ones when the command
    /// does not carry a time.
    #[packed_field(bytes = "3:6")]
    pub current_utc_time: u32,
    #[new(default)]
    #[packed_field(bytes = "7")]
    _reserved1: ReservedOnes<packed_bits::Bits<8>>,
}

/// Sends a session command; `utc_time` only matters for [Command::SetTime].
pub fn send_command<T: Transport>(
    sender: &AckSender<T>,
    command: Command,
    utc_time: Option<u32>,
    cancel: &CancelToken,
) -> Result<AckOutcome, Error> {
    let page = CommandPage::new(command, utc_time.unwrap_or(u32::MAX)).pack()?;
    Ok(sender.send(&page, cancel))
}

#[derive(Debug, Clone)]
pub struct MuscleOxygen {
    /// Grams per deciliter.
    pub total_hemoglobin: Option<f32>,
    /// Percent, measurement before the current one.
    pub previous_saturated_hemoglobin: Option<f32>,
    /// Percent.
    pub current_saturated_hemoglobin: Option<f32>,
    pub measurement_interval: Option<MeasurementInterval>,
    pub utc_time_required: bool,
    events: Accumulator,
}

impl Default for MuscleOxygen {
    fn default() -> Self {
        Self {
            total_hemoglobin: None,
            previous_saturated_hemoglobin: None,
            current_saturated_hemoglobin: None,
            measurement_interval: None,
            utc_time_required: false,
            events: Accumulator::new(8),
        }
    }
}

impl MuscleOxygen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_events(&self) -> u64 {
        self.events.total()
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        if DataPageNumbers::from_primitive(page[0]) != Some(DataPageNumbers::MeasurementData) {
            return Err(DecodeError::UnknownPage(page[0]));
        }
        let event_delta = self.events.update(page[1] as u64);
        self.utc_time_required = page[2] & 0x01 != 0;
        let interval = MeasurementInterval::from(page[3] & 0x07);
        let interval_changed = self.measurement_interval != Some(interval);
        self.measurement_interval = Some(interval);
        if event_delta == 0 {
            return Ok(interval_changed);
        }
        let raw = u32::from_le_bytes([page[4], page[5], page[6], page[7]]) as u64;
        let total = extract_bits(raw, 0, 12);
        self.total_hemoglobin =
            (total != TOTAL_HEMOGLOBIN_INVALID).then(|| total as f32 * 0.01);
        let previous = extract_bits(raw, 12, 10);
        self.previous_saturated_hemoglobin =
            (previous != SATURATED_HEMOGLOBIN_INVALID).then(|| previous as f32 * 0.1);
        let current = extract_bits(raw, 22, 10);
        self.current_saturated_hemoglobin =
            (current != SATURATED_HEMOGLOBIN_INVALID).then(|| current as f32 * 0.1);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement_page(event: u8, total: u32, previous: u32, current: u32) -> RawPage {
        let packed: u32 = total | previous << 12 | current << 22;
        let bytes = packed.to_le_bytes();
        [
            0x01, event, 0x00, 0x03, bytes[0], bytes[1], bytes[2], bytes[3],
        ]
    }

    #[test]
    fn hemoglobin_fields_unpack() {
        let mut state = MuscleOxygen::new();
        state.decode(&measurement_page(0, 1234, 655, 721)).unwrap();
        let changed = state.decode(&measurement_page(1, 1234, 655, 721)).unwrap();
        assert!(changed);
        assert!((state.total_hemoglobin.unwrap() - 12.34).abs() < 1e-4);
        assert!((state.previous_saturated_hemoglobin.unwrap() - 65.5).abs() < 1e-3);
        assert!((state.current_saturated_hemoglobin.unwrap() - 72.1).abs() < 1e-3);
        assert_eq!(
            state.measurement_interval,
            Some(MeasurementInterval::OneSecond)
        );
    }

    #[test]
    fn invalid_sentinels_map_to_none() {
        let mut state = MuscleOxygen::new();
        state.decode(&measurement_page(0, 0xFFF, 0x3FF, 0x3FF)).unwrap();
        state.decode(&measurement_page(1, 0xFFF, 0x3FF, 0x3FF)).unwrap();
        assert_eq!(state.total_hemoglobin, None);
        assert_eq!(state.previous_saturated_hemoglobin, None);
        assert_eq!(state.current_saturated_hemoglobin, None);
    }

    #[test]
    fn stale_event_count_is_not_a_measurement() {
        let mut state = MuscleOxygen::new();
        state.decode(&measurement_page(0, 1000, 500, 500)).unwrap();
        state.decode(&measurement_page(1, 1000, 500, 500)).unwrap();
        // Same event count: values must not be reread as a new sample.
        assert!(!state.decode(&measurement_page(1, 1000, 500, 500)).unwrap());
        assert_eq!(state.total_events(), 1);
    }

    #[test]
    fn command_page_wire_bytes() {
        let packed = CommandPage::new(Command::StartSession, u32::MAX).pack().unwrap();
        assert_eq!(packed, [0x10, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let packed = CommandPage::new(Command::SetTime, 0x0102_0304).pack().unwrap();
        assert_eq!(packed, [0x10, 0x00, 0xFF, 0x04, 0x03, 0x02, 0x01, 0xFF]);
    }
}
