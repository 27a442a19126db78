// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Bike radar profile. Two target pages cover eight tracked targets with
//! nibble- and 6-bit-packed fields that do not byte align, so the packed
//! groups are pulled apart with the bit extraction helpers.

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};
use crate::helpers::extract_bits;
use crate::session::AckSender;
use crate::transport::{AckOutcome, CancelToken, Transport};

pub const DEVICE_TYPE: u8 = 40;

/// Meters per count of a 6-bit target range field.
pub const RANGE_UNIT_M: f32 = 3.125;
/// Meters per second per count of a 4-bit closing speed field.
pub const CLOSING_SPEED_UNIT_MPS: f32 = 3.04;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum DataPageNumbers {
    RadarStatus = 0x01,
    ShutdownCommand = 0x10,
    TargetsA = 0x30,
    TargetsB = 0x31,
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

#[derive(PrimitiveEnum_u8, PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum ThreatLevel {
    #[default]
    None = 0,
    Approaching = 1,
    FastApproaching = 2,
    Reserved = 3,
}

#[derive(PrimitiveEnum_u8, PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum ThreatSide {
    #[default]
    Behind = 0,
    Right = 1,
    Left = 2,
    Reserved = 3,
}

/// One tracked target. A target with `ThreatLevel::None` carries no
/// meaningful side, range or speed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadarTarget {
    pub threat_level: ThreatLevel,
    pub side: ThreatSide,
    pub range_m: f32,
    pub closing_speed_mps: f32,
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum ShutdownCommand {
    Abort = 0x00,
    Request = 0x01,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct ShutdownPage {
    #[new(value = "DataPageNumbers::ShutdownCommand.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[packed_field(bytes = "1", ty = "enum")]
    pub command: ShutdownCommand,
    #[new(default)]
    #[packed_field(bytes = "2:7")]
    _reserved: ReservedOnes<packed_bits::Bits<48>>,
}

/// Asks the radar to power down, or aborts a pending shutdown.
pub fn send_shutdown<T: Transport>(
    sender: &AckSender<T>,
    command: ShutdownCommand,
    cancel: &CancelToken,
) -> Result<AckOutcome, Error> {
    let page = ShutdownPage::new(command).pack()?;
    Ok(sender.send(&page, cancel))
}

#[derive(Debug, Clone, Default)]
pub struct BikeRadar {
    /// Targets 1 through 8; the first page carries the lower four.
    pub targets: [RadarTarget; 8],
    pub shutdown_in_progress: Option<bool>,
}

impl BikeRadar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest threat currently tracked, if any target is active.
    pub fn highest_threat(&self) -> Option<&RadarTarget> {
        self.targets
            .iter()
            .filter(|target| target.threat_level != ThreatLevel::None)
            .max_by(|a, b| {
                (a.threat_level as u8)
                    .cmp(&(b.threat_level as u8))
                    .then(b.range_m.total_cmp(&a.range_m))
            })
    }

    fn decode_targets(&mut self, page: &RawPage, base: usize) -> bool {
        let ranges = u32::from_le_bytes([page[3], page[4], page[5], 0]) as u64;
        let speeds = u16::from_le_bytes([page[6], page[7]]) as u64;
        let mut changed = false;
        for slot in 0..4 {
            let level = (page[1] >> (2 * slot)) & 0x03;
            let level = ThreatLevel::from_primitive(level).unwrap_or(ThreatLevel::Reserved);
            let target = if level == ThreatLevel::None {
                RadarTarget::default()
            } else {
                let side = (page[2] >> (2 * slot)) & 0x03;
                RadarTarget {
                    threat_level: level,
                    side: ThreatSide::from_primitive(side).unwrap_or(ThreatSide::Reserved),
                    range_m: extract_bits(ranges, 6 * slot as u32, 6) as f32 * RANGE_UNIT_M,
                    closing_speed_mps: extract_bits(speeds, 4 * slot as u32, 4) as f32
                        * CLOSING_SPEED_UNIT_MPS,
                }
            };
            if self.targets[base + slot] != target {
                self.targets[base + slot] = target;
                changed = true;
            }
        }
        changed
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let number = match DataPageNumbers::from_primitive(page[0]) {
            Some(number) => number,
            None => return Err(DecodeError::UnknownPage(page[0])),
        };
        match number {
            DataPageNumbers::RadarStatus => {
                let in_progress = page[1] & 0x01 != 0;
                let changed = self.shutdown_in_progress != Some(in_progress);
                self.shutdown_in_progress = Some(in_progress);
                Ok(changed)
            }
            DataPageNumbers::TargetsA => Ok(self.decode_targets(page, 0)),
            DataPageNumbers::TargetsB => Ok(self.decode_targets(page, 4)),
            // The shutdown page travels toward the radar.
            DataPageNumbers::ShutdownCommand => Err(DecodeError::UnknownPage(page[0])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_clear_page_yields_empty_targets() {
        let mut state = BikeRadar::new();
        let changed = state
            .decode(&[0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .unwrap();
        assert!(!changed);
        for target in &state.targets {
            assert_eq!(target.threat_level, ThreatLevel::None);
            assert_eq!(target.side, ThreatSide::Behind);
            assert_eq!(target.range_m, 0.0);
            assert_eq!(target.closing_speed_mps, 0.0);
        }
        assert!(state.highest_threat().is_none());
    }

    #[test]
    fn packed_target_fields() {
        let mut state = BikeRadar::new();
        // Target 1 approaching from the right, target 2 fast approaching
        // left. Ranges 1 and 13 counts; speeds 2 and 5 counts.
        let levels = 0b0000_1001;
        let sides = 0b0000_1001;
        let ranges = 1u32 | 13 << 6;
        let speeds = 2u16 | 5 << 4;
        let page = [
            0x31,
            levels,
            sides,
            ranges.to_le_bytes()[0],
            ranges.to_le_bytes()[1],
            ranges.to_le_bytes()[2],
            speeds.to_le_bytes()[0],
            speeds.to_le_bytes()[1],
        ];
        assert!(state.decode(&page).unwrap());
        let first = state.targets[4];
        assert_eq!(first.threat_level, ThreatLevel::Approaching);
        assert_eq!(first.side, ThreatSide::Right);
        assert!((first.range_m - RANGE_UNIT_M).abs() < 1e-4);
        assert!((first.closing_speed_mps - 2.0 * CLOSING_SPEED_UNIT_MPS).abs() < 1e-4);
        let second = state.targets[5];
        assert_eq!(second.threat_level, ThreatLevel::FastApproaching);
        assert_eq!(second.side, ThreatSide::Left);
        assert!((second.range_m - 13.0 * RANGE_UNIT_M).abs() < 1e-3);
        assert!((second.closing_speed_mps - 5.0 * CLOSING_SPEED_UNIT_MPS).abs() < 1e-3);
    }

    #[test]
    fn cleared_threat_resets_the_slot() {
        let mut state = BikeRadar::new();
        state
            .decode(&[0x30, 0x01, 0x01, 0x05, 0x00, 0x00, 0x03, 0x00])
            .unwrap();
        assert_eq!(state.targets[0].threat_level, ThreatLevel::Approaching);
        let changed = state
            .decode(&[0x30, 0x00, 0x01, 0x05, 0x00, 0x00, 0x03, 0x00])
            .unwrap();
        assert!(changed);
        assert_eq!(state.targets[0], RadarTarget::default());
    }

    #[test]
    fn highest_threat_prefers_level_then_proximity() {
        let mut state = BikeRadar::new();
        // Two approaching targets, the nearer one second.
        let ranges = 20u32 | 4 << 6;
        let page = [
            0x30,
            0b0000_0101,
            0x00,
            ranges.to_le_bytes()[0],
            ranges.to_le_bytes()[1],
            ranges.to_le_bytes()[2],
            0x00,
            0x00,
        ];
        state.decode(&page).unwrap();
        let threat = state.highest_threat().unwrap();
        assert!((threat.range_m - 4.0 * RANGE_UNIT_M).abs() < 1e-3);
    }

    #[test]
    fn status_page_reports_shutdown() {
        let mut state = BikeRadar::new();
        assert!(state
            .decode(&[0x01, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])
            .unwrap());
        assert_eq!(state.shutdown_in_progress, Some(true));
    }

    #[test]
    fn shutdown_page_wire_bytes() {
        let packed = ShutdownPage::new(ShutdownCommand::Request).pack().unwrap();
        assert_eq!(packed, [0x10, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let packed = ShutdownPage::new(ShutdownCommand::Abort).pack().unwrap();
        assert_eq!(packed, [0x10, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
