//! Fitness equipment (FE-C) profile: general data and settings pages,
//! plus the basic-resistance and target-power control commands sent over
//! the acknowledged channel.

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};
use crate::helpers::Accumulator;
use crate::session::AckSender;
use crate::transport::{AckOutcome, CancelToken, Transport};

pub const DEVICE_TYPE: u8 = 17;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum DataPageNumbers {
    GeneralData = 0x10,
    GeneralSettings = 0x11,
    BasicResistance = 0x30,
    TargetPower = 0x31,
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
pub enum EquipmentType {
    Treadmill,
    Elliptical,
    Rower,
    Climber,
    NordicSkier,
    Trainer,
    Unknown(u8),
}

impl From<u8> for EquipmentType {
    fn from(field: u8) -> Self {
        match field {
            19 => EquipmentType::Treadmill,
            20 => EquipmentType::Elliptical,
            22 => EquipmentType::Rower,
            23 => EquipmentType::Climber,
            24 => EquipmentType::NordicSkier,
            25 => EquipmentType::Trainer,
            other => EquipmentType::Unknown(other),
        }
    }
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum HeartRateSource {
    Invalid = 0,
    AntPlusMonitor = 1,
    ElectromagneticCoupling = 2,
    HandContact = 3,
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum FeState {
    Reserved0 = 0,
    Asleep = 1,
    Ready = 2,
    InUse = 3,
    FinishedOrPaused = 4,
    Reserved5 = 5,
    Reserved6 = 6,
    Reserved7 = 7,
}

/// Byte 7 of the general pages: capability nibble, equipment state and
/// the lap toggle.
#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct CapabilitiesAndState {
    #[packed_field(bits = "0:1", ty = "enum")]
    pub heart_rate_source: HeartRateSource,
    #[packed_field(bits = "2")]
    pub distance_traveled_enabled: bool,
    #[packed_field(bits = "3")]
    pub virtual_speed: bool,
    #[packed_field(bits = "4:6", ty = "enum")]
    pub fe_state: FeState,
    #[packed_field(bits = "7")]
    pub lap_toggle: bool,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct GeneralDataPage {
    #[new(value = "DataPageNumbers::GeneralData.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[packed_field(bytes = "1")]
    pub equipment_type: u8,
    /// 0.25 s ticks, wraps at 64 s.
    #[packed_field(bytes = "2")]
    pub elapsed_time: u8,
    /// Meters, wraps at 256 m.
    #[packed_field(bytes = "3")]
    pub distance_traveled: u8,
    /// 0.001 m/s, 0xFFFF invalid.
    #[packed_field(bytes = "4:5")]
    pub speed: u16,
    /// Beats per minute, 0xFF invalid.
    #[packed_field(bytes = "6")]
    pub heart_rate: u8,
    #[packed_field(bytes = "7")]
    pub capabilities: CapabilitiesAndState,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct GeneralSettingsPage {
    #[new(value = "DataPageNumbers::GeneralSettings.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1:2")]
    _reserved: ReservedOnes<packed_bits::Bits<16>>,
    /// 0.01 m, 0xFF invalid.
    #[packed_field(bytes = "3")]
    pub cycle_length: u8,
    /// 0.01 %, 0x7FFF invalid.
    #[packed_field(bytes = "4:5")]
    pub incline: i16,
    /// 0.5 %, 0xFF invalid.
    #[packed_field(bytes = "6")]
    pub resistance_level: u8,
    #[packed_field(bytes = "7")]
    pub capabilities: CapabilitiesAndState,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct BasicResistancePage {
    #[new(value = "DataPageNumbers::BasicResistance.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1:6")]
    _reserved: ReservedOnes<packed_bits::Bits<48>>,
    /// 0.5 % units.
    #[packed_field(bytes = "7")]
    pub total_resistance: u8,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct TargetPowerPage {
    #[new(value = "DataPageNumbers::TargetPower.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1:5")]
    _reserved: ReservedOnes<packed_bits::Bits<40>>,
    /// 0.25 W units.
    #[packed_field(bytes = "6:7")]
    pub target_power: u16,
}

/// Commands the equipment to a flat resistance level.
pub fn send_basic_resistance<T: Transport>(
    sender: &AckSender<T>,
    resistance_percent: f32,
    cancel: &CancelToken,
) -> Result<AckOutcome, Error> {
    let page = BasicResistancePage::new((resistance_percent * 2.0).round() as u8).pack()?;
    Ok(sender.send(&page, cancel))
}

/// Commands the equipment to hold a target power (erg mode).
pub fn send_target_power<T: Transport>(
    sender: &AckSender<T>,
    target_watts: f32,
    cancel: &CancelToken,
) -> Result<AckOutcome, Error> {
    let page = TargetPowerPage::new((target_watts * 4.0).round() as u16).pack()?;
    Ok(sender.send(&page, cancel))
}

#[derive(Debug, Clone)]
pub struct FitnessEquipment {
    pub equipment_type: Option<EquipmentType>,
    pub fe_state: Option<FeState>,
    pub speed_mps: Option<f32>,
    pub heart_rate_bpm: Option<u8>,
    pub incline_percent: Option<f32>,
    pub resistance_percent: Option<f32>,
    pub cycle_length_m: Option<f32>,
    /// Lap toggle flips observed so far.
    pub lap_count: u64,
    last_lap_toggle: Option<bool>,
    elapsed_ticks: Accumulator,
    distance: Accumulator,
}

impl Default for FitnessEquipment {
    fn default() -> Self {
        Self {
            equipment_type: None,
            fe_state: None,
            speed_mps: None,
            heart_rate_bpm: None,
            incline_percent: None,
            resistance_percent: None,
            cycle_length_m: None,
            lap_count: 0,
            last_lap_toggle: None,
            elapsed_ticks: Accumulator::new(8),
            distance: Accumulator::new(8),
        }
    }
}

impl FitnessEquipment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated workout time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ticks.total() as f64 * 0.25
    }

    /// Accumulated distance in meters, when the equipment reports one.
    pub fn distance_m(&self) -> u64 {
        self.distance.total()
    }

    fn observe_capabilities(&mut self, caps: &CapabilitiesAndState) -> bool {
        let mut changed = false;
        if self.fe_state != Some(caps.fe_state) {
            self.fe_state = Some(caps.fe_state);
            changed = true;
        }
        if let Some(prev) = self.last_lap_toggle {
            if prev != caps.lap_toggle {
                self.lap_count += 1;
                changed = true;
            }
        }
        self.last_lap_toggle = Some(caps.lap_toggle);
        changed
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let number = match DataPageNumbers::from_primitive(page[0]) {
            Some(number) => number,
            None => return Err(DecodeError::UnknownPage(page[0])),
        };
        match number {
            DataPageNumbers::GeneralData => {
                let parsed = GeneralDataPage::unpack(page)?;
                let mut changed = self.elapsed_ticks.update(parsed.elapsed_time as u64) > 0;
                if parsed.capabilities.distance_traveled_enabled {
                    changed |= self.distance.update(parsed.distance_traveled as u64) > 0;
                }
                let equipment = Some(EquipmentType::from(parsed.equipment_type));
                if self.equipment_type != equipment {
                    self.equipment_type = equipment;
                    changed = true;
                }
                let speed = (parsed.speed != 0xFFFF).then(|| parsed.speed as f32 / 1000.0);
                if self.speed_mps != speed {
                    self.speed_mps = speed;
                    changed = true;
                }
                let heart_rate = (parsed.heart_rate != 0xFF).then_some(parsed.heart_rate);
                if self.heart_rate_bpm != heart_rate {
                    self.heart_rate_bpm = heart_rate;
                    changed = true;
                }
                changed |= self.observe_capabilities(&parsed.capabilities);
                Ok(changed)
            }
            DataPageNumbers::GeneralSettings => {
                let parsed = GeneralSettingsPage::unpack(page)?;
                let mut changed = false;
                let cycle_length =
                    (parsed.cycle_length != 0xFF).then(|| parsed.cycle_length as f32 * 0.01);
                if self.cycle_length_m != cycle_length {
                    self.cycle_length_m = cycle_length;
                    changed = true;
                }
                let incline =
                    (parsed.incline != 0x7FFF).then(|| parsed.incline as f32 * 0.01);
                if self.incline_percent != incline {
                    self.incline_percent = incline;
                    changed = true;
                }
                let resistance = (parsed.resistance_level != 0xFF)
                    .then(|| parsed.resistance_level as f32 * 0.5);
                if self.resistance_percent != resistance {
                    self.resistance_percent = resistance;
                    changed = true;
                }
                changed |= self.observe_capabilities(&parsed.capabilities);
                Ok(changed)
            }
            // Control pages come from us, not the equipment.
            DataPageNumbers::BasicResistance | DataPageNumbers::TargetPower => {
                Err(DecodeError::UnknownPage(page[0]))
            }
        }
    }
}
