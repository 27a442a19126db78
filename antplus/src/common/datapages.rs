// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The two background-information page sets shared across profiles.
//!
//! Legacy pages (ids 1 through 5) are used by the bike speed and cadence
//! family; byte 0 carries a page-change toggle in its high bit and the
//! profile keeps transmitting its sensor trailer in bytes 4 through 7.
//! Global pages (ids 0x50 through 0x53) use the full byte for the page
//! number and are shared by the remaining profiles.

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum LegacyPageNumbers {
    CumulativeOperatingTime = 1,
    ManufacturerInformation = 2,
    ProductInformation = 3,
    BatteryStatus = 4,
    MotionIndication = 5,
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum GlobalPageNumbers {
    ManufacturersInformation = 0x50,
    ProductInformation = 0x51,
    BatteryStatus = 0x52,
    TimeAndDate = 0x53,
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug, Default)]
pub enum BatteryStatusField {
    Reserved0 = 0,
    New = 1,
    Good = 2,
    Ok = 3,
    Low = 4,
    Critical = 5,
    Reserved1 = 6,
    #[default]
    Invalid = 7,
}

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum OperatingTimeResolution {
    SixteenSecondResolution = 0,
    TwoSecondResolution = 1,
}

/// Byte shared by both battery pages. On legacy pages the resolution bit
/// is transmitted as zero and carries no meaning.
#[derive(PackedStruct, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct DescriptiveBitField {
    #[packed_field(bits = "0:3")]
    pub coarse_battery_voltage: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "4:6", ty = "enum")]
    pub battery_status: BatteryStatusField,
    #[packed_field(bits = "7", ty = "enum")]
    pub operating_time_resolution: OperatingTimeResolution,
}

impl DescriptiveBitField {
    /// Battery voltage in volts, or `None` when either component carries
    /// its invalid sentinel (0xF coarse, 0xFF fractional).
    pub fn voltage(&self, fractional: u8) -> Option<f32> {
        let coarse: u8 = self.coarse_battery_voltage.into();
        if coarse == 0xF || fractional == 0xFF {
            return None;
        }
        Some(coarse as f32 + fractional as f32 / 256.0)
    }
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct OperatingTimePage {
    #[new(default)]
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(value = "LegacyPageNumbers::CumulativeOperatingTime.to_primitive().into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    /// Wraps at 2^24; one count is two seconds.
    #[packed_field(bytes = "1:3")]
    pub cumulative_operating_time: Integer<u32, packed_bits::Bits<24>>,
    #[packed_field(bytes = "4:7")]
    pub profile_data: [u8; 4],
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct ManufacturerPage {
    #[new(default)]
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(value = "LegacyPageNumbers::ManufacturerInformation.to_primitive().into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bytes = "1")]
    pub manufacturer_id: u8,
    #[packed_field(bytes = "2:3")]
    pub serial_number: u16,
    #[packed_field(bytes = "4:7")]
    pub profile_data: [u8; 4],
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct ProductPage {
    #[new(default)]
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(value = "LegacyPageNumbers::ProductInformation.to_primitive().into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bytes = "1")]
    pub hardware_version: u8,
    #[packed_field(bytes = "2")]
    pub software_version: u8,
    #[packed_field(bytes = "3")]
    pub model_number: u8,
    #[packed_field(bytes = "4:7")]
    pub profile_data: [u8; 4],
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct BatteryPage {
    #[new(default)]
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(value = "LegacyPageNumbers::BatteryStatus.to_primitive().into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    /// Remaining charge in percent, 0xFF when unsupported.
    #[packed_field(bytes = "1")]
    pub battery_level: u8,
    #[packed_field(bytes = "2")]
    pub fractional_battery_voltage: u8,
    #[packed_field(bytes = "3")]
    pub descriptive_bit_field: DescriptiveBitField,
    #[packed_field(bytes = "4:7")]
    pub profile_data: [u8; 4],
}

#[derive(PackedStruct, new, Copy, Clone, Debug, Default, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct MotionFlags {
    #[packed_field(bits = "0")]
    pub stop_indicated: bool,
    #[new(default)]
    #[packed_field(bits = "1:7")]
    _reserved: ReservedZeroes<packed_bits::Bits<7>>,
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct MotionPage {
    #[new(default)]
    #[packed_field(bits = "0")]
    pub page_change_toggle: bool,
    #[new(value = "LegacyPageNumbers::MotionIndication.to_primitive().into()")]
    #[packed_field(bits = "1:7")]
    data_page_number: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bytes = "1")]
    pub motion_flags: MotionFlags,
    #[new(default)]
    #[packed_field(bytes = "2:3")]
    _reserved: ReservedOnes<packed_bits::Bits<16>>,
    #[packed_field(bytes = "4:7")]
    pub profile_data: [u8; 4],
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, Default, PartialEq)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct ManufacturerIdPage {
    #[new(value = "GlobalPageNumbers::ManufacturersInformation.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1:2")]
    _reserved: ReservedOnes<packed_bits::Bits<16>>,
    #[packed_field(bytes = "3")]
    pub hardware_revision: u8,
    #[packed_field(bytes = "4:5")]
    pub manufacturer_id: u16,
    #[packed_field(bytes = "6:7")]
    pub model_number: u16,
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, Default, PartialEq)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct ProductIdPage {
    #[new(value = "GlobalPageNumbers::ProductInformation.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1")]
    _reserved: ReservedOnes<packed_bits::Bits<8>>,
    /// 0xFF when there is no supplemental revision.
    #[packed_field(bytes = "2")]
    pub software_revision_supplemental: u8,
    #[packed_field(bytes = "3")]
    pub software_revision_main: u8,
    #[packed_field(bytes = "4:7")]
    pub serial_number: u32,
}

#[derive(PackedStruct, new, Copy, Clone, Debug, Default, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct BatteryIdentifier {
    #[packed_field(bits = "0:3")]
    pub number_of_batteries: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "4:7")]
    pub identifier: Integer<u8, packed_bits::Bits<4>>,
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct BatteryStatusPage {
    #[new(value = "GlobalPageNumbers::BatteryStatus.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1")]
    _reserved: ReservedOnes<packed_bits::Bits<8>>,
    #[packed_field(bytes = "2")]
    pub battery_identifier: BatteryIdentifier,
    #[packed_field(bytes = "3:5")]
    pub cumulative_operating_time: Integer<u32, packed_bits::Bits<24>>,
    #[packed_field(bytes = "6")]
    pub fractional_battery_voltage: u8,
    #[packed_field(bytes = "7")]
    pub descriptive_bit_field: DescriptiveBitField,
}

impl BatteryStatusPage {
    /// Operating time in seconds at the resolution the descriptive byte
    /// declares.
    pub fn operating_time_secs(&self) -> u64 {
        let ticks: u32 = self.cumulative_operating_time.into();
        match self.descriptive_bit_field.operating_time_resolution {
            OperatingTimeResolution::SixteenSecondResolution => ticks as u64 * 16,
            OperatingTimeResolution::TwoSecondResolution => ticks as u64 * 2,
        }
    }
}

#[derive(PrimitiveEnum_u8, PartialEq, Eq, Copy, Clone, Debug)]
pub enum DayOfWeek {
    Sunday = 0,
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
    Invalid = 7,
}

#[derive(PackedStruct, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct Day {
    #[packed_field(bits = "0:4")]
    pub day: Integer<u8, packed_bits::Bits<5>>,
    #[packed_field(bits = "5:7", ty = "enum")]
    pub day_of_week: DayOfWeek,
}

#[derive(PackedStruct, DataPage, new, Copy, Clone, Debug, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "8")]
pub struct TimeAndDatePage {
    #[new(value = "GlobalPageNumbers::TimeAndDate.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1")]
    _reserved: ReservedOnes<packed_bits::Bits<8>>,
    #[packed_field(bytes = "2")]
    pub seconds: u8,
    #[packed_field(bytes = "3")]
    pub minutes: u8,
    #[packed_field(bytes = "4")]
    pub hours: u8,
    #[packed_field(bytes = "5")]
    pub day: Day,
    #[packed_field(bytes = "6")]
    pub month: u8,
    /// Years since 2000.
    #[packed_field(bytes = "7")]
    pub year: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_battery_page() {
        let page = BatteryPage::unpack(&[0x04, 50, 0xFF, 0x3F, 0x00, 0x00, 0xFF, 0x0F]).unwrap();
        assert!(!page.page_change_toggle);
        assert_eq!(page.data_page_number(), 4);
        assert_eq!(page.battery_level, 50);
        assert_eq!(
            page.descriptive_bit_field.battery_status,
            BatteryStatusField::Ok
        );
        // Coarse voltage nibble is the invalid sentinel.
        assert_eq!(page.descriptive_bit_field.voltage(0xFF), None);
        assert_eq!(page.profile_data, [0x00, 0x00, 0xFF, 0x0F]);
    }

    #[test]
    fn legacy_toggle_bit_is_byte_zero_msb() {
        let page = BatteryPage::unpack(&[0x84, 50, 0xFF, 0x3F, 0x00, 0x00, 0xFF, 0x0F]).unwrap();
        assert!(page.page_change_toggle);
        assert_eq!(page.data_page_number(), 4);
    }

    #[test]
    fn legacy_operating_time_page() {
        // 0x032C1A counts of two seconds each.
        let page = OperatingTimePage::unpack(&[0x01, 0x1A, 0x2C, 0x03, 0xAA, 0x00, 0x55, 0x00])
            .unwrap();
        let counts: u32 = page.cumulative_operating_time.into();
        assert_eq!(counts, 0x032C1A);
        assert_eq!(page.profile_data, [0xAA, 0x00, 0x55, 0x00]);
    }

    #[test]
    fn legacy_manufacturer_page() {
        let packed = ManufacturerPage::new(15, 0x0124, [0; 4]).pack().unwrap();
        assert_eq!(packed, [0x02, 0x0F, 0x24, 0x01, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn legacy_motion_page() {
        let page = MotionPage::unpack(&[0x05, 0x01, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert!(page.motion_flags.stop_indicated);
        let page = MotionPage::unpack(&[0x05, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]).unwrap();
        assert!(!page.motion_flags.stop_indicated);
    }

    #[test]
    fn global_manufacturer_page() {
        let packed = ManufacturerIdPage::new(10, 2, 292).pack().unwrap();
        assert_eq!(packed, [0x50, 0xFF, 0xFF, 0x0A, 0x02, 0x00, 0x24, 0x01]);
        let page = ManufacturerIdPage::unpack(&packed).unwrap();
        assert_eq!(page.manufacturer_id, 2);
        assert_eq!(page.model_number, 292);
    }

    #[test]
    fn global_product_page() {
        let packed = ProductIdPage::new(0x50, 13, 19136514).pack().unwrap();
        assert_eq!(packed, [0x51, 0xFF, 0x50, 0x0D, 0x02, 0x00, 0x24, 0x01]);
    }

    #[test]
    fn global_battery_page() {
        let page = BatteryStatusPage::new(
            BatteryIdentifier::new(0x1.into(), 0xA.into()),
            0x32C1A.into(),
            0x8B,
            DescriptiveBitField::new(
                2.into(),
                BatteryStatusField::Ok,
                OperatingTimeResolution::SixteenSecondResolution,
            ),
        );
        let packed = page.pack().unwrap();
        assert_eq!(packed, [0x52, 0xFF, 0xA1, 0x1A, 0x2C, 0x03, 0x8B, 0x32]);
        assert_eq!(page.operating_time_secs(), 0x32C1A * 16);
        let voltage = page.descriptive_bit_field.voltage(0x8B).unwrap();
        assert!((voltage - (2.0 + 0x8B as f32 / 256.0)).abs() < 1e-6);
    }

    #[test]
    fn time_and_date_page() {
        let packed = TimeAndDatePage::new(
            13,
            27,
            17,
            Day::new(18.into(), DayOfWeek::Thursday),
            6,
            9,
        )
        .pack()
        .unwrap();
        assert_eq!(packed, [0x53, 0xFF, 0x0D, 0x1B, 0x11, 0x92, 0x06, 0x09]);
    }
}
