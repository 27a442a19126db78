// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Asset tracker profile. Each tracked asset broadcasts a pair of
//! location pages; latitude is split across the pair and only assembled
//! once both halves have arrived.

use std::collections::BTreeMap;

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};

pub const DEVICE_TYPE: u8 = 41;

const SEMICIRCLE_DEG: f64 = 180.0 / (1u64 << 31) as f64;
/// Degrees per count of the byte-wide bearing field.
const BEARING_DEG: f32 = 360.0 / 256.0;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum DataPageNumbers {
    AssetLocation1 = 0x01,
    AssetLocation2 = 0x02,
    NoAssets = 0x10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSituation {
    Sitting,
    Moving,
    Pointing,
    Treed,
    Undetermined(u8),
}

impl From<u8> for AssetSituation {
    fn from(field: u8) -> Self {
        match field {
            0 => AssetSituation::Sitting,
            1 => AssetSituation::Moving,
            2 => AssetSituation::Pointing,
            3 => AssetSituation::Treed,
            other => AssetSituation::Undetermined(other),
        }
    }
}

#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct AssetId {
    #[packed_field(bits = "0:4")]
    pub index: Integer<u8, packed_bits::Bits<5>>,
    #[new(default)]
    #[packed_field(bits = "5:7")]
    _reserved: ReservedZeroes<packed_bits::Bits<3>>,
}

#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct SituationAndFlags {
    #[packed_field(bits = "0:2")]
    pub situation: Integer<u8, packed_bits::Bits<3>>,
    #[packed_field(bits = "3")]
    pub low_battery: bool,
    #[packed_field(bits = "4")]
    pub gps_lost: bool,
    #[packed_field(bits = "5")]
    pub communication_lost: bool,
    #[packed_field(bits = "6")]
    pub should_remove: bool,
    #[new(default)]
    #[packed_field(bits = "7")]
    _reserved: ReservedZeroes<packed_bits::Bits<1>>,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct AssetLocation1Page {
    #[new(value = "DataPageNumbers::AssetLocation1.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[packed_field(bytes = "1")]
    pub asset_id: AssetId,
    /// Meters from the tracker.
    #[packed_field(bytes = "2:3")]
    pub distance: u16,
    /// 256 counts per full circle.
    #[packed_field(bytes = "4")]
    pub bearing: u8,
    #[packed_field(bytes = "5")]
    pub situation: SituationAndFlags,
    /// Lower half of the latitude in semicircles.
    #[packed_field(bytes = "6:7")]
    pub latitude_lower: u16,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct AssetLocation2Page {
    #[new(value = "DataPageNumbers::AssetLocation2.to_primitive()")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[packed_field(bytes = "1")]
    pub asset_id: AssetId,
    /// Upper half of the latitude in semicircles.
    #[packed_field(bytes = "2:3")]
    pub latitude_upper: u16,
    #[packed_field(bytes = "4:7")]
    pub longitude: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Asset {
    pub distance_m: Option<u16>,
    pub bearing_deg: Option<f32>,
    pub situation: Option<AssetSituation>,
    pub low_battery: bool,
    pub gps_lost: bool,
    pub communication_lost: bool,
    pub should_remove: bool,
    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    latitude_lower: Option<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct AssetTracker {
    assets: BTreeMap<u8, Asset>,
}

impl AssetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset(&self, index: u8) -> Option<&Asset> {
        self.assets.get(&index)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&u8, &Asset)> {
        self.assets.iter()
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let number = match DataPageNumbers::from_primitive(page[0]) {
            Some(number) => number,
            None => return Err(DecodeError::UnknownPage(page[0])),
        };
        match number {
            DataPageNumbers::AssetLocation1 => {
                let parsed = AssetLocation1Page::unpack(page)?;
                let entry = self
                    .assets
                    .entry(parsed.asset_id.index.into())
                    .or_default();
                let before = *entry;
                entry.distance_m = Some(parsed.distance);
                entry.bearing_deg = Some(parsed.bearing as f32 * BEARING_DEG);
                let situation: u8 = parsed.situation.situation.into();
                entry.situation = Some(AssetSituation::from(situation));
                entry.low_battery = parsed.situation.low_battery;
                entry.gps_lost = parsed.situation.gps_lost;
                entry.communication_lost = parsed.situation.communication_lost;
                entry.should_remove = parsed.situation.should_remove;
                entry.latitude_lower = Some(parsed.latitude_lower);
                Ok(before != *entry)
            }
            DataPageNumbers::AssetLocation2 => {
                let parsed = AssetLocation2Page::unpack(page)?;
                let entry = self
                    .assets
                    .entry(parsed.asset_id.index.into())
                    .or_default();
                let before = *entry;
                if let Some(lower) = entry.latitude_lower {
                    let semicircles = ((parsed.latitude_upper as u32) << 16 | lower as u32) as i32;
                    entry.latitude_deg = Some(semicircles as f64 * SEMICIRCLE_DEG);
                }
                entry.longitude_deg = Some(parsed.longitude as f64 * SEMICIRCLE_DEG);
                Ok(before != *entry)
            }
            DataPageNumbers::NoAssets => {
                let changed = !self.assets.is_empty();
                self.assets.clear();
                Ok(changed)
            }
        }
    }
}
