// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Geocache beacon profile. The trackable id is nine 6-bit characters
//! packed MSB-first across bytes 1 through 7; cache data lives on
//! programmable pages keyed by a data id.

use std::collections::BTreeMap;

use antplus_derive::DataPage;
use derive_new::new;
use packed_struct::prelude::*;

use crate::fields::{DecodeError, RawPage};

pub const DEVICE_TYPE: u8 = 19;

/// Degrees per semicircle count.
const SEMICIRCLE_DEG: f64 = 180.0 / (1u64 << 31) as f64;

pub const TRACKABLE_ID_PAGE: u8 = 0x00;
pub const PIN_PAGE: u8 = 0x01;
pub const PROGRAMMABLE_PAGES: core::ops::RangeInclusive<u8> = 2..=31;

#[derive(PrimitiveEnum_u8, PartialEq, Copy, Clone, Debug)]
pub enum ProgrammableDataId {
    Latitude = 0,
    Longitude = 1,
    Hint = 2,
    LoggedVisits = 4,
}

#[derive(PackedStruct, DataPage, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(bit_numbering = "msb0", endian = "lsb", size_bytes = "8")]
pub struct PinPage {
    #[new(value = "PIN_PAGE")]
    #[packed_field(bytes = "0")]
    data_page_number: u8,
    #[new(default)]
    #[packed_field(bytes = "1")]
    _reserved0: ReservedOnes<packed_bits::Bits<8>>,
    #[packed_field(bytes = "2:5")]
    pub pin: u32,
    #[packed_field(bytes = "6")]
    pub total_pages: u8,
    #[new(default)]
    #[packed_field(bytes = "7")]
    _reserved1: ReservedOnes<packed_bits::Bits<8>>,
}

/// Decodes the nine packed id characters; each 6-bit value is offset
/// from ASCII space.
fn trackable_id(page: &RawPage) -> String {
    let mut raw = [0u8; 8];
    raw[1..].copy_from_slice(&page[1..]);
    let raw = u64::from_be_bytes(raw);
    (0..9)
        .map(|i| (((raw >> (56 - 6 * (i + 1))) & 0x3F) as u8 + 0x20) as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[derive(Debug, Clone, Default)]
pub struct Geocache {
    pub trackable_id: Option<String>,
    pub pin: Option<u32>,
    pub total_pages: Option<u8>,
    pub latitude_deg: Option<f64>,
    pub longitude_deg: Option<f64>,
    pub logged_visits: Option<u16>,
    pub last_visit_timestamp: Option<u32>,
    hint_chunks: BTreeMap<u8, [u8; 6]>,
}

impl Geocache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint text assembled from however many chunk pages have arrived,
    /// in page order, truncated at the first NUL.
    pub fn hint(&self) -> Option<String> {
        if self.hint_chunks.is_empty() {
            return None;
        }
        let bytes: Vec<u8> = self
            .hint_chunks
            .values()
            .flatten()
            .copied()
            .take_while(|&b| b != 0x00)
            .collect();
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        match page[0] {
            TRACKABLE_ID_PAGE => {
                let id = trackable_id(page);
                let changed = self.trackable_id.as_deref() != Some(id.as_str());
                self.trackable_id = Some(id);
                Ok(changed)
            }
            PIN_PAGE => {
                let parsed = PinPage::unpack(page)?;
                let changed =
                    self.pin != Some(parsed.pin) || self.total_pages != Some(parsed.total_pages);
                self.pin = Some(parsed.pin);
                self.total_pages = Some(parsed.total_pages);
                Ok(changed)
            }
            number if PROGRAMMABLE_PAGES.contains(&number) => self.decode_programmable(page),
            number => Err(DecodeError::UnknownPage(number)),
        }
    }

    fn decode_programmable(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let data_id = match ProgrammableDataId::from_primitive(page[1]) {
            Some(data_id) => data_id,
            // Unprogrammed filler pages are broadcast with 0xFF here.
            None => return Ok(false),
        };
        let changed = match data_id {
            ProgrammableDataId::Latitude => {
                let semicircles = i32::from_le_bytes([page[2], page[3], page[4], page[5]]);
                let degrees = semicircles as f64 * SEMICIRCLE_DEG;
                let changed = self.latitude_deg != Some(degrees);
                self.latitude_deg = Some(degrees);
                changed
            }
            ProgrammableDataId::Longitude => {
                let semicircles = i32::from_le_bytes([page[2], page[3], page[4], page[5]]);
                let degrees = semicircles as f64 * SEMICIRCLE_DEG;
                let changed = self.longitude_deg != Some(degrees);
                self.longitude_deg = Some(degrees);
                changed
            }
            ProgrammableDataId::Hint => {
                let chunk = [page[2], page[3], page[4], page[5], page[6], page[7]];
                let changed = self.hint_chunks.get(&page[0]) != Some(&chunk);
                self.hint_chunks.insert(page[0], chunk);
                changed
            }
            ProgrammableDataId::LoggedVisits => {
                let timestamp = u32::from_le_bytes([page[2], page[3], page[4], page[5]]);
                let visits = u16::from_le_bytes([page[6], page[7]]);
                let changed = self.logged_visits != Some(visits)
                    || self.last_visit_timestamp != Some(timestamp);
                self.logged_visits = Some(visits);
                self.last_visit_timestamp = Some(timestamp);
                changed
            }
        };
        Ok(changed)
    }
}
