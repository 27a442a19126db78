// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Background information pages shared by every device profile.

pub mod datapages;
pub mod decoder;

pub use datapages::{BatteryStatusField, DayOfWeek};
pub use decoder::{
    BatteryState, CommonDecode, CommonState, ManufacturerInfo, ProductInfo, WallTime,
};
