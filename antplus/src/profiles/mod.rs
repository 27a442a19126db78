// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-device-type page decoders. The profile for a session is chosen
//! once from the channel id's device-type byte and never changes.

pub mod asset_tracker;
pub mod bicycle_power;
pub mod bike_cadence;
pub mod bike_speed;
pub mod combined_speed_cadence;
pub mod fitness_equipment;
pub mod geocache;
pub mod heart_rate;
pub mod muscle_oxygen;
pub mod radar;
pub mod stride;
pub mod unknown;

use crate::common::decoder::CommonState;
use crate::fields::{DecodeError, RawPage};

/// Which background page set a profile's devices transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonPageSet {
    /// The profile handles all of its pages itself.
    None,
    /// Page ids 1 through 5 with the toggle bit in byte 0.
    Legacy,
    /// Page ids 0x50 through 0x53.
    Global,
}

#[derive(Debug, Clone)]
pub enum Profile {
    HeartRate(heart_rate::HeartRate),
    BikeSpeed(bike_speed::BikeSpeed),
    BikeCadence(bike_cadence::BikeCadence),
    CombinedSpeedCadence(combined_speed_cadence::CombinedSpeedCadence),
    BicyclePower(bicycle_power::BicyclePower),
    FitnessEquipment(fitness_equipment::FitnessEquipment),
    BikeRadar(radar::BikeRadar),
    Geocache(geocache::Geocache),
    AssetTracker(asset_tracker::AssetTracker),
    MuscleOxygen(muscle_oxygen::MuscleOxygen),
    StrideMonitor(stride::StrideMonitor),
    /// Device types without a decoder keep their raw traffic.
    Unknown(unknown::UnknownDevice),
}

impl Profile {
    /// Selects the decoder for a device-type byte. `wheel_circumference_m`
    /// only matters to the profiles that turn wheel revolutions into
    /// distance.
    pub fn for_device_type(device_type: u8, wheel_circumference_m: f32) -> Self {
        match device_type {
            heart_rate::DEVICE_TYPE => Profile::HeartRate(heart_rate::HeartRate::new()),
            bike_speed::DEVICE_TYPE => {
                Profile::BikeSpeed(bike_speed::BikeSpeed::new(wheel_circumference_m))
            }
            bike_cadence::DEVICE_TYPE => Profile::BikeCadence(bike_cadence::BikeCadence::new()),
            combined_speed_cadence::DEVICE_TYPE => Profile::CombinedSpeedCadence(
                combined_speed_cadence::CombinedSpeedCadence::new(wheel_circumference_m),
            ),
            bicycle_power::DEVICE_TYPE => {
                Profile::BicyclePower(bicycle_power::BicyclePower::new())
            }
            fitness_equipment::DEVICE_TYPE => {
                Profile::FitnessEquipment(fitness_equipment::FitnessEquipment::new())
            }
            radar::DEVICE_TYPE => Profile::BikeRadar(radar::BikeRadar::new()),
            geocache::DEVICE_TYPE => Profile::Geocache(geocache::Geocache::new()),
            asset_tracker::DEVICE_TYPE => {
                Profile::AssetTracker(asset_tracker::AssetTracker::new())
            }
            muscle_oxygen::DEVICE_TYPE => {
                Profile::MuscleOxygen(muscle_oxygen::MuscleOxygen::new())
            }
            stride::DEVICE_TYPE => Profile::StrideMonitor(stride::StrideMonitor::new()),
            _ => Profile::Unknown(unknown::UnknownDevice::new()),
        }
    }

    pub fn common_pages(&self) -> CommonPageSet {
        match self {
            // These carry their background data on profile pages.
            Profile::HeartRate(_) | Profile::CombinedSpeedCadence(_) => CommonPageSet::None,
            Profile::BikeSpeed(_) | Profile::BikeCadence(_) => CommonPageSet::Legacy,
            Profile::BicyclePower(_)
            | Profile::FitnessEquipment(_)
            | Profile::BikeRadar(_)
            | Profile::Geocache(_)
            | Profile::AssetTracker(_)
            | Profile::MuscleOxygen(_)
            | Profile::StrideMonitor(_)
            | Profile::Unknown(_) => CommonPageSet::Global,
        }
    }

    pub fn decode(
        &mut self,
        common: &mut CommonState,
        page: &RawPage,
    ) -> Result<bool, DecodeError> {
        match self {
            Profile::HeartRate(state) => state.decode(common, page),
            Profile::BikeSpeed(state) => state.decode(page),
            Profile::BikeCadence(state) => state.decode(page),
            Profile::CombinedSpeedCadence(state) => state.decode(page),
            Profile::BicyclePower(state) => state.decode(page),
            Profile::FitnessEquipment(state) => state.decode(page),
            Profile::BikeRadar(state) => state.decode(page),
            Profile::Geocache(state) => state.decode(page),
            Profile::AssetTracker(state) => state.decode(page),
            Profile::MuscleOxygen(state) => state.decode(page),
            Profile::StrideMonitor(state) => state.decode(common, page),
            Profile::Unknown(state) => state.decode(page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_maps_device_types() {
        assert!(matches!(
            Profile::for_device_type(120, 2.2),
            Profile::HeartRate(_)
        ));
        assert!(matches!(
            Profile::for_device_type(123, 2.2),
            Profile::BikeSpeed(_)
        ));
        assert!(matches!(
            Profile::for_device_type(121, 2.2),
            Profile::CombinedSpeedCadence(_)
        ));
        assert!(matches!(
            Profile::for_device_type(11, 2.2),
            Profile::BicyclePower(_)
        ));
        assert!(matches!(
            Profile::for_device_type(17, 2.2),
            Profile::FitnessEquipment(_)
        ));
        assert!(matches!(
            Profile::for_device_type(40, 2.2),
            Profile::BikeRadar(_)
        ));
        assert!(matches!(
            Profile::for_device_type(0, 2.2),
            Profile::Unknown(_)
        ));
        assert!(matches!(
            Profile::for_device_type(200, 2.2),
            Profile::Unknown(_)
        ));
    }

    #[test]
    fn common_page_sets() {
        assert_eq!(
            Profile::for_device_type(120, 2.2).common_pages(),
            CommonPageSet::None
        );
        assert_eq!(
            Profile::for_device_type(122, 2.2).common_pages(),
            CommonPageSet::Legacy
        );
        assert_eq!(
            Profile::for_device_type(31, 2.2).common_pages(),
            CommonPageSet::Global
        );
        assert_eq!(
            Profile::for_device_type(6, 2.2).common_pages(),
            CommonPageSet::Global
        );
    }
}
