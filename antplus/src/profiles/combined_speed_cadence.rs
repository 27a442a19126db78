//! Combined speed and cadence sensor. A single page layout carrying both
//! (event time, revolution count) pairs; no page number, no common set.

use derive_new::new;
use packed_struct::derive::PackedStruct;
use packed_struct::PackedStruct as _;

use crate::fields::{DecodeError, RawPage};
use crate::helpers::{Accumulator, RotationEvents};

pub const DEVICE_TYPE: u8 = 121;

#[derive(PackedStruct, new, PartialEq, Copy, Clone, Debug)]
#[packed_struct(endian = "lsb")]
pub struct SpeedAndCadencePage {
    /// Time of the last valid bike cadence event (1/1024 sec)
    pub cadence_event_time: u16,

    /// Total number of pedal revolutions
    pub cadence_revolution_count: u16,

    /// Time of the last valid bike speed event (1/1024 sec)
    pub speed_event_time: u16,

    /// Total number of wheel revolutions
    pub speed_revolution_count: u16,
}

#[derive(Debug, Clone)]
pub struct CombinedSpeedCadence {
    wheel_circumference_m: f32,
    pub cadence_rpm: Option<f32>,
    pub speed_mps: Option<f32>,
    wheel_revolutions: Accumulator,
    pedal_revolutions: Accumulator,
    speed_events: RotationEvents,
    cadence_events: RotationEvents,
}

impl CombinedSpeedCadence {
    pub fn new(wheel_circumference_m: f32) -> Self {
        Self {
            wheel_circumference_m,
            cadence_rpm: None,
            speed_mps: None,
            wheel_revolutions: Accumulator::new(16),
            pedal_revolutions: Accumulator::new(16),
            speed_events: RotationEvents::default(),
            cadence_events: RotationEvents::default(),
        }
    }

    /// Total distance in meters, rollover safe.
    pub fn distance_m(&self) -> f64 {
        self.wheel_revolutions.total() as f64 * self.wheel_circumference_m as f64
    }

    pub fn total_wheel_revolutions(&self) -> u64 {
        self.wheel_revolutions.total()
    }

    pub fn total_pedal_revolutions(&self) -> u64 {
        self.pedal_revolutions.total()
    }

    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let parsed = SpeedAndCadencePage::unpack(page)?;
        self.wheel_revolutions
            .update(parsed.speed_revolution_count as u64);
        self.pedal_revolutions
            .update(parsed.cadence_revolution_count as u64);
        let mut changed = false;
        if let Some(delta) = self
            .cadence_events
            .update(parsed.cadence_event_time, parsed.cadence_revolution_count)
        {
            self.cadence_rpm = Some(delta.revolutions as f32 * 60.0 / delta.seconds);
            changed = true;
        }
        if let Some(delta) = self
            .speed_events
            .update(parsed.speed_event_time, parsed.speed_revolution_count)
        {
            self.speed_mps =
                Some(delta.revolutions as f32 * self.wheel_circumference_m / delta.seconds);
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack() {
        let raw = [0x09, 0x91, 0xd5, 0x08, 0xd7, 0x90, 0x42, 0x1b];
        let page = SpeedAndCadencePage::unpack(&raw).unwrap();
        assert_eq!(page.cadence_event_time, 37129);
        assert_eq!(page.cadence_revolution_count, 2261);
        assert_eq!(page.speed_event_time, 37079);
        assert_eq!(page.speed_revolution_count, 6978);
    }

    #[test]
    fn both_rates_from_one_page_stream() {
        let mut state = CombinedSpeedCadence::new(1.0);
        state
            .decode(&SpeedAndCadencePage::new(0, 0, 0, 0).pack().unwrap())
            .unwrap();
        let changed = state
            .decode(&SpeedAndCadencePage::new(1024, 1, 1024, 2).pack().unwrap())
            .unwrap();
        assert!(changed);
        assert!((state.cadence_rpm.unwrap() - 60.0).abs() <= f32::EPSILON);
        assert!((state.speed_mps.unwrap() - 2.0).abs() <= f32::EPSILON);
        assert!((state.distance_m() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn counter_roll_over() {
        let mut state = CombinedSpeedCadence::new(1.0);
        state
            .decode(
                &SpeedAndCadencePage::new(u16::MAX, u16::MAX, u16::MAX, u16::MAX)
                    .pack()
                    .unwrap(),
            )
            .unwrap();
        state
            .decode(&SpeedAndCadencePage::new(1023, 0, 1023, 0).pack().unwrap())
            .unwrap();
        assert!((state.cadence_rpm.unwrap() - 60.0).abs() <= f32::EPSILON);
        assert!((state.speed_mps.unwrap() - 1.0).abs() <= f32::EPSILON);
    }

    #[test]
    fn coasting_is_not_a_change() {
        let mut state = CombinedSpeedCadence::new(1.0);
        state
            .decode(&SpeedAndCadencePage::new(1024, 1, 1024, 2).pack().unwrap())
            .unwrap();
        // Timers advance, counts do not.
        let changed = state
            .decode(&SpeedAndCadencePage::new(2048, 1, 2048, 2).pack().unwrap())
            .unwrap();
        assert!(!changed);
    }
}
