// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use derive_new::new;

/// Fixed size of every ANT+ data page and command page.
pub const PAGE_SIZE: usize = 8;

/// A validated 8-byte data page.
pub type RawPage = [u8; PAGE_SIZE];

/// The channel id triple that uniquely identifies a device on the network.
///
/// `device_number` is 16 bits on the wire, extendable to 20 bits via the
/// transmission type's device number extension nibble. Identity never
/// changes for the lifetime of a session and is the registry key.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub device_number: u32,
    pub device_type: u8,
    pub transmission_type: u8,
}

#[derive(Debug, Clone)]
pub enum DecodeError {
    /// Fewer than [PAGE_SIZE] bytes were delivered; no field was extracted.
    TooShort { len: usize },
    /// Neither the common-page decoder nor the profile recognized the id.
    /// Reported to the diagnostics sink and otherwise harmless.
    UnknownPage(u8),
    BytePattern(packed_struct::PackingError),
}

impl From<packed_struct::PackingError> for DecodeError {
    fn from(err: packed_struct::PackingError) -> Self {
        Self::BytePattern(err)
    }
}

/// Length-checks a delivered payload before any field extraction.
pub fn page_from_slice(data: &[u8]) -> Result<&RawPage, DecodeError> {
    if data.len() < PAGE_SIZE {
        return Err(DecodeError::TooShort { len: data.len() });
    }
    data[..PAGE_SIZE]
        .try_into()
        .map_err(|_| DecodeError::TooShort { len: data.len() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_page_is_a_decode_error() {
        let data = [0x00, 0x01, 0x02];
        assert!(matches!(
            page_from_slice(&data),
            Err(DecodeError::TooShort { len: 3 })
        ));
    }

    #[test]
    fn long_payload_truncates_to_page() {
        let data = [0u8; 12];
        assert_eq!(page_from_slice(&data).unwrap(), &[0u8; 8]);
    }

    #[test]
    fn identity_equality_is_all_three_fields() {
        let a = DeviceIdentity::new(1234, 120, 1);
        assert_eq!(a, DeviceIdentity::new(1234, 120, 1));
        assert_ne!(a, DeviceIdentity::new(1234, 121, 1));
        assert_ne!(a, DeviceIdentity::new(1234, 120, 5));
        assert_ne!(a, DeviceIdentity::new(1235, 120, 1));
    }
}
