// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pass-through profile for device types without a decoder. The raw last
//! page per id is retained so callers can still inspect the traffic; the
//! global common set is handled by the session as usual.

use std::collections::BTreeMap;

use crate::fields::{DecodeError, RawPage};

#[derive(Debug, Clone, Default)]
pub struct UnknownDevice {
    pages: BTreeMap<u8, RawPage>,
}

impl UnknownDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent page carrying this id, if one has arrived.
    pub fn last_page(&self, number: u8) -> Option<&RawPage> {
        self.pages.get(&number)
    }

    pub fn page_numbers(&self) -> impl Iterator<Item = u8> + '_ {
        self.pages.keys().copied()
    }

    /// Never rejects a page; any 8 bytes are worth keeping.
    pub fn decode(&mut self, page: &RawPage) -> Result<bool, DecodeError> {
        let changed = self.pages.get(&page[0]) != Some(page);
        self.pages.insert(page[0], *page);
        Ok(changed)
    }
}
