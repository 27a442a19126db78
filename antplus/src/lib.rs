// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Decoders and session plumbing for ANT+ sensor broadcasts.
//!
//! Every ANT+ data page is 8 bytes; this crate turns streams of those
//! pages into typed, rollover-safe sensor state. The radio itself stays
//! behind the [transport::Transport] trait, so the library runs against
//! any driver (or a mock in tests):
//!
//! * [profiles] holds one decoder per supported device type, selected
//!   from the channel id's device-type byte.
//! * [common] decodes the background pages (manufacturer, product,
//!   battery, time) that most profiles share.
//! * [registry::DeviceRegistry] keys sessions by [fields::DeviceIdentity],
//!   routes received pages, tracks staleness and hands out
//!   [session::AckSender] handles for acknowledged commands.

pub mod common;
pub mod fields;
pub mod helpers;
pub mod profiles;
pub mod registry;
pub mod session;
pub mod transport;

pub use fields::{DecodeError, DeviceIdentity, RawPage, PAGE_SIZE};
pub use profiles::Profile;
pub use registry::{DeviceRegistry, RegistryError, SessionEvent};
pub use session::{AckSender, DeviceSession, RegistryConfig, SendConfig};
pub use transport::{AckOutcome, CancelToken, ChannelHandle, Transport, TransportError};

#[cfg(test)]
pub(crate) mod testutil {
    //! Scripted transport for exercising the send and registry paths.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::fields::{DeviceIdentity, RawPage};
    use crate::transport::{AckOutcome, CancelToken, ChannelHandle, Transport, TransportError};

    /// One scripted response to [Transport::send_acknowledged].
    pub enum Scripted {
        Outcome(AckOutcome),
        /// Fires the caller's cancel token mid-wait, as a blocked radio
        /// driver would observe it.
        CancelAndReport,
    }

    pub struct MockTransport {
        script: Mutex<VecDeque<Scripted>>,
        sent: Mutex<Vec<RawPage>>,
        closed: Mutex<Vec<ChannelHandle>>,
        next_channel: AtomicU8,
        channel_capacity: Option<u8>,
    }

    impl MockTransport {
        pub fn scripted(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
                closed: Mutex::new(Vec::new()),
                next_channel: AtomicU8::new(0),
                channel_capacity: None,
            }
        }

        pub fn with_channel_capacity(capacity: u8) -> Self {
            Self {
                channel_capacity: Some(capacity),
                ..Self::scripted(Vec::new())
            }
        }

        pub fn sent_pages(&self) -> Vec<RawPage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn closed_channels(&self) -> Vec<ChannelHandle> {
            self.closed.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn open_channel(&self, _identity: DeviceIdentity) -> Result<ChannelHandle, TransportError> {
            let channel = self.next_channel.fetch_add(1, Ordering::SeqCst);
            if self.channel_capacity.is_some_and(|cap| channel >= cap) {
                return Err(TransportError::OutOfChannels());
            }
            Ok(ChannelHandle(channel))
        }

        fn send_acknowledged(
            &self,
            _handle: ChannelHandle,
            payload: &RawPage,
            _timeout: Duration,
            cancel: &CancelToken,
        ) -> AckOutcome {
            self.sent.lock().unwrap().push(*payload);
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Outcome(_)) if cancel.is_cancelled() => AckOutcome::Cancelled,
                Some(Scripted::Outcome(outcome)) => outcome,
                Some(Scripted::CancelAndReport) => {
                    cancel.cancel();
                    AckOutcome::Cancelled
                }
                // Out of script: a healthy device.
                None => AckOutcome::Accepted,
            }
        }

        fn close_channel(&self, handle: ChannelHandle) {
            self.closed.lock().unwrap().push(handle);
        }
    }
}
