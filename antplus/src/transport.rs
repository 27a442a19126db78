// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Seams to the radio driver and to diagnostics. The library never touches
//! hardware directly; everything below this trait boundary is the caller's.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::fields::{DecodeError, DeviceIdentity, RawPage};

/// Opaque handle to an open channel, issued by the [Transport].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u8);

/// Terminal result of a single acknowledged transmission attempt, and of
/// a whole send once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The device acknowledged the page.
    Accepted,
    /// The device reported a transmit failure.
    Failed,
    /// No acknowledgement arrived within the attempt timeout.
    TimedOut,
    /// The caller cancelled the send before it completed.
    Cancelled,
    /// The channel already had a send in flight or is closed.
    ChannelUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    OutOfChannels(),
    ChannelUnavailable(),
}

/// Cooperative cancellation flag shared between a blocked send and the
/// caller that wants to abandon it. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent; already-completed sends are
    /// unaffected.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The radio driver seam. Implementations are expected to block in
/// [Transport::send_acknowledged] until the device responds, the timeout
/// elapses or the cancel token fires.
pub trait Transport: Send + Sync {
    fn open_channel(&self, identity: DeviceIdentity) -> Result<ChannelHandle, TransportError>;

    /// One acknowledged transmission attempt. Must honor `timeout` and
    /// check `cancel` while waiting; retry policy lives above this trait.
    fn send_acknowledged(
        &self,
        handle: ChannelHandle,
        payload: &RawPage,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> AckOutcome;

    fn close_channel(&self, handle: ChannelHandle);
}

/// Where malformed or unrecognized pages go. Decode failures never abort
/// a session; they are reported here and the page is dropped.
pub trait DiagnosticsSink: Send + Sync {
    fn bad_page(&self, identity: &DeviceIdentity, err: &DecodeError, data: &[u8]);
}

/// Default sink that forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn bad_page(&self, identity: &DeviceIdentity, err: &DecodeError, data: &[u8]) {
        log::warn!(
            "dropping bad page from device {}/{}: {:?} ({:02X?})",
            identity.device_number,
            identity.device_type,
            err,
            data
        );
    }
}
