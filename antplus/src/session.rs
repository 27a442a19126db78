// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-device session: page routing through the common and profile
//! decoders, staleness tracking, and the bounded-retry acknowledged
//! send machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::decoder::{CommonDecode, CommonState};
use crate::fields::{page_from_slice, DecodeError, DeviceIdentity, RawPage};
use crate::profiles::{CommonPageSet, Profile};
use crate::transport::{AckOutcome, CancelToken, ChannelHandle, Transport};

/// Acknowledged-send policy.
#[derive(Debug, Clone, Copy)]
pub struct SendConfig {
    /// Transmission attempts before the last failure is reported.
    /// Values below one behave as one.
    pub max_attempts: u8,
    pub attempt_timeout: Duration,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub send: SendConfig,
    /// Silence after which a session is flagged stale.
    pub stale_after: Duration,
    /// Used by the wheel-based profiles to turn revolutions into meters.
    pub wheel_circumference_m: f32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            send: SendConfig::default(),
            stale_after: Duration::from_secs(5),
            wheel_circumference_m: 2.2,
        }
    }
}

/// What a delivered page did to the session, beyond decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEvents {
    /// Observable sensor state changed (not a retransmission).
    pub changed: bool,
    /// The session was stale and this page brought it back.
    pub returned: bool,
}

#[derive(Debug)]
pub struct DeviceSession {
    pub identity: DeviceIdentity,
    pub handle: ChannelHandle,
    pub profile: Profile,
    pub common: CommonState,
    last_seen: Option<Instant>,
    stale: bool,
    send_gate: Arc<AtomicBool>,
}

impl DeviceSession {
    pub fn new(identity: DeviceIdentity, handle: ChannelHandle, config: &RegistryConfig) -> Self {
        Self {
            identity,
            handle,
            profile: Profile::for_device_type(identity.device_type, config.wheel_circumference_m),
            common: CommonState::new(),
            last_seen: None,
            stale: false,
            send_gate: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Runs a delivered payload through the common-then-profile decode.
    /// Any length-checked page stamps `last_seen`, even one that later
    /// fails to decode; the device is demonstrably alive either way.
    pub fn handle_page(&mut self, data: &[u8], now: Instant) -> Result<PageEvents, DecodeError> {
        let page = page_from_slice(data)?;
        self.last_seen = Some(now);
        let returned = self.stale;
        self.stale = false;
        let mut changed = false;
        let handled = match self.profile.common_pages() {
            CommonPageSet::None => false,
            CommonPageSet::Legacy => match self.common.decode_legacy(page)? {
                CommonDecode::Handled { changed: c } => {
                    changed |= c;
                    true
                }
                CommonDecode::NotCommon => false,
            },
            CommonPageSet::Global => match self.common.decode_global(page)? {
                CommonDecode::Handled { changed: c } => {
                    changed |= c;
                    true
                }
                CommonDecode::NotCommon => false,
            },
        };
        match self.profile.decode(&mut self.common, page) {
            Ok(c) => changed |= c,
            // A page the profile does not know is fine when the common
            // decoder already consumed it.
            Err(DecodeError::UnknownPage(_)) if handled => {}
            Err(err) => return Err(err),
        }
        Ok(PageEvents { changed, returned })
    }

    /// Flips the stale flag once the threshold has elapsed. Returns true
    /// on the transition only; a session that never saw a page cannot go
    /// stale.
    pub fn poll_stale(&mut self, now: Instant, threshold: Duration) -> bool {
        if self.stale {
            return false;
        }
        let silent = match self.last_seen {
            Some(seen) => now.duration_since(seen) >= threshold,
            None => false,
        };
        if silent {
            self.stale = true;
        }
        silent
    }

    pub(crate) fn send_gate(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.send_gate)
    }
}

/// Cloneable handle for acknowledged sends on one session's channel.
/// Holds no session lock, so sending never blocks the decode path; all
/// clones share the one-in-flight gate.
#[derive(Debug)]
pub struct AckSender<T: Transport> {
    transport: Arc<T>,
    handle: ChannelHandle,
    gate: Arc<AtomicBool>,
    config: SendConfig,
}

impl<T: Transport> Clone for AckSender<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            handle: self.handle,
            gate: Arc::clone(&self.gate),
            config: self.config,
        }
    }
}

impl<T: Transport> AckSender<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        handle: ChannelHandle,
        gate: Arc<AtomicBool>,
        config: SendConfig,
    ) -> Self {
        Self {
            transport,
            handle,
            gate,
            config,
        }
    }

    /// Sends one page with retries. A concurrent send on the same
    /// session observes [AckOutcome::ChannelUnavailable] immediately;
    /// requests are never queued.
    pub fn send(&self, payload: &RawPage, cancel: &CancelToken) -> AckOutcome {
        if self.gate.swap(true, Ordering::AcqRel) {
            return AckOutcome::ChannelUnavailable;
        }
        let outcome = self.run_attempts(payload, cancel);
        self.gate.store(false, Ordering::Release);
        outcome
    }

    fn run_attempts(&self, payload: &RawPage, cancel: &CancelToken) -> AckOutcome {
        let attempts = self.config.max_attempts.max(1);
        let mut last = AckOutcome::TimedOut;
        for _ in 0..attempts {
            if cancel.is_cancelled() {
                return AckOutcome::Cancelled;
            }
            match self
                .transport
                .send_acknowledged(self.handle, payload, self.config.attempt_timeout, cancel)
            {
                AckOutcome::Accepted => return AckOutcome::Accepted,
                // Cancellation is a caller decision, never retried.
                AckOutcome::Cancelled => return AckOutcome::Cancelled,
                AckOutcome::ChannelUnavailable => return AckOutcome::ChannelUnavailable,
                outcome => last = outcome,
            }
        }
        last
    }
}
