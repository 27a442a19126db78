// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Concurrent registry of device sessions. Pages arrive from the radio
//! thread, staleness polls from a timer, acknowledged sends from anywhere;
//! the registry keys everything by [DeviceIdentity] and keeps each
//! session behind its own lock so one slow decode never stalls the rest.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::fields::DeviceIdentity;
use crate::session::{AckSender, DeviceSession, RegistryConfig};
use crate::transport::{DiagnosticsSink, LogSink, Transport, TransportError};

/// Lifecycle notifications, delivered through the registered callback
/// after all registry and session locks are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A page changed the session's observable state.
    StateChanged,
    /// The staleness threshold elapsed with no page.
    WentStale,
    /// A page arrived on a stale session.
    Returned,
    /// The session was removed and its channel closed.
    Evicted,
}

pub type EventCallback = Arc<dyn Fn(&DeviceIdentity, SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry was closed; no new sessions or pages are accepted.
    AlreadyClosed(),
    Transport(TransportError),
}

impl From<TransportError> for RegistryError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

struct Inner {
    sessions: HashMap<DeviceIdentity, Arc<Mutex<DeviceSession>>>,
    closed: bool,
}

pub struct DeviceRegistry<T: Transport> {
    transport: Arc<T>,
    config: RegistryConfig,
    sink: Arc<dyn DiagnosticsSink>,
    callback: Mutex<Option<EventCallback>>,
    inner: Mutex<Inner>,
}

// A poisoned lock only means another thread panicked mid-update; the
// session data itself is still the last consistent write.
fn relock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|err| err.into_inner())
}

impl<T: Transport> DeviceRegistry<T> {
    pub fn new(transport: T, config: RegistryConfig) -> Self {
        Self::with_sink(transport, config, Arc::new(LogSink))
    }

    pub fn with_sink(transport: T, config: RegistryConfig, sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            sink,
            callback: Mutex::new(None),
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Replaces the lifecycle callback. Events raised while no callback
    /// is registered are dropped.
    pub fn set_event_callback(
        &self,
        callback: impl Fn(&DeviceIdentity, SessionEvent) + Send + Sync + 'static,
    ) {
        *relock(&self.callback) = Some(Arc::new(callback));
    }

    fn fire(&self, identity: &DeviceIdentity, event: SessionEvent) {
        let callback = relock(&self.callback).clone();
        if let Some(callback) = callback {
            callback(identity, event);
        }
    }

    /// Returns the session for `identity`, opening a channel and creating
    /// one on first sight.
    pub fn open(&self, identity: DeviceIdentity) -> Result<Arc<Mutex<DeviceSession>>, RegistryError> {
        let mut inner = relock(&self.inner);
        if inner.closed {
            return Err(RegistryError::AlreadyClosed());
        }
        if let Some(session) = inner.sessions.get(&identity) {
            return Ok(Arc::clone(session));
        }
        let handle = self.transport.open_channel(identity)?;
        let session = Arc::new(Mutex::new(DeviceSession::new(identity, handle, &self.config)));
        inner.sessions.insert(identity, Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, identity: &DeviceIdentity) -> Option<Arc<Mutex<DeviceSession>>> {
        relock(&self.inner).sessions.get(identity).cloned()
    }

    /// Identities of every live session.
    pub fn snapshot(&self) -> Vec<DeviceIdentity> {
        relock(&self.inner).sessions.keys().copied().collect()
    }

    /// Builds a send handle for the session's channel. The handle shares
    /// the session's one-in-flight gate but holds no session lock.
    pub fn sender(&self, identity: &DeviceIdentity) -> Option<AckSender<T>> {
        let session = self.get(identity)?;
        let session = relock(&session);
        Some(AckSender::new(
            Arc::clone(&self.transport),
            session.handle,
            session.send_gate(),
            self.config.send,
        ))
    }

    /// Routes a received page to its session, creating the session on
    /// first sight. Decode failures go to the diagnostics sink and the
    /// page is dropped; only registry-level failures surface here.
    pub fn on_page_received(
        &self,
        identity: DeviceIdentity,
        data: &[u8],
    ) -> Result<(), RegistryError> {
        let session = self.open(identity)?;
        let result = relock(&session).handle_page(data, Instant::now());
        match result {
            Ok(events) => {
                if events.returned {
                    self.fire(&identity, SessionEvent::Returned);
                }
                if events.changed {
                    self.fire(&identity, SessionEvent::StateChanged);
                }
            }
            Err(err) => self.sink.bad_page(&identity, &err, data),
        }
        Ok(())
    }

    /// Marks sessions silent for longer than the configured threshold.
    /// Called from the caller's timer; the registry keeps no thread of
    /// its own.
    pub fn poll_staleness(&self, now: Instant) {
        let sessions: Vec<_> = relock(&self.inner)
            .sessions
            .iter()
            .map(|(identity, session)| (*identity, Arc::clone(session)))
            .collect();
        for (identity, session) in sessions {
            let went_stale = relock(&session).poll_stale(now, self.config.stale_after);
            if went_stale {
                self.fire(&identity, SessionEvent::WentStale);
            }
        }
    }

    /// Removes a session and closes its channel. Existing [AckSender]
    /// clones keep their handle; the transport reports sends on a closed
    /// channel as unavailable.
    pub fn evict(&self, identity: &DeviceIdentity) -> bool {
        let session = relock(&self.inner).sessions.remove(identity);
        match session {
            Some(session) => {
                let handle = relock(&session).handle;
                self.transport.close_channel(handle);
                self.fire(identity, SessionEvent::Evicted);
                true
            }
            None => false,
        }
    }

    /// Evicts every session and refuses all further pages and opens.
    pub fn close(&self) {
        let sessions: Vec<_> = {
            let mut inner = relock(&self.inner);
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.sessions.drain().collect()
        };
        for (identity, session) in sessions {
            let handle = relock(&session).handle;
            self.transport.close_channel(handle);
            self.fire(&identity, SessionEvent::Evicted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::DecodeError;
    use crate::profiles::Profile;
    use crate::testutil::MockTransport;
    use crate::transport::{AckOutcome, CancelToken};
    use std::time::Duration;

    fn heart_rate_identity() -> DeviceIdentity {
        DeviceIdentity::new(1234, 120, 1)
    }

    fn registry() -> DeviceRegistry<MockTransport> {
        DeviceRegistry::new(MockTransport::scripted(vec![]), RegistryConfig::default())
    }

    #[derive(Default)]
    struct CountingSink {
        bad_pages: Mutex<Vec<(DeviceIdentity, Vec<u8>)>>,
    }

    impl DiagnosticsSink for CountingSink {
        fn bad_page(&self, identity: &DeviceIdentity, _err: &DecodeError, data: &[u8]) {
            relock(&self.bad_pages).push((*identity, data.to_vec()));
        }
    }

    #[test]
    fn first_page_creates_the_session() {
        let registry = registry();
        let identity = heart_rate_identity();
        registry
            .on_page_received(identity, &[0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x01, 0x3C])
            .unwrap();
        let session = registry.get(&identity).unwrap();
        let session = session.lock().unwrap();
        match &session.profile {
            Profile::HeartRate(state) => assert_eq!(state.computed_heart_rate, 60),
            other => panic!("wrong profile: {:?}", other),
        }
        assert_eq!(registry.snapshot(), vec![identity]);
    }

    #[test]
    fn unrecognized_device_type_still_gets_a_session() {
        let registry = registry();
        let identity = DeviceIdentity::new(7, 99, 1);
        registry
            .on_page_received(identity, &[0x20, 1, 2, 3, 4, 5, 6, 7])
            .unwrap();
        let session = registry.get(&identity).unwrap();
        assert!(matches!(
            session.lock().unwrap().profile,
            Profile::Unknown(_)
        ));
    }

    #[test]
    fn decode_errors_go_to_the_sink_not_the_caller() {
        let sink = Arc::new(CountingSink::default());
        let registry = DeviceRegistry::with_sink(
            MockTransport::scripted(vec![]),
            RegistryConfig::default(),
            Arc::clone(&sink) as Arc<dyn DiagnosticsSink>,
        );
        let identity = heart_rate_identity();
        registry.on_page_received(identity, &[0x00, 0x01]).unwrap();
        let bad = relock(&sink.bad_pages);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].1, vec![0x00, 0x01]);
    }

    #[test]
    fn events_fire_for_change_stale_and_return() {
        let registry = Arc::new(registry());
        let events: Arc<Mutex<Vec<SessionEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);
        registry.set_event_callback(move |_, event| relock(&log).push(event));
        let identity = heart_rate_identity();
        let page = [0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x01, 0x3C];
        registry.on_page_received(identity, &page).unwrap();
        let last_seen = relock(&registry.get(&identity).unwrap())
            .last_seen()
            .unwrap();
        registry.poll_staleness(last_seen + Duration::from_secs(6));
        // A second poll is not a second transition.
        registry.poll_staleness(last_seen + Duration::from_secs(7));
        registry.on_page_received(identity, &page).unwrap();
        assert_eq!(
            *relock(&events),
            vec![
                SessionEvent::StateChanged,
                SessionEvent::WentStale,
                SessionEvent::Returned,
            ]
        );
    }

    #[test]
    fn evict_closes_the_channel() {
        let transport = MockTransport::scripted(vec![]);
        let registry = DeviceRegistry::new(transport, RegistryConfig::default());
        let identity = heart_rate_identity();
        registry
            .on_page_received(identity, &[0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x01, 0x3C])
            .unwrap();
        assert!(registry.evict(&identity));
        assert!(!registry.evict(&identity));
        assert!(registry.get(&identity).is_none());
        assert_eq!(registry.transport.closed_channels().len(), 1);
    }

    #[test]
    fn closed_registry_rejects_everything() {
        let registry = registry();
        let identity = heart_rate_identity();
        registry
            .on_page_received(identity, &[0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x01, 0x3C])
            .unwrap();
        registry.close();
        assert!(registry.get(&identity).is_none());
        assert_eq!(
            registry.on_page_received(identity, &[0x00; 8]),
            Err(RegistryError::AlreadyClosed())
        );
        assert_eq!(
            registry.open(identity).err(),
            Some(RegistryError::AlreadyClosed())
        );
        // Idempotent.
        registry.close();
    }

    #[test]
    fn out_of_channels_surfaces_as_a_transport_error() {
        let transport = MockTransport::with_channel_capacity(1);
        let registry = DeviceRegistry::new(transport, RegistryConfig::default());
        registry.open(DeviceIdentity::new(1, 120, 1)).unwrap();
        assert_eq!(
            registry.open(DeviceIdentity::new(2, 120, 1)).err(),
            Some(RegistryError::Transport(TransportError::OutOfChannels()))
        );
    }

    #[test]
    fn sender_reaches_the_session_channel() {
        let registry = registry();
        let identity = heart_rate_identity();
        registry
            .on_page_received(identity, &[0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x01, 0x3C])
            .unwrap();
        let sender = registry.sender(&identity).unwrap();
        assert_eq!(
            sender.send(&[0x10; 8], &CancelToken::new()),
            AckOutcome::Accepted
        );
        assert_eq!(registry.transport.sent_pages().len(), 1);
        assert!(registry.sender(&DeviceIdentity::new(9, 9, 9)).is_none());
    }
}
