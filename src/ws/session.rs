//! Per-client session state.
//!
//! A [`Session`] is the broker-side handle of one authenticated socket. It
//! owns the sending half of the socket's outbound queue, the patterns the
//! client subscribed to, and the token used to terminate the connection.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{IdPattern, SessionId};
use crate::error::BridgeError;

/// Queue slots kept free for `hello` and the initial payload, which are
/// queued before held events are flushed.
const INITIAL_FRAMES: usize = 2;

/// Patterns one client may hold.
pub const MAX_SUBSCRIPTIONS: usize = 256;

/// Broker-side state of one connected client.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    tx: mpsc::Sender<Utf8Bytes>,
    /// Live events parked until the initial payload is queued. `None` once
    /// the session is open.
    held: Mutex<Option<Vec<Utf8Bytes>>>,
    hold_limit: usize,
    subscriptions: RwLock<Vec<IdPattern>>,
    cancel: CancellationToken,
    connected_at: DateTime<Utc>,
    dropped: AtomicU64,
}

impl Session {
    /// Creates a session writing into `tx`.
    ///
    /// The session starts closed to live events; call [`Session::open`]
    /// after the initial payload has been queued.
    #[must_use]
    pub fn new(tx: mpsc::Sender<Utf8Bytes>) -> Self {
        let hold_limit = tx.max_capacity().saturating_sub(INITIAL_FRAMES);
        Self {
            id: SessionId::new(),
            tx,
            held: Mutex::new(Some(Vec::new())),
            hold_limit,
            subscriptions: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
            connected_at: Utc::now(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the handshake was accepted.
    #[must_use]
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queues a frame directly, bypassing the hold-back buffer.
    ///
    /// Used for replies and the initial payload.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Delivery`] if the queue is full or the socket
    /// writer has gone away.
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), BridgeError> {
        if self.tx.try_send(frame).is_ok() {
            Ok(())
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            Err(BridgeError::Delivery(self.id))
        }
    }

    /// Queues a live event, parking it if the session is not open yet.
    ///
    /// Returns `false` if the event was dropped.
    pub fn push_event(&self, frame: Utf8Bytes) -> bool {
        let mut held = self.held.lock();
        if let Some(buf) = held.as_mut() {
            if buf.len() >= self.hold_limit {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            buf.push(frame);
            return true;
        }
        drop(held);
        self.send(frame).is_ok()
    }

    /// Flushes parked events in arrival order and starts live delivery.
    ///
    /// Returns the number of events actually queued; events that no longer
    /// fit are counted as dropped. Calling it again is a no-op.
    pub fn open(&self) -> usize {
        let mut held = self.held.lock();
        let Some(buf) = held.take() else {
            return 0;
        };
        // Flush while holding the lock so concurrent events queue behind.
        buf.into_iter()
            .map(|frame| self.send(frame))
            .filter(Result::is_ok)
            .count()
    }

    /// Returns `true` once [`Session::open`] has run.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.held.lock().is_none()
    }

    /// Adds a pattern to this client's subscriptions.
    ///
    /// Returns `false` if the pattern is new and the session already holds
    /// [`MAX_SUBSCRIPTIONS`] patterns.
    pub fn subscribe(&self, pattern: IdPattern) -> bool {
        let mut subs = self.subscriptions.write();
        if subs.iter().any(|p| p.as_str() == pattern.as_str()) {
            return true;
        }
        if subs.len() >= MAX_SUBSCRIPTIONS {
            return false;
        }
        subs.push(pattern);
        true
    }

    /// Returns `true` if `pattern` is already subscribed, or there is room
    /// for it.
    #[must_use]
    pub fn can_subscribe(&self, pattern: &str) -> bool {
        let subs = self.subscriptions.read();
        subs.len() < MAX_SUBSCRIPTIONS || subs.iter().any(|p| p.as_str() == pattern)
    }

    /// Returns `true` if `id` matches any subscribed pattern.
    #[must_use]
    pub fn is_subscribed(&self, id: &str) -> bool {
        self.subscriptions.read().iter().any(|p| p.matches(id))
    }

    /// Subscribed pattern strings, in subscription order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .read()
            .iter()
            .map(|p| p.as_str().to_string())
            .collect()
    }

    /// Forcibly ends the connection. The socket is dropped without a close
    /// handshake.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once [`Session::terminate`] has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled on termination, for the connection tasks to watch.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Frames dropped because the queue was full or closed.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn make_session(capacity: usize) -> (Session, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Session::new(tx), rx)
    }

    fn frame(s: &str) -> Utf8Bytes {
        Utf8Bytes::from(s.to_string())
    }

    #[test]
    fn events_are_held_until_open() {
        let (session, mut rx) = make_session(8);
        assert!(!session.is_open());
        assert!(session.push_event(frame("e1")));

        let Ok(()) = session.send(frame("hello")) else {
            panic!("send succeeds");
        };
        assert!(session.push_event(frame("e2")));
        assert_eq!(session.open(), 2);
        assert!(session.is_open());
        assert!(session.push_event(frame("e3")));

        let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|f| f.as_str().to_string())
            .collect();
        assert_eq!(received, vec!["hello", "e1", "e2", "e3"]);
    }

    #[test]
    fn open_twice_is_noop() {
        let (session, _rx) = make_session(4);
        assert_eq!(session.open(), 0);
        assert_eq!(session.open(), 0);
    }

    #[test]
    fn full_queue_counts_drops() {
        let (session, _rx) = make_session(1);
        session.open();
        assert!(session.push_event(frame("a")));
        assert!(!session.push_event(frame("b")));
        assert!(matches!(
            session.send(frame("c")),
            Err(BridgeError::Delivery(_))
        ));
        assert_eq!(session.dropped_count(), 2);
    }

    #[test]
    fn hold_buffer_is_bounded() {
        let (session, _rx) = make_session(4);
        assert!(session.push_event(frame("a")));
        assert!(session.push_event(frame("b")));
        assert!(!session.push_event(frame("c")));
        assert_eq!(session.dropped_count(), 1);
    }

    #[test]
    fn held_events_leave_room_for_initial_frames() {
        let (session, mut rx) = make_session(4);
        let accepted = (0..4)
            .filter(|i| session.push_event(frame(&format!("e{i}"))))
            .count();
        assert_eq!(accepted, 2);

        let Ok(()) = session.send(frame("hello")) else {
            panic!("hello fits");
        };
        let Ok(()) = session.send(frame("snapshot")) else {
            panic!("snapshot fits");
        };
        assert_eq!(session.open(), 2);

        let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|f| f.as_str().to_string())
            .collect();
        assert_eq!(received, vec!["hello", "snapshot", "e0", "e1"]);
        assert_eq!(session.dropped_count(), 2);
    }

    #[test]
    fn open_counts_only_queued_events() {
        let (session, _rx) = make_session(3);
        assert!(session.push_event(frame("e0")));
        for extra in ["hello", "snapshot", "reply"] {
            let Ok(()) = session.send(frame(extra)) else {
                panic!("{extra} fits");
            };
        }
        assert_eq!(session.open(), 0);
        assert_eq!(session.dropped_count(), 1);
    }

    #[test]
    fn closed_receiver_fails_safely() {
        let (session, rx) = make_session(4);
        drop(rx);
        session.open();
        assert!(!session.push_event(frame("x")));
        assert!(session.send(frame("y")).is_err());
    }

    #[test]
    fn subscriptions_match_and_dedupe() {
        let (session, _rx) = make_session(4);
        assert!(!session.is_subscribed("light.kitchen"));
        for _ in 0..2 {
            let Ok(p) = IdPattern::compile("light.*") else {
                panic!("compiles");
            };
            session.subscribe(p);
        }
        assert!(session.is_subscribed("light.kitchen"));
        assert!(!session.is_subscribed("sensor.temp"));
        assert_eq!(session.subscriptions(), vec!["light.*".to_string()]);
    }

    #[test]
    fn subscriptions_are_capped() {
        let (session, _rx) = make_session(4);
        for i in 0..MAX_SUBSCRIPTIONS {
            let Ok(p) = IdPattern::compile(&format!("dev.{i}.*")) else {
                panic!("compiles");
            };
            assert!(session.subscribe(p));
        }
        assert!(!session.can_subscribe("dev.extra.*"));
        assert!(session.can_subscribe("dev.0.*"));

        let Ok(extra) = IdPattern::compile("dev.extra.*") else {
            panic!("compiles");
        };
        assert!(!session.subscribe(extra));
        let Ok(again) = IdPattern::compile("dev.0.*") else {
            panic!("compiles");
        };
        assert!(session.subscribe(again));
        assert_eq!(session.subscriptions().len(), MAX_SUBSCRIPTIONS);
        assert!(!session.is_subscribed("dev.extra.x"));
    }

    #[test]
    fn terminate_cancels_token() {
        let (session, _rx) = make_session(4);
        let token = session.cancel_token();
        assert!(!session.is_terminated());
        session.terminate();
        assert!(session.is_terminated());
        assert!(token.is_cancelled());
    }
}
