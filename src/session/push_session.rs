//! Per-connection push session.
//!
//! A [`Session`] is built from the upgrade request before the transport is
//! wired, then runs [`Session::listen`] for the life of the connection.
//! [`Session::stop`] is the single end-of-life transition: it cancels the
//! lifetime token, closes the close signal and calls the unregister
//! callback, exactly once however many callers race on it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

use super::transport::{Frame, Transport};
use super::upgrade::{Parameters, TOKEN_PARAMETER, TlsInfo, UpgradeRequest};
use crate::config::GatewayConfig;
use crate::domain::{Claims, PushEvent, PushFilter, SessionId};
use crate::error::GatewayError;
use crate::ws::messages::WsMessage;

/// Callback removing a session from its owning registry.
///
/// Called exactly once, while the session's close lock is held: it must
/// not call [`Session::stop`] or [`Session::closed`] on the same session.
pub type UnregisterFn = Arc<dyn Fn(&Session) + Send + Sync>;

type Metadata = Arc<dyn Any + Send + Sync>;

/// Why [`Session::listen`] returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection.
    ClientClosed,
    /// The session was stopped locally.
    Stopped,
}

/// Receives every text message read by [`Session::listen`].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message. A returned string is sent back to the client.
    async fn on_message(&self, session: &Session, text: &str) -> Option<String>;
}

struct Io {
    transport: Option<Box<dyn Transport>>,
    outbox: Option<mpsc::Receiver<String>>,
}

/// One live push connection.
pub struct Session {
    id: SessionId,
    claims: RwLock<Claims>,
    parameters: Parameters,
    headers: Arc<HeaderMap>,
    remote_addr: RwLock<String>,
    tls: RwLock<Option<Arc<TlsInfo>>>,
    metadata: RwLock<Option<Metadata>>,
    filter: RwLock<Option<PushFilter>>,
    io: Mutex<Io>,
    outbox: mpsc::Sender<String>,
    config: Arc<GatewayConfig>,
    span: Span,
    created_at: DateTime<Utc>,
    stale_before: Option<DateTime<Utc>>,
    lifetime: CancellationToken,
    close_signal: Mutex<Option<watch::Sender<()>>>,
    closed: AtomicBool,
    unregister: UnregisterFn,
}

impl Session {
    /// Builds a session from an upgrade request.
    ///
    /// The session span is opened as a child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::IdentifierGeneration`] if no identifier
    /// could be drawn. No session exists in that case.
    pub fn new(
        request: UpgradeRequest,
        config: Arc<GatewayConfig>,
        unregister: UnregisterFn,
        parent: &Span,
    ) -> Result<Self, GatewayError> {
        let id = SessionId::generate()?;
        let (headers, parameters, remote_addr, tls, claims) = request.into_parts();

        let span = tracing::info_span!(
            parent: parent,
            "push_session",
            session_id = %id,
            remote_addr = %remote_addr
        );

        let (outbox, outbox_rx) = mpsc::channel(config.outbox_capacity.max(1));
        let (close_signal, _) = watch::channel(());
        let created_at = Utc::now();
        let stale_before = i64::try_from(config.clock_skew_tolerance_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|tolerance| created_at.checked_sub_signed(tolerance));

        Ok(Self {
            id,
            claims: RwLock::new(Claims::new(claims)),
            parameters,
            headers,
            remote_addr: RwLock::new(remote_addr),
            tls: RwLock::new(tls),
            metadata: RwLock::new(None),
            filter: RwLock::new(None),
            io: Mutex::new(Io {
                transport: None,
                outbox: Some(outbox_rx),
            }),
            outbox,
            config,
            span,
            created_at,
            stale_before,
            lifetime: CancellationToken::new(),
            close_signal: Mutex::new(Some(close_signal)),
            closed: AtomicBool::new(false),
            unregister,
        })
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn identifier(&self) -> SessionId {
        self.id
    }

    /// Returns the claim entries in their original order.
    #[must_use]
    pub fn claims(&self) -> Vec<String> {
        self.claims.read().entries().to_vec()
    }

    /// Returns the claims as a key/value map.
    #[must_use]
    pub fn claims_map(&self) -> std::collections::HashMap<String, String> {
        self.claims.read().map().clone()
    }

    /// Replaces the claims. Entries and map change together.
    pub fn set_claims(&self, entries: Vec<String>) {
        *self.claims.write() = Claims::new(entries);
    }

    /// Returns the raw credential from the reserved token parameter.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.parameter(TOKEN_PARAMETER)
    }

    /// Returns the first value of a query parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Returns every query parameter of the upgrade request.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Returns the headers of the upgrade request.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the client address.
    #[must_use]
    pub fn remote_address(&self) -> String {
        self.remote_addr.read().clone()
    }

    /// Replaces the client address, e.g. after proxy unwrapping.
    pub fn set_remote_address(&self, addr: impl Into<String>) {
        *self.remote_addr.write() = addr.into();
    }

    /// Returns the TLS metadata of the connection, if any.
    #[must_use]
    pub fn tls_connection_state(&self) -> Option<Arc<TlsInfo>> {
        self.tls.read().clone()
    }

    /// Replaces the TLS metadata.
    pub fn set_tls_connection_state(&self, state: Option<TlsInfo>) {
        *self.tls.write() = state.map(Arc::new);
    }

    /// Returns the application metadata if it is a `T`.
    #[must_use]
    pub fn metadata<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = self.metadata.read().clone()?;
        value.downcast::<T>().ok()
    }

    /// Stores application metadata, replacing any previous value.
    pub fn set_metadata<T: Any + Send + Sync>(&self, value: T) {
        *self.metadata.write() = Some(Arc::new(value));
    }

    /// Returns the current push filter.
    #[must_use]
    pub fn filter(&self) -> Option<PushFilter> {
        self.filter.read().clone()
    }

    /// Replaces the push filter. `None` lets every event through.
    pub fn set_filter(&self, filter: Option<PushFilter>) {
        *self.filter.write() = filter;
    }

    /// Attaches the transport [`Session::listen`] reads from.
    pub fn set_transport(&self, transport: Box<dyn Transport>) {
        self.io.lock().transport = Some(transport);
    }

    /// Returns the session span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Opens a new span for a sub-operation, child of the session span.
    #[must_use]
    pub fn new_child_span(&self, operation: &str) -> Span {
        tracing::info_span!(
            parent: &self.span,
            "session_operation",
            operation = %operation,
            session_id = %self.id
        )
    }

    /// Returns the configuration the session was built with.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Returns when the session was built.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the lifetime token. It is cancelled when the session stops.
    #[must_use]
    pub fn context(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    /// Returns `true` once [`Session::stop`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Completes once the session is closed.
    pub async fn closed(&self) {
        let receiver = self.close_signal.lock().as_ref().map(watch::Sender::subscribe);
        if let Some(mut receiver) = receiver {
            while receiver.changed().await.is_ok() {}
        }
    }

    /// Queues an event for delivery to the client.
    ///
    /// Returns `false` if the event was not queued: it predates the
    /// session by more than the configured clock skew tolerance, the
    /// session filter rejects it, the session is closed, or the outbox is
    /// full.
    pub fn push(&self, event: &PushEvent) -> bool {
        if self.is_closed() || self.is_stale(event) {
            return false;
        }
        if let Some(filter) = self.filter.read().as_ref()
            && filter.is_filtered_out(event)
        {
            return false;
        }
        let json = match serde_json::to_string(&WsMessage::event(event)) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "failed to serialize event");
                return false;
            }
        };
        match self.outbox.try_send(json) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(parent: &self.span, event_id = %event.id, "outbox full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    fn is_stale(&self, event: &PushEvent) -> bool {
        self.stale_before.is_some_and(|cutoff| event.timestamp < cutoff)
    }

    /// Closes the session.
    ///
    /// The first caller cancels the lifetime token, closes the close signal
    /// and calls the unregister callback. Every other caller, concurrent or
    /// later, returns `false` without side effects once that transition has
    /// completed.
    pub fn stop(&self) -> bool {
        let mut signal = self.close_signal.lock();
        let Some(sender) = signal.take() else {
            return false;
        };
        self.closed.store(true, Ordering::Release);
        self.lifetime.cancel();
        drop(sender);
        (self.unregister)(self);
        tracing::debug!(parent: &self.span, "session stopped");
        true
    }

    /// Runs the receive loop until the connection ends.
    ///
    /// Reads frames from the transport and hands text to `handler`, and
    /// writes queued events back. Always ends with [`Session::stop`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::TransportMissing`] if no transport is
    /// attached or the loop already ran, and [`GatewayError::Transport`]
    /// when the connection failed rather than closed.
    pub async fn listen(&self, handler: &dyn MessageHandler) -> Result<CloseReason, GatewayError> {
        let (mut transport, mut outbox) = {
            let mut io = self.io.lock();
            match (io.transport.take(), io.outbox.take()) {
                (Some(transport), Some(outbox)) => (transport, outbox),
                (transport, outbox) => {
                    io.transport = transport;
                    io.outbox = outbox;
                    return Err(GatewayError::TransportMissing);
                }
            }
        };

        let result = async {
            loop {
                tokio::select! {
                    biased;
                    () = self.lifetime.cancelled() => break Ok(CloseReason::Stopped),
                    frame = transport.recv() => match frame {
                        Some(Ok(Frame::Text(text))) => {
                            match self.dispatch(handler, transport.as_mut(), &text).await {
                                Ok(true) => {}
                                Ok(false) => break Ok(CloseReason::Stopped),
                                Err(e) => break Err(e),
                            }
                        }
                        Some(Ok(Frame::Binary(data))) => match String::from_utf8(data) {
                            Ok(text) => match self.dispatch(handler, transport.as_mut(), &text).await {
                                Ok(true) => {}
                                Ok(false) => break Ok(CloseReason::Stopped),
                                Err(e) => break Err(e),
                            },
                            Err(_) => tracing::debug!("ignoring non utf-8 binary frame"),
                        },
                        Some(Ok(Frame::Control)) => {}
                        Some(Ok(Frame::Close)) | None => break Ok(CloseReason::ClientClosed),
                        Some(Err(e)) => break Err(e),
                    },
                    Some(message) = outbox.recv() => {
                        if let Err(e) = transport.send(Frame::Text(message)).await {
                            break Err(e);
                        }
                    }
                }
            }
        }
        .instrument(self.span.clone())
        .await;

        transport.close().await;
        self.stop();

        match &result {
            Ok(reason) => tracing::debug!(parent: &self.span, ?reason, "listen finished"),
            Err(e) => tracing::warn!(parent: &self.span, error = %e, "listen aborted"),
        }
        result
    }

    /// Runs `handler` on one message and sends its reply. Returns
    /// `Ok(false)` when the session is stopped before that completes.
    async fn dispatch(
        &self,
        handler: &dyn MessageHandler,
        transport: &mut dyn Transport,
        text: &str,
    ) -> Result<bool, GatewayError> {
        let handled = async {
            match handler.on_message(self, text).await {
                Some(reply) => transport.send(Frame::Text(reply)).await,
                None => Ok(()),
            }
        };
        tokio::select! {
            biased;
            () = self.lifetime.cancelled() => Ok(false),
            result = handled => result.map(|()| true),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<pushsession id:{} parameters:{:?}>",
            self.id, self.parameters
        )
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &*self.remote_addr.read())
            .field("created_at", &self.created_at)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use axum::http::{HeaderValue, Uri};

    use super::*;
    use crate::session::transport::memory;

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn on_message(&self, _session: &Session, text: &str) -> Option<String> {
            Some(format!("echo:{text}"))
        }
    }

    fn request(uri: &'static str) -> UpgradeRequest {
        let mut headers = HeaderMap::new();
        headers.insert("h1", HeaderValue::from_static("a"));
        UpgradeRequest::new(Arc::new(headers), Uri::from_static(uri), "1.2.3.4")
    }

    fn counting_session(uri: &'static str) -> (Arc<Session>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let unregister: UnregisterFn = Arc::new(move |_: &Session| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let Ok(session) = Session::new(
            request(uri),
            Arc::new(GatewayConfig::default()),
            unregister,
            &Span::none(),
        ) else {
            panic!("session construction failed");
        };
        (Arc::new(session), calls)
    }

    #[test]
    fn new_session_is_initialized_from_request() {
        let req = request("http://push.local/events?a=b");
        let headers = Arc::clone(req.headers());
        let Ok(session) = Session::new(
            req,
            Arc::new(GatewayConfig::default()),
            Arc::new(|_: &Session| {}),
            &Span::none(),
        ) else {
            panic!("session construction failed");
        };

        assert!(!session.identifier().to_string().is_empty());
        assert!(session.claims().is_empty());
        assert!(session.claims_map().is_empty());
        assert_eq!(session.parameters().len(), 1);
        assert_eq!(session.parameters().get("a"), Some(&vec!["b".to_string()]));
        assert!(std::ptr::eq(session.headers(), &*headers));
        assert_eq!(session.remote_address(), "1.2.3.4");
        assert!(session.tls_connection_state().is_none());
        assert!(!session.is_closed());
        assert!(!session.context().is_cancelled());
    }

    #[test]
    fn request_tls_and_claims_are_captured() {
        let tls = TlsInfo {
            protocol_version: "TLSv1.3".into(),
            cipher_suite: "TLS_AES_128_GCM_SHA256".into(),
            server_name: None,
        };
        let req = request("/events")
            .with_tls(tls.clone())
            .with_claims(vec!["org=acme".into()]);
        let Ok(session) = Session::new(
            req,
            Arc::new(GatewayConfig::default()),
            Arc::new(|_: &Session| {}),
            &Span::none(),
        ) else {
            panic!("session construction failed");
        };
        assert_eq!(session.tls_connection_state().as_deref(), Some(&tls));
        assert_eq!(session.claims_map().get("org").map(String::as_str), Some("acme"));
    }

    #[test]
    fn identifiers_are_unique() {
        let (a, _) = counting_session("/events");
        let (b, _) = counting_session("/events");
        assert_ne!(a.identifier(), b.identifier());
    }

    #[test]
    fn set_claims_rebuilds_map() {
        let (session, _) = counting_session("/events");
        session.set_claims(vec!["a=a".into(), "b=b".into()]);
        assert_eq!(session.claims(), ["a=a", "b=b"]);
        let map = session.claims_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a").map(String::as_str), Some("a"));
        assert_eq!(map.get("b").map(String::as_str), Some("b"));

        session.set_claims(vec!["c=c".into()]);
        assert_eq!(session.claims_map().len(), 1);
    }

    #[test]
    fn token_and_parameters() {
        let (session, _) = counting_session("http://push.local/events?a=b&token=tok123");
        assert_eq!(session.token(), Some("tok123"));
        assert_eq!(session.parameter("a"), Some("b"));
        assert_eq!(session.parameter("missing"), None);

        let (anonymous, _) = counting_session("http://push.local/events?a=b");
        assert_eq!(anonymous.token(), None);
    }

    #[test]
    fn metadata_is_last_write_wins() {
        let (session, _) = counting_session("/events");
        assert!(session.metadata::<&'static str>().is_none());
        session.set_metadata("hi");
        assert_eq!(session.metadata::<&'static str>().as_deref(), Some(&"hi"));
        session.set_metadata(42_u32);
        assert!(session.metadata::<&'static str>().is_none());
        assert_eq!(session.metadata::<u32>().as_deref(), Some(&42));
    }

    #[test]
    fn remote_address_and_tls_can_be_corrected() {
        let (session, _) = counting_session("/events");
        session.set_remote_address("a.b.c.d");
        assert_eq!(session.remote_address(), "a.b.c.d");

        let tls = TlsInfo {
            protocol_version: "TLSv1.2".into(),
            cipher_suite: "ECDHE-RSA-AES128-GCM-SHA256".into(),
            server_name: Some("push.local".into()),
        };
        session.set_tls_connection_state(Some(tls.clone()));
        assert_eq!(session.tls_connection_state().as_deref(), Some(&tls));
    }

    #[test]
    fn child_spans_do_not_replace_session_span() {
        let (session, _) = counting_session("/events");
        let before = session.span().id();
        let _a = session.new_child_span("a");
        let _b = session.new_child_span("b");
        assert_eq!(session.span().id(), before);
    }

    #[test]
    fn display_names_the_session() {
        let (session, _) = counting_session("/events?a=b");
        let s = session.to_string();
        assert!(s.starts_with("<pushsession id:"));
        assert!(s.contains(&session.identifier().to_string()));
    }

    #[test]
    fn stop_unregisters_once() {
        let (session, calls) = counting_session("/events");
        assert!(session.stop());
        assert!(session.is_closed());
        assert!(session.context().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!session.stop());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_stop_unregisters_exactly_once() {
        for _ in 0..50 {
            let (session, calls) = counting_session("/events");
            let callers = 16;
            let barrier = std::sync::Barrier::new(callers);
            let winners = AtomicUsize::new(0);

            std::thread::scope(|scope| {
                for _ in 0..callers {
                    scope.spawn(|| {
                        barrier.wait();
                        if session.stop() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                        assert!(session.is_closed());
                        assert_eq!(calls.load(Ordering::SeqCst), 1);
                    });
                }
            });

            assert_eq!(winners.load(Ordering::SeqCst), 1);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn closed_completes_after_stop() {
        let (session, _) = counting_session("/events");
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };
        session.stop();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
        // Already closed: returns immediately.
        session.closed().await;
    }

    #[tokio::test]
    async fn listen_without_transport_fails() {
        let (session, calls) = counting_session("/events");
        let result = session.listen(&Echo).await;
        assert!(matches!(result, Err(GatewayError::TransportMissing)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listen_replies_through_handler() {
        let (session, calls) = counting_session("/events");
        let (transport, mut peer) = memory::pair();
        session.set_transport(Box::new(transport));

        let task = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(&Echo).await })
        };

        peer.send_text("hello");
        let reply = tokio::time::timeout(Duration::from_secs(1), peer.from_session.recv()).await;
        assert_eq!(reply.ok().flatten(), Some(Frame::Text("echo:hello".into())));

        let _ = peer.to_session.send(Ok(Frame::Close));
        let Ok(Ok(result)) = tokio::time::timeout(Duration::from_secs(1), task).await else {
            panic!("listen did not finish");
        };
        assert!(matches!(result, Ok(CloseReason::ClientClosed)));
        assert!(session.is_closed());
        assert!(peer.transport_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listen_ends_promptly_after_stop() {
        let (session, calls) = counting_session("/events");
        let (transport, _peer) = memory::pair();
        session.set_transport(Box::new(transport));

        let task = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(&Echo).await })
        };
        tokio::task::yield_now().await;

        session.stop();
        let Ok(Ok(result)) = tokio::time::timeout(Duration::from_secs(1), task).await else {
            panic!("listen did not observe cancellation");
        };
        assert!(matches!(result, Ok(CloseReason::Stopped)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Stuck;

    #[async_trait]
    impl MessageHandler for Stuck {
        async fn on_message(&self, _session: &Session, _text: &str) -> Option<String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stop_interrupts_a_handler_that_never_returns() {
        let (session, calls) = counting_session("/events");
        let (transport, peer) = memory::pair();
        session.set_transport(Box::new(transport));

        let task = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(&Stuck).await })
        };
        peer.send_text("hi");
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.stop();
        let Ok(Ok(result)) = tokio::time::timeout(Duration::from_secs(1), task).await else {
            panic!("listen kept waiting on the handler after stop");
        };
        assert!(matches!(result, Ok(CloseReason::Stopped)));
        assert!(peer.transport_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_reported_and_stops() {
        let (session, calls) = counting_session("/events");
        let (transport, peer) = memory::pair();
        session.set_transport(Box::new(transport));

        peer.fail("connection reset");
        let result = session.listen(&Echo).await;
        assert!(matches!(result, Err(GatewayError::Transport(_))));
        assert!(session.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn peer_disappearing_is_a_clean_close() {
        let (session, _) = counting_session("/events");
        let (transport, peer) = memory::pair();
        session.set_transport(Box::new(transport));
        drop(peer);

        let result = session.listen(&Echo).await;
        assert!(matches!(result, Ok(CloseReason::ClientClosed)));
    }

    #[tokio::test]
    async fn pushed_events_reach_the_transport() {
        let (session, _) = counting_session("/events");
        let (transport, mut peer) = memory::pair();
        session.set_transport(Box::new(transport));

        let task = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.listen(&Echo).await })
        };

        let event = PushEvent::directed(session.identifier(), serde_json::json!({"n": 1}));
        assert!(session.push(&event));

        let frame = tokio::time::timeout(Duration::from_secs(1), peer.from_session.recv()).await;
        let Ok(Some(Frame::Text(text))) = frame else {
            panic!("expected pushed event");
        };
        let Ok(message) = serde_json::from_str::<WsMessage>(&text) else {
            panic!("event envelope did not decode");
        };
        assert_eq!(message.id, event.id.to_string());
        assert_eq!(message.payload["n"], 1);

        session.stop();
        let _ = task.await;
    }

    #[test]
    fn push_skips_old_events_and_closed_sessions() {
        let (session, _) = counting_session("/events");
        let mut stale = PushEvent::broadcast(serde_json::Value::Null);
        stale.timestamp = session.created_at() - TimeDelta::seconds(5);
        assert!(!session.push(&stale));

        session.stop();
        assert!(!session.push(&PushEvent::broadcast(serde_json::Value::Null)));
    }

    #[test]
    fn push_tolerates_publisher_clock_skew() {
        let (session, _) = counting_session("/events");
        let mut skewed = PushEvent::broadcast(serde_json::Value::Null);
        skewed.timestamp = session.created_at() - TimeDelta::milliseconds(500);
        assert!(session.push(&skewed));

        let config = GatewayConfig {
            clock_skew_tolerance_ms: 0,
            ..GatewayConfig::default()
        };
        let Ok(strict) = Session::new(
            request("/events"),
            Arc::new(config),
            Arc::new(|_: &Session| {}),
            &Span::none(),
        ) else {
            panic!("session construction failed");
        };
        skewed.timestamp = strict.created_at() - TimeDelta::milliseconds(500);
        assert!(!strict.push(&skewed));
    }

    #[test]
    fn push_honours_the_session_filter() {
        let (session, _) = counting_session("/events");
        assert!(session.filter().is_none());
        session.set_filter(Some(PushFilter::new(["chat"])));

        let chat = PushEvent::broadcast(serde_json::Value::Null).with_kind("chat");
        let presence = PushEvent::broadcast(serde_json::Value::Null).with_kind("presence");
        assert!(session.push(&chat));
        assert!(!session.push(&presence));
        assert!(!session.push(&PushEvent::broadcast(serde_json::Value::Null)));

        session.set_filter(None);
        assert!(session.push(&presence));
    }

    #[test]
    fn push_drops_when_outbox_is_full() {
        let config = GatewayConfig {
            outbox_capacity: 1,
            ..GatewayConfig::default()
        };
        let Ok(session) = Session::new(
            request("/events"),
            Arc::new(config),
            Arc::new(|_: &Session| {}),
            &Span::none(),
        ) else {
            panic!("session construction failed");
        };
        assert!(session.push(&PushEvent::broadcast(serde_json::Value::Null)));
        assert!(!session.push(&PushEvent::broadcast(serde_json::Value::Null)));
    }
}
