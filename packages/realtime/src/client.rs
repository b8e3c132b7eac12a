//! Dashboard-side realtime connection.
//!
//! [`RealtimeClient::connect`] spawns a background task that walks the
//! configured transports in order until one opens, then pumps events into
//! a [`RealtimeListener`]. When the session drops the task reconnects with
//! exponential backoff until [`ReconnectPolicy::max_attempts`] consecutive
//! failures. [`RealtimeConnection::disconnect`] stops everything and
//! releases the listener; it is safe to call more than once.

use std::sync::Arc;
use std::time::Duration;

use desa_sos_emergency_models::EmergencyEvent;
use futures::StreamExt as _;
use reqwest::{StatusCode, header};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::sse::SseDecoder;
use crate::{
    EVENT_STREAM_PATH, LONG_POLL_PATH, PollBatch, RealtimeError, SESSION_COOKIE, Transport,
};

/// Why a live session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// [`RealtimeConnection::disconnect`] was called.
    ClientDisconnect,
    /// The server closed the stream.
    ServerClosed,
    /// The transport failed mid-session.
    TransportError(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientDisconnect => f.write_str("client disconnect"),
            Self::ServerClosed => f.write_str("server closed the connection"),
            Self::TransportError(message) => write!(f, "transport error: {message}"),
        }
    }
}

/// Connectivity and event hooks.
///
/// Hooks run on the connection task and should return quickly.
pub trait RealtimeListener: Send + Sync {
    /// A transport opened.
    fn on_connect(&self, _transport: Transport) {}

    /// A live session ended.
    fn on_disconnect(&self, _reason: &DisconnectReason) {}

    /// No transport could be opened.
    fn on_connect_error(&self, _error: &RealtimeError) {}

    /// An event arrived.
    fn on_event(&self, event: EmergencyEvent);
}

/// Everything a [`RealtimeListener`] can observe, as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeSignal {
    /// See [`RealtimeListener::on_connect`].
    Connected(Transport),
    /// See [`RealtimeListener::on_disconnect`].
    Disconnected(DisconnectReason),
    /// See [`RealtimeListener::on_connect_error`]; carries the rendered
    /// error.
    ConnectError(String),
    /// See [`RealtimeListener::on_event`].
    Event(EmergencyEvent),
}

/// Listener that forwards every hook into a channel, for consumers that
/// own their state on a single task.
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<RealtimeSignal>,
}

impl ChannelListener {
    /// Creates the listener and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RealtimeSignal>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, signal: RealtimeSignal) {
        if self.sender.send(signal).is_err() {
            log::debug!("Realtime signal dropped, receiver is gone");
        }
    }
}

impl RealtimeListener for ChannelListener {
    fn on_connect(&self, transport: Transport) {
        self.forward(RealtimeSignal::Connected(transport));
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        self.forward(RealtimeSignal::Disconnected(reason.clone()));
    }

    fn on_connect_error(&self, error: &RealtimeError) {
        self.forward(RealtimeSignal::ConnectError(error.to_string()));
    }

    fn on_event(&self, event: EmergencyEvent) {
        self.forward(RealtimeSignal::Event(event));
    }
}

/// Reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each failure.
    pub base_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Settings for a [`RealtimeClient`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Backend origin, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Session token sent as the `session` cookie.
    pub session: Option<String>,
    /// Transports to try, in order.
    pub transports: Vec<Transport>,
    /// Backoff between reconnect attempts.
    pub reconnect: ReconnectPolicy,
    /// How long one long-poll request may wait for events.
    pub poll_wait: Duration,
}

impl RealtimeConfig {
    /// Default settings for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, session: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            session,
            transports: Transport::all().to_vec(),
            reconnect: ReconnectPolicy::default(),
            poll_wait: Duration::from_secs(25),
        }
    }
}

/// Opens realtime connections to the emergency backend.
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    config: Arc<RealtimeConfig>,
    http: reqwest::Client,
}

impl RealtimeClient {
    /// Creates a client with its own HTTP connection pool.
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }

    /// Starts connecting in the background. Must be called from within a
    /// tokio runtime.
    #[must_use]
    pub fn connect(&self, listener: Arc<dyn RealtimeListener>) -> RealtimeConnection {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            config: Arc::clone(&self.config),
            http: self.http.clone(),
            listener: Arc::clone(&listener),
            shutdown: shutdown_rx,
            poll_cursor: None,
        };
        let task = tokio::spawn(worker.run());

        RealtimeConnection {
            shutdown,
            task: Some(task),
            listener: Some(listener),
        }
    }
}

/// Handle to a running realtime connection.
///
/// Dropping the handle disconnects.
pub struct RealtimeConnection {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    listener: Option<Arc<dyn RealtimeListener>>,
}

impl RealtimeConnection {
    /// Stops the connection, reports [`DisconnectReason::ClientDisconnect`]
    /// once and releases the listener. Later calls do nothing.
    pub fn disconnect(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = self.shutdown.send(true);
        task.abort();

        if let Some(listener) = self.listener.take() {
            listener.on_disconnect(&DisconnectReason::ClientDisconnect);
        }
        log::debug!("Realtime connection closed by client");
    }

    /// Whether the background task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct Worker {
    config: Arc<RealtimeConfig>,
    http: reqwest::Client,
    listener: Arc<dyn RealtimeListener>,
    shutdown: watch::Receiver<bool>,
    poll_cursor: Option<u64>,
}

/// Outcome of one attempt at a transport.
enum Session {
    /// The transport never opened.
    Failed(RealtimeError),
    /// The transport opened and later ended.
    Ended(DisconnectReason),
}

impl Worker {
    async fn run(mut self) {
        let mut failures = 0u32;

        loop {
            if *self.shutdown.borrow() {
                return;
            }

            let mut last_error = None;
            let mut was_live = false;

            for transport in self.config.transports.clone() {
                match self.session(transport).await {
                    Session::Ended(DisconnectReason::ClientDisconnect) => return,
                    Session::Ended(reason) => {
                        log::info!("Realtime {transport} session ended: {reason}");
                        self.listener.on_disconnect(&reason);
                        was_live = true;
                        break;
                    }
                    Session::Failed(e) if e.is_fatal() => {
                        log::warn!("Realtime {transport} rejected: {e}");
                        self.listener.on_connect_error(&e);
                        return;
                    }
                    Session::Failed(e) => {
                        log::warn!("Realtime {transport} failed to open: {e}");
                        last_error = Some(e);
                    }
                }
            }

            if was_live {
                failures = 0;
            } else {
                if let Some(e) = &last_error {
                    self.listener.on_connect_error(e);
                }
                failures += 1;
                if failures >= self.config.reconnect.max_attempts {
                    log::error!("Realtime channel gave up after {failures} failed attempt(s)");
                    return;
                }
            }

            let delay = self.config.reconnect.delay_for(failures);
            log::debug!("Realtime reconnect in {delay:?}");
            tokio::select! {
                _ = self.shutdown.changed() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let builder = self.http.get(url);
        match &self.config.session {
            Some(token) => builder.header(header::COOKIE, format!("{SESSION_COOKIE}={token}")),
            None => builder,
        }
    }

    async fn session(&mut self, transport: Transport) -> Session {
        match transport {
            Transport::EventStream => self.event_stream().await,
            Transport::LongPoll => self.long_poll().await,
        }
    }

    async fn event_stream(&mut self) -> Session {
        let response = match self
            .request(EVENT_STREAM_PATH)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Session::Failed(e.into()),
        };
        if let Err(e) = check_status(response.status()) {
            return Session::Failed(e);
        }

        self.listener.on_connect(Transport::EventStream);
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    return Session::Ended(DisconnectReason::ClientDisconnect);
                }
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        let frames = match decoder.push(&bytes) {
                            Ok(frames) => frames,
                            Err(e) => {
                                return Session::Ended(DisconnectReason::TransportError(
                                    e.to_string(),
                                ));
                            }
                        };
                        for frame in frames {
                            match frame.to_event() {
                                Ok(event) => self.listener.on_event(event),
                                Err(e) => log::warn!("Ignoring undecodable realtime frame: {e}"),
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Session::Ended(DisconnectReason::TransportError(e.to_string()));
                    }
                    None => return Session::Ended(DisconnectReason::ServerClosed),
                },
            }
        }
    }

    async fn poll_once(
        &self,
        wait: Duration,
        since: Option<u64>,
    ) -> Result<PollBatch, RealtimeError> {
        let mut query = vec![("wait_secs", wait.as_secs())];
        if let Some(since) = since {
            query.push(("since", since));
        }
        let response = self
            .request(LONG_POLL_PATH)
            .query(&query)
            .timeout(wait + Duration::from_secs(10))
            .send()
            .await?;
        check_status(response.status())?;
        Ok(response.json().await?)
    }

    fn deliver(&mut self, batch: PollBatch) {
        self.poll_cursor = Some(batch.cursor);
        for event in batch.events {
            self.listener.on_event(event);
        }
    }

    /// The cursor survives reconnects, so a poll session that drops resumes
    /// where it left off.
    async fn long_poll(&mut self) -> Session {
        let handshake = match self.poll_once(Duration::ZERO, self.poll_cursor).await {
            Ok(batch) => batch,
            Err(e) => return Session::Failed(e),
        };
        self.listener.on_connect(Transport::LongPoll);
        self.deliver(handshake);

        let mut shutdown = self.shutdown.clone();
        loop {
            let wait = self.config.poll_wait;
            let result = tokio::select! {
                _ = shutdown.changed() => {
                    return Session::Ended(DisconnectReason::ClientDisconnect);
                }
                result = self.poll_once(wait, self.poll_cursor) => result,
            };
            match result {
                Ok(batch) => self.deliver(batch),
                Err(e) => return Session::Ended(DisconnectReason::TransportError(e.to_string())),
            }
        }
    }
}

fn check_status(status: StatusCode) -> Result<(), RealtimeError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(RealtimeError::Unauthorized);
    }
    if !status.is_success() {
        return Err(RealtimeError::Rejected {
            status: status.as_u16(),
        });
    }
    Ok(())
}
