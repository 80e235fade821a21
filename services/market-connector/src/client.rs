//! Stream-client state machine
//!
//! One client owns one venue connection: a reader task for the public
//! transport, an optional reader for the private transport, a heartbeat
//! timer inside the session loop, and a reconnect loop with full-jitter
//! backoff. Subscription state lives in the registry and is replayed in
//! insertion order after every reconnect.

use crate::adapter::{VenueAdapter, VenueEvent};
use crate::config::ConnectorSettings;
use crate::events::MarketEvent;
use crate::registry::SubscriptionRegistry;
use crate::transport::{Connector, TransportSink, TransportStream, WireMessage};
use observer::MarketObserver;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use services_common::{
    interval::split_interval, now_millis, Channel, FeedError, FeedResult, Market,
    SubscriptionDescriptor,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Connection lifecycle states
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClientState {
    /// Created, never connected
    Idle,
    /// Handshake in flight
    Connecting,
    /// Transport open, nothing subscribed yet
    Connected,
    /// Subscribe frames sent, waiting for data
    Subscribing,
    /// Steady state: frames flowing
    Streaming,
    /// Parse failures accumulating; exits up on good parses
    Degraded,
    /// Link declared dead; backoff and replay in progress
    Reconnecting,
    /// Terminal: disconnected by the caller
    Closed,
}

/// Per-client tunables
#[derive(Clone, Copy, Debug)]
pub struct ClientConfig {
    /// Deadline for a single outbound send
    pub send_timeout: Duration,
    /// First reconnect backoff step
    pub backoff_base: Duration,
    /// Backoff ceiling
    pub backoff_cap: Duration,
    /// Fan-out capacity before slow consumers lose events
    pub event_capacity: usize,
    /// Quarantine settings
    pub settings: ConnectorSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            event_capacity: 2048,
            settings: ConnectorSettings::default(),
        }
    }
}

/// Rolling-window parse-failure counter
struct FailureWindow {
    threshold: u32,
    window: Duration,
    count: u32,
    started: Option<Instant>,
}

impl FailureWindow {
    fn new(settings: ConnectorSettings) -> Self {
        Self {
            threshold: settings.max_msg_failures,
            window: settings.failure_window,
            count: 0,
            started: None,
        }
    }

    /// Count one failure; true once the window total exceeds the threshold
    fn record(&mut self) -> bool {
        let now = Instant::now();
        match self.started {
            Some(started) if now.duration_since(started) <= self.window => self.count += 1,
            _ => {
                self.started = Some(now);
                self.count = 1;
            }
        }
        self.count > self.threshold
    }
}

/// Full-jitter exponential backoff: uniform over [0, min(cap, base·2^attempt)]
fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let ceiling = base
        .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        .min(cap);
    let micros = ceiling.as_micros().min(u128::from(u64::MAX)) as u64;
    if micros == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::thread_rng().gen_range(0..=micros))
}

enum SessionEnd {
    Shutdown,
    LinkDead(String),
}

struct ClientInner {
    venue: &'static str,
    adapter: Mutex<Box<dyn VenueAdapter>>,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    observer: Arc<MarketObserver>,
    registry: RwLock<SubscriptionRegistry>,
    events: broadcast::Sender<MarketEvent>,
    state: watch::Sender<ClientState>,
    sink: AsyncMutex<Option<Box<dyn TransportSink>>>,
    private_sink: AsyncMutex<Option<Box<dyn TransportSink>>>,
    last_inbound: AtomicI64,
    shutdown: watch::Sender<bool>,
    public_url: String,
    private_url: Option<String>,
    ping_interval: Duration,
}

/// One venue's stream client
pub struct StreamClient {
    inner: Arc<ClientInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamClient {
    /// Create a client for an adapter.
    ///
    /// Nothing connects until [`StreamClient::connect`] is called.
    #[must_use]
    pub fn new(
        adapter: Box<dyn VenueAdapter>,
        connector: Arc<dyn Connector>,
        observer: Arc<MarketObserver>,
        config: ClientConfig,
    ) -> Self {
        let venue = adapter.name();
        let public_url = adapter.public_url().to_string();
        let private_url = adapter.private_url().map(ToString::to_string);
        let ping_interval = adapter.ping_interval();
        let (events, _) = broadcast::channel(config.event_capacity);
        let (state, _) = watch::channel(ClientState::Idle);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClientInner {
                venue,
                adapter: Mutex::new(adapter),
                connector,
                config,
                observer,
                registry: RwLock::new(SubscriptionRegistry::new()),
                events,
                state,
                sink: AsyncMutex::new(None),
                private_sink: AsyncMutex::new(None),
                last_inbound: AtomicI64::new(0),
                shutdown,
                public_url,
                private_url,
                ping_interval,
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Venue name
    #[must_use]
    pub fn venue(&self) -> &'static str {
        self.inner.venue
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.inner.state.borrow()
    }

    /// Watch lifecycle transitions
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ClientState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to the normalized event stream
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<MarketEvent> {
        self.inner.events.subscribe()
    }

    /// Shared observer handle
    #[must_use]
    pub fn observer(&self) -> Arc<MarketObserver> {
        Arc::clone(&self.inner.observer)
    }

    /// Registered subscriptions in insertion order
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionDescriptor> {
        self.inner.registry.read().all().to_vec()
    }

    /// Open the public transport (and the private one when configured).
    ///
    /// Idempotent: calling while already connected is a no-op.
    ///
    /// # Errors
    ///
    /// `FeedError::Transport` on handshake failure; `FeedError::Argument`
    /// when the client was already closed.
    pub async fn connect(&self) -> FeedResult<()> {
        match self.state() {
            ClientState::Connected
            | ClientState::Subscribing
            | ClientState::Streaming
            | ClientState::Degraded => return Ok(()),
            ClientState::Closed => {
                return Err(FeedError::Argument("client is closed".to_string()))
            }
            _ => {}
        }

        self.inner.state.send_replace(ClientState::Connecting);
        info!(venue = self.inner.venue, url = %self.inner.public_url, "connecting");

        let (sink, stream) = match self.inner.connector.connect(&self.inner.public_url).await {
            Ok(pair) => pair,
            Err(e) => {
                self.inner.state.send_replace(ClientState::Idle);
                return Err(e);
            }
        };
        *self.inner.sink.lock().await = Some(sink);

        let private_stream = match &self.inner.private_url {
            Some(url) => {
                let (psink, pstream) = self.inner.connector.connect(url).await?;
                *self.inner.private_sink.lock().await = Some(psink);
                self.inner.observer.set_authenticated(self.inner.venue, true);
                Some(pstream)
            }
            None => None,
        };

        self.inner
            .last_inbound
            .store(now_millis(), Ordering::Relaxed);
        self.inner.state.send_replace(ClientState::Connected);
        self.inner
            .observer
            .on_connection_state_changed(self.inner.venue, true);

        let inner = Arc::clone(&self.inner);
        self.tasks
            .lock()
            .push(tokio::spawn(async move { run_loop(inner, stream).await }));

        if let Some(pstream) = private_stream {
            let inner = Arc::clone(&self.inner);
            self.tasks
                .lock()
                .push(tokio::spawn(async move { private_loop(inner, pstream).await }));
        }
        Ok(())
    }

    /// Subscribe to the ticker channel.
    ///
    /// # Errors
    ///
    /// `FeedError::Argument` when the client is closed; transport and
    /// contract failures return `Ok(false)` and surface as error events.
    pub async fn subscribe_ticker(&self, market: &Market) -> FeedResult<bool> {
        self.subscribe(Channel::Ticker, market, None).await
    }

    /// Subscribe to the order-book channel.
    ///
    /// # Errors
    ///
    /// See [`StreamClient::subscribe_ticker`].
    pub async fn subscribe_orderbook(&self, market: &Market) -> FeedResult<bool> {
        self.subscribe(Channel::Orderbook, market, None).await
    }

    /// Subscribe to the trades channel.
    ///
    /// # Errors
    ///
    /// See [`StreamClient::subscribe_ticker`].
    pub async fn subscribe_trades(&self, market: &Market) -> FeedResult<bool> {
        self.subscribe(Channel::Trades, market, None).await
    }

    /// Subscribe to the candles channel with a canonical interval.
    ///
    /// # Errors
    ///
    /// `FeedError::Argument` for an unparseable interval or a closed
    /// client; venue-unsupported channels return `Ok(false)`.
    pub async fn subscribe_candles(&self, market: &Market, interval: &str) -> FeedResult<bool> {
        if split_interval(interval).is_none() {
            return Err(FeedError::Argument(format!(
                "invalid candle interval: {interval:?}"
            )));
        }
        self.subscribe(Channel::Candles, market, Some(interval.to_string()))
            .await
    }

    async fn subscribe(
        &self,
        channel: Channel,
        market: &Market,
        extra: Option<String>,
    ) -> FeedResult<bool> {
        if self.state() == ClientState::Closed {
            return Err(FeedError::Argument("client is closed".to_string()));
        }
        let symbol = market.canonical();
        let sub = SubscriptionDescriptor::new(channel, &symbol, extra);
        let key = sub.key();

        let frame = {
            let adapter = self.inner.adapter.lock();
            match adapter.subscribe_frame(&sub) {
                Ok(frame) => frame,
                Err(e @ FeedError::Contract(_)) => {
                    emit_error(&self.inner, &e.to_string());
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        };

        self.inner.registry.write().upsert(sub);
        if self.state() == ClientState::Connected {
            self.inner.state.send_replace(ClientState::Subscribing);
        }

        match send_text(&self.inner, frame).await {
            Ok(()) => {
                self.inner.registry.write().mark_active(&key);
                self.inner.observer.on_subscription_changed(
                    self.inner.venue,
                    channel.as_str(),
                    &symbol,
                    true,
                );
                debug!(venue = self.inner.venue, %channel, %symbol, "subscribed");
                Ok(true)
            }
            Err(e) => {
                // Descriptor stays registered but inactive; the caller may retry
                emit_error(&self.inner, &e.to_string());
                Ok(false)
            }
        }
    }

    /// Subscribe a set of requests, batched when the venue allows it.
    ///
    /// With batch support and two or more valid requests, the adapter
    /// groups them into as few frames as its wire format permits;
    /// otherwise one frame per request is sent in order. Returns the
    /// number of subscriptions activated.
    ///
    /// # Errors
    ///
    /// `FeedError::Argument` when the client is closed.
    pub async fn subscribe_many(
        &self,
        requests: Vec<(Channel, Market, Option<String>)>,
    ) -> FeedResult<usize> {
        if self.state() == ClientState::Closed {
            return Err(FeedError::Argument("client is closed".to_string()));
        }

        let mut subs = Vec::with_capacity(requests.len());
        {
            let adapter = self.inner.adapter.lock();
            for (channel, market, extra) in requests {
                let sub = SubscriptionDescriptor::new(channel, market.canonical(), extra);
                match adapter.subscribe_frame(&sub) {
                    Ok(_) => subs.push(sub),
                    Err(e) => emit_error(&self.inner, &e.to_string()),
                }
            }
        }
        if subs.is_empty() {
            return Ok(0);
        }

        {
            let mut registry = self.inner.registry.write();
            for sub in &subs {
                registry.upsert(sub.clone());
            }
        }
        if self.state() == ClientState::Connected {
            self.inner.state.send_replace(ClientState::Subscribing);
        }

        let frames = {
            let adapter = self.inner.adapter.lock();
            if adapter.supports_batch_subscription() && subs.len() >= 2 {
                adapter.batch_subscribe_frames(&subs)?
            } else {
                subs.iter()
                    .map(|sub| adapter.subscribe_frame(sub))
                    .collect::<FeedResult<Vec<_>>>()?
            }
        };
        for frame in frames {
            if let Err(e) = send_text(&self.inner, frame).await {
                emit_error(&self.inner, &e.to_string());
                return Ok(0);
            }
        }

        let mut registry = self.inner.registry.write();
        for sub in &subs {
            registry.mark_active(&sub.key());
            self.inner.observer.on_subscription_changed(
                self.inner.venue,
                sub.channel.as_str(),
                &sub.symbol,
                true,
            );
        }
        Ok(subs.len())
    }

    /// Best-effort unsubscribe: send the venue frame and drop the
    /// descriptor. Observer statistics for the stream remain queryable.
    ///
    /// # Errors
    ///
    /// `FeedError::Argument` when the client is closed.
    pub async fn unsubscribe(&self, channel: Channel, market: &Market) -> FeedResult<bool> {
        if self.state() == ClientState::Closed {
            return Err(FeedError::Argument("client is closed".to_string()));
        }
        let symbol = market.canonical();
        let matching: Vec<SubscriptionDescriptor> = self
            .inner
            .registry
            .read()
            .all()
            .iter()
            .filter(|s| s.channel == channel && s.symbol == symbol)
            .cloned()
            .collect();
        if matching.is_empty() {
            return Ok(false);
        }

        for sub in &matching {
            let frame = {
                let adapter = self.inner.adapter.lock();
                adapter.unsubscribe_frame(sub)
            };
            match frame {
                Ok(frame) => {
                    if let Err(e) = send_text(&self.inner, frame).await {
                        debug!(venue = self.inner.venue, %channel, %symbol, error = %e,
                            "unsubscribe send failed");
                    }
                }
                Err(e) => debug!(venue = self.inner.venue, error = %e, "no unsubscribe frame"),
            }
            self.inner.registry.write().remove(&sub.key());
            self.inner.observer.on_subscription_changed(
                self.inner.venue,
                channel.as_str(),
                &symbol,
                false,
            );
        }
        if channel == Channel::Orderbook {
            self.inner.adapter.lock().drop_symbol(&symbol);
        }
        Ok(true)
    }

    /// Graceful close: trip the shutdown signal, close the transports,
    /// wait for the reader and heartbeat tasks, and enter `Closed`.
    /// Metrics are retained.
    pub async fn disconnect(&self) {
        let _ = self.inner.shutdown.send(true);
        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        if let Some(mut sink) = self.inner.private_sink.lock().await.take() {
            let _ = sink.close().await;
        }
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        let was_connected = !matches!(self.state(), ClientState::Idle | ClientState::Closed);
        self.inner.state.send_replace(ClientState::Closed);
        if was_connected {
            self.inner
                .observer
                .on_connection_state_changed(self.inner.venue, false);
        }
        info!(venue = self.inner.venue, "disconnected");
    }
}

fn emit_error(inner: &Arc<ClientInner>, message: &str) {
    inner.observer.on_error(inner.venue, message);
    let _ = inner.events.send(MarketEvent::Error {
        venue: inner.venue.to_string(),
        message: message.to_string(),
    });
}

async fn send_text(inner: &Arc<ClientInner>, text: String) -> FeedResult<()> {
    let mut guard = inner.sink.lock().await;
    let sink = guard
        .as_mut()
        .ok_or_else(|| FeedError::Transport("not connected".to_string()))?;
    tokio::time::timeout(inner.config.send_timeout, sink.send(WireMessage::Text(text)))
        .await
        .map_err(|_| FeedError::Transport("send timed out".to_string()))?
}

async fn send_raw(inner: &Arc<ClientInner>, msg: WireMessage) -> FeedResult<()> {
    let mut guard = inner.sink.lock().await;
    let sink = guard
        .as_mut()
        .ok_or_else(|| FeedError::Transport("not connected".to_string()))?;
    tokio::time::timeout(inner.config.send_timeout, sink.send(msg))
        .await
        .map_err(|_| FeedError::Transport("send timed out".to_string()))?
}

/// Owns the public stream across sessions and reconnects
async fn run_loop(inner: Arc<ClientInner>, mut stream: Box<dyn TransportStream>) {
    let mut shutdown = inner.shutdown.subscribe();
    loop {
        match run_session(&inner, stream.as_mut(), &mut shutdown).await {
            SessionEnd::Shutdown => break,
            SessionEnd::LinkDead(reason) => {
                warn!(venue = inner.venue, %reason, "link dead, reconnecting");
                inner.state.send_replace(ClientState::Reconnecting);
                inner
                    .observer
                    .on_connection_state_changed(inner.venue, false);
                let _ = inner.events.send(MarketEvent::Info {
                    venue: inner.venue.to_string(),
                    message: format!("reconnecting: {reason}"),
                });
                inner.sink.lock().await.take();

                match reconnect(&inner, &mut shutdown).await {
                    Some(new_stream) => stream = new_stream,
                    None => break,
                }
            }
        }
    }
}

/// One connected session: reads frames and keeps the heartbeat
async fn run_session(
    inner: &Arc<ClientInner>,
    stream: &mut dyn TransportStream,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let mut quarantine = FailureWindow::new(inner.config.settings);
    let mut ping = tokio::time::interval(inner.ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // immediate first tick

    loop {
        if *shutdown.borrow() {
            return SessionEnd::Shutdown;
        }
        tokio::select! {
            _ = shutdown.changed() => return SessionEnd::Shutdown,
            _ = ping.tick() => {
                let idle_ms = now_millis() - inner.last_inbound.load(Ordering::Relaxed);
                let deadline_ms = 2 * inner.ping_interval.as_millis() as i64;
                if idle_ms > deadline_ms {
                    return SessionEnd::LinkDead(format!("no inbound frame for {idle_ms}ms"));
                }
                let ping_msg = inner.adapter.lock().create_ping_message();
                let result = match ping_msg {
                    Some(text) => send_text(inner, text).await,
                    // No application ping: fall back to a transport-level ping
                    None => send_raw(inner, WireMessage::Ping(Vec::new())).await,
                };
                if let Err(e) = result {
                    return SessionEnd::LinkDead(format!("ping send failed: {e}"));
                }
            }
            frame = stream.recv() => match frame {
                None => return SessionEnd::LinkDead("stream closed".to_string()),
                Some(Err(e)) => return SessionEnd::LinkDead(format!("read failed: {e}")),
                Some(Ok(wire)) => {
                    if let Some(end) = handle_frame(inner, wire, false, &mut quarantine).await {
                        return end;
                    }
                }
            }
        }
    }
}

/// Reader for the optional private transport; no heartbeat of its own
async fn private_loop(inner: Arc<ClientInner>, mut stream: Box<dyn TransportStream>) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut quarantine = FailureWindow::new(inner.config.settings);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            frame = stream.recv() => match frame {
                None => {
                    warn!(venue = inner.venue, "private stream closed");
                    inner.observer.set_authenticated(inner.venue, false);
                    break;
                }
                Some(Err(e)) => {
                    warn!(venue = inner.venue, error = %e, "private stream failed");
                    inner.observer.set_authenticated(inner.venue, false);
                    break;
                }
                Some(Ok(wire)) => {
                    let _ = handle_frame(&inner, wire, true, &mut quarantine).await;
                }
            }
        }
    }
}

async fn handle_frame(
    inner: &Arc<ClientInner>,
    wire: WireMessage,
    is_private: bool,
    quarantine: &mut FailureWindow,
) -> Option<SessionEnd> {
    inner
        .last_inbound
        .store(now_millis(), Ordering::Relaxed);

    match &wire {
        WireMessage::Ping(data) => {
            if let Err(e) = send_raw(inner, WireMessage::Pong(data.clone())).await {
                return Some(SessionEnd::LinkDead(format!("pong send failed: {e}")));
            }
            return None;
        }
        WireMessage::Pong(_) => return None,
        WireMessage::Close => {
            return Some(SessionEnd::LinkDead("close frame received".to_string()))
        }
        WireMessage::Text(_) | WireMessage::Binary(_) => {}
    }

    let size = wire.len();
    let started = Instant::now();
    let parsed = inner.adapter.lock().process_message(&wire, is_private);
    let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

    match parsed {
        Ok(events) => {
            if *inner.state.borrow() == ClientState::Degraded {
                inner.state.send_replace(ClientState::Streaming);
            }
            for event in events {
                if let Some(end) = dispatch_event(inner, event, size, latency_ms) {
                    return Some(end);
                }
            }
            None
        }
        Err(e) => {
            debug!(venue = inner.venue, error = %e, "frame dropped");
            emit_error(inner, &e.to_string());
            if quarantine.record() {
                return Some(SessionEnd::LinkDead(
                    "parse-failure threshold exceeded".to_string(),
                ));
            }
            if matches!(
                *inner.state.borrow(),
                ClientState::Connected | ClientState::Subscribing | ClientState::Streaming
            ) {
                inner.state.send_replace(ClientState::Degraded);
            }
            None
        }
    }
}

fn set_streaming(inner: &Arc<ClientInner>) {
    if matches!(
        *inner.state.borrow(),
        ClientState::Connected | ClientState::Subscribing | ClientState::Degraded
    ) {
        inner.state.send_replace(ClientState::Streaming);
    }
}

fn dispatch_event(
    inner: &Arc<ClientInner>,
    event: VenueEvent,
    size: usize,
    latency_ms: f64,
) -> Option<SessionEnd> {
    match event {
        VenueEvent::Ticker(ticker) => {
            inner.observer.on_message_received(
                inner.venue,
                Channel::Ticker.as_str(),
                &ticker.symbol,
                size,
                latency_ms,
            );
            inner
                .registry
                .write()
                .touch(Channel::Ticker, &ticker.symbol, None);
            set_streaming(inner);
            let _ = inner.events.send(MarketEvent::Ticker(ticker));
        }
        VenueEvent::Book(book) => {
            inner.observer.on_message_received(
                inner.venue,
                Channel::Orderbook.as_str(),
                &book.symbol,
                size,
                latency_ms,
            );
            inner
                .registry
                .write()
                .touch(Channel::Orderbook, &book.symbol, None);
            set_streaming(inner);
            let _ = inner.events.send(MarketEvent::Book(book));
        }
        VenueEvent::Trades(batch) => {
            inner.observer.on_message_received(
                inner.venue,
                Channel::Trades.as_str(),
                &batch.symbol,
                size,
                latency_ms,
            );
            inner
                .registry
                .write()
                .touch(Channel::Trades, &batch.symbol, None);
            set_streaming(inner);
            let _ = inner.events.send(MarketEvent::Trades(batch));
        }
        VenueEvent::Candle(candle) => {
            inner.observer.on_message_received(
                inner.venue,
                Channel::Candles.as_str(),
                &candle.symbol,
                size,
                latency_ms,
            );
            inner
                .registry
                .write()
                .touch(Channel::Candles, &candle.symbol, Some(candle.interval.as_str()));
            set_streaming(inner);
            let _ = inner.events.send(MarketEvent::Candle(candle));
        }
        VenueEvent::SubscriptionAck {
            channel,
            symbol,
            extra,
            subscription_id,
        } => {
            if let (Some(symbol), Some(id)) = (symbol, subscription_id) {
                // The id belongs to one (channel, symbol, extra) key; a
                // same-symbol subscription on another qualifier keeps its own
                let mut registry = inner.registry.write();
                let keys: Vec<_> = registry
                    .all()
                    .iter()
                    .filter(|s| s.channel == channel && s.symbol == symbol && s.extra == extra)
                    .map(SubscriptionDescriptor::key)
                    .collect();
                for key in keys {
                    registry.set_subscription_id(&key, id.clone());
                }
            }
            set_streaming(inner);
        }
        VenueEvent::Pong | VenueEvent::Heartbeat => {}
        VenueEvent::ReconnectRequest => {
            return Some(SessionEnd::LinkDead("venue requested reconnect".to_string()));
        }
        VenueEvent::VenueError { message, fatal } => {
            emit_error(inner, &message);
            if fatal {
                return Some(SessionEnd::LinkDead(format!("fatal venue error: {message}")));
            }
        }
    }
    None
}

/// Backoff-and-retry until connected or shut down.
///
/// On success the books are reset, the active registry is replayed in
/// insertion order (batched when the venue supports it), and the new
/// read half is returned.
async fn reconnect(
    inner: &Arc<ClientInner>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Box<dyn TransportStream>> {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return None;
        }
        let delay = backoff_delay(attempt, inner.config.backoff_base, inner.config.backoff_cap);
        debug!(venue = inner.venue, attempt, delay_ms = delay.as_millis() as u64, "backoff");
        tokio::select! {
            _ = shutdown.changed() => return None,
            () = tokio::time::sleep(delay) => {}
        }

        match inner.connector.connect(&inner.public_url).await {
            Ok((sink, stream)) => {
                *inner.sink.lock().await = Some(sink);
                inner.adapter.lock().reset_books();
                inner.last_inbound.store(now_millis(), Ordering::Relaxed);
                inner.state.send_replace(ClientState::Connected);
                inner.observer.on_connection_state_changed(inner.venue, true);

                if let Err(e) = replay_subscriptions(inner).await {
                    warn!(venue = inner.venue, error = %e, "replay failed");
                    inner.observer.on_connection_state_changed(inner.venue, false);
                    inner.sink.lock().await.take();
                    attempt += 1;
                    continue;
                }

                info!(venue = inner.venue, "reconnected");
                inner.state.send_replace(ClientState::Streaming);
                return Some(stream);
            }
            Err(e) => {
                warn!(venue = inner.venue, attempt, error = %e, "reconnect attempt failed");
                inner.observer.on_connection_state_changed(inner.venue, false);
                attempt += 1;
            }
        }
    }
}

async fn replay_subscriptions(inner: &Arc<ClientInner>) -> FeedResult<()> {
    let subs = inner.registry.read().active_in_order();
    if subs.is_empty() {
        return Ok(());
    }
    let frames = {
        let adapter = inner.adapter.lock();
        if adapter.supports_batch_subscription() && subs.len() >= 2 {
            adapter.batch_subscribe_frames(&subs)?
        } else {
            subs.iter()
                .map(|sub| adapter.subscribe_frame(sub))
                .collect::<FeedResult<Vec<_>>>()?
        }
    };
    debug!(venue = inner.venue, subs = subs.len(), frames = frames.len(), "replaying");
    for frame in frames {
        send_text(inner, frame).await?;
    }
    Ok(())
}
