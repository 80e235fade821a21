//! Channel manager
//!
//! Owns the stream clients and the cross-venue view of active
//! subscriptions. Requests route to the owning client; multi-request
//! calls batch when the venue supports it, otherwise they dispatch one
//! frame per subscription.

use crate::client::StreamClient;
use crate::events::MarketEvent;
use rustc_hash::FxHashMap;
use services_common::{Channel, FeedError, FeedResult, Market, SubscriptionDescriptor};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Default capacity of the merged event stream
const MERGED_EVENT_CAPACITY: usize = 4096;

/// Coordinates the per-venue stream clients
pub struct ChannelManager {
    clients: FxHashMap<String, Arc<StreamClient>>,
    events: broadcast::Sender<MarketEvent>,
    forwarders: Vec<JoinHandle<()>>,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(MERGED_EVENT_CAPACITY);
        Self {
            clients: FxHashMap::default(),
            events,
            forwarders: Vec::new(),
        }
    }

    /// Register a client and start forwarding its events into the merged
    /// stream. Returns the shared handle.
    pub fn add_client(&mut self, client: StreamClient) -> Arc<StreamClient> {
        let client = Arc::new(client);
        let venue = client.venue().to_string();
        let mut rx = client.events();
        let tx = self.events.clone();
        self.forwarders.push(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let _ = tx.send(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        info!(%venue, "client registered");
        self.clients.insert(venue, Arc::clone(&client));
        client
    }

    /// Client handle for a venue
    #[must_use]
    pub fn client(&self, venue: &str) -> Option<Arc<StreamClient>> {
        self.clients.get(venue).cloned()
    }

    /// Registered venue names
    #[must_use]
    pub fn venues(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    /// Merged event stream across all venues
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }

    fn require(&self, venue: &str) -> FeedResult<&Arc<StreamClient>> {
        self.clients
            .get(venue)
            .ok_or_else(|| FeedError::Argument(format!("unknown venue {venue:?}")))
    }

    /// Connect every registered client.
    ///
    /// # Errors
    ///
    /// Returns the first handshake failure.
    pub async fn connect_all(&self) -> FeedResult<()> {
        for client in self.clients.values() {
            client.connect().await?;
        }
        Ok(())
    }

    /// Disconnect every registered client
    pub async fn disconnect_all(&self) {
        for client in self.clients.values() {
            client.disconnect().await;
        }
    }

    /// Subscribe one (venue, channel, symbol[, extra]) request.
    ///
    /// # Errors
    ///
    /// `FeedError::Argument` for unknown venues, closed clients, or
    /// malformed intervals; venue-refused requests return `Ok(false)`.
    pub async fn subscribe(
        &self,
        venue: &str,
        channel: Channel,
        market: &Market,
        extra: Option<&str>,
    ) -> FeedResult<bool> {
        let client = self.require(venue)?;
        match channel {
            Channel::Ticker => client.subscribe_ticker(market).await,
            Channel::Orderbook => client.subscribe_orderbook(market).await,
            Channel::Trades => client.subscribe_trades(market).await,
            Channel::Candles => {
                client
                    .subscribe_candles(market, extra.unwrap_or("1m"))
                    .await
            }
        }
    }

    /// Subscribe a set of requests on one venue, batched when possible.
    ///
    /// # Errors
    ///
    /// `FeedError::Argument` for unknown venues or a closed client.
    pub async fn subscribe_many(
        &self,
        venue: &str,
        requests: Vec<(Channel, Market, Option<String>)>,
    ) -> FeedResult<usize> {
        self.require(venue)?.subscribe_many(requests).await
    }

    /// Unsubscribe one (venue, channel, symbol).
    ///
    /// # Errors
    ///
    /// `FeedError::Argument` for unknown venues or a closed client.
    pub async fn unsubscribe(
        &self,
        venue: &str,
        channel: Channel,
        market: &Market,
    ) -> FeedResult<bool> {
        self.require(venue)?.unsubscribe(channel, market).await
    }

    /// All registered subscriptions across venues, venue-tagged
    #[must_use]
    pub fn active_subscriptions(&self) -> Vec<(String, SubscriptionDescriptor)> {
        let mut all = Vec::new();
        for (venue, client) in &self.clients {
            for sub in client.subscriptions() {
                if sub.is_active {
                    all.push((venue.clone(), sub));
                }
            }
        }
        all
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        for handle in &self.forwarders {
            handle.abort();
        }
    }
}
