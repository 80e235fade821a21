//! Live market-data feed
//!
//! Connects to the configured venues, subscribes the requested symbols on
//! ticker/orderbook/trades, and logs normalized events plus a periodic
//! health line per venue.
//!
//! Environment:
//! - `FEED_VENUES`   comma list of kraken,bitfinex,bitstamp,mexc (default: kraken)
//! - `FEED_SYMBOLS`  comma list of canonical symbols (default: BTC/USD)
//! - `CCXT_MAX_MSG_FAILURES` parse-failure quarantine threshold

use anyhow::Result;
use market_connector::exchanges::{BitfinexAdapter, BitstampAdapter, KrakenAdapter, MexcAdapter};
use market_connector::{
    ChannelManager, ClientConfig, ConnectorSettings, MarketEvent, StreamClient, VenueAdapter,
    WsConnector,
};
use observer::MarketObserver;
use services_common::{Channel, Market};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HEALTH_PERIOD: Duration = Duration::from_secs(30);

fn adapter_for(venue: &str) -> Option<Box<dyn VenueAdapter>> {
    match venue {
        "kraken" => Some(Box::new(KrakenAdapter::new())),
        "bitfinex" => Some(Box::new(BitfinexAdapter::new())),
        "bitstamp" => Some(Box::new(BitstampAdapter::new())),
        "mexc" => Some(Box::new(MexcAdapter::new())),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_feed=info,market_connector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let venues = std::env::var("FEED_VENUES").unwrap_or_else(|_| "kraken".to_string());
    let symbols = std::env::var("FEED_SYMBOLS").unwrap_or_else(|_| "BTC/USD".to_string());
    let markets = symbols
        .split(',')
        .map(|s| Market::parse(s.trim()))
        .collect::<Result<Vec<Market>, _>>()?;

    let observer = Arc::new(MarketObserver::new());
    let connector = Arc::new(WsConnector);
    let config = ClientConfig {
        settings: ConnectorSettings::from_env(),
        ..ClientConfig::default()
    };

    let mut manager = ChannelManager::new();
    for venue in venues.split(',').map(str::trim) {
        let Some(adapter) = adapter_for(venue) else {
            warn!(venue, "unknown venue, skipping");
            continue;
        };
        manager.add_client(StreamClient::new(
            adapter,
            connector.clone(),
            Arc::clone(&observer),
            config,
        ));
    }

    manager.connect_all().await?;
    info!(venues = %venues, symbols = %symbols, "connected");

    for venue in manager.venues() {
        let requests: Vec<(Channel, Market, Option<String>)> = markets
            .iter()
            .flat_map(|market| {
                [
                    (Channel::Ticker, market.clone(), None),
                    (Channel::Orderbook, market.clone(), None),
                    (Channel::Trades, market.clone(), None),
                ]
            })
            .collect();
        let subscribed = manager.subscribe_many(&venue, requests).await?;
        info!(%venue, subscribed, "subscriptions sent");
    }

    let health_observer = Arc::clone(&observer);
    let health_venues = manager.venues();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(HEALTH_PERIOD);
        loop {
            tick.tick().await;
            for venue in &health_venues {
                let health = health_observer.health(venue);
                let stats = health_observer.statistics(venue).unwrap_or_default();
                info!(
                    %venue,
                    status = ?health.status,
                    messages = stats.message_count,
                    rate = %format!("{:.1}/s", stats.messages_per_second),
                    errors = stats.error_count,
                    reconnects = health.total_reconnects,
                    "health"
                );
            }
        }
    });

    let mut events = manager.events();
    loop {
        match events.recv().await {
            Ok(MarketEvent::Ticker(t)) => {
                info!(venue = %t.venue, symbol = %t.symbol,
                    bid = ?t.bid, ask = ?t.ask, "ticker");
            }
            Ok(MarketEvent::Book(b)) => {
                let best_bid = b.book.bids.first().map(|l| l.price);
                let best_ask = b.book.asks.first().map(|l| l.price);
                info!(venue = %b.venue, symbol = %b.symbol,
                    bid = ?best_bid, ask = ?best_ask,
                    depth = b.book.bids.len() + b.book.asks.len(), "book");
            }
            Ok(MarketEvent::Trades(t)) => {
                info!(venue = %t.venue, symbol = %t.symbol, count = t.trades.len(), "trades");
            }
            Ok(MarketEvent::Candle(c)) => {
                info!(venue = %c.venue, symbol = %c.symbol, interval = %c.interval,
                    close = %c.close, "candle");
            }
            Ok(MarketEvent::Error { venue, message }) => warn!(%venue, %message, "venue error"),
            Ok(MarketEvent::Info { venue, message }) => info!(%venue, %message, "info"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "consumer lagged, events dropped");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    Ok(())
}
