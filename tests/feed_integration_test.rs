//! Integration Tests - Provider Feeds End to End
//!
//! Runs real strategies against a local tokio-tungstenite server that
//! stands in for Binance and Tiingo, with the supervisor relaying ticks
//! into the cache and broadcaster.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use price_feed_engine::adapters::feeds::ProviderStrategyFactory;
use price_feed_engine::adapters::metrics::FeedMetrics;
use price_feed_engine::config::loader::parse_config;
use price_feed_engine::domain::InternalSymbol;
use price_feed_engine::ports::ExitReason;
use price_feed_engine::usecases::{
    Broadcaster, FeedSupervisor, PriceCache, Shutdown, SupervisorReport,
};

// ---- Fake provider ----

/// What the fake provider does after sending its scripted frames.
#[derive(Clone, Copy)]
enum AfterFrames {
    /// Keep the socket open until the client closes it.
    Hold,
    /// Send a close frame.
    Close,
    /// Drop the TCP connection without a close handshake.
    Reset,
}

/// Local WebSocket server. Every accepted connection optionally reads
/// one client frame (forwarded on the returned channel), then sends the
/// scripted frames.
async fn fake_provider(
    frames: Vec<&'static str>,
    read_first: bool,
    after: AfterFrames,
) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (inbound_tx, inbound_rx) = mpsc::channel(16);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let frames = frames.clone();
            let inbound_tx = inbound_tx.clone();
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();

                if read_first {
                    if let Some(Ok(Message::Text(text))) = ws.next().await {
                        let _ = inbound_tx.send(text).await;
                    }
                }
                for frame in frames {
                    if ws.send(Message::Text(frame.to_string())).await.is_err() {
                        return;
                    }
                }
                match after {
                    AfterFrames::Hold => {}
                    AfterFrames::Close => {
                        let _ = ws.close(None).await;
                    }
                    AfterFrames::Reset => return,
                }
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    (url, inbound_rx)
}

/// A port with nothing listening on it.
async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

// ---- Harness ----

struct Harness {
    supervisor: Arc<FeedSupervisor>,
    cache: Arc<PriceCache>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<FeedMetrics>,
}

fn harness(config_toml: &str) -> Harness {
    let config = parse_config(config_toml).unwrap();
    let metrics = Arc::new(FeedMetrics::new().unwrap());
    let cache = Arc::new(PriceCache::new());
    let broadcaster = Arc::new(Broadcaster::new(16));
    let factory = Arc::new(ProviderStrategyFactory::new(&config, Arc::clone(&metrics)));

    let supervisor = Arc::new(FeedSupervisor::new(
        factory,
        config.symbol_map().provider_symbols(),
        Arc::clone(&cache),
        Arc::clone(&broadcaster),
        Arc::clone(&metrics),
        config.feed.event_buffer,
    ));

    Harness {
        supervisor,
        cache,
        broadcaster,
        metrics,
    }
}

fn spawn_start(
    supervisor: &Arc<FeedSupervisor>,
    root: &Shutdown,
) -> tokio::task::JoinHandle<SupervisorReport> {
    let supervisor = Arc::clone(supervisor);
    let root = root.clone();
    tokio::spawn(async move { supervisor.start(&root).await })
}

async fn wait_for_price(cache: &PriceCache, symbol: &str) -> rust_decimal::Decimal {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(update) = cache.get(&InternalSymbol::new(symbol)) {
                return update.price;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("price should reach the cache")
}

async fn wait_for_streaming(supervisor: &FeedSupervisor, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while supervisor.connected_feeds() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("feeds should reach Streaming");
}

// ---- Tests ----

#[tokio::test]
async fn binance_tick_reaches_cache_and_subscriber() {
    let (url, _) = fake_provider(
        vec![r#"{"e":"aggTrade","s":"BTCUSDT","p":"65000.50","q":"0.01"}"#],
        false,
        AfterFrames::Hold,
    )
    .await;
    let h = harness(&format!(
        "[binance]\nws_base_endpoint = \"{url}\"\n[feed.symbols]\nBTCUSDT = \"BTCUSD\"\n"
    ));

    let (handle, mut updates) = h.broadcaster.register();
    assert!(h.broadcaster.join(handle, &InternalSymbol::new("BTCUSD")));

    let root = Shutdown::new();
    let runner = spawn_start(&h.supervisor, &root);

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.symbol.as_str(), "BTCUSD");
    assert_eq!(update.price, dec!(65000.50));
    assert_eq!(wait_for_price(&h.cache, "BTCUSD").await, dec!(65000.50));

    h.supervisor.stop(&Shutdown::new()).await;
    let report = tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    assert_eq!(report.exits, vec![("BTCUSDT".to_string(), ExitReason::Cancelled)]);
    assert_eq!(h.supervisor.connected_feeds(), 0);
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let (url, _) = fake_provider(
        vec![
            "not json at all",
            r#"{"s":"ETHUSDT"}"#,
            r#"{"s":"ETHUSDT","p":"abc"}"#,
            r#"{"s":"ETHUSDT","p":"3150.25"}"#,
        ],
        false,
        AfterFrames::Hold,
    )
    .await;
    let h = harness(&format!(
        "[binance]\nws_base_endpoint = \"{url}\"\n[feed.symbols]\nETHUSDT = \"ETHUSD\"\n"
    ));
    let root = Shutdown::new();
    let runner = spawn_start(&h.supervisor, &root);

    assert_eq!(wait_for_price(&h.cache, "ETHUSD").await, dec!(3150.25));
    assert_eq!(
        h.metrics.frames_discarded.with_label_values(&["binance"]).get(),
        3
    );

    root.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    assert_eq!(report.ticks_relayed, 1);
}

#[tokio::test]
async fn tiingo_subscribes_then_streams() {
    let (url, mut inbound) = fake_provider(
        vec![
            r#"{"messageType":"I","response":{"code":200,"message":"Success"}}"#,
            r#"{"messageType":"H"}"#,
            r#"{"messageType":"A","ticker":"eurusd","last":1.0825}"#,
        ],
        true,
        AfterFrames::Hold,
    )
    .await;
    let h = harness(&format!(
        "[feed]\nprovider = \"tiingo\"\n[feed.symbols]\neurusd = \"EURUSD\"\n\
         [tiingo]\nws_endpoint = \"{url}\"\napi_token = \"secret\"\n"
    ));
    let root = Shutdown::new();
    let runner = spawn_start(&h.supervisor, &root);

    let subscribe = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
        .await
        .unwrap()
        .unwrap();
    let subscribe: serde_json::Value = serde_json::from_str(&subscribe).unwrap();
    assert_eq!(subscribe["eventName"], "subscribe");
    assert_eq!(subscribe["authorization"], "secret");
    assert_eq!(subscribe["eventData"]["tickers"][0], "eurusd");

    assert_eq!(wait_for_price(&h.cache, "EURUSD").await, dec!(1.0825));
    // The info frame has no ticker and counts as malformed; the heartbeat does not.
    assert_eq!(
        h.metrics.frames_discarded.with_label_values(&["tiingo"]).get(),
        1
    );

    root.cancel();
    tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
}

#[tokio::test]
async fn construction_failure_does_not_block_other_symbols() {
    let (url, _) = fake_provider(
        vec![r#"{"s":"BTCUSDT","p":"64000"}"#],
        false,
        AfterFrames::Hold,
    )
    .await;
    // Tiingo without a token cannot be constructed.
    let h = harness(&format!(
        "[binance]\nws_base_endpoint = \"{url}\"\n\
         [feed.symbols]\nBTCUSDT = \"BTCUSD\"\neurusd = \"EURUSD\"\n\
         [feed.provider_overrides]\neurusd = \"tiingo\"\n"
    ));
    let root = Shutdown::new();
    let runner = spawn_start(&h.supervisor, &root);

    assert_eq!(wait_for_price(&h.cache, "BTCUSD").await, dec!(64000));

    root.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "eurusd");
}

#[tokio::test]
async fn cancellation_closes_all_strategies() {
    let (url, _) = fake_provider(Vec::new(), false, AfterFrames::Hold).await;
    let h = harness(&format!(
        "[binance]\nws_base_endpoint = \"{url}\"\n\
         [feed.symbols]\nBTCUSDT = \"BTCUSD\"\nETHUSDT = \"ETHUSD\"\n"
    ));
    let root = Shutdown::new();
    let runner = spawn_start(&h.supervisor, &root);

    wait_for_streaming(&h.supervisor, 2).await;
    assert_eq!(h.metrics.feeds_streaming.get(), 2);

    root.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("cancellation should finish in bounded time")
        .unwrap();

    assert_eq!(report.exits.len(), 2);
    assert!(report.exits.iter().all(|(_, exit)| *exit == ExitReason::Cancelled));
    assert_eq!(h.supervisor.connected_feeds(), 0);
    assert_eq!(h.metrics.feeds_streaming.get(), 0);
}

#[tokio::test]
async fn remote_close_ends_strategy_without_restart() {
    let (url, _) = fake_provider(
        vec![r#"{"s":"BTCUSDT","p":"1"}"#],
        false,
        AfterFrames::Close,
    )
    .await;
    let h = harness(&format!(
        "[binance]\nws_base_endpoint = \"{url}\"\n[feed.symbols]\nBTCUSDT = \"BTCUSD\"\n"
    ));

    let report = tokio::time::timeout(Duration::from_secs(5), h.supervisor.start(&Shutdown::new()))
        .await
        .expect("supervisor should return once the only strategy exits");

    assert_eq!(report.exits, vec![("BTCUSDT".to_string(), ExitReason::RemoteClosed)]);
    assert_eq!(report.ticks_relayed, 1);
}

#[tokio::test]
async fn connect_failure_is_reported_as_transport_failure() {
    let url = dead_endpoint().await;
    let h = harness(&format!(
        "[binance]\nws_base_endpoint = \"{url}\"\n[feed.symbols]\nBTCUSDT = \"BTCUSD\"\n"
    ));

    let report = tokio::time::timeout(Duration::from_secs(5), h.supervisor.start(&Shutdown::new()))
        .await
        .unwrap();

    assert!(matches!(
        report.exits.as_slice(),
        [(symbol, ExitReason::TransportFailed(_))] if symbol == "BTCUSDT"
    ));
    assert_eq!(
        h.metrics.transport_failures.with_label_values(&["binance"]).get(),
        1
    );
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn connection_reset_ends_strategy_as_transport_failure() {
    let (url, _) = fake_provider(
        vec![r#"{"s":"BTCUSDT","p":"1"}"#],
        false,
        AfterFrames::Reset,
    )
    .await;
    let h = harness(&format!(
        "[binance]\nws_base_endpoint = \"{url}\"\n[feed.symbols]\nBTCUSDT = \"BTCUSD\"\n"
    ));

    let report = tokio::time::timeout(Duration::from_secs(5), h.supervisor.start(&Shutdown::new()))
        .await
        .expect("supervisor should return once the reset strategy exits");

    assert!(matches!(
        report.exits.as_slice(),
        [(symbol, ExitReason::TransportFailed(_))] if symbol == "BTCUSDT"
    ));
    assert_eq!(report.ticks_relayed, 1);
    assert_eq!(
        h.metrics.transport_failures.with_label_values(&["binance"]).get(),
        1
    );
    assert_eq!(h.supervisor.connected_feeds(), 0);
}
