use candle_trader::feed::RestTradePoller;
use candle_trader::ingest::TradeIngestor;
use candle_trader::models::TradeSide;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const TRADES_BODY: &str = r#"[
    {"tid": 3, "timestamp": 1450000130, "price": "432.10", "amount": "0.5", "type": "sell"},
    {"tid": 2, "timestamp": 1450000070, "price": "431.00", "amount": "1.0", "type": "buy"},
    {"tid": 1, "timestamp": 1450000010, "price": "430.50", "amount": "0.25", "type": "buy"}
]"#;

fn poller(url: String) -> RestTradePoller {
    RestTradePoller::new(url, 600, Duration::from_millis(10))
        .unwrap()
        .with_max_backoff(Duration::from_millis(50))
}

#[tokio::test]
async fn test_fetch_decodes_and_orders_oldest_first() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/trades")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TRADES_BODY)
        .create_async()
        .await;

    let records = poller(format!("{}/trades", server.url())).fetch().await.unwrap();
    mock.assert_async().await;

    let trades: Vec<_> = records.into_iter().map(|r| r.unwrap()).collect();
    let ids: Vec<&str> = trades.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(trades[2].side, Some(TradeSide::Sell));
    assert_eq!(trades[0].price, Decimal::new(43050, 2));
}

#[tokio::test]
async fn test_repeated_polls_forward_each_trade_once() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/trades")
        .with_status(200)
        .with_body(TRADES_BODY)
        .expect(2)
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::channel(16);
    let mut ingestor = TradeIngestor::new(tx);
    let poller = poller(format!("{}/trades", server.url()));

    assert_eq!(poller.poll_once(&mut ingestor).await.unwrap(), 3);
    assert_eq!(poller.poll_once(&mut ingestor).await.unwrap(), 0);
    assert_eq!(ingestor.stats().duplicates, 3);

    let mut received = Vec::new();
    while let Ok(trade) = rx.try_recv() {
        received.push(trade.timestamp);
    }
    assert_eq!(received, vec![1450000010, 1450000070, 1450000130]);
}

#[tokio::test]
async fn test_malformed_records_rejected_individually() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/trades")
        .with_status(200)
        .with_body(
            r#"[
                {"tid": 1, "timestamp": 1450000010, "price": "abc", "amount": "1"},
                {"tid": 2, "timestamp": 1450000020, "price": "430", "amount": "1"},
                {"tid": 3, "price": "430", "amount": "1"}
            ]"#,
        )
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::channel(16);
    let mut ingestor = TradeIngestor::new(tx);
    let forwarded = poller(format!("{}/trades", server.url()))
        .poll_once(&mut ingestor)
        .await
        .unwrap();

    assert_eq!(forwarded, 1);
    assert_eq!(ingestor.stats().rejected, 2);
    assert_eq!(rx.try_recv().unwrap().id, "2");
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/trades")
        .with_status(503)
        .create_async()
        .await;

    let result = poller(format!("{}/trades", server.url())).fetch().await;
    tokio_test::assert_err!(result);
}

#[tokio::test]
async fn test_run_recovers_after_failures_and_stops_on_shutdown() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("GET", "/trades")
        .with_status(500)
        .expect(2)
        .create_async()
        .await;

    let (tx, mut rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = poller(format!("{}/trades", server.url()));
    let task = tokio::spawn(async move { poller.run(TradeIngestor::new(tx), shutdown_rx).await });

    // Wait out two failed attempts, then serve trades
    tokio::time::sleep(Duration::from_millis(40)).await;
    failing.remove_async().await;
    let _ok = server
        .mock("GET", "/trades")
        .with_status(200)
        .with_body(TRADES_BODY)
        .create_async()
        .await;

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("poller should recover")
        .unwrap();
    assert_eq!(first.id, "1");

    shutdown_tx.send(true).unwrap();
    let ingestor = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ingestor.stats().accepted, 3);
}
