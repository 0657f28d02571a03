use crate::*;

use conway_core::ReplyStatus;

fn with_store(mut config: ConwayConfig, url: &str) -> ConwayConfig {
    config.telemetry.enabled = true;
    config.telemetry.url = url.to_string();
    config
}

fn parse_time(value: &serde_json::Value) -> chrono::DateTime<chrono::Utc> {
    let text = value.as_str().expect("timestamp is a string");
    assert!(text.ends_with('Z'), "not UTC: {text}");
    chrono::DateTime::parse_from_rfc3339(text)
        .expect("timestamp is RFC 3339")
        .with_timezone(&chrono::Utc)
}

/// One record per request, indexed under the configured index, carrying
/// the metrics pulled out of the engine text.
#[tokio::test]
async fn test_record_indexed_per_request() {
    let (store, url) = spawn_store().await;
    let spark = spawn_engine("tam=16; gens=36; tempo=0.045; \n", Duration::ZERO).await;
    let config = with_store(test_config(unused_port().await, spark.port), &url);
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("spark", 4, 4)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Ok);
    drop(client);
    dispatcher.stop().await.unwrap();

    let docs = store.docs.lock().unwrap();
    assert_eq!(docs.len(), 1);
    let (index, doc) = &docs[0];
    assert_eq!(index, "observabilidade");
    assert_eq!(doc["request_id"], reply.request_id.as_str());
    assert_eq!(doc["client_id"], "127.0.0.1");
    assert_eq!(doc["engine"], "spark");
    assert_eq!(doc["powmin"], 4);
    assert_eq!(doc["powmax"], 4);
    assert_eq!(doc["status"], "ok");
    assert!(doc["error_message"].is_null());
    assert_eq!(doc["board_size"], 16);
    assert_eq!(doc["num_generations"], 36);
    assert_eq!(doc["duration_ms"].as_f64(), Some(45.0));
    assert_eq!(doc["host_node"], "it-node");
    assert_eq!(doc["num_clients_active"], 1);

    let start = parse_time(&doc["start_time"]);
    let end = parse_time(&doc["end_time"]);
    let stamp = parse_time(&doc["timestamp"]);
    assert!(start <= end && end <= stamp);
}

/// Failed requests are recorded too, with sentinel metrics.
#[tokio::test]
async fn test_failed_request_recorded_with_sentinels() {
    let (store, url) = spawn_store().await;
    let dead = unused_port().await;
    let dispatcher = Dispatcher::start(with_store(test_config(dead, dead), &url))
        .await
        .unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("mpi", 1, 2)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Error);
    drop(client);
    dispatcher.stop().await.unwrap();

    let docs = store.docs.lock().unwrap();
    let doc = &docs[0].1;
    assert_eq!(doc["status"], "error");
    assert_eq!(doc["error_message"].as_str(), reply.error.as_deref());
    assert_eq!(doc["board_size"], -1);
    assert_eq!(doc["num_generations"], -1);
    assert_eq!(doc["duration_ms"].as_f64(), Some(0.0));
}

/// A store answering 503 is retried up to max_attempts; the client reply
/// is unaffected.
#[tokio::test]
async fn test_rejecting_store_does_not_alter_reply() {
    let (store, url) = spawn_store().await;
    store.status.store(503, Ordering::SeqCst);
    let mpi = spawn_engine("tam=8; gens=2; tempo=0.002; ", Duration::ZERO).await;
    let mut config = with_store(test_config(mpi.port, mpi.port), &url);
    config.telemetry.max_attempts = 3;
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let started = std::time::Instant::now();
    let reply = client.call(job("mpi", 3, 3)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(reply.data.as_deref(), Some("tam=8; gens=2; tempo=0.002; "));

    drop(client);
    let telemetry = dispatcher.telemetry.clone();
    dispatcher.stop().await.unwrap();

    assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    assert!(store.docs.lock().unwrap().is_empty());
    assert_eq!(telemetry.stats().failed(), 1);
}

/// A permanent rejection (4xx) is not retried.
#[tokio::test]
async fn test_bad_request_from_store_not_retried() {
    let (store, url) = spawn_store().await;
    store.status.store(400, Ordering::SeqCst);
    let mpi = spawn_engine("x", Duration::ZERO).await;
    let mut config = with_store(test_config(mpi.port, mpi.port), &url);
    config.telemetry.max_attempts = 5;
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    client.call(job("mpi", 1, 1)).await.unwrap();
    drop(client);
    dispatcher.stop().await.unwrap();

    assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
}

/// An unreachable store costs the client nothing.
#[tokio::test]
async fn test_unreachable_store_does_not_alter_reply() {
    let store_url = format!("http://127.0.0.1:{}", unused_port().await);
    let mpi = spawn_engine("fine", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(with_store(test_config(mpi.port, mpi.port), &store_url))
        .await
        .unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    for _ in 0..3 {
        let reply = client.call(job("mpi", 1, 1)).await.unwrap();
        assert_eq!(reply.status, ReplyStatus::Ok);
        assert_eq!(reply.data.as_deref(), Some("fine"));
    }

    drop(client);
    let telemetry = dispatcher.telemetry.clone();
    dispatcher.stop().await.unwrap();
    assert_eq!(telemetry.stats().delivered(), 0);
    assert_eq!(telemetry.stats().failed(), 3);
}
