use crate::*;

use conway_core::wire::INVALID_JSON_REPLY;
use conway_core::ReplyStatus;

/// A valid job gets the engine's text back verbatim, and the engine only
/// ever sees the two powers.
#[tokio::test]
async fn test_ok_reply_carries_engine_text() {
    let mpi = spawn_engine("mpi output\n", Duration::ZERO).await;
    let spark = spawn_engine("tam=8; gens=12; tempo=0.010; \n", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, spark.port)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("spark", 3, 3)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(reply.data.as_deref(), Some("tam=8; gens=12; tempo=0.010; \n"));
    assert_eq!(reply.error, None);
    assert!(!reply.request_id.is_empty());

    let reply = client.call(job("mpi", 1, 2)).await.unwrap();
    assert_eq!(reply.data.as_deref(), Some("mpi output\n"));

    assert_eq!(
        spark.stats.requests.lock().unwrap().as_slice(),
        &[serde_json::json!({ "powmin": 3, "powmax": 3 })]
    );
    assert_eq!(mpi.stats.served.load(Ordering::SeqCst), 1);

    drop(client);
    dispatcher.stop().await.unwrap();
}

/// powmin > powmax is not validated; it goes to the engine as-is.
#[tokio::test]
async fn test_inverted_range_is_forwarded() {
    let mpi = spawn_engine("", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, unused_port().await))
        .await
        .unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("mpi", 7, 2)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(
        mpi.stats.requests.lock().unwrap()[0],
        serde_json::json!({ "powmin": 7, "powmax": 2 })
    );

    dispatcher.stop().await.unwrap();
}

/// Undecodable input gets the fixed envelope and the connection is closed.
#[tokio::test]
async fn test_malformed_request_closes_connection() {
    let mpi = spawn_engine("unused", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, mpi.port)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    client.send_raw(b"hello, engine\n").await.unwrap();
    let received = client.read_to_close().await.unwrap();
    assert_eq!(received, INVALID_JSON_REPLY);
    assert_eq!(mpi.stats.served.load(Ordering::SeqCst), 0);

    dispatcher.stop().await.unwrap();
}

/// A valid reply first, then garbage: the first reply stands, then close.
#[tokio::test]
async fn test_malformed_after_valid_request() {
    let mpi = spawn_engine("ok", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, mpi.port)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let first = client.call(job("mpi", 1, 1)).await.unwrap();
    assert_eq!(first.status, ReplyStatus::Ok);

    client.send_raw(br#"{"engine":"mpi","powmin":"x","powmax":1}"#).await.unwrap();
    assert_eq!(client.read_to_close().await.unwrap(), INVALID_JSON_REPLY);

    dispatcher.stop().await.unwrap();
}

/// An engine reporting its own failure yields status=error, data=null.
#[tokio::test]
async fn test_engine_error_text_is_error_reply() {
    let mpi = spawn_engine("ERROR: mpirun not found", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, mpi.port)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("mpi", 1, 3)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Error);
    assert_eq!(reply.data, None);
    assert_eq!(reply.error.as_deref(), Some("ERROR: mpirun not found"));

    // The connection survives engine failures.
    let again = client.call(job("mpi", 1, 3)).await.unwrap();
    assert_eq!(again.status, ReplyStatus::Error);
    assert_ne!(again.request_id, reply.request_id);

    dispatcher.stop().await.unwrap();
}

/// Nothing listening at the engine address: prompt error reply.
#[tokio::test]
async fn test_unreachable_engine() {
    let dead = unused_port().await;
    let dispatcher = Dispatcher::start(test_config(dead, dead)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let started = std::time::Instant::now();
    let reply = client.call(job("spark", 2, 4)).await.unwrap();
    assert!(started.elapsed() < PROMPT);
    assert_eq!(reply.status, ReplyStatus::Error);
    assert_eq!(reply.data, None);
    assert!(reply.error.unwrap().contains("unreachable"));

    dispatcher.stop().await.unwrap();
}

/// An engine that never answers is cut off at the configured timeout.
#[tokio::test]
async fn test_silent_engine_times_out() {
    let slow = spawn_engine("too late", Duration::from_secs(30)).await;
    let mut config = test_config(slow.port, slow.port);
    config.dispatch.engine_timeout_secs = 1;
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("mpi", 1, 1)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Error);
    assert!(reply.error.unwrap().contains("did not reply within 1s"));

    dispatcher.stop().await.unwrap();
}

/// Unknown engine selector: error reply, connection stays usable.
#[tokio::test]
async fn test_unknown_engine_keeps_connection() {
    let mpi = spawn_engine("fine", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, mpi.port)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let rejected = client.call(job("cuda", 1, 1)).await.unwrap();
    assert_eq!(rejected.status, ReplyStatus::Error);
    assert!(rejected.error.unwrap().contains("unknown engine"));

    let accepted = client.call(job("mpi", 1, 1)).await.unwrap();
    assert_eq!(accepted.data.as_deref(), Some("fine"));

    dispatcher.stop().await.unwrap();
}

/// Back-to-back requests in one write are answered in order.
#[tokio::test]
async fn test_pipelined_requests_answer_in_order() {
    let mpi = spawn_engine("m", Duration::ZERO).await;
    let spark = spawn_engine("s", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, spark.port)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    client
        .send_raw(br#"{"engine":"spark","powmin":1,"powmax":1}{"engine":"mpi","powmin":1,"powmax":1}"#)
        .await
        .unwrap();
    let first = client.reply().await.unwrap().unwrap();
    let second = client.reply().await.unwrap().unwrap();
    assert_eq!(first.data.as_deref(), Some("s"));
    assert_eq!(second.data.as_deref(), Some("m"));

    dispatcher.stop().await.unwrap();
}

/// The registry tracks live connections and forgets closed ones.
#[tokio::test]
async fn test_connection_registry_follows_clients() {
    let mpi = spawn_engine("x", Duration::ZERO).await;
    let dispatcher = Dispatcher::start(test_config(mpi.port, mpi.port)).await.unwrap();

    let mut a = Client::connect(dispatcher.addr).await.unwrap();
    let mut b = Client::connect(dispatcher.addr).await.unwrap();
    a.call(job("mpi", 1, 1)).await.unwrap();
    b.call(job("mpi", 1, 1)).await.unwrap();
    assert_eq!(dispatcher.ctx.connections.active(), 2);

    drop(a);
    drop(b);
    let deadline = tokio::time::Instant::now() + PROMPT;
    while dispatcher.ctx.connections.active() > 0 {
        assert!(tokio::time::Instant::now() < deadline, "connections never unregistered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    dispatcher.stop().await.unwrap();
}
