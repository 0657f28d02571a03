use crate::*;

use conway_core::ReplyStatus;

const JOB_TIME: Duration = Duration::from_millis(300);

/// With N dispatch permits, N+1 simultaneous clients are all served, at
/// most N engine calls overlap, and the extra one waits rather than fails.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dispatch_cap_delays_extra_client() {
    let engine = spawn_engine("tam=4; gens=1; tempo=0.300; \n", JOB_TIME).await;
    let mut config = test_config(engine.port, engine.port);
    config.dispatch.max_concurrent = 2;
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let started = std::time::Instant::now();
    let mut clients = Vec::new();
    for _ in 0..3 {
        let addr = dispatcher.addr;
        clients.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await.unwrap();
            client.call(job("mpi", 2, 2)).await.unwrap()
        }));
    }
    for handle in clients {
        let reply = handle.await.unwrap();
        assert_eq!(reply.status, ReplyStatus::Ok);
    }
    let elapsed = started.elapsed();

    assert_eq!(engine.stats.served.load(Ordering::SeqCst), 3);
    assert_eq!(engine.stats.peak.load(Ordering::SeqCst), 2);
    // The third job could only start once one of the first two finished.
    assert!(elapsed >= JOB_TIME * 2, "finished in {elapsed:?}");

    dispatcher.stop().await.unwrap();
}

/// Idle connections hold no permit: with one permit, a silent client does
/// not block a second client's job.
#[tokio::test]
async fn test_idle_connection_holds_no_permit() {
    let engine = spawn_engine("done", Duration::ZERO).await;
    let mut config = test_config(engine.port, engine.port);
    config.dispatch.max_concurrent = 1;
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let _idle = Client::connect(dispatcher.addr).await.unwrap();
    let mut busy = Client::connect(dispatcher.addr).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), busy.call(job("spark", 1, 1)))
        .await
        .expect("idle connection blocked dispatch")
        .unwrap();
    assert_eq!(reply.data.as_deref(), Some("done"));
    assert_eq!(dispatcher.ctx.in_flight(), 0);

    dispatcher.stop().await.unwrap();
}

/// Many clients at once against a larger pool all get answers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_of_clients_all_answered() {
    let engine = spawn_engine("ok", Duration::from_millis(20)).await;
    let mut config = test_config(engine.port, engine.port);
    config.dispatch.max_concurrent = 8;
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let mut clients = Vec::new();
    for i in 0..32 {
        let addr = dispatcher.addr;
        clients.push(tokio::spawn(async move {
            let mut client = Client::connect(addr).await.unwrap();
            client.call(job("mpi", i, i)).await.unwrap()
        }));
    }
    let mut ids = std::collections::HashSet::new();
    for handle in clients {
        let reply = handle.await.unwrap();
        assert_eq!(reply.status, ReplyStatus::Ok);
        ids.insert(reply.request_id);
    }

    assert_eq!(ids.len(), 32);
    assert!(engine.stats.peak.load(Ordering::SeqCst) <= 8);

    dispatcher.stop().await.unwrap();
}
