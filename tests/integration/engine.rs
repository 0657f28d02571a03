use crate::*;

use conway_core::ReplyStatus;
use conway_engine::{EngineConfig, EngineServer};

/// Start a real engine server whose "simulation" is a shell script.
async fn spawn_script_engine(script: &str) -> (u16, broadcast::Sender<()>) {
    let config = EngineConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        timeout_secs: 10,
        ..EngineConfig::default()
    };
    let listener = TcpListener::bind(config.bind_addr()).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (shutdown, rx) = broadcast::channel(1);
    tokio::spawn(Arc::new(EngineServer::new(&config)).serve(listener, rx));
    (port, shutdown)
}

/// Dispatcher → engine server → external program, one line per power.
#[tokio::test]
async fn test_end_to_end_with_engine_server() {
    let script = r#"p=$1; while [ "$p" -le "$2" ]; do echo "tam=$((1 << p)); gens=$((p * 2)); tempo=0.010; "; p=$((p + 1)); done"#;
    let (port, engine_shutdown) = spawn_script_engine(script).await;
    let (store, url) = spawn_store().await;

    let mut config = test_config(port, port);
    config.telemetry.enabled = true;
    config.telemetry.url = url;
    let dispatcher = Dispatcher::start(config).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("mpi", 3, 5)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Ok);
    assert_eq!(
        reply.data.as_deref(),
        Some("tam=8; gens=6; tempo=0.010; \ntam=16; gens=8; tempo=0.010; \ntam=32; gens=10; tempo=0.010; \n")
    );

    drop(client);
    dispatcher.stop().await.unwrap();
    let _ = engine_shutdown.send(());

    let docs = store.docs.lock().unwrap();
    let doc = &docs[0].1;
    // Board size is the last line's, generations are summed.
    assert_eq!(doc["board_size"], 32);
    assert_eq!(doc["num_generations"], 24);
    assert_eq!(doc["duration_ms"].as_f64(), Some(10.0));
}

/// A failing program surfaces as an error reply through the dispatcher.
#[tokio::test]
async fn test_engine_program_failure_is_error_reply() {
    let (port, engine_shutdown) = spawn_script_engine("echo 'mpirun: not found' >&2; exit 127").await;
    let dispatcher = Dispatcher::start(test_config(port, port)).await.unwrap();

    let mut client = Client::connect(dispatcher.addr).await.unwrap();
    let reply = client.call(job("mpi", 1, 1)).await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Error);
    assert_eq!(reply.data, None);
    assert_eq!(
        reply.error.as_deref(),
        Some("ERROR: exit code 127: mpirun: not found")
    );

    dispatcher.stop().await.unwrap();
    let _ = engine_shutdown.send(());
}
