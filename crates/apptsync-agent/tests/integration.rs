use apptsync_adapter_athena::{AthenaClient, AthenaClientConfig};
use apptsync_adapter_sink::{HttpSink, SinkConfig};
use apptsync_core::{
    normalize, ChangeSource, CredentialCache, CredentialPolicy, Cursor, PollWorker,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn athena_config() -> Option<AthenaClientConfig> {
    if std::env::var("APPTSYNC_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set APPTSYNC_INTEGRATION=1 to run");
        return None;
    }

    let client_id = std::env::var("APPTSYNC_CLIENT_ID").expect("APPTSYNC_CLIENT_ID");
    let client_secret = std::env::var("APPTSYNC_CLIENT_SECRET").expect("APPTSYNC_CLIENT_SECRET");
    let mut config = AthenaClientConfig {
        client_id,
        client_secret,
        ..Default::default()
    };
    if let Ok(base_url) = std::env::var("APPTSYNC_API_BASE_URL") {
        config.base_url = base_url;
    }
    if let Ok(practice_id) = std::env::var("APPTSYNC_PRACTICE_ID") {
        config.practice_id = practice_id;
    }
    Some(config)
}

/// Answers every request with 200 and counts them.
async fn accepting_sink() -> (String, tokio::task::JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/events", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let mut accepted = 0;
        while let Ok(Ok((mut socket, _))) =
            tokio::time::timeout(Duration::from_secs(5), listener.accept()).await
        {
            let mut buf = vec![0u8; 1 << 20];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await;
            accepted += 1;
        }
        accepted
    });
    (url, handle)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_and_normalize_live_feed() {
    let Some(config) = athena_config() else {
        return;
    };

    let client = AthenaClient::new(config).unwrap();
    let credentials = CredentialCache::new(client.clone(), CredentialPolicy::default());
    let credential = credentials.get_valid_credential().await.unwrap();

    let status = client.subscriptions(&credential).await.unwrap();
    if !status.is_active() {
        client.subscribe(&credential, None).await.unwrap();
    }

    let page = client
        .fetch_changes(&credential, &Cursor::None)
        .await
        .unwrap();
    let batch = normalize(&page.records);
    assert!(batch.len() <= page.records.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_cycle_against_live_feed() {
    let Some(config) = athena_config() else {
        return;
    };

    let (sink_url, sink_server) = accepting_sink().await;
    let client = AthenaClient::new(config).unwrap();
    let practice_id = client.practice_id().to_string();
    let mut worker = PollWorker::new(
        practice_id,
        CredentialCache::new(client.clone(), CredentialPolicy::default()),
        client,
        HttpSink::new(SinkConfig::new(sink_url)).unwrap(),
    );

    worker.bootstrap().await.unwrap();
    let result = worker.run_cycle().await;
    assert!(result.is_success(), "cycle failed: {:?}", result.error);
    assert_eq!(worker.stats().poll_count, 1);

    drop(worker);
    let _ = sink_server.await;
}
