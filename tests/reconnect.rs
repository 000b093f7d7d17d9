//! Drives the full client stack (login, a single real transport
//! session, the fan's window processor) against local mock servers.
//! Covers spec.md §8's S4 scenario: a dropped session reconnects and
//! the reconnect's announce frame never reaches a subscriber.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scratch_cloud::{ClientConfig, CloudClient, Source};

/// Serves exactly two connection epochs: the first drops after its
/// handshake ack to force a reconnect, the second sends a reconnect
/// announce frame (which must be ignored) followed by a real update.
async fn spawn_mock_transport() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // Epoch 1: handshake ack, then drop.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text("{\"ack\":true}\n".to_string()))
            .await
            .unwrap();
        drop(ws);

        // Epoch 2: handshake ack, reconnect announce (ignored), then a
        // real update that must reach the subscriber.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Text("{\"ack\":true}\n".to_string()))
            .await
            .unwrap();
        ws.send(Message::Text(
            "{\"name\":\"\u{2601} score\",\"value\":\"15\"}\n".to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            "{\"name\":\"\u{2601} score\",\"value\":\"20\"}\n".to_string(),
        ))
        .await
        .unwrap();

        // Keep the socket open; the test shuts the client down itself.
        while ws.next().await.is_some() {}
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn reconnect_ignores_announce_frame_but_delivers_the_next_update() {
    let login_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "scratchsessionsid=tok; Path=/")
                .set_body_json(serde_json::json!([{"token": "authtok"}])),
        )
        .mount(&login_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&login_server)
        .await;

    let transport_url = spawn_mock_transport().await;

    let config = ClientConfig::default()
        .with_connections(1)
        .with_default_listen_mode(Source::Transport)
        .with_transport_url(transport_url)
        .with_login_url(format!("{}/login/", login_server.uri()))
        .with_change_log_url(format!("{}/logs", login_server.uri()));

    let client = CloudClient::connect("alice", "hunter2", "1", config).await;

    let seen_values = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_for_cb = Arc::clone(&seen_values);
    let announce_count = Arc::new(AtomicUsize::new(0));
    let announce_for_cb = Arc::clone(&announce_count);
    client.on_variable_set(Box::new(move |event| {
        if event.name != "score" {
            return;
        }
        if event.value == "15" {
            announce_for_cb.fetch_add(1, Ordering::SeqCst);
        }
        seen_for_cb.lock().unwrap().push(event.value.clone());
    }));

    // The fan's build step waits a fixed connect+handshake window
    // (config::CONNECT_TIMEOUT + config::HANDSHAKE_TIMEOUT) before it
    // even checks connectivity, so this generously outlives that gate.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(20);
    loop {
        if client.get_variable("score") == "20" {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for the reconnect's real update to arrive"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    assert_eq!(
        announce_count.load(Ordering::SeqCst),
        0,
        "the reconnect announce frame must never reach the subscriber"
    );
    assert_eq!(seen_values.lock().unwrap().as_slice(), ["20"]);
    assert_eq!(client.get_variable("score"), "20");

    client.shutdown().await;
}
