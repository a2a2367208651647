mod common;

use std::time::Duration;

use common::{ServerOptions, echo_server, server};
use ws_probe::{
    Connection, ConnectionSettings, Error, Event, Message, ProbeConfig, ProbeKind, WebSocket,
    probe,
};

fn output_lines(out: &[u8]) -> Vec<String> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[tokio::test]
async fn ping_probe_against_echo_server() {
    let url = echo_server().await;
    let mut ws = WebSocket::connect(&url, &ConnectionSettings::default())
        .await
        .unwrap();
    let config = ProbeConfig {
        count: 3,
        interval: Duration::from_millis(20),
        ..ProbeConfig::new(ProbeKind::Ping, url.clone())
    };

    let mut out = Vec::new();
    let report = probe::run(&mut ws, &config, &mut out, std::future::pending())
        .await
        .unwrap();

    assert!(!report.cancelled);
    let sequences: Vec<_> = report.results.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, [1, 2, 3]);

    let lines = output_lines(&out);
    assert_eq!(lines[0], format!("PING {url} with 32 bytes of data"));
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("sequence=1, time="));
    assert!(ws.is_closed());
}

#[tokio::test]
async fn pong_probe_with_message() {
    let url = echo_server().await;
    let mut ws = WebSocket::connect(&url, &ConnectionSettings::default())
        .await
        .unwrap();
    let config = ProbeConfig {
        count: 2,
        interval: Duration::from_millis(10),
        message: Some(b"hello".to_vec()),
        ..ProbeConfig::new(ProbeKind::Pong, url.clone())
    };

    let mut out = Vec::new();
    let report = probe::run(&mut ws, &config, &mut out, std::future::pending())
        .await
        .unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(
        output_lines(&out)[0],
        format!("Sent unsolicited PONG of 5 bytes of data to {url}")
    );
}

#[tokio::test]
async fn unanswered_ping_times_out() {
    let url = server(ServerOptions {
        mute_pings: true,
        ..ServerOptions::default()
    })
    .await;
    let settings = ConnectionSettings {
        message_timeout: Some(Duration::from_millis(100)),
        ..ConnectionSettings::default()
    };
    let mut ws = WebSocket::connect(&url, &settings).await.unwrap();
    let config = ProbeConfig {
        reply_timeout: settings.message_timeout,
        ..ProbeConfig::new(ProbeKind::Ping, url)
    };

    let mut out = Vec::new();
    let err = probe::run(&mut ws, &config, &mut out, std::future::pending())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(_)), "{err}");
    assert_eq!(output_lines(&out).len(), 1);
}

#[tokio::test]
async fn unbounded_probe_stops_when_cancelled() {
    let url = echo_server().await;
    let mut ws = WebSocket::connect(&url, &ConnectionSettings::default())
        .await
        .unwrap();
    let config = ProbeConfig {
        count: -1,
        interval: Duration::from_millis(10),
        ..ProbeConfig::new(ProbeKind::Ping, url)
    };

    let mut out = Vec::new();
    let report = probe::run(
        &mut ws,
        &config,
        &mut out,
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    assert!(report.cancelled);
    assert!(!report.results.is_empty());
    assert_eq!(output_lines(&out).len(), report.results.len() + 1);
}

#[tokio::test]
async fn messages_are_echoed_and_reassembled() {
    let url = echo_server().await;
    let mut ws = WebSocket::connect(&url, &ConnectionSettings::default())
        .await
        .unwrap();

    ws.send_text("hello").await.unwrap();
    assert_eq!(
        ws.next_event().await,
        Some(Event::Message(Message::Text("hello".into())))
    );

    // spans several frames
    let big = vec![7u8; 100 * 1024];
    ws.send_bytes(&big).await.unwrap();
    assert_eq!(ws.next_event().await, Some(Event::Message(Message::Binary(big))));

    ws.close(1000, "").await.unwrap();
    ws.close(1000, "").await.unwrap();
    assert!(ws.is_closed());
    assert!(matches!(ws.send_text("late").await, Err(Error::Closed)));
}

#[tokio::test]
async fn data_after_the_handshake_is_not_lost() {
    let url = server(ServerOptions {
        greeting: Some("welcome".into()),
        ..ServerOptions::default()
    })
    .await;
    let mut ws = WebSocket::connect(&url, &ConnectionSettings::default())
        .await
        .unwrap();

    assert_eq!(
        ws.next_event().await,
        Some(Event::Message(Message::Text("welcome".into())))
    );
}

#[tokio::test]
async fn oversized_message_closes_the_connection() {
    let url = echo_server().await;
    let settings = ConnectionSettings {
        max_message_size: 1024,
        ..ConnectionSettings::default()
    };
    let mut ws = WebSocket::connect(&url, &settings).await.unwrap();

    ws.send_text(&"x".repeat(2048)).await.unwrap();
    assert!(matches!(ws.next_event().await, Some(Event::Closed(_))));
    assert!(ws.is_closed());
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = WebSocket::connect(&format!("ws://127.0.0.1:{port}"), &ConnectionSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Upgrade(_)), "{err}");
}
