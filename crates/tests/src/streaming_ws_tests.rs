use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::fixtures::test_app::TestApp;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn binary_frame(client_timestamp: f64, pcm: &[u8]) -> Vec<u8> {
    let mut frame = client_timestamp.to_le_bytes().to_vec();
    frame.extend_from_slice(pcm);
    frame
}

fn loud_speech(secs: f64) -> Vec<u8> {
    let samples = (secs * 16_000.0) as usize;
    vec![0x10, 0x27].repeat(samples)
}

async fn next_json(stream: &mut WsStream) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for a websocket frame")
        .expect("stream ended unexpectedly")
        .expect("websocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(text.as_str()).expect("frame was not valid JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn connecting_sends_a_connected_frame_with_the_session_id() {
    let app = TestApp::spawn().await;
    let url = app.ws_url("/ws/streaming-audio?session_id=ws-session-1&meeting_id=meeting-ws-1");

    let (mut ws_stream, _) = connect_async(url).await.expect("failed to connect");
    let connected = next_json(&mut ws_stream).await;

    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["session_id"], "ws-session-1");
    assert!(connected["timestamp"].is_string());
}

#[tokio::test]
async fn missing_credential_rejects_with_groq_key_required_and_closes() {
    let app = TestApp::spawn_with(|settings| settings.asr_api_key = None).await;
    let url = app.ws_url("/ws/streaming-audio?session_id=ws-session-no-key");

    let (mut ws_stream, _) = connect_async(url).await.expect("failed to connect");
    let error = next_json(&mut ws_stream).await;

    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "GROQ_KEY_REQUIRED");

    let next = tokio::time::timeout(Duration::from_secs(5), ws_stream.next())
        .await
        .expect("timed out waiting for the socket to close");
    match next {
        Some(Ok(Message::Close(_))) | None => {}
        other => panic!("expected the socket to close after the error frame, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_control_frame_is_answered_with_pong() {
    let app = TestApp::spawn().await;
    let url = app.ws_url("/ws/streaming-audio?session_id=ws-session-2");

    let (mut ws_stream, _) = connect_async(url).await.expect("failed to connect");
    let _connected = next_json(&mut ws_stream).await;

    ws_stream
        .send(Message::Text(serde_json::json!({ "type": "ping" }).to_string().into()))
        .await
        .expect("failed to send ping");

    let pong = next_json(&mut ws_stream).await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn a_long_punctuated_sentence_produces_a_final_frame() {
    let app = TestApp::spawn().await;
    let url = app.ws_url("/ws/streaming-audio?session_id=ws-session-3&meeting_id=meeting-ws-3");

    let (mut ws_stream, _) = connect_async(url).await.expect("failed to connect");
    let _connected = next_json(&mut ws_stream).await;

    // The fixture ASR backend always answers "Hello world." — enough
    // contiguous loud speech to fill the rolling window past viability
    // and past the punctuation-minimum duration triggers an immediate
    // finalization on the first backend call.
    ws_stream
        .send(Message::Binary(binary_frame(0.0, &loud_speech(6.5)).into()))
        .await
        .expect("failed to send audio frame");

    let mut saw_final = false;
    for _ in 0..5 {
        let frame = next_json(&mut ws_stream).await;
        if frame["type"] == "final" {
            assert_eq!(frame["text"], "Hello world.");
            assert!(frame["audio_start_time"].is_number());
            saw_final = true;
            break;
        }
    }
    assert!(saw_final, "expected a final frame after a long punctuated sentence");
}
