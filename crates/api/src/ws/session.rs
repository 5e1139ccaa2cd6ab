//! The single streaming-audio endpoint (`/ws/streaming-audio`). Follows the
//! teacher's `ws::handler` split — a receiver loop drives a dedicated worker
//! task over a channel — generalized from the teacher's per-room
//! multiplexed protocol to this crate's single binary-audio-in/JSON-out
//! protocol.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scribeline_transcription::{ManagerErrorCode, ManagerEvent, TriggerReason};

use crate::state::AppState;

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(15);
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub session_id: Option<String>,
    pub user_email: Option<String>,
    pub meeting_id: Option<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

/// One inbound audio frame, handed from the receiver task to the worker
/// task. `Terminate` is the drain sentinel enqueued during shutdown (spec
/// §4.1 step 3).
enum WorkerMsg {
    Frame { pcm: Vec<u8>, client_timestamp: Option<f64> },
    Terminate,
}

type WsSink = futures::stream::SplitSink<WebSocket, Message>;

async fn handle_socket(socket: WebSocket, state: AppState, params: WsParams) {
    let session_id = params.session_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(
        session_id,
        meeting_id = ?params.meeting_id,
        user_email = ?params.user_email,
        "streaming session connected"
    );

    // Step 1 of the session protocol (spec §4.1): a transcription
    // credential must be resolvable before anything else happens. Refusing
    // here, rather than waiting for the first backend call to fail, avoids
    // spinning up a manager/recorder for a session that can never produce
    // a transcript.
    if state.settings.asr_api_key.is_none() {
        warn!(session_id, "rejecting session, no transcription credential configured");
        let (mut sender, _receiver) = socket.split();
        if let Ok(text) = serde_json::to_string(&error_frame(
            ManagerErrorCode::GroqKeyRequired,
            "transcription credential missing or invalid",
        )) {
            let _ = sender.send(Message::Text(text.into())).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    if let Some(meeting_id) = &params.meeting_id {
        if let Err(e) = state.meeting_dao.touch(meeting_id).await {
            warn!(session_id, meeting_id, error = %e, "failed to touch meeting record");
        }
    }

    let streaming_config = scribeline_transcription::StreamingConfig::default();
    let manager_handle = state
        .runtime
        .get_or_create_manager(&session_id, state.asr.clone(), &streaming_config);

    let recorder = if state.settings.enable_audio_recording {
        let recorder_config = scribeline_transcription::RecorderConfig {
            staging_dir: format!("{}/{}", state.settings.recordings_storage_path, session_id),
            ..scribeline_transcription::RecorderConfig::default()
        };
        let recorder = state
            .runtime
            .get_or_create_recorder(&session_id, recorder_config, state.object_store.clone());
        recorder.start();
        Some(recorder)
    } else {
        None
    };

    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    send_json(
        &sender,
        json!({
            "type": "connected",
            "session_id": session_id,
            "message": "streaming session established",
            "timestamp": Utc::now().to_rfc3339(),
        }),
    )
    .await;

    let (worker_tx, worker_rx) = mpsc::channel::<WorkerMsg>(64);

    let worker_task = tokio::spawn(run_worker(
        worker_rx,
        manager_handle.clone(),
        recorder,
        state.transcript_segment_dao.clone(),
        sender.clone(),
        session_id.clone(),
        params.meeting_id.clone(),
    ));

    let last_activity = Arc::new(std::sync::Mutex::new(Instant::now()));
    let liveness_session_id = session_id.clone();
    let liveness_sender = sender.clone();
    let liveness_last_activity = last_activity.clone();
    let liveness_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let idle = {
                let guard = liveness_last_activity.lock().expect("liveness mutex poisoned");
                guard.elapsed()
            };
            if idle >= LIVENESS_TIMEOUT {
                warn!(session_id = liveness_session_id, "no client activity within timeout, closing");
                let mut guard = liveness_sender.lock().await;
                let _ = guard.send(Message::Close(None)).await;
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        *last_activity.lock().expect("liveness mutex poisoned") = Instant::now();
        match msg {
            Ok(Message::Binary(data)) => {
                let (client_timestamp, pcm) = split_timestamp_prefix(&data);
                if worker_tx
                    .send(WorkerMsg::Frame { pcm, client_timestamp })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                handle_control_message(&text, &sender).await;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(session_id, "client sent close frame");
                break;
            }
            Err(e) => {
                warn!(session_id, error = %e, "websocket receive error");
                break;
            }
        }
    }

    // Session teardown (spec §4.1):
    // 1. cancel the liveness monitor.
    liveness_task.abort();

    // 2. force-flush any remaining buffered audio, persist and emit it.
    {
        let mut guard = manager_handle.manager.lock().await;
        if let Some(segment) = guard.force_flush().await {
            drop(guard);
            if let Some(meeting_id) = &params.meeting_id {
                if let Err(e) = state
                    .transcript_segment_dao
                    .record(meeting_id, &segment.text, segment.audio_start_time)
                    .await
                {
                    warn!(session_id, error = %e, "failed to persist flushed segment");
                }
            }
            send_json(&sender, final_segment_frame(&segment)).await;
        }
    }

    // 3. enqueue the terminator sentinel and wait up to 5s for the worker to drain.
    let _ = worker_tx.send(WorkerMsg::Terminate).await;
    drop(worker_tx);
    if tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker_task).await.is_err() {
        warn!(session_id, "worker task did not drain within timeout");
    }

    // 4. stop the recorder and hand the meeting off to the detached finalizer.
    if let Some(recorder) = state.runtime.remove_recorder(&session_id) {
        match recorder.stop().await {
            Ok(summary) => {
                info!(
                    session_id,
                    chunk_count = summary.chunk_count,
                    duration_seconds = summary.total_duration_seconds,
                    "recorder stopped"
                );
                if let Some(meeting_id) = params.meeting_id.clone() {
                    let finalizer = state.finalizer.clone();
                    let diarization_pipeline = state.diarization_pipeline.clone();
                    tokio::spawn(async move {
                        let report = finalizer.finalize(&meeting_id).await;
                        info!(meeting_id, status = ?report.status, "finalizer run completed");
                        if report.diarization_triggered {
                            let outcome = diarization_pipeline.run(&meeting_id).await;
                            info!(meeting_id, ?outcome, "diarization pipeline run completed");
                        }
                    });
                }
            }
            Err(e) => warn!(session_id, error = %e, "failed to stop recorder"),
        }
    }

    // 5. decrement the connection count; destroy the manager at zero.
    if state.runtime.release_session(&session_id) {
        state.runtime.remove_session(&session_id);
        info!(session_id, "streaming session destroyed");
    }

    info!(session_id, "streaming session disconnected");
}

async fn handle_control_message(text: &str, sender: &Arc<Mutex<WsSink>>) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    if value.get("type").and_then(|t| t.as_str()) == Some("ping") {
        send_json(sender, json!({ "type": "pong" })).await;
    }
}

/// Splits an inbound binary frame per spec §4.1/§6: if at least 8 bytes
/// long, the leading 8 bytes are always a little-endian f64 client
/// timestamp and the remainder is raw PCM; shorter frames are raw PCM with
/// no timestamp.
fn split_timestamp_prefix(data: &[u8]) -> (Option<f64>, Vec<u8>) {
    if data.len() >= 8 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&data[..8]);
        (Some(f64::from_le_bytes(buf)), data[8..].to_vec())
    } else {
        (None, data.to_vec())
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<WorkerMsg>,
    manager_handle: Arc<crate::state::ManagerHandle>,
    recorder: Option<Arc<scribeline_transcription::AudioRecorder>>,
    transcript_segment_dao: Arc<scribeline_services::TranscriptSegmentDao>,
    sender: Arc<Mutex<WsSink>>,
    session_id: String,
    meeting_id: Option<String>,
) {
    while let Some(msg) = rx.recv().await {
        let (pcm, client_timestamp) = match msg {
            WorkerMsg::Frame { pcm, client_timestamp } => (pcm, client_timestamp),
            WorkerMsg::Terminate => break,
        };

        if let Some(recorder) = &recorder {
            if let Err(e) = recorder.add_chunk(&pcm).await {
                warn!(session_id, error = %e, "recorder chunk write failed");
            }
        }

        let events = {
            let mut guard = manager_handle.manager.lock().await;
            guard.process_frame(&pcm, client_timestamp).await
        };

        for event in events {
            match event {
                ManagerEvent::Final(segment) => {
                    if let Some(meeting_id) = &meeting_id {
                        if let Err(e) = transcript_segment_dao
                            .record(meeting_id, &segment.text, segment.audio_start_time)
                            .await
                        {
                            warn!(session_id, error = %e, "failed to persist final segment");
                        }
                    }
                    send_json(&sender, final_segment_frame(&segment)).await;
                }
                ManagerEvent::Error { code, message } => {
                    warn!(session_id, ?code, message, "transcription backend error");
                    send_json(&sender, error_frame(code, &message)).await;
                }
            }
        }
    }
}

fn final_segment_frame(segment: &scribeline_transcription::FinalSegment) -> serde_json::Value {
    let mut frame = json!({
        "type": "final",
        "text": segment.text,
        "confidence": segment.confidence,
        "reason": reason_str(segment.reason),
        "timestamp": Utc::now().to_rfc3339(),
        "audio_start_time": segment.audio_start_time,
        "audio_end_time": segment.audio_end_time,
        "duration": segment.duration,
    });
    if let Some(original_text) = &segment.original_text {
        frame["original_text"] = json!(original_text);
    }
    if let Some(translated) = segment.translated {
        frame["translated"] = json!(translated);
    }
    frame
}

fn reason_str(reason: TriggerReason) -> &'static str {
    reason.as_str()
}

fn error_frame(code: ManagerErrorCode, message: &str) -> serde_json::Value {
    let code_str = match code {
        ManagerErrorCode::GroqKeyRequired => "GROQ_KEY_REQUIRED",
        ManagerErrorCode::GroqRateLimit => "GROQ_RATE_LIMIT",
    };
    json!({
        "type": "error",
        "message": message,
        "code": code_str,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

async fn send_json(sender: &Arc<Mutex<WsSink>>, value: serde_json::Value) {
    let text = match serde_json::to_string(&value) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to serialize outbound frame");
            return;
        }
    };
    let mut guard = sender.lock().await;
    if let Err(e) = guard.send(Message::Text(text.into())).await {
        warn!(error = %e, "failed to send outbound frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_byte_prefix_is_stripped_as_timestamp() {
        let mut frame = 12.5f64.to_le_bytes().to_vec();
        frame.extend_from_slice(&[1, 2, 3, 4]);
        let (ts, pcm) = split_timestamp_prefix(&frame);
        assert_eq!(ts, Some(12.5));
        assert_eq!(pcm, vec![1, 2, 3, 4]);
    }

    #[test]
    fn short_frame_has_no_prefix() {
        let (ts, pcm) = split_timestamp_prefix(&[1, 2, 3]);
        assert_eq!(ts, None);
        assert_eq!(pcm, vec![1, 2, 3]);
    }

    #[test]
    fn exactly_eight_bytes_is_all_timestamp_and_no_pcm() {
        let frame = 0.0f64.to_le_bytes().to_vec();
        let (ts, pcm) = split_timestamp_prefix(&frame);
        assert_eq!(ts, Some(0.0));
        assert!(pcm.is_empty());
    }
}
