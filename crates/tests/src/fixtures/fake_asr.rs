use async_trait::async_trait;
use scribeline_transcription::{AsrBackend, AsrError, AsrRequest, FullTranscription, TranscriptSegment, TranscriptionResult};
use tokio::sync::Mutex;

/// A deterministic stand-in for a real ASR backend, driven by a fixed
/// queue of responses consumed in order — mirrors the `StubAsr` fixture
/// used in `scribeline_transcription::manager`'s own unit tests, lifted
/// here so cross-crate integration tests can drive the same manager
/// without a network call.
pub struct FakeAsrBackend {
    responses: Mutex<Vec<&'static str>>,
}

impl FakeAsrBackend {
    pub fn new(responses: Vec<&'static str>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl AsrBackend for FakeAsrBackend {
    async fn transcribe(&self, _request: AsrRequest) -> Result<TranscriptionResult, AsrError> {
        let mut responses = self.responses.lock().await;
        let text = if responses.is_empty() {
            String::new()
        } else {
            responses.remove(0).to_string()
        };
        Ok(TranscriptionResult {
            text,
            language_detected: None,
            duration: 6.0,
            translated: None,
            original_text: None,
            confidence: 0.92,
        })
    }

    async fn transcribe_full(&self, _wav_bytes: Vec<u8>) -> Result<FullTranscription, AsrError> {
        Ok(FullTranscription {
            text: "Hello world. This is a test meeting.".to_string(),
            segments: vec![
                TranscriptSegment { start: 0.0, end: 2.0, text: "Hello world.".to_string() },
                TranscriptSegment { start: 2.0, end: 5.0, text: "This is a test meeting.".to_string() },
            ],
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}
