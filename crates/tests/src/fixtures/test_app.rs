use std::net::SocketAddr;
use std::sync::Arc;

use mongodb::Database;
use scribeline_api::state::{AppState, Runtime};
use scribeline_config::Settings;
use scribeline_services::{
    DiarizationJobDao, DiarizationPipeline, DiarizationPipelineConfig, DiarizationService, Finalizer,
    FinalizerConfig, MeetingDao, TranscriptSegmentDao, VersionStore,
};
use scribeline_transcription::LocalFsStore;
use tempfile::TempDir;

use super::fake_asr::FakeAsrBackend;

/// Spawns a real `scribeline-api` router bound to an ephemeral port, backed
/// by a real MongoDB database (one per test run, so tests never interfere)
/// and a temp-directory `ObjectStore`. Mirrors the teacher's
/// `TestApp::spawn()` fixture referenced throughout its `crates/tests`
/// suite (not itself part of the retrieved pack — reconstructed from its
/// call sites the same way `BaseDao<T>` was).
pub struct TestApp {
    pub addr: SocketAddr,
    pub db: Database,
    pub http: reqwest::Client,
    _storage_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Like `spawn`, but lets a test tweak `Settings` (e.g. to unset
    /// `asr_api_key` and exercise the accept-time credential check).
    pub async fn spawn_with(customize: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings::load().unwrap_or_default();
        settings.mongodb_db_name = format!("scribeline_test_{}", uuid::Uuid::new_v4().simple());
        settings.enable_audio_recording = true;
        settings.asr_api_key = Some("test-key".to_string());
        customize(&mut settings);

        let db = scribeline_db::connect(&settings)
            .await
            .expect("a reachable MongoDB instance is required for integration tests");

        let storage_dir = TempDir::new().expect("failed to create temp storage dir");
        let object_store: Arc<dyn scribeline_transcription::ObjectStore> =
            Arc::new(LocalFsStore::new(storage_dir.path().to_path_buf()));

        let asr = Arc::new(FakeAsrBackend::new(vec!["Hello world."]));

        let meeting_dao = Arc::new(MeetingDao::new(&db));
        let transcript_segment_dao = Arc::new(TranscriptSegmentDao::new(&db));
        let finalizer = Arc::new(Finalizer::new(
            object_store.clone(),
            FinalizerConfig {
                chunk_prefix: settings.audio_chunk_prefix.clone(),
                cloud_storage: false,
                delete_local_after_upload: false,
                trigger_diarization: false,
            },
        ));

        let diarization_job_dao = Arc::new(DiarizationJobDao::new(&db));
        let version_store = Arc::new(VersionStore::new(db.clone()));
        let diarization_service = Arc::new(DiarizationService::deepgram("unused".to_string(), asr.clone()));
        let diarization_pipeline = Arc::new(DiarizationPipeline::new(
            object_store.clone(),
            asr.clone(),
            diarization_service,
            version_store,
            diarization_job_dao,
            DiarizationPipelineConfig { enabled: false, chunk_prefix: settings.audio_chunk_prefix.clone() },
            "deepgram",
        ));

        let state = AppState {
            settings: Arc::new(settings),
            db: db.clone(),
            runtime: Arc::new(Runtime::new()),
            object_store,
            asr,
            meeting_dao,
            transcript_segment_dao,
            finalizer,
            diarization_pipeline,
        };

        let router = scribeline_api::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("listener has no local addr");

        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server crashed");
        });

        Self {
            addr,
            db,
            http: reqwest::Client::new(),
            _storage_dir: storage_dir,
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path_and_query: &str) -> String {
        format!("ws://{}{}", self.addr, path_and_query)
    }
}
