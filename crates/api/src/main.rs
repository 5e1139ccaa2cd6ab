use std::sync::Arc;

use scribeline_api::state::{AppState, Runtime};
use scribeline_config::{DiarizationProvider, LogFormat, Settings, StorageType};
use scribeline_services::{
    DiarizationJobDao, DiarizationPipeline, DiarizationPipelineConfig, DiarizationService, Finalizer,
    FinalizerConfig, MeetingDao, TranscriptSegmentDao, VersionStore,
};
use scribeline_transcription::{GcsStore, HttpAsrBackend, LocalFsStore, ObjectStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let settings = Settings::load()?;
    init_tracing(&settings);

    info!(bind_addr = %settings.bind_addr, "starting scribeline-api");

    let db = scribeline_db::connect(&settings).await?;

    let object_store: Arc<dyn ObjectStore> = match settings.storage_type {
        StorageType::Local => Arc::new(LocalFsStore::new(settings.recordings_storage_path.clone())),
        StorageType::Gcp => {
            let bucket = settings
                .gcs_bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("GCS_BUCKET must be set when STORAGE_TYPE=gcp"))?;
            let token = settings
                .gcs_credentials_json
                .clone()
                .ok_or_else(|| anyhow::anyhow!("GCS_CREDENTIALS_JSON must be set when STORAGE_TYPE=gcp"))?;
            Arc::new(GcsStore::new(bucket, token))
        }
    };

    let asr_api_key = settings
        .asr_api_key
        .clone()
        .ok_or_else(|| anyhow::anyhow!("ASR_API_KEY must be set"))?;
    let asr = Arc::new(HttpAsrBackend::new(
        asr_api_key,
        settings.asr_api_url.clone(),
        None,
    ));

    let meeting_dao = Arc::new(MeetingDao::new(&db));
    let transcript_segment_dao = Arc::new(TranscriptSegmentDao::new(&db));

    let finalizer = Arc::new(Finalizer::new(
        object_store.clone(),
        FinalizerConfig {
            chunk_prefix: settings.audio_chunk_prefix.clone(),
            cloud_storage: matches!(settings.storage_type, StorageType::Gcp),
            delete_local_after_upload: settings.delete_local_after_upload,
            trigger_diarization: settings.enable_diarization,
        },
    ));

    let (diarization_service, provider_name) = match settings.diarization_provider {
        DiarizationProvider::Deepgram => (
            DiarizationService::deepgram(settings.deepgram_api_key.clone().unwrap_or_default(), asr.clone()),
            "deepgram",
        ),
        DiarizationProvider::Assemblyai => (
            DiarizationService::assemblyai(settings.assemblyai_api_key.clone().unwrap_or_default(), asr.clone()),
            "assemblyai",
        ),
    };
    let diarization_job_dao = Arc::new(DiarizationJobDao::new(&db));
    let version_store = Arc::new(VersionStore::new(db.clone()));
    let diarization_pipeline = Arc::new(DiarizationPipeline::new(
        object_store.clone(),
        asr.clone(),
        Arc::new(diarization_service),
        version_store,
        diarization_job_dao,
        DiarizationPipelineConfig {
            enabled: settings.enable_diarization,
            chunk_prefix: settings.audio_chunk_prefix.clone(),
        },
        provider_name,
    ));

    let state = AppState {
        settings: Arc::new(settings.clone()),
        db,
        runtime: Arc::new(Runtime::new()),
        object_store,
        asr,
        meeting_dao,
        transcript_segment_dao,
        finalizer,
        diarization_pipeline,
    };

    let router = scribeline_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!(bind_addr = %settings.bind_addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}
