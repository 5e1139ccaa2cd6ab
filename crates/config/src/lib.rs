use std::fmt;

use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Selects which `ObjectStore` backend services construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    Gcp,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Local => write!(f, "local"),
            StorageType::Gcp => write!(f, "gcp"),
        }
    }
}

/// Selects the cloud diarization provider consumed by C7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiarizationProvider {
    Deepgram,
    Assemblyai,
}

impl fmt::Display for DiarizationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiarizationProvider::Deepgram => write!(f, "deepgram"),
            DiarizationProvider::Assemblyai => write!(f, "assemblyai"),
        }
    }
}

/// Process-wide settings, resolved once at startup from the environment
/// (optionally preceded by a `.env` file loaded by the caller via `dotenvy`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,

    pub mongodb_uri: String,
    pub mongodb_db_name: String,

    pub recordings_storage_path: String,
    pub audio_chunk_prefix: String,
    pub storage_type: StorageType,
    pub recorder_chunk_duration_s: u64,
    pub delete_local_after_upload: bool,

    pub enable_audio_recording: bool,
    pub enable_diarization: bool,
    pub diarization_provider: DiarizationProvider,

    pub asr_api_key: Option<String>,
    pub asr_api_url: Option<String>,
    pub deepgram_api_key: Option<String>,
    pub assemblyai_api_key: Option<String>,

    pub gcs_bucket: Option<String>,
    pub gcs_credentials_json: Option<String>,

    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_db_name: "scribeline".to_string(),
            recordings_storage_path: "./data/recordings".to_string(),
            audio_chunk_prefix: "pcm_chunks".to_string(),
            storage_type: StorageType::Local,
            recorder_chunk_duration_s: 30,
            delete_local_after_upload: false,
            enable_audio_recording: true,
            enable_diarization: false,
            diarization_provider: DiarizationProvider::Deepgram,
            asr_api_key: None,
            asr_api_url: None,
            deepgram_api_key: None,
            assemblyai_api_key: None,
            gcs_bucket: None,
            gcs_credentials_json: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Loads settings from process environment variables, falling back to
    /// the defaults above for anything unset. Environment variables are
    /// matched case-insensitively against the field names (e.g.
    /// `MONGODB_URI`, `ENABLE_DIARIZATION`, `STORAGE_TYPE`).
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&Settings::default())?;

        let config = Config::builder()
            .add_source(defaults)
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.storage_type, StorageType::Local);
        assert_eq!(settings.recorder_chunk_duration_s, 30);
        assert!(!settings.enable_diarization);
    }
}
