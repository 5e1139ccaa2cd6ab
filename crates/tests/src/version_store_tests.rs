use scribeline_config::Settings;
use scribeline_db::models::{AlignedTranscriptSegment, TranscriptSource};
use scribeline_services::VersionStore;

fn segment(text: &str, confidence: f64, state: &str) -> AlignedTranscriptSegment {
    AlignedTranscriptSegment {
        id: String::new(),
        text: text.to_string(),
        confidence,
        reason: "punctuation".to_string(),
        audio_start_time: 0.0,
        audio_end_time: 1.0,
        duration: 1.0,
        original_text: None,
        translated: None,
        speaker: "Speaker 0".to_string(),
        speaker_confidence: confidence,
        alignment_method: "time_overlap".to_string(),
        alignment_state: state.to_string(),
    }
}

async fn test_store() -> VersionStore {
    let mut settings = Settings::load().unwrap_or_default();
    settings.mongodb_db_name = format!("scribeline_test_{}", uuid::Uuid::new_v4().simple());
    let db = scribeline_db::connect(&settings)
        .await
        .expect("a reachable MongoDB instance is required for integration tests");
    VersionStore::new(db)
}

#[tokio::test]
async fn version_numbers_are_dense_and_start_at_one() {
    let store = test_store().await;
    let meeting_id = "meeting-versions-1";

    let v1 = store
        .save_version(meeting_id, TranscriptSource::Live, vec![segment("hi", 0.9, "CONFIDENT")], false, None)
        .await
        .unwrap();
    let v2 = store
        .save_version(meeting_id, TranscriptSource::Diarized, vec![segment("hi there", 0.8, "CONFIDENT")], false, None)
        .await
        .unwrap();

    assert_eq!(v1, 1);
    assert_eq!(v2, 2);

    let versions = store.list_versions(meeting_id).await.unwrap();
    assert_eq!(versions.len(), 2);
}

#[tokio::test]
async fn at_most_one_version_is_ever_authoritative() {
    let store = test_store().await;
    let meeting_id = "meeting-versions-2";

    store
        .save_version(meeting_id, TranscriptSource::Live, vec![segment("first pass", 0.7, "UNCERTAIN")], true, None)
        .await
        .unwrap();
    let second = store
        .save_version(
            meeting_id,
            TranscriptSource::Diarized,
            vec![segment("corrected pass", 0.95, "CONFIDENT")],
            true,
            Some("diarization-job".to_string()),
        )
        .await
        .unwrap();

    let authoritative = store.get_authoritative(meeting_id).await.unwrap().expect("must have one authoritative version");
    assert_eq!(authoritative.version_num, second);

    let versions = store.list_versions(meeting_id).await.unwrap();
    let authoritative_count = versions.iter().filter(|v| v.is_authoritative).count();
    assert_eq!(authoritative_count, 1);
}

#[tokio::test]
async fn confidence_metrics_are_derived_from_content_not_the_caller() {
    let store = test_store().await;
    let meeting_id = "meeting-versions-3";

    let content = vec![
        segment("a", 0.9, "CONFIDENT"),
        segment("b", 0.5, "OVERLAP"),
        segment("c", 0.2, "UNKNOWN_SPEAKER"),
    ];
    store
        .save_version(meeting_id, TranscriptSource::Live, content, true, None)
        .await
        .unwrap();

    let authoritative = store.get_authoritative(meeting_id).await.unwrap().unwrap();
    assert_eq!(authoritative.confidence_metrics.total, 3);
    assert_eq!(authoritative.confidence_metrics.confident_count, 1);
    assert_eq!(authoritative.confidence_metrics.overlap_count, 1);
    assert_eq!(authoritative.confidence_metrics.unknown_count, 1);
}

#[tokio::test]
async fn deleting_a_version_removes_it_from_the_list() {
    let store = test_store().await;
    let meeting_id = "meeting-versions-4";

    store
        .save_version(meeting_id, TranscriptSource::ManualEdit, vec![segment("edited", 1.0, "CONFIDENT")], false, Some("user-1".into()))
        .await
        .unwrap();

    let deleted = store.delete_version(meeting_id, 1).await.unwrap();
    assert!(deleted);
    assert!(store.list_versions(meeting_id).await.unwrap().is_empty());
}
