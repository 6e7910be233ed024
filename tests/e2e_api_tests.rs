//! End-to-end tests for the HTTP client
//!
//! Runs `SeparatorClient` against the mock backend.

mod common;

use common::*;
use stem_separator_client::api::{ApiError, SeparatorApi, ShutdownOutcome, VisualizationKind};
use stem_separator_client::job::{OutputFormat, ProcessingSettings, Quality, SeparationModel};
use tempfile::TempDir;

#[tokio::test]
async fn test_device_status() {
    let server = TestServer::spawn().await;
    let status = server.client().device_status().await.unwrap();

    assert!(status.cuda_available);
    assert_eq!(status.device_count, Some(1));
    assert_eq!(status.device_name.as_deref(), Some(DEVICE_NAME));
}

#[tokio::test]
async fn test_upload_sends_every_file_as_one_submission() {
    let server = TestServer::spawn().await;
    let (_dir, files) = create_audio_files(&["track.wav", "other.wav"]);

    let response = server.client().upload(&files).await.unwrap();
    assert_eq!(response.job_id, JOB_ID);
    assert_eq!(response.files_count, Some(2));

    let uploads = server.uploads();
    assert_eq!(uploads.len(), 1);
    let parts = &uploads[0];
    assert_eq!(parts.len(), 2);
    assert!(parts.iter().all(|p| p.field == "files"));
    assert_eq!(parts[0].file_name, "track.wav");
    assert_eq!(parts[1].file_name, "other.wav");
    assert_eq!(parts[0].size as u64, files[0].size);
    assert!(parts[0]
        .content_type
        .as_deref()
        .is_some_and(|t| t.contains("wav")));
}

#[tokio::test]
async fn test_upload_failure_carries_backend_message() {
    let server = TestServer::spawn().await;
    server.fail_uploads();
    let (_dir, files) = create_audio_files(&["track.wav"]);

    let err = server.client().upload(&files).await.unwrap_err();
    match err {
        ApiError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Disk full");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_start_processing_sends_settings() {
    let server = TestServer::spawn().await;
    let settings = ProcessingSettings {
        model: SeparationModel::Htdemucs6s,
        format: OutputFormat::Mp3,
        quality: Quality::Medium,
        volume_boost: 1.5,
        noise_reduction: true,
    };

    server
        .client()
        .start_processing(JOB_ID, &settings)
        .await
        .unwrap();

    let requests = server.process_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["job_id"], JOB_ID);
    assert_eq!(requests[0]["settings"]["model"], "htdemucs_6s");
    assert_eq!(requests[0]["settings"]["format"], "mp3");
    assert_eq!(requests[0]["settings"]["quality"], "medium");
    assert_eq!(requests[0]["settings"]["volume_boost"], 1.5);
    assert_eq!(requests[0]["settings"]["noise_reduction"], true);
}

#[tokio::test]
async fn test_start_processing_failure() {
    let server = TestServer::spawn().await;
    server.fail_process();

    let err = server
        .client()
        .start_processing(JOB_ID, &ProcessingSettings::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Server error (status 400): Job not found");
}

#[tokio::test]
async fn test_stop() {
    let server = TestServer::spawn().await;
    server.client().stop(JOB_ID).await.unwrap();
    assert_eq!(server.stopped_jobs(), vec![JOB_ID.to_string()]);
}

#[tokio::test]
async fn test_stems_have_absolute_urls() {
    let server = TestServer::spawn().await;
    let stems = server.client().stems(JOB_ID, FILE_STEM).await.unwrap();

    assert_eq!(stems.len(), 3);
    assert_eq!(stems[0].name, "original");
    assert_eq!(stems[1].filename, "track_vocals.wav");
    assert_eq!(
        stems[1].url,
        format!("{}/download/abc/track_vocals.wav", server.base_url)
    );

    let none = server.client().stems(JOB_ID, "zzz").await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_visualize_decodes_image() {
    let server = TestServer::spawn().await;
    let image = server
        .client()
        .visualize(JOB_ID, "track.wav", VisualizationKind::Waveforms)
        .await
        .unwrap();

    assert_eq!(image.media_type, "image/png");
    assert_eq!(image.extension(), "png");
    assert_eq!(&image.data[1..4], b"PNG");
}

#[tokio::test]
async fn test_visualize_reports_backend_error() {
    let server = TestServer::spawn().await;
    let err = server
        .client()
        .visualize(JOB_ID, "track.wav", VisualizationKind::Analysis)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Backend(ref m) if m == ANALYSIS_ERROR));
}

#[tokio::test]
async fn test_shutdown_acknowledged() {
    let server = TestServer::spawn().await;
    let outcome = server.client().shutdown().await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::Acknowledged);
}

#[tokio::test]
async fn test_download_archive() {
    let server = TestServer::spawn().await;
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("results").join("stems.zip");

    let written = server
        .client()
        .download(ARCHIVE_PATH, &dest)
        .await
        .unwrap();

    assert_eq!(written, ARCHIVE_BYTES.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), ARCHIVE_BYTES);
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() {
    let client = stem_separator_client::api::SeparatorClient::new(
        "http://127.0.0.1:1",
        std::time::Duration::from_secs(2),
    )
    .unwrap();

    let err = client.device_status().await.unwrap_err();
    assert!(err.is_transport());
}
