//! HTTP client for the stem separation backend.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use super::types::*;
use super::ApiError;
use crate::intake::AudioFile;
use crate::job::ProcessingSettings;

/// Multipart field carrying the uploaded files.
const UPLOAD_FIELD: &str = "files";

/// Backend operations the session depends on.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait SeparatorApi: Send + Sync {
    async fn device_status(&self) -> Result<DeviceStatusResponse, ApiError>;

    /// Upload all files as a single multipart submission.
    async fn upload(&self, files: &[AudioFile]) -> Result<UploadResponse, ApiError>;

    async fn start_processing(
        &self,
        job_id: &str,
        settings: &ProcessingSettings,
    ) -> Result<(), ApiError>;

    async fn stop(&self, job_id: &str) -> Result<(), ApiError>;

    /// Stems produced for one source file. URLs are absolute.
    async fn stems(&self, job_id: &str, file_stem: &str) -> Result<Vec<StemTrack>, ApiError>;
}

pub struct SeparatorClient {
    client: Client,
    base_url: String,
}

impl SeparatorClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the backend (e.g., "http://127.0.0.1:5000")
    /// * `timeout` - Per request timeout, uploads included
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|e| ApiError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a server relative path such as "/download/x.zip" against the base URL.
    pub fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Render a backend visualization of one processed file.
    pub async fn visualize(
        &self,
        job_id: &str,
        filename: &str,
        kind: VisualizationKind,
    ) -> Result<VisualizationImage, ApiError> {
        let url = format!(
            "{}/visualize/{}/{}/{}",
            self.base_url,
            urlencoding::encode(job_id),
            urlencoding::encode(filename),
            kind.as_str()
        );
        debug!("Requesting {} visualization: {}", kind.as_str(), url);

        let response = check_status(self.client.get(&url).send().await?).await?;
        let body: VisualizationResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("visualization body: {}", e)))?;

        if let Some(error) = body.error {
            return Err(ApiError::Backend(error));
        }
        let image = body
            .image
            .ok_or_else(|| ApiError::InvalidResponse("response has no image".to_string()))?;
        VisualizationImage::from_data_url(&image)
    }

    /// Ask the backend process to exit.
    ///
    /// The server terminates while answering, so a transport failure after
    /// the request was issued is reported as `ConnectionClosed`.
    pub async fn shutdown(&self) -> Result<ShutdownOutcome, ApiError> {
        let url = format!("{}/shutdown", self.base_url);
        match self.client.post(&url).send().await {
            Ok(response) => {
                check_status(response).await?;
                Ok(ShutdownOutcome::Acknowledged)
            }
            Err(e) => {
                debug!("Shutdown request ended with transport error: {}", e);
                Ok(ShutdownOutcome::ConnectionClosed)
            }
        }
    }

    /// Stream a result archive (or any server path) to `dest`.
    ///
    /// Creates parent directories if they don't exist. Returns the number of bytes written.
    pub async fn download(&self, path: &str, dest: &Path) -> Result<u64, ApiError> {
        let url = self.absolute_url(path);
        info!("Downloading {} to {:?}", url, dest);

        let response = check_status(self.client.get(&url).send().await?).await?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(dest).await?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn file_part(file: &AudioFile) -> Result<Part, ApiError> {
        let handle = File::open(&file.path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));
        let part = Part::stream_with_length(body, file.size).file_name(file.name.clone());

        match file.media_type.as_deref() {
            Some(media_type) => part.mime_str(media_type).map_err(|e| {
                ApiError::InvalidResponse(format!("bad media type {:?}: {}", media_type, e))
            }),
            None => Ok(part),
        }
    }
}

#[async_trait]
impl SeparatorApi for SeparatorClient {
    async fn device_status(&self) -> Result<DeviceStatusResponse, ApiError> {
        let url = format!("{}/device-status", self.base_url);
        let response = check_status(self.client.get(&url).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("device status: {}", e)))
    }

    async fn upload(&self, files: &[AudioFile]) -> Result<UploadResponse, ApiError> {
        let url = format!("{}/upload", self.base_url);

        let mut form = Form::new();
        for file in files {
            form = form.part(UPLOAD_FIELD, Self::file_part(file).await?);
        }

        debug!(file_count = files.len(), "Uploading files");
        let response = check_status(self.client.post(&url).multipart(form).send().await?).await?;
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("upload response: {}", e)))?;

        if body.job_id.is_empty() {
            return Err(ApiError::InvalidResponse("empty job id".to_string()));
        }
        info!("Upload accepted, job {}", body.job_id);
        Ok(body)
    }

    async fn start_processing(
        &self,
        job_id: &str,
        settings: &ProcessingSettings,
    ) -> Result<(), ApiError> {
        let url = format!("{}/process", self.base_url);
        let request = ProcessRequest { job_id, settings };
        check_status(self.client.post(&url).json(&request).send().await?).await?;
        info!("Processing started for job {}", job_id);
        Ok(())
    }

    async fn stop(&self, job_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/stop/{}", self.base_url, urlencoding::encode(job_id));
        check_status(self.client.post(&url).send().await?).await?;
        info!("Stop requested for job {}", job_id);
        Ok(())
    }

    async fn stems(&self, job_id: &str, file_stem: &str) -> Result<Vec<StemTrack>, ApiError> {
        let url = format!(
            "{}/stems/{}/{}",
            self.base_url,
            urlencoding::encode(job_id),
            urlencoding::encode(file_stem)
        );
        let response = check_status(self.client.get(&url).send().await?).await?;
        let body: StemsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("stems response: {}", e)))?;

        Ok(body
            .stems
            .into_iter()
            .map(|stem| StemTrack {
                url: self.absolute_url(&stem.url),
                ..stem
            })
            .collect())
    }
}

/// Turn a non-2xx response into `ApiError::Status`.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!("Backend returned {}: {}", status, body.trim());
    Err(ApiError::from_status(status.as_u16(), &body))
}

fn user_agent() -> String {
    format!(
        "stem-separator/{} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> SeparatorClient {
        SeparatorClient::new(base_url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_trailing_slash_removal() {
        assert_eq!(
            client("http://localhost:5000/").base_url(),
            "http://localhost:5000"
        );
    }

    #[test]
    fn test_absolute_url() {
        let client = client("http://localhost:5000");
        assert_eq!(
            client.absolute_url("/download/abc.zip"),
            "http://localhost:5000/download/abc.zip"
        );
        assert_eq!(
            client.absolute_url("audio/abc/x.wav"),
            "http://localhost:5000/audio/abc/x.wav"
        );
        assert_eq!(
            client.absolute_url("https://cdn.example/x.wav"),
            "https://cdn.example/x.wav"
        );
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(user_agent().starts_with("stem-separator/"));
    }
}
