//! Upload a finished recording to the publish endpoint.
//!
//! The endpoint accepts multipart form fields `recording` (binary),
//! `title`, `userId` and `userName`, and answers non-2xx with a JSON
//! `{ error, details? }` envelope. The blob itself is opaque here.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::PublishError;
use crate::pipeline::assemble::AssembledVideo;
use crate::PublishConfig;

#[derive(Debug, Deserialize, Default)]
struct UploadFailure {
    #[serde(default)]
    error: String,
    details: Option<String>,
}

pub struct PublishClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PublishClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Send the video blob with its metadata.
    pub async fn publish(
        &self,
        video: &AssembledVideo,
        config: &PublishConfig,
    ) -> Result<(), PublishError> {
        let part = Part::bytes(video.data.to_vec())
            .file_name("timelapse.webm")
            .mime_str(video.mime)?;
        let form = Form::new()
            .part("recording", part)
            .text("title", config.title.clone())
            .text("userId", config.user_id.clone())
            .text("userName", config.user_name.clone());

        info!(
            bytes = video.data.len(),
            endpoint = %self.endpoint,
            "publishing recording"
        );
        let response = self.http.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        if status.is_success() {
            info!("recording published");
            return Ok(());
        }

        let failure: UploadFailure = response.json().await.unwrap_or_default();
        warn!(%status, error = %failure.error, "publish rejected");
        Err(PublishError::Rejected {
            status,
            error: failure.error,
            details: failure.details,
        })
    }
}
