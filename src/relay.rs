//! Submits conversions to the upstream MP3 service and polls queued jobs.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::{StatusCode, multipart::Form};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::{
    config::UpstreamConfig,
    normalize::NormalizedVideoUrl,
    retry::{QueueDecision, QueueRetryPolicy},
};

pub const DEFAULT_FILENAME: &str = "download.mp3";
const QUEUED_MARKER: &str = "queued";
const ERROR_MARKER: &str = "error";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream reported an error: {0}")]
    Upstream(String),

    #[error("upstream returned HTTP {status}")]
    UpstreamStatus { status: StatusCode },

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream response is malformed: {0}")]
    MalformedResponse(String),

    #[error("conversion still queued after {retries} retries")]
    StillQueued { retries: u32, retry_after: Duration },

    #[error("conversion did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Shape of the upstream JSON reply; `filename` doubles as a status marker.
#[derive(Debug, Deserialize)]
struct UpstreamReply {
    #[serde(default)]
    filename: Option<String>,
    /// Base64 audio on success, the failure reason on `error`. The reason is
    /// not always a string.
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Queued,
    Error(String),
    Success { filename: String, audio: Vec<u8> },
}

impl ConversionResult {
    fn from_reply(reply: UpstreamReply) -> Result<Self, RelayError> {
        match reply.filename.as_deref().map(str::trim) {
            Some(QUEUED_MARKER) => Ok(Self::Queued),
            Some(ERROR_MARKER) => Ok(Self::Error(match reply.data {
                Some(Value::String(message)) => message,
                None | Some(Value::Null) => "Upstream conversion failed".to_string(),
                Some(other) => other.to_string(),
            })),
            name => {
                let filename = name
                    .filter(|value| !value.is_empty())
                    .unwrap_or(DEFAULT_FILENAME)
                    .to_string();
                let data = match reply.data {
                    Some(Value::String(data)) => data,
                    Some(Value::Null) | None => {
                        return Err(RelayError::MalformedResponse(
                            "missing audio data".to_string(),
                        ));
                    }
                    Some(other) => {
                        return Err(RelayError::MalformedResponse(format!(
                            "audio data is not a string: {other}"
                        )));
                    }
                };
                let audio = BASE64.decode(data.trim()).map_err(|error| {
                    RelayError::MalformedResponse(format!("audio is not valid base64: {error}"))
                })?;
                Ok(Self::Success { filename, audio })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub filename: String,
    pub audio: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ConversionRelay {
    client: reqwest::Client,
    upstream: UpstreamConfig,
    policy: QueueRetryPolicy,
    deadline: Duration,
}

impl ConversionRelay {
    pub fn new(
        client: reqwest::Client,
        upstream: UpstreamConfig,
        policy: QueueRetryPolicy,
        deadline: Duration,
    ) -> Self {
        Self {
            client,
            upstream,
            policy,
            deadline,
        }
    }

    /// Runs the submit/poll sequence under the overall deadline.
    pub async fn convert(
        &self,
        video_url: &NormalizedVideoUrl,
    ) -> Result<Conversion, RelayError> {
        timeout(self.deadline, self.poll_until_done(video_url))
            .await
            .map_err(|_| RelayError::DeadlineExceeded(self.deadline))?
    }

    async fn poll_until_done(
        &self,
        video_url: &NormalizedVideoUrl,
    ) -> Result<Conversion, RelayError> {
        let mut retries = 0u32;
        loop {
            match self.submit(video_url).await? {
                ConversionResult::Success { filename, audio } => {
                    info!(
                        "Conversion for {} finished after {retries} retries ({} bytes)",
                        video_url.video_id(),
                        audio.len()
                    );
                    return Ok(Conversion { filename, audio });
                }
                ConversionResult::Error(message) => return Err(RelayError::Upstream(message)),
                ConversionResult::Queued => match self.policy.decide(retries) {
                    QueueDecision::GiveUp => {
                        return Err(RelayError::StillQueued {
                            retries,
                            retry_after: self.policy.delay_for(retries),
                        });
                    }
                    QueueDecision::RetryAfter(delay) => {
                        debug!(
                            "Conversion for {} queued; retrying in {delay:?}",
                            video_url.video_id()
                        );
                        sleep(delay).await;
                        retries += 1;
                    }
                },
            }
        }
    }

    /// One upstream call. The form is rebuilt per call since it is consumed.
    async fn submit(
        &self,
        video_url: &NormalizedVideoUrl,
    ) -> Result<ConversionResult, RelayError> {
        let form = Form::new()
            .text("client-type", self.upstream.client_type.clone())
            .text("client-name", self.upstream.client_name.clone())
            .text("url", video_url.as_str().to_string());

        let response = self
            .client
            .post(&self.upstream.url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::UpstreamStatus { status });
        }

        let body = response.bytes().await?;
        let reply: UpstreamReply = serde_json::from_slice(&body)
            .map_err(|error| RelayError::MalformedResponse(error.to_string()))?;
        ConversionResult::from_reply(reply)
    }
}
