use crate::frame::EncodedFrame;
use crate::gesture::ClassificationResult;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier is rate limiting requests")]
    RateLimited,
    #[error("classifier answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed classifier response: {0}")]
    Decode(String),
}

/// The remote gesture classifier as seen by the poll loop.
pub trait Classifier {
    fn classify(&mut self, frame: &EncodedFrame) -> Result<ClassificationResult, ClassifyError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyRequest<'a> {
    mime_type: &'a str,
    image: String,
}

/// Posts frames as JSON to an HTTP endpoint.
pub struct HttpClassifier {
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Self {
            agent: builder.build(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Classifier for HttpClassifier {
    fn classify(&mut self, frame: &EncodedFrame) -> Result<ClassificationResult, ClassifyError> {
        let body = ClassifyRequest {
            mime_type: "image/jpeg",
            image: frame.to_base64(),
        };
        let mut req = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            req = req.set("Authorization", &format!("Bearer {key}"));
        }
        debug!(endpoint = %self.endpoint, bytes = frame.jpeg.len(), "submitting frame");
        match req.send_json(body) {
            Ok(resp) => resp
                .into_json::<ClassificationResult>()
                .map_err(|e| ClassifyError::Decode(e.to_string())),
            Err(ureq::Error::Status(429, _)) => {
                warn!("classifier rate limited");
                Err(ClassifyError::RateLimited)
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(ClassifyError::Status { status, body })
            }
            Err(ureq::Error::Transport(t)) => Err(ClassifyError::Transport(t.to_string())),
        }
    }
}
