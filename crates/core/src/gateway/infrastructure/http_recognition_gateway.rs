use std::error::Error as StdError;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::capture::domain::captured_image::CapturedImage;
use crate::gateway::domain::recognition_gateway::RecognitionGateway;
use crate::gateway::domain::service_response::{FailureReason, ServiceResponse};
use crate::gateway::infrastructure::analysis_summary::{summarize, AnalyzeResponse};
use crate::shared::config::RemoteConfiguration;
use crate::shared::constants::{
    ANALYZE_PATH, IMAGE_FIELD_NAME, REGISTER_PATH, UPLOAD_FILE_NAME, VERIFY_PATH,
};
use crate::workflow::domain::outcome::{AnalyzeOutcome, RegisterOutcome, VerifyOutcome};

const USER_AGENT: &str = concat!("facegate/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    detector_backend: &'a str,
    align: bool,
    img: String,
    enforce_detection: bool,
    anti_spoofing: bool,
}

/// Raw answer to a request that reached the service.
struct RawResponse {
    status: StatusCode,
    body: Vec<u8>,
}

/// [`RecognitionGateway`] over HTTP using a blocking reqwest client.
///
/// Register and verify upload the JPEG as a multipart form and only accept
/// `201 Created`; analyze posts JSON with the JPEG as a data URI and only
/// accepts `200 OK`. Every request is bounded by the configured timeout.
pub struct HttpRecognitionGateway {
    client: Client,
    config: Arc<RemoteConfiguration>,
}

impl HttpRecognitionGateway {
    pub fn new(config: Arc<RemoteConfiguration>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(GatewayError::Client)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RemoteConfiguration {
        &self.config
    }

    fn post_form(&self, path: &str, image: CapturedImage) -> Result<RawResponse, FailureReason> {
        let url = self.config.url_for(path);
        let mime_type = image.mime_type();
        log::debug!("POST {url} (multipart, {} bytes)", image.len());

        let part = Part::bytes(image.into_bytes())
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(mime_type)
            .map_err(|e| transport_failure(&url, &e))?;
        let form = Form::new().part(IMAGE_FIELD_NAME, part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| transport_failure(&url, &e))?;
        read_response(&url, response)
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<RawResponse, FailureReason> {
        let url = self.config.url_for(path);
        log::debug!("POST {url} (json)");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| transport_failure(&url, &e))?;
        read_response(&url, response)
    }

    /// Shared register/verify handling: anything but 201 is a rejection.
    fn submit_identity(
        &self,
        path: &str,
        image: CapturedImage,
    ) -> Result<Option<Value>, FailureReason> {
        let raw = self.post_form(path, image)?;
        if raw.status != StatusCode::CREATED {
            return Err(rejection(raw.status, &raw.body, StatusCode::CREATED));
        }
        Ok(serde_json::from_slice(&raw.body).ok())
    }
}

impl RecognitionGateway for HttpRecognitionGateway {
    fn register(&self, image: CapturedImage) -> ServiceResponse<RegisterOutcome> {
        let result = self
            .submit_identity(REGISTER_PATH, image)
            .map(|_| RegisterOutcome { succeeded: true });
        log_result("register", &result);
        result
    }

    fn verify(&self, image: CapturedImage) -> ServiceResponse<VerifyOutcome> {
        let result = self.submit_identity(VERIFY_PATH, image).map(|body| {
            // A 201 carrying an explicit negative verdict is a completed
            // verification that simply did not match.
            let verdict = body.as_ref().and_then(|b| b.get("verified")).and_then(Value::as_bool);
            match verdict {
                Some(false) => VerifyOutcome::not_verified(),
                _ => VerifyOutcome::verified(),
            }
        });
        log_result("verify", &result);
        result
    }

    fn analyze(&self, image: CapturedImage) -> ServiceResponse<AnalyzeOutcome> {
        let img = format!(
            "data:{};base64,{}",
            image.mime_type(),
            BASE64.encode(image.bytes())
        );
        drop(image);

        let request = AnalyzeRequest {
            detector_backend: &self.config.detector_backend,
            align: true,
            img,
            enforce_detection: false,
            anti_spoofing: self.config.anti_spoofing,
        };

        let result = self.post_json(ANALYZE_PATH, &request).and_then(|raw| {
            if raw.status != StatusCode::OK {
                return Err(rejection(raw.status, &raw.body, StatusCode::OK));
            }
            let parsed: AnalyzeResponse = serde_json::from_slice(&raw.body).map_err(|e| {
                FailureReason::transport(format!("malformed analysis response: {e}"))
            })?;
            let summaries = summarize(&parsed);
            if summaries.is_empty() {
                return Err(FailureReason::NoFaceDetected);
            }
            Ok(AnalyzeOutcome {
                succeeded: true,
                summaries,
            })
        });
        log_result("analyze", &result);
        result
    }
}

fn read_response(
    url: &str,
    response: reqwest::blocking::Response,
) -> Result<RawResponse, FailureReason> {
    let status = response.status();
    let body = response
        .bytes()
        .map_err(|e| transport_failure(url, &e))?
        .to_vec();
    log::debug!("{url} answered {status} ({} bytes)", body.len());
    Ok(RawResponse { status, body })
}

/// Folds a reqwest error (and its causes) into a transport failure.
fn transport_failure(url: &str, error: &reqwest::Error) -> FailureReason {
    if error.is_timeout() {
        return FailureReason::transport(format!("request to {url} timed out"));
    }
    let mut message = error.to_string();
    let mut cause = error.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    FailureReason::transport(message)
}

/// Builds the rejection for a response with the wrong status, preferring the
/// service's own `message` or `error` text.
fn rejection(status: StatusCode, body: &[u8], expected: StatusCode) -> FailureReason {
    let from_body = serde_json::from_slice::<Value>(body).ok().and_then(|v| {
        ["message", "error"].iter().find_map(|key| {
            v.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        })
    });

    let message = match from_body {
        Some(message) => message,
        None if status.is_success() => {
            format!("unexpected response status {status} (expected {expected})")
        }
        None => format!("request failed with status {status}"),
    };
    FailureReason::rejected(status.as_u16(), message)
}

fn log_result<T: std::fmt::Debug>(operation: &str, result: &ServiceResponse<T>) {
    match result {
        Ok(outcome) => log::info!("{operation} completed: {outcome:?}"),
        Err(reason) => log::warn!("{operation} failed: {reason:?}"),
    }
}
