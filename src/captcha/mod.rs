//! CAPTCHA recognition client
//!
//! The submitter only needs "image bytes in, text out". [`CaptchaSolver`] is
//! that contract; [`TrueCaptchaSolver`] implements it against the
//! apitruecaptcha.org JSON API.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::CaptchaConfig;
use crate::utils::error::{FetchError, SubmitError};

/// Turns a CAPTCHA image into its text
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, image: &[u8]) -> Result<String, SubmitError>;
}

#[derive(Debug, Serialize)]
struct SolveRequest<'a> {
    userid: &'a str,
    apikey: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    result: Option<String>,
    error_message: Option<String>,
    error: Option<String>,
}

/// apitruecaptcha.org client
pub struct TrueCaptchaSolver {
    client: Client,
    endpoint: String,
    user_id: String,
    api_key: String,
}

impl TrueCaptchaSolver {
    pub fn new(config: &CaptchaConfig, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.service_url.clone(),
            user_id: config.user_id.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl CaptchaSolver for TrueCaptchaSolver {
    async fn solve(&self, image: &[u8]) -> Result<String, SubmitError> {
        let request = SolveRequest {
            userid: &self.user_id,
            apikey: &self.api_key,
            data: STANDARD.encode(image),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::CaptchaService(format!(
                "service returned {status}"
            )));
        }

        let body: SolveResponse = response
            .json()
            .await
            .map_err(|e| SubmitError::CaptchaService(format!("invalid response: {e}")))?;

        match body.result.map(|r| r.trim().to_string()) {
            Some(text) if !text.is_empty() => {
                debug!(length = text.len(), "CAPTCHA solved");
                Ok(text)
            }
            _ => Err(SubmitError::CaptchaService(
                body.error_message
                    .or(body.error)
                    .unwrap_or_else(|| "no result in response".to_string()),
            )),
        }
    }
}
