//! Reset client trait and the HTTP implementation
//!
//! A reset is a single `POST` with an empty JSON body and the shared secret in
//! the `x-secret` header. Failures are classified so the log tells apart an
//! endpoint that answered badly from one that could not be reached.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Header carrying the shared secret
pub const SECRET_HEADER: &str = "x-secret";

#[derive(Error, Debug)]
pub enum ResetError {
    /// The endpoint answered with a non-success status
    #[error("reset endpoint returned {status}: {body}")]
    Endpoint { status: StatusCode, body: String },

    /// The request was sent but no response came back
    #[error("reset request failed: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be built
    #[error("reset request could not be built: {message}")]
    Client { message: String },
}

impl ResetError {
    /// Failure class used as the `kind` log field
    pub fn kind(&self) -> &'static str {
        match self {
            ResetError::Endpoint { .. } => "endpoint",
            ResetError::Transport { .. } => "transport",
            ResetError::Client { .. } => "client",
        }
    }

    fn from_send(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ResetError::Client {
                message: e.to_string(),
            }
        } else {
            ResetError::Transport { source: e }
        }
    }
}

/// Performs the backend reset
#[async_trait]
pub trait ResetClient: Send + Sync {
    /// Issue one reset call; never retried by the caller
    async fn reset(&self) -> Result<StatusCode, ResetError>;
}

/// HTTP reset client - POSTs to the configured reset endpoint
pub struct HttpResetClient {
    endpoint: String,
    secret: String,
    client: reqwest::Client,
}

impl HttpResetClient {
    /// Create a new HTTP reset client. Without a timeout the reqwest default applies.
    pub fn new(endpoint: String, secret: String, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint,
            secret,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ResetClient for HttpResetClient {
    async fn reset(&self) -> Result<StatusCode, ResetError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(SECRET_HEADER, &self.secret)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(ResetError::from_send)?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read body>".to_string());
        Err(ResetError::Endpoint { status, body })
    }
}
