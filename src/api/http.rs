//! reqwest-backed transport

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::core::error::PublishError;
use crate::core::traits::{HttpMethod, HttpRequest, HttpResponse, Transport};

/// User agent for vendor requests
const USER_AGENT_VALUE: &str = concat!("closed-test-publisher/", env!("CARGO_PKG_VERSION"));

/// [`Transport`] implementation over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_VALUE)
            .build()
            .map_err(|e| PublishError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PublishError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| PublishError::Network {
            message: format!("{} {} failed: {}", request.method, request.url, e),
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| PublishError::Network {
            message: format!("failed to read response body: {}", e),
        })?;
        debug!(status, bytes = body.len(), "response received");

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
