//! Core traits and types for closed-test publishing
//!
//! This module defines the seams to the hosting environment: the HTTP
//! transport used for every vendor call, the clock used by the compile
//! poller and the sink receiving step outputs. All are trait objects so tests
//! can substitute recording or simulated implementations.

use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};

use crate::core::error::PublishError;

// ============================================================================
// Transport
// ============================================================================

/// HTTP methods used by the vendor API and presigned uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    /// Parse a method name as issued in an upload ticket (case-insensitive)
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built request handed to the transport
///
/// Headers are kept as an ordered list so that presigned uploads reproduce
/// the ticket's header set exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and complete body of a response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Network collaborator: delivers a request and returns the full response
///
/// Implementations must only fail for connection-level problems; HTTP error
/// statuses are returned as regular responses and interpreted by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PublishError>;
}

// ============================================================================
// Clock
// ============================================================================

/// Time source for polling loops
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by tokio timers
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// Step outputs
// ============================================================================

/// Receives named outputs (`version-id`, `pkg-version`, ...) as soon as the
/// step producing them succeeds, so a later failure keeps earlier values
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn set_output(&self, key: &str, value: &str) -> Result<(), PublishError>;
}
