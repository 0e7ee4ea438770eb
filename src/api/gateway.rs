//! Authenticated JSON request gateway
//!
//! Every vendor call goes through [`ApiGateway`]: it joins the base URL and
//! path, encodes query parameters, attaches the session headers and hands
//! the request to the [`Transport`]. The response envelope is opened by the
//! [`ResponseEnvelope`] named at the call site.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use secrecy::ExposeSecret;

use crate::api::envelope::ResponseEnvelope;
use crate::core::error::PublishError;
use crate::core::traits::{HttpMethod, HttpRequest, Transport};
use crate::security::authenticator::Session;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const CLIENT_ID_HEADER: &str = "client_id";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A single call description: path, query, extra headers and body
#[derive(Debug, Clone, Default)]
pub struct ApiCall {
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl ApiCall {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Attach a JSON request body
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, PublishError> {
        let bytes = serde_json::to_vec(body).map_err(|e| PublishError::Decode {
            message: format!("failed to encode request body: {}", e),
            body: String::new(),
        })?;
        self.body = Some(bytes);
        Ok(self)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Gateway bound to one base URL and one authenticated session
#[derive(Clone)]
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    base_url: String,
    session: Arc<Session>,
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, session: Arc<Session>) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub async fn get<E: ResponseEnvelope>(&self, call: ApiCall) -> Result<E::Payload, PublishError> {
        self.execute::<E>(HttpMethod::Get, call).await
    }

    pub async fn post<E: ResponseEnvelope>(&self, call: ApiCall) -> Result<E::Payload, PublishError> {
        self.execute::<E>(HttpMethod::Post, call).await
    }

    pub async fn put<E: ResponseEnvelope>(&self, call: ApiCall) -> Result<E::Payload, PublishError> {
        self.execute::<E>(HttpMethod::Put, call).await
    }

    async fn execute<E: ResponseEnvelope>(
        &self,
        method: HttpMethod,
        call: ApiCall,
    ) -> Result<E::Payload, PublishError> {
        let url = build_url(&self.base_url, &call.path, &call.query)?;
        let headers = self.headers(call.headers);

        let body = send_json(
            self.transport.as_ref(),
            HttpRequest {
                method,
                url,
                headers,
                body: call.body,
            },
        )
        .await?;

        E::open(body)
    }

    /// Session headers followed by the call's extra headers
    fn headers(&self, extra: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut headers = vec![
            (
                AUTHORIZATION_HEADER.to_string(),
                format!("Bearer {}", self.session.bearer_token().expose_secret()),
            ),
            (
                CLIENT_ID_HEADER.to_string(),
                self.session.client_id().to_string(),
            ),
            (CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string()),
        ];

        for (name, value) in extra {
            match headers
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
            {
                Some(slot) => {
                    warn!(header = %name, "extra header overrides a session header");
                    slot.1 = value;
                }
                None => headers.push((name, value)),
            }
        }

        headers
    }
}

/// Join base URL and path and append percent-encoded query parameters
pub fn build_url(
    base_url: &str,
    path: &str,
    query: &[(String, String)],
) -> Result<String, PublishError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined)
        .map_err(|e| PublishError::Config(format!("invalid API URL {}: {}", joined, e)))?;

    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in query {
            pairs.append_pair(name, value);
        }
    }

    Ok(url.to_string())
}

/// Send a request and decode the response body as JSON
///
/// Statuses of 400 and above fail with [`PublishError::HttpStatus`]; bodies
/// that are not JSON fail with [`PublishError::Decode`].
pub async fn send_json(
    transport: &dyn Transport,
    request: HttpRequest,
) -> Result<Value, PublishError> {
    debug!(method = %request.method, url = %request.url, "api request");
    let response = transport.send(request).await?;
    let text = response.body_text();

    if response.status >= 400 {
        return Err(PublishError::http_status(response.status, &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| PublishError::decode(format!("response is not JSON: {}", e), &text))
}
