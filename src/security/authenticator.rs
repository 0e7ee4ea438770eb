//! Session establishment for vendor API calls
//!
//! Client credentials are exchanged for an access token at the OAuth token
//! endpoint. Service accounts need no exchange: the signed assertion itself
//! is presented as the bearer token. Either way the resulting [`Session`] is
//! written once and then shared read-only with the gateway.

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::envelope::{ResponseEnvelope, RetEnvelope};
use crate::api::gateway::{CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE, build_url, send_json};
use crate::core::error::PublishError;
use crate::core::traits::{HttpMethod, HttpRequest, Transport};
use crate::security::assertion::SignedAssertion;
use crate::security::credentials::{Credential, ServiceAccountKey};
use crate::security::secret_masker::SecretMasker;

/// OAuth token endpoint, relative to the API base URL
pub const TOKEN_PATH: &str = "/api/oauth2/v1/token";

/// Authenticated session used for every subsequent API call
#[derive(Debug)]
pub struct Session {
    bearer_token: SecretString,
    client_id: String,
}

impl Session {
    pub fn new(bearer_token: SecretString, client_id: impl Into<String>) -> Self {
        Self {
            bearer_token,
            client_id: client_id.into(),
        }
    }

    pub fn bearer_token(&self) -> &SecretString {
        &self.bearer_token
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Obtains the run's [`Session`]
pub struct Authenticator {
    transport: Arc<dyn Transport>,
    base_url: String,
    masker: Arc<SecretMasker>,
    session: Option<Arc<Session>>,
}

impl Authenticator {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, masker: Arc<SecretMasker>) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            masker,
            session: None,
        }
    }

    /// The established session, if any
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.clone()
    }

    /// Establish the session with whichever strategy the credential names
    pub async fn authenticate(&mut self, credential: &Credential) -> Result<Arc<Session>, PublishError> {
        match credential {
            Credential::ClientCredential {
                client_id,
                client_secret,
            } => {
                self.authenticate_with_client_credentials(client_id, client_secret)
                    .await
            }
            Credential::ServiceAccount(key) => self.authenticate_with_service_account_key(key),
        }
    }

    /// Exchange a client id and secret for an access token
    pub async fn authenticate_with_client_credentials(
        &mut self,
        client_id: &str,
        client_secret: &SecretString,
    ) -> Result<Arc<Session>, PublishError> {
        self.ensure_unauthenticated()?;
        self.masker.register(client_secret.expose_secret());

        let url = build_url(&self.base_url, TOKEN_PATH, &[])?;
        let body = serde_json::to_vec(&TokenRequest {
            grant_type: "client_credentials",
            client_id,
            client_secret: client_secret.expose_secret(),
        })
        .map_err(|e| PublishError::Authentication {
            message: format!("failed to encode token request: {}", e),
        })?;

        debug!(url = %url, "requesting access token");
        let response = send_json(
            self.transport.as_ref(),
            HttpRequest {
                method: HttpMethod::Post,
                url,
                headers: vec![(
                    CONTENT_TYPE_HEADER.to_string(),
                    JSON_CONTENT_TYPE.to_string(),
                )],
                body: Some(body),
            },
        )
        .await?;

        let payload = RetEnvelope::<TokenPayload>::open(response).map_err(|e| match e {
            PublishError::RetCode { code, message } => PublishError::Authentication {
                message: format!("token endpoint returned code {}: {}", code, message),
            },
            other => other,
        })?;

        let access_token = payload
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| PublishError::Authentication {
                message: "token response has no access_token".to_string(),
            })?;

        info!(expires_in = ?payload.expires_in, "obtained access token");
        Ok(self.install(Session::new(SecretString::new(access_token.into()), client_id)))
    }

    /// Parse service account JSON and use a freshly signed assertion as the bearer
    pub fn authenticate_with_service_account(
        &mut self,
        credentials_text: &str,
    ) -> Result<Arc<Session>, PublishError> {
        let key = ServiceAccountKey::parse(credentials_text)?;
        self.authenticate_with_service_account_key(&key)
    }

    fn authenticate_with_service_account_key(
        &mut self,
        key: &ServiceAccountKey,
    ) -> Result<Arc<Session>, PublishError> {
        self.ensure_unauthenticated()?;

        let assertion = SignedAssertion::build(key, Utc::now())?;
        info!(
            key_id = %assertion.header.kid,
            expires_at = assertion.claims.exp,
            "signed service account assertion"
        );

        Ok(self.install(Session::new(
            assertion.into_token(),
            key.sub_account.clone(),
        )))
    }

    fn ensure_unauthenticated(&self) -> Result<(), PublishError> {
        if self.session.is_some() {
            return Err(PublishError::Authentication {
                message: "a session has already been established for this run".to_string(),
            });
        }
        Ok(())
    }

    fn install(&mut self, session: Session) -> Arc<Session> {
        self.masker.register(session.bearer_token.expose_secret());
        let session = Arc::new(session);
        self.session = Some(Arc::clone(&session));
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::ReqwestTransport;
    use crate::security::assertion::tests::test_service_account_json;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authenticator(base_url: &str, masker: Arc<SecretMasker>) -> Authenticator {
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        Authenticator::new(Arc::new(transport), base_url, masker)
    }

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.into())
    }

    #[tokio::test]
    async fn test_client_credentials_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_json(json!({
                "grant_type": "client_credentials",
                "client_id": "cid",
                "client_secret": "client-secret-value"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "T-0123456789", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let masker = Arc::new(SecretMasker::new());
        let mut auth = authenticator(&server.uri(), Arc::clone(&masker));
        let session = auth
            .authenticate_with_client_credentials("cid", &secret("client-secret-value"))
            .await
            .unwrap();

        assert_eq!(session.bearer_token().expose_secret(), "T-0123456789");
        assert_eq!(session.client_id(), "cid");
        assert!(auth.session().is_some());

        let masked = masker.mask("token T-0123456789 secret client-secret-value");
        assert!(!masked.contains("T-0123456789"));
        assert!(!masked.contains("client-secret-value"));
    }

    #[tokio::test]
    async fn test_client_credentials_error_code_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ret": {"code": 1, "msg": "invalid client"}})),
            )
            .mount(&server)
            .await;

        let mut auth = authenticator(&server.uri(), Arc::new(SecretMasker::new()));
        let result = auth
            .authenticate_with_client_credentials("cid", &secret("bad"))
            .await;

        match result {
            Err(PublishError::Authentication { message }) => {
                assert!(message.contains("invalid client"))
            }
            other => panic!("expected authentication error, got {:?}", other),
        }
        assert!(auth.session().is_none());
    }

    #[tokio::test]
    async fn test_missing_access_token_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"expires_in": 3600})))
            .mount(&server)
            .await;

        let mut auth = authenticator(&server.uri(), Arc::new(SecretMasker::new()));
        let result = auth
            .authenticate_with_client_credentials("cid", &secret("s"))
            .await;

        assert!(matches!(result, Err(PublishError::Authentication { .. })));
    }

    #[tokio::test]
    async fn test_service_account_makes_no_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let masker = Arc::new(SecretMasker::new());
        let mut auth = authenticator(&server.uri(), Arc::clone(&masker));
        let session = auth
            .authenticate_with_service_account(&test_service_account_json())
            .unwrap();

        assert_eq!(session.client_id(), "sub-account-1");
        assert_eq!(session.bearer_token().expose_secret().split('.').count(), 3);
        assert_eq!(masker.len(), 1);
    }

    #[test]
    fn test_incomplete_service_account_is_credential_error() {
        let mut auth = authenticator("http://127.0.0.1:1", Arc::new(SecretMasker::new()));
        let result = auth.authenticate_with_service_account(r#"{"key_id": "kid"}"#);

        assert!(matches!(result, Err(PublishError::Credential { .. })));
        assert!(auth.session().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_dispatches_and_rejects_second_session() {
        let mut auth = authenticator("http://127.0.0.1:1", Arc::new(SecretMasker::new()));
        let key = ServiceAccountKey::parse(&test_service_account_json()).unwrap();
        let credential = Credential::ServiceAccount(key);

        auth.authenticate(&credential).await.unwrap();
        assert!(matches!(
            auth.authenticate(&credential).await,
            Err(PublishError::Authentication { .. })
        ));
    }
}
