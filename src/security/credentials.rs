//! Credential material for vendor authentication
//!
//! Two strategies exist: an OAuth2 client-credential pair, or a service
//! account key used to sign a self-certifying assertion. Incomplete service
//! account keys are rejected here, before any signing or network access.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs;

use crate::core::config::CredentialsConfig;
use crate::core::error::PublishError;

/// Parsed credential, one variant per authentication strategy
#[derive(Debug)]
pub enum Credential {
    ClientCredential {
        client_id: String,
        client_secret: SecretString,
    },
    ServiceAccount(ServiceAccountKey),
}

/// Service account key with every field required for signing present
#[derive(Debug)]
pub struct ServiceAccountKey {
    pub key_id: String,
    pub private_key: SecretString,
    pub sub_account: String,
    pub token_uri: String,
    pub project_id: Option<String>,
    pub auth_uri: Option<String>,
    pub developer_id: Option<String>,
    pub account_type: Option<String>,
    pub client_cert_uri: Option<String>,
    pub auth_provider_cert_uri: Option<String>,
}

/// Service account JSON as downloaded from the vendor console
#[derive(Deserialize)]
struct RawServiceAccount {
    project_id: Option<String>,
    key_id: Option<String>,
    private_key: Option<String>,
    sub_account: Option<String>,
    token_uri: Option<String>,
    auth_uri: Option<String>,
    developer_id: Option<String>,
    #[serde(rename = "type")]
    account_type: Option<String>,
    client_cert_uri: Option<String>,
    auth_provider_cert_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Parse and validate service account JSON text
    pub fn parse(text: &str) -> Result<Self, PublishError> {
        let raw: RawServiceAccount =
            serde_json::from_str(text).map_err(|e| PublishError::Credential {
                message: format!("service account JSON is malformed: {}", e),
            })?;

        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let private_key = present(raw.private_key).map(|key| SecretString::new(key.into()));
        let key_id = present(raw.key_id);
        let sub_account = present(raw.sub_account);
        let token_uri = present(raw.token_uri);

        let mut missing = Vec::new();
        if key_id.is_none() {
            missing.push("key_id");
        }
        if private_key.is_none() {
            missing.push("private_key");
        }
        if sub_account.is_none() {
            missing.push("sub_account");
        }
        if token_uri.is_none() {
            missing.push("token_uri");
        }

        match (key_id, private_key, sub_account, token_uri) {
            (Some(key_id), Some(private_key), Some(sub_account), Some(token_uri)) => Ok(Self {
                key_id,
                private_key,
                sub_account,
                token_uri,
                project_id: raw.project_id,
                auth_uri: raw.auth_uri,
                developer_id: raw.developer_id,
                account_type: raw.account_type,
                client_cert_uri: raw.client_cert_uri,
                auth_provider_cert_uri: raw.auth_provider_cert_uri,
            }),
            _ => Err(PublishError::Credential {
                message: format!("service account is missing: {}", missing.join(", ")),
            }),
        }
    }
}

/// Where the credential comes from, as resolved from configuration
#[derive(Debug)]
pub enum CredentialSource {
    ClientCredential {
        client_id: String,
        client_secret: SecretString,
    },
    ServiceAccountFile(PathBuf),
    ServiceAccountJson(SecretString),
}

impl CredentialSource {
    /// Pick exactly one credential strategy from the merged configuration
    pub fn from_config(config: CredentialsConfig) -> Result<Self, PublishError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let client_id = non_empty(config.client_id);
        let client_secret = non_empty(config.client_secret);
        let json = non_empty(config.service_account_json);
        let file = config
            .service_account_file
            .filter(|path| !path.as_os_str().is_empty());

        let has_client = client_id.is_some() || client_secret.is_some();
        let has_service_account = json.is_some() || file.is_some();

        match (has_client, has_service_account) {
            (true, true) => Err(PublishError::Config(
                "credentials: specify either clientId/clientSecret or a service account, not both"
                    .to_string(),
            )),
            (false, false) => Err(PublishError::Config(
                "credentials: clientId/clientSecret or serviceAccountFile/serviceAccountJson is required"
                    .to_string(),
            )),
            (true, false) => match (client_id, client_secret) {
                (Some(client_id), Some(client_secret)) => Ok(Self::ClientCredential {
                    client_id,
                    client_secret: SecretString::new(client_secret.into()),
                }),
                _ => Err(PublishError::Config(
                    "credentials: clientId and clientSecret must both be set".to_string(),
                )),
            },
            (false, true) => match (file, json) {
                (Some(path), None) => Ok(Self::ServiceAccountFile(path)),
                (None, Some(json)) => Ok(Self::ServiceAccountJson(SecretString::new(json.into()))),
                _ => Err(PublishError::Config(
                    "credentials: serviceAccountFile and serviceAccountJson are mutually exclusive"
                        .to_string(),
                )),
            },
        }
    }

    /// Read (if needed) and parse the credential
    pub async fn load(&self) -> Result<Credential, PublishError> {
        match self {
            Self::ClientCredential {
                client_id,
                client_secret,
            } => Ok(Credential::ClientCredential {
                client_id: client_id.clone(),
                client_secret: SecretString::new(client_secret.expose_secret().into()),
            }),
            Self::ServiceAccountFile(path) => {
                let text = fs::read_to_string(path)
                    .await
                    .map_err(|e| PublishError::io(path, e))?;
                ServiceAccountKey::parse(&text).map(Credential::ServiceAccount)
            }
            Self::ServiceAccountJson(json) => {
                ServiceAccountKey::parse(json.expose_secret()).map(Credential::ServiceAccount)
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::ClientCredential { .. } => "client credentials",
            Self::ServiceAccountFile(_) | Self::ServiceAccountJson(_) => "service account",
        }
    }
}
