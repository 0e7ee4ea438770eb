//! Self-signed service account assertions
//!
//! The assertion is a JWS in compact form: base64url(header) "." base64url(claims)
//! "." base64url(signature), signed with RSASSA-PSS over SHA-256 with a salt as
//! long as the digest. The vendor accepts it directly as a bearer token.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::core::error::PublishError;
use crate::security::credentials::ServiceAccountKey;

/// Lifetime of an assertion in seconds
pub const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Signature algorithm identifier for RSA-PSS with SHA-256
pub const ASSERTION_ALGORITHM: &str = "PS256";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionHeader {
    pub kid: String,
    pub typ: String,
    pub alg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signed assertion ready to be presented as a bearer token
#[derive(Debug)]
pub struct SignedAssertion {
    pub header: AssertionHeader,
    pub claims: AssertionClaims,
    token: SecretString,
}

impl SignedAssertion {
    /// Build and sign an assertion for `key`, issued at `issued_at`
    pub fn build(key: &ServiceAccountKey, issued_at: DateTime<Utc>) -> Result<Self, PublishError> {
        let header = AssertionHeader {
            kid: key.key_id.clone(),
            typ: "JWT".to_string(),
            alg: ASSERTION_ALGORITHM.to_string(),
        };
        let iat = issued_at.timestamp();
        let claims = AssertionClaims {
            aud: key.token_uri.clone(),
            iss: key.sub_account.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&claims)?);

        let private_key = parse_private_key(key.private_key.expose_secret())?;
        let signing_key = BlindedSigningKey::<Sha256>::new(private_key);
        let signature = signing_key
            .try_sign_with_rng(&mut rand::thread_rng(), signing_input.as_bytes())
            .map_err(|e| PublishError::Authentication {
                message: format!("failed to sign service account assertion: {}", e),
            })?;

        let token = format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );

        Ok(Self {
            header,
            claims,
            token: SecretString::new(token.into()),
        })
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn into_token(self) -> SecretString {
        self.token
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, PublishError> {
    let json = serde_json::to_vec(value).map_err(|e| PublishError::Authentication {
        message: format!("failed to encode assertion segment: {}", e),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Parse a PEM private key in PKCS#8 or PKCS#1 form
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, PublishError> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| PublishError::Credential {
            message: format!("private_key is not a valid RSA PEM key: {}", e),
        })
}
