//! Response envelope interpretation
//!
//! The vendor API answers in one of two incompatible envelope shapes
//! depending on the API family:
//!
//! - [`RetEnvelope`]: `{"ret": {"code": 0, "msg": "..."}, ...payload}`
//! - [`RtnCodeEnvelope`]: `{"rtnCode": 0, ...payload}` (no message on failure)
//!
//! The shape cannot be detected from a body, so every call site names the
//! envelope it expects as a type parameter. The status check always runs
//! before the payload is decoded.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

use crate::core::error::PublishError;

/// An envelope shape that can be opened into its payload
pub trait ResponseEnvelope {
    type Payload: DeserializeOwned;

    /// Check the envelope status and decode the payload
    fn open(body: Value) -> Result<Self::Payload, PublishError>;
}

/// `ret.code` envelope used by the OAuth, publishing and testing-version APIs
pub struct RetEnvelope<T>(PhantomData<T>);

/// `rtnCode` envelope used by the tester group and invite code APIs
pub struct RtnCodeEnvelope<T>(PhantomData<T>);

/// Status object of a `ret` envelope
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RetStatus {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
}

impl<T: DeserializeOwned> ResponseEnvelope for RetEnvelope<T> {
    type Payload = T;

    /// A body without `ret` carries no error (the token endpoint answers
    /// successes that way)
    fn open(body: Value) -> Result<T, PublishError> {
        if let Some(ret) = body.get("ret") {
            let status = RetStatus::deserialize(ret).map_err(|e| {
                PublishError::decode(format!("malformed ret status: {}", e), &body.to_string())
            })?;
            if status.code != 0 {
                return Err(PublishError::RetCode {
                    code: status.code,
                    message: status.msg.unwrap_or_default(),
                });
            }
        }
        decode_payload(body)
    }
}

impl<T: DeserializeOwned> ResponseEnvelope for RtnCodeEnvelope<T> {
    type Payload = T;

    fn open(body: Value) -> Result<T, PublishError> {
        let code = body
            .get("rtnCode")
            .and_then(Value::as_i64)
            .ok_or_else(|| PublishError::decode("missing numeric rtnCode", &body.to_string()))?;
        if code != 0 {
            return Err(PublishError::RtnCode { code });
        }
        decode_payload(body)
    }
}

fn decode_payload<T: DeserializeOwned>(body: Value) -> Result<T, PublishError> {
    T::deserialize(&body).map_err(|e| {
        PublishError::decode(format!("unexpected response shape: {}", e), &body.to_string())
    })
}
