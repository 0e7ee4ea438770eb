//! Vendor API access
//!
//! Transport, authenticated gateway, envelope interpretation and the typed
//! endpoints used by the publishing pipeline.

pub mod endpoints;
pub mod envelope;
pub mod gateway;
pub mod http;

pub use endpoints::{DistributionApi, InviteCode, OpenTestInfo, TestGroup, UploadTicket};
pub use envelope::{ResponseEnvelope, RetEnvelope, RtnCodeEnvelope};
pub use gateway::{ApiCall, ApiGateway};
pub use http::ReqwestTransport;
