pub mod api;
pub mod core;
pub mod orchestration;
pub mod security;

pub use api::{DistributionApi, ReqwestTransport};
pub use crate::core::*;
pub use orchestration::{PublishReport, TestTrackPublisher};
pub use security::{Authenticator, Credential, SecretMasker, Session};
