pub mod assertion;
pub mod authenticator;
pub mod credentials;
pub mod secret_masker;

pub use assertion::{AssertionClaims, AssertionHeader, SignedAssertion};
pub use authenticator::{Authenticator, Session};
pub use credentials::{Credential, CredentialSource, ServiceAccountKey};
pub use secret_masker::SecretMasker;
