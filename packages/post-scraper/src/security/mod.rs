//! Credential handling and SSRF protection.

pub mod credentials;
pub mod url_validator;

pub use credentials::{LoginCredentials, SecretString};
pub use url_validator::UrlValidator;
