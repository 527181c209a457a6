//! Security primitives
//!
//! Generic secret storage used by the OAuth token store. Token-specific
//! layout (one JSON record per storage identity) lives in `auth::store`.

pub mod keychain;

pub use keychain::{KeychainError, KeychainProvider, KEYRING_SERVICE_NAME};
