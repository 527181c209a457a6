//! Test doubles for the credential vault port.
//!
//! Built for this crate's own tests and, behind the `test-utils` feature,
//! for downstream crates exercising code generic over [`SecretVault`].
//!
//! [`SecretVault`]: crate::auth::SecretVault

pub mod mocks;

pub use mocks::{MockKeychainProvider, UnavailableKeychain};
