//! # Gatehouse Auth
//!
//! Opaque API key issuance and validation. Keys are random tokens with a
//! recognizable prefix; each record may carry a rate-limit override that
//! takes precedence over the matched route's default.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod keys;

pub use keys::{extract_api_key, ApiKeyManager, ApiKeyRecord, KEY_PREFIX};
