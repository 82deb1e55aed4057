//! Annal Crypto - Hashing and keyed signatures for the audit chain.
//!
//! This crate provides:
//! - BLAKE3 content hashing with domain separation
//! - The length-prefixed chain hash linking each record to its predecessor
//! - HMAC-SHA256 record signatures keyed by a configured secret
//!
//! Everything here is a pure function over bytes. There is no I/O and no
//! shared state, so chains can be re-verified offline.
//!
//! # Example
//!
//! ```
//! use annal_crypto::{ContentHash, SigningKey};
//!
//! let first = ContentHash::chain(None, b"record one");
//! let second = ContentHash::chain(Some(&first), b"record two");
//! assert_ne!(first, second);
//!
//! let key = SigningKey::new("app-secret").unwrap();
//! let signature = key.sign(&second).unwrap();
//! assert!(key.verify(&second, &signature).is_ok());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;
mod mac;

pub use error::{CryptoError, CryptoResult};
pub use hash::{CHAIN_CONTEXT, ContentHash};
pub use mac::{RecordSignature, SigningKey};
