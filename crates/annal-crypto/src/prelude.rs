//! Prelude module - commonly used types for convenient import.
//!
//! ```rust
//! use annal_crypto::prelude::*;
//!
//! let hash = ContentHash::chain(None, b"payload");
//! let key = SigningKey::new("secret").unwrap();
//! assert!(key.verify(&hash, &key.sign(&hash).unwrap()).is_ok());
//! ```

// Errors
pub use crate::{CryptoError, CryptoResult};

// Hashing
pub use crate::ContentHash;

// Signatures
pub use crate::{RecordSignature, SigningKey};
