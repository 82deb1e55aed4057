//! Chain hashing and record signatures.

use annal_crypto::{ContentHash, RecordSignature, SigningKey};

use crate::error::{AuditError, AuditResult};
use crate::schema::AuditSettings;

/// Hash canonical record bytes onto the chain.
///
/// `previous` is `None` for the genesis record.
#[must_use]
pub fn chain_hash(normalized: &[u8], previous: Option<&ContentHash>) -> ContentHash {
    ContentHash::chain(previous, normalized)
}

/// Sign a record hash.
///
/// # Errors
///
/// Returns [`AuditError::Crypto`] if the MAC rejects the key.
pub fn sign(hash: &ContentHash, key: &SigningKey) -> AuditResult<RecordSignature> {
    Ok(key.sign(hash)?)
}

/// Check a signature in constant time.
#[must_use]
pub fn verify_signature(hash: &ContentHash, signature: &RecordSignature, key: &SigningKey) -> bool {
    key.verify(hash, signature).is_ok()
}

/// Derive the signing key from settings.
///
/// Returns `Ok(None)` when signing is disabled.
///
/// # Errors
///
/// Returns [`AuditError::Configuration`] when signing is enabled and the
/// secret is missing or empty.
pub fn signing_key(settings: &AuditSettings) -> AuditResult<Option<SigningKey>> {
    if !settings.signing_enabled {
        return Ok(None);
    }
    let secret = settings
        .signing_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AuditError::Configuration(
                "signing is enabled but no signing secret is configured".into(),
            )
        })?;
    Ok(Some(SigningKey::new(secret)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, secret: Option<&str>) -> AuditSettings {
        AuditSettings {
            signing_enabled: enabled,
            signing_secret: secret.map(str::to_owned),
            ..AuditSettings::default()
        }
    }

    #[test]
    fn test_chain_depends_on_previous() {
        let genesis = chain_hash(b"a", None);
        let linked = chain_hash(b"a", Some(&genesis));
        assert_ne!(genesis, linked);
        assert_eq!(genesis, chain_hash(b"a", None));
    }

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::new("k1").unwrap();
        let other = SigningKey::new("k2").unwrap();
        let hash = chain_hash(b"row", None);
        let sig = sign(&hash, &key).unwrap();
        assert!(verify_signature(&hash, &sig, &key));
        assert!(!verify_signature(&hash, &sig, &other));
        assert!(!verify_signature(&chain_hash(b"other", None), &sig, &key));
    }

    #[test]
    fn test_signing_key_resolution() {
        assert!(signing_key(&settings(false, None)).unwrap().is_none());
        assert!(signing_key(&settings(false, Some("s"))).unwrap().is_none());
        assert!(signing_key(&settings(true, Some("s"))).unwrap().is_some());
        assert!(matches!(
            signing_key(&settings(true, None)),
            Err(AuditError::Configuration(_))
        ));
        assert!(matches!(
            signing_key(&settings(true, Some(""))),
            Err(AuditError::Configuration(_))
        ));
    }
}
