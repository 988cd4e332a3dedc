use std::collections::{BTreeMap, HashMap};
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::algorithm::Algorithm;
use crate::error::SignatoryError;
use crate::kvform;

/// Which kind of relying party an association serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationClass {
    /// Long-lived, negotiated with a stateful relying party.
    Smart,
    /// Short-lived, provider-internal, checked via `check_authentication`.
    Dumb,
}

/// Anything an association can look signed field values up in.
pub trait FieldSource {
    fn field(&self, key: &str) -> Option<&str>;
}

impl FieldSource for BTreeMap<String, String> {
    fn field(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl FieldSource for HashMap<String, String> {
    fn field(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

/// One shared secret between the provider and a relying party.
///
/// Immutable once built: the store hands out clones and nothing mutates
/// them. The secret is wiped from memory when the last clone drops.
///
/// Serializes as a flat record with a base64 secret, for stores that keep
/// associations outside the process. Deserializing goes through
/// [`Association::new`], so a record whose secret does not fit its
/// algorithm is rejected.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "AssociationRecord", try_from = "AssociationRecord")]
pub struct Association {
    handle: String,
    algorithm: Algorithm,
    secret: Zeroizing<Vec<u8>>,
    issued_at: DateTime<Utc>,
    lifetime: Duration,
}

impl Association {
    /// Build an association, checking the secret against the algorithm.
    pub fn new(
        handle: impl Into<String>,
        algorithm: Algorithm,
        secret: Vec<u8>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<Self, SignatoryError> {
        let secret = Zeroizing::new(secret);
        if secret.len() != algorithm.digest_len() {
            return Err(SignatoryError::SecretLength {
                algorithm,
                expected: algorithm.digest_len(),
                actual: secret.len(),
            });
        }
        Ok(Self {
            handle: handle.into(),
            algorithm,
            secret,
            issued_at,
            lifetime,
        })
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + self.lifetime
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// HMAC over the `key_order` fields, read from `fields` as `prefix + key`
    /// and encoded as `key:value\n` lines with the bare key.
    pub fn sign<F>(
        &self,
        fields: &F,
        key_order: &[&str],
        prefix: &str,
    ) -> Result<Vec<u8>, SignatoryError>
    where
        F: FieldSource + ?Sized,
    {
        let pairs = key_order
            .iter()
            .map(|key| {
                let lookup = format!("{prefix}{key}");
                fields
                    .field(&lookup)
                    .map(|value| (*key, value))
                    .ok_or(SignatoryError::MissingField(lookup))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let message = kvform::encode(pairs)?;
        Ok(self.algorithm.mac(&self.secret, message.as_bytes()))
    }

    /// Base64 form of [`Association::sign`], as carried in `sig`.
    pub fn sign_base64<F>(
        &self,
        fields: &F,
        key_order: &[&str],
        prefix: &str,
    ) -> Result<String, SignatoryError>
    where
        F: FieldSource + ?Sized,
    {
        Ok(STANDARD.encode(self.sign(fields, key_order, prefix)?))
    }
}

#[derive(Serialize, Deserialize)]
struct AssociationRecord {
    handle: String,
    algorithm: Algorithm,
    secret: Zeroizing<String>,
    issued_at: DateTime<Utc>,
    lifetime_secs: i64,
}

impl From<Association> for AssociationRecord {
    fn from(association: Association) -> Self {
        Self {
            secret: Zeroizing::new(STANDARD.encode(association.secret.as_slice())),
            handle: association.handle,
            algorithm: association.algorithm,
            issued_at: association.issued_at,
            lifetime_secs: association.lifetime.num_seconds(),
        }
    }
}

impl TryFrom<AssociationRecord> for Association {
    type Error = SignatoryError;

    fn try_from(record: AssociationRecord) -> Result<Self, Self::Error> {
        let secret = STANDARD.decode(record.secret.as_bytes())?;
        Association::new(
            record.handle,
            record.algorithm,
            secret,
            record.issued_at,
            Duration::seconds(record.lifetime_secs),
        )
    }
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("handle", &self.handle)
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn association(algorithm: Algorithm) -> Association {
        Association::new(
            "{test}",
            algorithm,
            vec![7u8; algorithm.digest_len()],
            Utc::now(),
            Duration::minutes(5),
        )
        .unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rejects_secret_of_wrong_length() {
        let err = Association::new(
            "{h}",
            Algorithm::HmacSha256,
            vec![0u8; 20],
            Utc::now(),
            Duration::minutes(5),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SignatoryError::SecretLength {
                expected: 32,
                actual: 20,
                ..
            }
        ));
    }

    #[test]
    fn signs_kv_form_of_selected_keys_in_order() {
        let assoc = association(Algorithm::HmacSha256);
        let msg = fields(&[
            ("openid.mode", "id_res"),
            ("openid.identity", "http://alice.example/"),
            ("openid.unsigned", "ignored"),
        ]);
        let sig = assoc.sign(&msg, &["identity", "mode"], "openid.").unwrap();

        let mut mac = Hmac::<Sha256>::new_from_slice(&[7u8; 32]).unwrap();
        mac.update(b"identity:http://alice.example/\nmode:id_res\n");
        assert_eq!(sig, mac.finalize().into_bytes().to_vec());
    }

    #[test]
    fn key_order_changes_signature() {
        let assoc = association(Algorithm::HmacSha1);
        let msg = fields(&[("a", "1"), ("b", "2")]);
        let ab = assoc.sign(&msg, &["a", "b"], "").unwrap();
        let ba = assoc.sign(&msg, &["b", "a"], "").unwrap();
        assert_ne!(ab, ba);
    }

    #[test]
    fn empty_key_order_signs_empty_message() {
        let assoc = association(Algorithm::HmacSha1);
        let sig = assoc.sign(&fields(&[]), &[], "").unwrap();
        assert_eq!(sig, Algorithm::HmacSha1.mac(&[7u8; 20], b""));
    }

    #[test]
    fn missing_signed_field_is_an_error() {
        let assoc = association(Algorithm::HmacSha256);
        let err = assoc
            .sign(&fields(&[("openid.mode", "id_res")]), &["identity"], "openid.")
            .unwrap_err();
        assert!(matches!(err, SignatoryError::MissingField(ref key) if key == "openid.identity"));
    }

    #[test]
    fn expiry_is_strictly_after_lifetime() {
        let issued = Utc::now();
        let assoc = Association::new(
            "{h}",
            Algorithm::HmacSha1,
            vec![1u8; 20],
            issued,
            Duration::minutes(5),
        )
        .unwrap();
        assert!(!assoc.is_expired_at(issued + Duration::minutes(5)));
        assert!(assoc.is_expired_at(issued + Duration::minutes(5) + Duration::milliseconds(1)));
        assert_eq!(assoc.expires_at(), issued + Duration::seconds(300));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let assoc = association(Algorithm::HmacSha256);
        let rendered = format!("{assoc:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("[7, 7"));
    }

    #[test]
    fn serialized_form_survives_a_round_trip() {
        let assoc = association(Algorithm::HmacSha1);
        let json = serde_json::to_value(&assoc).unwrap();
        assert_eq!(json["algorithm"], "HMAC-SHA1");
        assert_eq!(json["secret"], STANDARD.encode([7u8; 20]));
        assert_eq!(json["lifetime_secs"], 300);

        let restored: Association = serde_json::from_value(json).unwrap();
        assert_eq!(restored.handle(), assoc.handle());
        assert_eq!(restored.secret(), assoc.secret());
        assert_eq!(restored.expires_at(), assoc.expires_at());
    }

    #[test]
    fn deserializing_rejects_secret_of_wrong_length() {
        let mut json = serde_json::to_value(association(Algorithm::HmacSha256)).unwrap();
        json["secret"] = STANDARD.encode([1u8; 20]).into();
        let err = serde_json::from_value::<Association>(json).unwrap_err();
        assert!(err.to_string().contains("32-byte secret"));
    }

    #[test]
    fn association_class_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AssociationClass::Smart).unwrap(),
            "\"smart\""
        );
    }
}
