use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration, Utc};
use rand::RngCore;
use subtle::ConstantTimeEq;

use super::algorithm::Algorithm;
use super::association::{Association, AssociationClass, FieldSource};
use super::response::Response;
use super::store::AssociationStore;
use crate::error::SignatoryError;
use crate::kvform;
use crate::protocol::{ProviderContext, fields};

/// Lifetime of associations negotiated with smart relying parties.
pub const SMART_LIFETIME_SECS: i64 = 14 * 24 * 60 * 60;

/// Lifetime of provider-internal secrets used for dumb relying parties.
pub const DUMB_LIFETIME_SECS: i64 = 5 * 60;

/// Size of the random disambiguator embedded in every handle.
const HANDLE_NONCE_LEN: usize = 4;

/// The provider's signing authority.
///
/// Holds nothing but the association store, so one instance can serve
/// any number of concurrent requests.
pub struct Signatory<S> {
    store: S,
}

impl<S: AssociationStore> Signatory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sign `response` in place.
    ///
    /// Uses the smart association the relying party asked for when it is
    /// still live. Otherwise a fresh dumb association signs the response and,
    /// if a handle had been requested, `invalidate_handle` tells the relying
    /// party to forget it.
    #[tracing::instrument(skip_all, fields(requested = response.requested_handle()))]
    pub async fn sign(&self, response: &mut Response) -> Result<(), SignatoryError> {
        // Fail before touching the store or the response.
        check_signable(response)?;

        let requested = response
            .requested_handle()
            .filter(|handle| !handle.is_empty())
            .map(str::to_owned);

        let mut draft = response.clone();
        let association = match requested {
            Some(handle) => {
                let live = self.get_association(&handle, AssociationClass::Smart).await?;
                match live {
                    Some(association) => association,
                    None => {
                        tracing::warn!(%handle, "requested association is unknown or expired");
                        let association =
                            self.create_association(AssociationClass::Dumb, None).await?;
                        draft.set_field(fields::INVALIDATE_HANDLE, handle);
                        association
                    }
                }
            }
            None => self.create_association(AssociationClass::Dumb, None).await?,
        };

        draft.set_signed_field(fields::ASSOC_HANDLE, association.handle());
        draft.mark_signed(fields::SIGNED);
        let signed_list = draft.signed().join(",");
        draft.set_field(fields::SIGNED, signed_list);

        let signature = {
            let key_order: Vec<&str> = draft.signed().iter().map(String::as_str).collect();
            association.sign_base64(&draft, &key_order, "")?
        };
        draft.set_field(fields::SIG, signature);

        *response = draft;
        tracing::debug!(handle = association.handle(), "signed response");
        Ok(())
    }

    /// Check a signature issued under a dumb association.
    ///
    /// `message` holds the relying party's `openid.`-prefixed arguments and
    /// `key_order` the unprefixed names from its `openid.signed` list.
    /// Unknown or expired handles, malformed field sets and mismatches all
    /// yield `false`; only store failures are errors.
    #[tracing::instrument(skip(self, signature, message, key_order))]
    pub async fn verify<F>(
        &self,
        handle: &str,
        signature: &str,
        message: &F,
        key_order: &[&str],
    ) -> Result<bool, SignatoryError>
    where
        F: FieldSource + Sync + ?Sized,
    {
        if handle.is_empty() {
            tracing::debug!("verification request without a handle");
            return Ok(false);
        }

        let Some(association) = self.get_association(handle, AssociationClass::Dumb).await? else {
            return Ok(false);
        };

        let expected = match association.sign_base64(message, key_order, fields::PREFIX) {
            Ok(expected) => expected,
            Err(err @ (SignatoryError::MissingField(_) | SignatoryError::KvForm(_))) => {
                tracing::debug!(error = %err, "signed field set cannot be reproduced");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let valid: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        tracing::debug!(valid, "signature checked");
        Ok(valid)
    }

    /// Create and persist a new association of `class`.
    ///
    /// Dumb associations always use HMAC-SHA256. Smart associations take
    /// the algorithm from the request's `assoc_type`, which must name a
    /// type the request's protocol version advertises.
    pub async fn create_association(
        &self,
        class: AssociationClass,
        context: Option<&dyn ProviderContext>,
    ) -> Result<Association, SignatoryError> {
        let (algorithm, lifetime) = match class {
            AssociationClass::Dumb => (Algorithm::HmacSha256, Duration::seconds(DUMB_LIFETIME_SECS)),
            AssociationClass::Smart => {
                let context = context.ok_or(SignatoryError::MissingProviderContext)?;
                (
                    negotiated_algorithm(context)?,
                    Duration::seconds(SMART_LIFETIME_SECS),
                )
            }
        };

        let issued_at = Utc::now();
        let nonce = STANDARD.encode(random_bytes(HANDLE_NONCE_LEN));
        let timestamp = issued_at.timestamp_millis() as f64 / 1000.0;
        let handle = format!("{{{}}}{{{timestamp}}}{{{nonce}}}", algorithm.name());

        let association = Association::new(
            handle,
            algorithm,
            random_bytes(algorithm.digest_len()),
            issued_at,
            lifetime,
        )?;

        self.store
            .store(class, association.clone())
            .await
            .map_err(SignatoryError::store)?;

        tracing::info!(
            ?class,
            %algorithm,
            handle = association.handle(),
            "created association"
        );
        Ok(association)
    }

    /// Look up a live association.
    ///
    /// Missing and expired entries are removed from the store and reported
    /// as `None`.
    pub async fn get_association(
        &self,
        handle: &str,
        class: AssociationClass,
    ) -> Result<Option<Association>, SignatoryError> {
        if handle.is_empty() {
            return Err(SignatoryError::MissingHandle);
        }

        let stored = self
            .store
            .get(class, handle)
            .await
            .map_err(SignatoryError::store)?;

        match stored {
            Some(association) if !association.is_expired() => Ok(Some(association)),
            stale => {
                if stale.is_some() {
                    tracing::debug!(?class, handle, "evicting expired association");
                } else {
                    tracing::debug!(?class, handle, "association not found");
                }
                self.store
                    .remove(class, handle)
                    .await
                    .map_err(SignatoryError::store)?;
                Ok(None)
            }
        }
    }

    /// Remove an association. Removing an absent one is not an error.
    pub async fn invalidate(
        &self,
        handle: &str,
        class: AssociationClass,
    ) -> Result<(), SignatoryError> {
        tracing::debug!(?class, handle, "invalidating association");
        self.store
            .remove(class, handle)
            .await
            .map_err(SignatoryError::store)
    }
}

fn negotiated_algorithm(context: &dyn ProviderContext) -> Result<Algorithm, SignatoryError> {
    let name = context
        .assoc_type()
        .ok_or(SignatoryError::MissingArgument(fields::ASSOC_TYPE))?;
    let algorithm: Algorithm = name.parse()?;
    if !context.protocol().advertises(algorithm) {
        return Err(SignatoryError::UnsupportedAlgorithm(name.to_string()));
    }
    Ok(algorithm)
}

/// Every signed field the caller set must exist and encode as key-value
/// form. `assoc_handle` and `signed` are filled in by `sign` itself.
fn check_signable(response: &Response) -> Result<(), SignatoryError> {
    let pairs = response
        .signed()
        .iter()
        .map(String::as_str)
        .filter(|name| *name != fields::ASSOC_HANDLE && *name != fields::SIGNED)
        .map(|name| {
            response
                .field(name)
                .map(|value| (name, value))
                .ok_or_else(|| SignatoryError::MissingField(name.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    kvform::encode(pairs)?;
    Ok(())
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}
