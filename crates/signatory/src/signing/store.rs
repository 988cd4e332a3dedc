use super::association::{Association, AssociationClass};

/// Persistence for associations, keyed by `(class, handle)`.
///
/// Stores need not expire entries themselves: the signatory checks expiry
/// on every read and removes stale entries it finds. Removal must be
/// idempotent since concurrent lookups of one expired handle may both
/// remove it.
pub trait AssociationStore: Send + Sync {
    /// The error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save an association, replacing any entry with the same key.
    fn store(
        &self,
        class: AssociationClass,
        association: Association,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Load an association, expired or not.
    fn get(
        &self,
        class: AssociationClass,
        handle: &str,
    ) -> impl Future<Output = Result<Option<Association>, Self::Error>> + Send;

    /// Delete an association. Deleting an absent entry succeeds.
    fn remove(
        &self,
        class: AssociationClass,
        handle: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
