use std::time::Duration;

use async_trait::async_trait;
use clustermsi_domain::{ClusterDocument, DocumentKey, DomainError};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::lease::Lease;

/// Change applied to a private copy of a document inside `patch_with_lease`.
///
/// Must not touch anything but the copy it is handed: it may run and then be
/// thrown away if the commit loses a race.
pub type Mutation<'a> =
    Box<dyn FnOnce(&mut ClusterDocument) -> Result<(), DomainError> + Send + 'a>;

/// Versioned cluster document storage.
///
/// Backends implement the lease and compare-and-swap primitives; the patch
/// protocol built on top of them is shared by every backend.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, key: &DocumentKey) -> Result<ClusterDocument, StoreError>;

    /// Insert a new document at version 0. Fails if the key is taken.
    async fn create(&self, doc: &ClusterDocument) -> Result<ClusterDocument, StoreError>;

    /// Validity window of leases taken by `patch_with_lease`.
    fn lease_ttl(&self) -> Duration;

    // ── Primitives ───────────────────────────────────────────────────────────

    /// Take exclusive ownership of `key` for `ttl`. An expired lease held by
    /// someone else may be taken over; a live one yields `LeaseHeld`.
    async fn acquire_lease(&self, key: &DocumentKey, ttl: Duration) -> Result<Lease, StoreError>;

    /// Write `doc` as version `expected_version + 1` iff the stored version is
    /// still `expected_version` and `lease` is still the live lease.
    async fn compare_and_swap(
        &self,
        lease: &Lease,
        expected_version: u64,
        doc: &ClusterDocument,
    ) -> Result<ClusterDocument, StoreError>;

    /// Drop `lease` if it is still ours. Never removes another holder's lease.
    async fn release_lease(&self, lease: &Lease) -> Result<(), StoreError>;

    // ── Protocol ─────────────────────────────────────────────────────────────

    /// Acquire → read → mutate → conditional write → release.
    ///
    /// Single attempt: conflicts surface as errors with
    /// [`StoreError::is_conflict`] set and retrying is up to the caller. A
    /// mutation error is returned as [`StoreError::Mutation`] and nothing is
    /// written. The lease is released on every path.
    async fn patch_with_lease(
        &self,
        key: &DocumentKey,
        mutate: Mutation<'_>,
    ) -> Result<ClusterDocument, StoreError> {
        let lease = self.acquire_lease(key, self.lease_ttl()).await?;
        debug!(key = %key, holder = %lease.holder, "document lease acquired");

        let outcome = async {
            let current = self.get(key).await?;
            let expected = current.version;

            let mut next = current.clone();
            mutate(&mut next).map_err(StoreError::Mutation)?;
            // Key and version belong to the store, not to the mutation.
            next.key = current.key;
            next.version = expected;

            self.compare_and_swap(&lease, expected, &next).await
        }
        .await;

        if let Err(e) = self.release_lease(&lease).await {
            warn!(key = %key, holder = %lease.holder, error = %e, "failed to release document lease");
        }

        match &outcome {
            Ok(doc) => info!(key = %key, version = doc.version, "document patched"),
            Err(e) => debug!(key = %key, error = %e, "document patch aborted"),
        }
        outcome
    }
}
