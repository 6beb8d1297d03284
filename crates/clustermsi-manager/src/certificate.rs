use chrono::{Duration, Utc};
use clustermsi_config::Feature;
use clustermsi_domain::SecretProperties;
use tracing::{debug, info};

use crate::error::MsiError;
use crate::manager::ClusterMsiManager;

/// Validity the mock MSI dataplane is assumed to grant.
const MOCK_CERTIFICATE_VALIDITY_DAYS: i64 = 90;

impl ClusterMsiManager {
    /// Make sure the cluster MSI's credentials object is in the secret store.
    ///
    /// An existing secret is left alone. Only a missing secret triggers a
    /// dataplane fetch and a single write; any other lookup failure is
    /// returned. The cluster document is never touched.
    pub async fn ensure_cluster_msi_certificate(&self) -> Result<(), MsiError> {
        let msi = self.cluster_msi_resource_id()?;
        let secret_name = self.secret_name_for(&msi);

        match self.deps.secrets.get(&secret_name).await {
            Ok(_) => {
                debug!(secret_name = %secret_name, "cluster MSI certificate already stored");
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(source) => {
                return Err(MsiError::SecretLookup {
                    name: secret_name,
                    source,
                })
            }
        }

        let creds = self.fetch_credentials(&msi).await?;

        let now = Utc::now();
        let expires = if self.deps.features.is_set(Feature::UseMockMsiRp) {
            now + Duration::days(MOCK_CERTIFICATE_VALIDITY_DAYS)
        } else {
            self.single_identity(&msi, &creds)?.expires_at()?
        };

        let value = serde_json::to_string(&creds)?;
        let properties = SecretProperties {
            name: secret_name.clone(),
            enabled: true,
            expires,
            not_before: now,
        };
        self.deps
            .secrets
            .set(&properties, &value)
            .await
            .map_err(|source| MsiError::SecretWrite {
                name: secret_name.clone(),
                source,
            })?;

        info!(secret_name = %secret_name, expires = %expires, "cluster MSI certificate stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::{Duration, TimeZone, Utc};
    use clustermsi_domain::{CredentialsObject, SecretProperties};
    use clustermsi_store::SecretStore;

    use crate::error::ErrorKind;
    use crate::testing::*;

    fn secret_name() -> String {
        format!("{}-Cluster-MSI", DOC_ID)
    }

    #[tokio::test]
    async fn existing_secret_means_no_work() {
        let h = Harness::new().await;
        let now = Utc::now();
        h.secrets
            .inner
            .set(
                &SecretProperties {
                    name: secret_name(),
                    enabled: true,
                    expires: now + Duration::days(1),
                    not_before: now,
                },
                "{}",
            )
            .await
            .unwrap();

        h.manager().ensure_cluster_msi_certificate().await.unwrap();
        assert_eq!(h.secrets.sets(), 0);
        assert_eq!(h.dataplane.calls(), 0);
    }

    #[tokio::test]
    async fn missing_secret_is_created_once_in_mock_mode() {
        let h = Harness::new().await.with_mock_msi();
        // The mock dataplane reports no expiry at all.
        let creds = credentials(vec![identity_json(None)]);
        h.dataplane.respond_with(creds.clone());

        h.manager().ensure_cluster_msi_certificate().await.unwrap();

        assert_eq!(h.dataplane.calls(), 1);
        assert_eq!(h.secrets.sets(), 1);
        let stored = h.secrets.inner.get(&secret_name()).await.unwrap();
        assert!(stored.enabled);
        let nbf = stored.not_before.unwrap();
        assert_eq!(stored.expires.unwrap(), nbf + Duration::days(90));
        let round_trip: CredentialsObject = serde_json::from_str(&stored.value).unwrap();
        assert_eq!(round_trip, creds);
    }

    #[tokio::test]
    async fn request_targets_cluster_identity() {
        let h = Harness::new().await.with_mock_msi();
        h.dataplane.respond_with(credentials(vec![identity_json(None)]));

        h.manager().ensure_cluster_msi_certificate().await.unwrap();

        let requests = h.dataplane.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].identity_url, IDENTITY_URL);
        assert_eq!(requests[0].resource_ids, vec![MSI_RID.to_string()]);
        assert_eq!(requests[0].tenant_id, CLUSTER_TENANT);
    }

    #[tokio::test]
    async fn real_mode_uses_not_after() {
        let h = Harness::new().await;
        h.dataplane
            .respond_with(credentials(vec![identity_json(Some("2030-01-01T00:00:00Z"))]));

        h.manager().ensure_cluster_msi_certificate().await.unwrap();

        let stored = h.secrets.inner.get(&secret_name()).await.unwrap();
        assert_eq!(
            stored.expires,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn real_mode_with_extra_identities_uses_the_first() {
        let h = Harness::new().await;
        h.dataplane.respond_with(credentials(vec![
            identity_json(Some("2030-01-01T00:00:00Z")),
            identity_json(Some("2040-01-01T00:00:00Z")),
        ]));

        h.manager().ensure_cluster_msi_certificate().await.unwrap();

        assert_eq!(h.secrets.sets(), 1);
        let stored = h.secrets.inner.get(&secret_name()).await.unwrap();
        assert_eq!(
            stored.expires,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn real_mode_without_not_after_writes_nothing() {
        let h = Harness::new().await;
        h.dataplane.respond_with(credentials(vec![identity_json(None)]));

        let err = h.manager().ensure_cluster_msi_certificate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert_eq!(h.secrets.sets(), 0);
    }

    #[tokio::test]
    async fn real_mode_with_malformed_not_after_writes_nothing() {
        let h = Harness::new().await;
        h.dataplane
            .respond_with(credentials(vec![identity_json(Some("next tuesday"))]));

        let err = h.manager().ensure_cluster_msi_certificate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        assert_eq!(h.secrets.sets(), 0);
    }

    #[tokio::test]
    async fn real_mode_without_identities_is_identity_not_present() {
        let h = Harness::new().await;
        h.dataplane.respond_with(credentials(vec![]));

        let err = h.manager().ensure_cluster_msi_certificate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IdentityNotPresent);
        assert_eq!(h.secrets.sets(), 0);
    }

    #[tokio::test]
    async fn broken_secret_store_is_not_treated_as_missing() {
        let h = Harness::new().await;
        h.secrets.unavailable.store(true, Ordering::SeqCst);

        let err = h.manager().ensure_cluster_msi_certificate().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(err.to_string().contains(&secret_name()), "got: {}", err);
        assert_eq!(h.dataplane.calls(), 0);
        assert_eq!(h.secrets.sets(), 0);
    }

    #[tokio::test]
    async fn dataplane_failure_writes_nothing() {
        let h = Harness::new().await;

        let err = h.manager().ensure_cluster_msi_certificate().await.unwrap_err();
        assert!(err.to_string().contains(MSI_RID), "got: {}", err);
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(h.secrets.sets(), 0);
    }

    #[tokio::test]
    async fn cluster_document_is_untouched() {
        let h = Harness::new().await.with_mock_msi();
        h.dataplane.respond_with(credentials(vec![identity_json(None)]));

        h.manager().ensure_cluster_msi_certificate().await.unwrap();
        assert_eq!(h.stored().await, workload_document());
    }
}
