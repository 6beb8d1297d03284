use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clustermsi_azure::{
    default_token_provider, AzureEnvironment, CloudEnvironment, HttpDataplaneClient,
    KeyVaultSecretStore, KEY_VAULT_SCOPE,
};
use clustermsi_config::{DocumentBackendConfig, Settings};
use clustermsi_domain::{ClusterDocument, DocumentKey, SubscriptionDocument};
use clustermsi_manager::{ClusterMsiManager, MsiDependencies};
use clustermsi_store::{
    DocumentStore, InMemoryDocumentStore, InMemorySecretStore, PostgresDocumentStore,
    RedbDocumentStore, SecretStore,
};
use tracing::warn;

use crate::cli::OperationArgs;
use crate::output;

// ── Wiring ────────────────────────────────────────────────────────────────────

const MEMORY_BACKEND_IS_EMPTY: &str =
    "the in-memory document store starts empty in every process; pass --document or configure a redb or postgres backend";

fn require_persistent_documents(settings: &Settings) -> Result<()> {
    if settings.documents == DocumentBackendConfig::Memory {
        bail!("{}", MEMORY_BACKEND_IS_EMPTY);
    }
    Ok(())
}

async fn document_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match &settings.documents {
        DocumentBackendConfig::Memory => {
            warn!("using the in-memory document store; nothing outlives this process");
            Arc::new(InMemoryDocumentStore::new().with_lease_ttl(settings.lease_ttl))
        }
        DocumentBackendConfig::Redb { path } => Arc::new(
            RedbDocumentStore::open(path, settings.lease_ttl)
                .with_context(|| format!("Failed to open document store at {}", path.display()))?,
        ),
        DocumentBackendConfig::Postgres { url } => Arc::new(
            PostgresDocumentStore::connect(url, settings.lease_ttl)
                .await
                .context("Failed to connect to the PostgreSQL document store")?,
        ),
    };
    Ok(store)
}

async fn dependencies(settings: &Settings) -> Result<MsiDependencies> {
    let environment = AzureEnvironment::from_name(&settings.cloud)
        .with_context(|| format!("Unknown cloud '{}'", settings.cloud))?;
    let options = environment.arm_client_options();

    let secrets: Arc<dyn SecretStore> = match &settings.key_vault_url {
        Some(url) => Arc::new(KeyVaultSecretStore::new(
            url.clone(),
            default_token_provider(&options.authority_host, KEY_VAULT_SCOPE),
        )),
        None => {
            warn!("no key_vault_url configured; secrets are kept in memory");
            Arc::new(InMemorySecretStore::new())
        }
    };

    let dataplane = Arc::new(HttpDataplaneClient::new(
        default_token_provider(&options.authority_host, &options.scope()),
        settings.dataplane_api_version.clone(),
    ));

    Ok(MsiDependencies {
        documents: document_store(settings).await?,
        secrets,
        dataplane,
        environment: Arc::new(environment),
        features: Arc::new(settings.features.clone()),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} in {}", what, path.display()))
}

async fn manager(settings: &Settings, args: &OperationArgs) -> Result<ClusterMsiManager> {
    let subscription: SubscriptionDocument = read_json(&args.subscription, "subscription document")?;
    if args.document.is_none() {
        require_persistent_documents(settings)?;
    }
    let deps = dependencies(settings).await?;
    if let Some(path) = &args.document {
        let seed: ClusterDocument = read_json(path, "cluster document")?;
        deps.documents
            .create(&seed)
            .await
            .with_context(|| format!("Failed to store cluster document '{}'", seed.key))?;
    }
    let doc = deps
        .documents
        .get(&DocumentKey::new(&args.key))
        .await
        .with_context(|| format!("Failed to load cluster document '{}'", args.key))?;
    Ok(ClusterMsiManager::new(doc, subscription, deps))
}

// ── Documents ─────────────────────────────────────────────────────────────────

pub async fn import_document(settings: &Settings, file: PathBuf) -> Result<()> {
    require_persistent_documents(settings)?;
    let doc: ClusterDocument = read_json(&file, "cluster document")?;
    let store = document_store(settings).await?;
    let stored = store
        .create(&doc)
        .await
        .with_context(|| format!("Failed to import cluster document '{}'", doc.key))?;
    println!("Imported {} (version {})", stored.key, stored.version);
    Ok(())
}

pub async fn show_document(settings: &Settings, key: String) -> Result<()> {
    require_persistent_documents(settings)?;
    let store = document_store(settings).await?;
    let doc = store
        .get(&DocumentKey::new(&key))
        .await
        .with_context(|| format!("Failed to load cluster document '{}'", key))?;
    print!("{}", output::render_document(&doc));
    Ok(())
}

// ── Operations ────────────────────────────────────────────────────────────────

pub async fn ensure_certificate(settings: &Settings, args: OperationArgs) -> Result<()> {
    let m = manager(settings, &args).await?;
    m.ensure_cluster_msi_certificate()
        .await
        .context("Failed to ensure cluster MSI certificate")?;
    println!("Cluster MSI certificate present ({})", m.secret_name()?);
    Ok(())
}

pub async fn init_clients(settings: &Settings, args: OperationArgs) -> Result<()> {
    let mut m = manager(settings, &args).await?;
    m.initialize_cluster_msi_clients()
        .await
        .context("Failed to initialize cluster MSI clients")?;
    println!(
        "Cluster MSI clients initialized for subscription {}",
        m.subscription_document().id
    );
    Ok(())
}

pub async fn identity_ids(settings: &Settings, args: OperationArgs) -> Result<()> {
    let mut m = manager(settings, &args).await?;
    m.ensure_cluster_identity_ids()
        .await
        .context("Failed to record cluster MSI identity ids")?;
    print!("{}", output::render_document(m.document()));
    Ok(())
}

pub async fn fixup_tenant(settings: &Settings, args: OperationArgs) -> Result<()> {
    let mut m = manager(settings, &args).await?;
    m.fixup_cluster_msi_tenant_id()
        .await
        .context("Failed to fix up cluster MSI tenant id")?;
    print!("{}", output::render_document(m.document()));
    Ok(())
}
