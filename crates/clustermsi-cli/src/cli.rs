use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "clustermsi",
    about = "Cluster managed-identity credential lifecycle operations",
    version
)]
pub struct Cli {
    /// Settings file (YAML).
    #[arg(long, env = "CLUSTERMSI_CONFIG", global = true, default_value = "clustermsi.yml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a cluster document (JSON) in the configured document backend.
    ImportDocument {
        /// Path to the cluster document.
        file: PathBuf,
    },

    /// Print a stored cluster document.
    ShowDocument {
        /// Document key.
        #[arg(long)]
        key: String,
    },

    /// Make sure the cluster MSI certificate is in the secret store.
    EnsureCertificate(OperationArgs),

    /// Build the managed-identity ARM clients from the stored certificate.
    InitClients(OperationArgs),

    /// Record the cluster MSI client and principal ids in the document.
    IdentityIds(OperationArgs),

    /// Set the cluster identity tenant to the subscription tenant.
    FixupTenant(OperationArgs),
}

#[derive(Debug, Args)]
pub struct OperationArgs {
    /// Key of the cluster document to operate on.
    #[arg(long)]
    pub key: String,

    /// Path to the subscription document (JSON).
    #[arg(long)]
    pub subscription: PathBuf,

    /// Cluster document (JSON) to store before the operation runs. Required
    /// with the in-memory backend, which starts empty in every process.
    #[arg(long)]
    pub document: Option<PathBuf>,
}
