mod cli;
mod commands;
mod output;

use anyhow::Result;
use cli::{Cli, Command};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = clustermsi_config::load_settings(&cli.config)?;

    match cli.command {
        Command::ImportDocument { file } => commands::import_document(&settings, file).await,
        Command::ShowDocument { key } => commands::show_document(&settings, key).await,
        Command::EnsureCertificate(args) => commands::ensure_certificate(&settings, args).await,
        Command::InitClients(args) => commands::init_clients(&settings, args).await,
        Command::IdentityIds(args) => commands::identity_ids(&settings, args).await,
        Command::FixupTenant(args) => commands::fixup_tenant(&settings, args).await,
    }
}
