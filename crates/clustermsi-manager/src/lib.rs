pub mod certificate;
pub mod clients;
pub mod error;
pub mod identity;
pub mod manager;

#[cfg(test)]
mod testing;

pub use error::{ErrorKind, MsiError};
pub use manager::{ClusterMsiManager, MsiClients, MsiDependencies};
