mod raw;
mod loader;
pub mod error;
pub mod flags;
pub mod settings;

pub use error::ConfigError;
pub use flags::{Feature, FeatureFlags, FeatureSet};
pub use loader::{load_settings, parse_settings};
pub use settings::{DocumentBackendConfig, Settings};
