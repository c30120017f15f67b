pub mod config;
pub mod logger;
pub(crate) mod signer_toml;

pub use config::*;
pub use logger::setup_logging;
