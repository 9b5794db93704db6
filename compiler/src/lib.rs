pub mod config;
pub mod ir;
pub mod logging;

pub use config::{AddressSpaceConfig, ConfigError, VectorizerConfig};
pub use ir::vectorization::{LoadStoreVectorizer, VectorizerStats};
