//! Storage configuration.

use serde::{Deserialize, Serialize};

/// Local storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory that asset paths are relative to.
    #[serde(default = "default_data_root")]
    pub data_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
        }
    }
}

fn default_data_root() -> String {
    "./data".to_string()
}
