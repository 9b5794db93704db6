//! Vectorizer configuration
//!
//! Read from TOML (`lsv.toml`) or JSON. Every key is optional:
//!
//! ```toml
//! chunk-size = 64
//! target-base-align = 4
//! default-register-bits = 128
//!
//! [[address-space]]
//! id = 3
//! register-bits = 64
//! pointer-bits = 32
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tunables of the load/store vectorizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct VectorizerConfig {
    /// Master switch; a disabled pass reports no modification
    pub enabled: bool,

    /// Accesses considered together by the pairwise adjacency search
    pub chunk_size: usize,

    /// Alignment stack objects are raised to when a chain is misaligned
    pub target_base_align: u32,

    /// Vector register width for address spaces without an override
    pub default_register_bits: u32,

    /// Pointer width for address spaces without an override
    pub default_pointer_bits: u32,

    /// How many GEP/cast steps are stripped when grouping by base object
    pub max_underlying_object_depth: usize,

    /// Skip functions marked `no_implicit_float`
    pub respect_no_implicit_float: bool,

    /// Per address space overrides
    #[serde(rename = "address-space")]
    pub address_spaces: Vec<AddressSpaceConfig>,
}

/// Target facts for one address space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AddressSpaceConfig {
    pub id: u32,
    pub register_bits: Option<u32>,
    pub pointer_bits: Option<u32>,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 64,
            target_base_align: 4,
            default_register_bits: 128,
            default_pointer_bits: 64,
            max_underlying_object_depth: 6,
            respect_no_implicit_float: true,
            address_spaces: Vec::new(),
        }
    }
}

/// Configuration loading failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The TOML text could not be parsed
    Toml(String),
    /// The JSON text could not be parsed
    Json(String),
    /// A value parsed but is unusable
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Toml(msg) => write!(f, "failed to parse vectorizer TOML: {}", msg),
            ConfigError::Json(msg) => write!(f, "failed to parse vectorizer JSON: {}", msg),
            ConfigError::Invalid { key, reason } => {
                write!(f, "invalid vectorizer setting '{}': {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl VectorizerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: VectorizerConfig =
            toml::from_str(text).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: VectorizerConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Json(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Reject values the pass cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "chunk-size",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.target_base_align.is_power_of_two() {
            return Err(ConfigError::Invalid {
                key: "target-base-align",
                reason: format!("{} is not a power of two", self.target_base_align),
            });
        }
        if self.max_underlying_object_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "max-underlying-object-depth",
                reason: "must be at least 1".to_string(),
            });
        }
        let widths = std::iter::once(("default-pointer-bits", Some(self.default_pointer_bits)))
            .chain(
                self.address_spaces
                    .iter()
                    .map(|space| ("address-space.pointer-bits", space.pointer_bits)),
            );
        for (key, bits) in widths {
            if let Some(bits) = bits {
                if bits == 0 || bits > 64 || bits % 8 != 0 {
                    return Err(ConfigError::Invalid {
                        key,
                        reason: format!("{} bits is not a supported pointer width", bits),
                    });
                }
            }
        }
        let mut seen = std::collections::HashSet::new();
        for space in &self.address_spaces {
            if !seen.insert(space.id) {
                return Err(ConfigError::Invalid {
                    key: "address-space.id",
                    reason: format!("address space {} configured twice", space.id),
                });
            }
        }
        Ok(())
    }

    /// Vector register width of an address space
    pub fn register_bits(&self, addr_space: u32) -> u32 {
        self.address_space(addr_space)
            .and_then(|s| s.register_bits)
            .unwrap_or(self.default_register_bits)
    }

    /// Pointer width of an address space
    pub fn pointer_bits(&self, addr_space: u32) -> u32 {
        self.address_space(addr_space)
            .and_then(|s| s.pointer_bits)
            .unwrap_or(self.default_pointer_bits)
    }

    fn address_space(&self, id: u32) -> Option<&AddressSpaceConfig> {
        self.address_spaces.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VectorizerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.chunk_size, 64);
        assert_eq!(config.register_bits(0), 128);
        assert_eq!(config.pointer_bits(7), 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = VectorizerConfig::from_toml_str(
            r#"
            chunk-size = 16
            default-register-bits = 256

            [[address-space]]
            id = 3
            register-bits = 64
            pointer-bits = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.target_base_align, 4);
        assert_eq!(config.register_bits(0), 256);
        assert_eq!(config.register_bits(3), 64);
        assert_eq!(config.pointer_bits(3), 32);
    }

    #[test]
    fn test_from_json() {
        let config = VectorizerConfig::from_json_str(
            r#"{ "enabled": false, "address-space": [{ "id": 1, "register-bits": 512 }] }"#,
        )
        .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.register_bits(1), 512);
        assert_eq!(config.pointer_bits(1), 64);
    }

    #[test]
    fn test_invalid_values() {
        let err = VectorizerConfig::from_toml_str("chunk-size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "chunk-size", .. }));

        let err = VectorizerConfig::from_toml_str("target-base-align = 6").unwrap_err();
        assert!(err.to_string().contains("target-base-align"));

        assert!(matches!(
            VectorizerConfig::from_toml_str("chunk-size = \"many\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = VectorizerConfig::default();
        config.address_spaces.push(AddressSpaceConfig {
            id: 2,
            register_bits: Some(64),
            pointer_bits: None,
        });
        let text = config.to_toml_string().unwrap();
        assert_eq!(VectorizerConfig::from_toml_str(&text).unwrap(), config);
    }
}
