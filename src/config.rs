//! TOML configuration file
//!
//! ```toml
//! [session]
//! max_write_retries = 5
//! max_status_polls = 100000
//! check_onfi_signature = true
//! reset_on_open = true
//! enable_internal_ecc = true
//!
//! [image]
//! index_page = 0
//!
//! [usb]
//! vendor_id = "0x09fb"
//! product_id = "0x6001"
//! interface = 1
//! timeout_ms = 5000
//! ```
//!
//! Every key is optional. Numbers may be written as hex strings.

use nandbridge_core::SessionConfig;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading the configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML or has unexpected keys
    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of the configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub session: SessionSection,
    pub image: ImageSection,
    pub usb: UsbSection,
}

/// `[session]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub max_write_retries: Option<u32>,
    /// 0 polls forever
    #[serde(deserialize_with = "deserialize_hex")]
    pub max_status_polls: Option<u32>,
    pub check_onfi_signature: Option<bool>,
    pub reset_on_open: Option<bool>,
    pub enable_internal_ecc: Option<bool>,
}

/// `[image]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSection {
    #[serde(deserialize_with = "deserialize_hex")]
    pub index_page: Option<u32>,
}

/// `[usb]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsbSection {
    #[serde(deserialize_with = "deserialize_hex")]
    pub vendor_id: Option<u16>,
    #[serde(deserialize_with = "deserialize_hex")]
    pub product_id: Option<u16>,
    pub interface: Option<u8>,
    pub timeout_ms: Option<u64>,
}

impl Config {
    /// Load `path`, or return the defaults if no path was given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Session tunables with the file's overrides applied
    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        let s = &self.session;
        SessionConfig {
            max_write_retries: s.max_write_retries.unwrap_or(defaults.max_write_retries),
            max_status_polls: match s.max_status_polls {
                Some(0) => None,
                Some(n) => Some(n),
                None => defaults.max_status_polls,
            },
            check_onfi_signature: s
                .check_onfi_signature
                .unwrap_or(defaults.check_onfi_signature),
            reset_on_open: s.reset_on_open.unwrap_or(defaults.reset_on_open),
            enable_internal_ecc: s
                .enable_internal_ecc
                .unwrap_or(defaults.enable_internal_ecc),
        }
    }

    /// Index page from the file, else page 0
    pub fn index_page(&self) -> u32 {
        self.image.index_page.unwrap_or(0)
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Deserialize an optional integer that can be hex (0x...) or decimal
fn deserialize_hex<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    use serde::de::Error;

    // Try to deserialize as a number first, then as a string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u64),
        Str(String),
    }

    let value = match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => n,
        HexOrInt::Str(s) => parse_number(&s).map_err(D::Error::custom)?,
    };
    T::try_from(value)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("value {} out of range", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.session_config(), SessionConfig::default());
        assert_eq!(config.index_page(), 0);
        assert!(config.usb.vendor_id.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [session]
            max_write_retries = 3
            max_status_polls = "0x1000"
            check_onfi_signature = false
            enable_internal_ecc = false

            [image]
            index_page = "0x40"

            [usb]
            vendor_id = "0x1209"
            product_id = 0x0001
            interface = 0
            timeout_ms = 250
            "#,
        )
        .unwrap();
        let session = config.session_config();
        assert_eq!(session.max_write_retries, 3);
        assert_eq!(session.max_status_polls, Some(0x1000));
        assert!(!session.check_onfi_signature);
        assert!(session.reset_on_open);
        assert!(!session.enable_internal_ecc);
        assert_eq!(config.index_page(), 64);
        assert_eq!(config.usb.vendor_id, Some(0x1209));
        assert_eq!(config.usb.product_id, Some(1));
        assert_eq!(config.usb.interface, Some(0));
        assert_eq!(config.usb.timeout_ms, Some(250));
    }

    #[test]
    fn test_zero_polls_means_unbounded() {
        let config = Config::parse("[session]\nmax_status_polls = 0\n").unwrap();
        assert_eq!(config.session_config().max_status_polls, None);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(Config::parse("[usb]\nvendor_id = \"0x10000\"\n").is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse("[image]\nindex = 3\n").is_err());
    }
}
