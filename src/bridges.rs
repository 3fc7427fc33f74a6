//! Bridge registration and dispatch
//!
//! A bridge is selected with a string of the form `name` or
//! `name:key1=value1,key2=value2`. This module knows every bridge compiled
//! in, parses its parameters and opens a session on it.

use std::collections::HashMap;

use nandbridge_core::{NandSession, SessionConfig, Transport};
use thiserror::Error;

use crate::config::{parse_number, Config};

/// Session over whichever bridge was selected
pub type BridgeSession = NandSession<Box<dyn Transport>>;

/// Errors selecting or configuring a bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No bridge with that name is compiled in
    #[error("unknown bridge '{0}' (available: {1})")]
    Unknown(String, String),

    /// Parameter not of the form key=value
    #[error("invalid parameter format: '{0}' (expected key=value)")]
    Format(String),

    /// Parameter the bridge does not understand
    #[error("bridge '{bridge}' has no parameter '{key}'")]
    UnknownParameter { bridge: &'static str, key: String },

    /// Parameter value could not be parsed
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Information about a bridge
pub struct BridgeInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all bridges enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_bridges() -> Vec<BridgeInfo> {
    let mut bridges = Vec::new();

    #[cfg(feature = "usb")]
    bridges.push(BridgeInfo {
        name: "usb",
        aliases: &["bridge"],
        description: "USB bulk bridge (vid=<id>,pid=<id>,index=<n>,interface=<n>,timeout=<ms>)",
    });

    #[cfg(feature = "dummy")]
    bridges.push(BridgeInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "In-memory NAND emulator (blocks=<n>,bad=<a+b+..>,wp=<0|1>,busy=<polls>)",
    });

    bridges
}

/// Short list of bridge names for error messages
pub fn bridge_names_short() -> String {
    let names: Vec<&str> = available_bridges().iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Resolve a name or alias to the bridge's primary name
pub fn find_bridge(name: &str) -> Option<&'static str> {
    available_bridges()
        .into_iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
        .map(|b| b.name)
}

/// Parsed bridge string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeParams {
    /// Bridge name as given
    pub name: String,
    /// Key-value parameters
    pub params: HashMap<String, String>,
}

impl BridgeParams {
    fn number<T: TryFrom<u64>>(&self, key: &str) -> Result<Option<T>, BridgeError> {
        let Some(value) = self.params.get(key) else {
            return Ok(None);
        };
        let invalid = |reason: String| BridgeError::InvalidValue {
            key: key.to_string(),
            value: value.clone(),
            reason,
        };
        let n = parse_number(value).map_err(invalid)?;
        T::try_from(n)
            .map(Some)
            .map_err(|_| invalid("out of range".to_string()))
    }

    fn check_keys(&self, bridge: &'static str, known: &[&str]) -> Result<(), BridgeError> {
        match self.params.keys().find(|k| !known.contains(&k.as_str())) {
            Some(key) => Err(BridgeError::UnknownParameter {
                bridge,
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Parse a bridge string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_bridge_params(s: &str) -> Result<BridgeParams, BridgeError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            let Some((key, value)) = opt.split_once('=') else {
                return Err(BridgeError::Format(opt.to_string()));
            };
            params.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok(BridgeParams {
        name: name.to_string(),
        params,
    })
}

/// Open the bridge named by `bridge` and identify the device behind it
pub fn open_session(
    bridge: &str,
    config: &Config,
    session: SessionConfig,
) -> Result<BridgeSession, Box<dyn std::error::Error>> {
    let transport = open_transport(bridge, config)?;
    let nand = NandSession::open(transport, session)?;
    Ok(nand)
}

/// Open the transport for the bridge named by `bridge`
#[allow(unused_variables)]
pub fn open_transport(
    bridge: &str,
    config: &Config,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    let params = parse_bridge_params(bridge)?;
    let name = find_bridge(&params.name)
        .ok_or_else(|| BridgeError::Unknown(params.name.clone(), bridge_names_short()))?;

    match name {
        #[cfg(feature = "usb")]
        "usb" => open_usb(&params, config),
        #[cfg(feature = "dummy")]
        "dummy" => open_dummy(&params),
        _ => Err(BridgeError::Unknown(params.name.clone(), bridge_names_short()).into()),
    }
}

#[cfg(feature = "usb")]
fn usb_config(
    params: &BridgeParams,
    config: &Config,
) -> Result<nandbridge_usb::UsbConfig, BridgeError> {
    use std::time::Duration;

    params.check_keys("usb", &["vid", "pid", "index", "interface", "timeout"])?;

    let defaults = nandbridge_usb::UsbConfig::default();
    let file = &config.usb;
    let timeout_ms = params.number::<u64>("timeout")?.or(file.timeout_ms);
    Ok(nandbridge_usb::UsbConfig {
        vendor_id: params
            .number("vid")?
            .or(file.vendor_id)
            .unwrap_or(defaults.vendor_id),
        product_id: params
            .number("pid")?
            .or(file.product_id)
            .unwrap_or(defaults.product_id),
        interface: params
            .number("interface")?
            .or(file.interface)
            .unwrap_or(defaults.interface),
        timeout: timeout_ms.map_or(defaults.timeout, Duration::from_millis),
    })
}

#[cfg(feature = "usb")]
fn open_usb(
    params: &BridgeParams,
    config: &Config,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    let usb = usb_config(params, config)?;
    let index = params.number::<usize>("index")?.unwrap_or(0);

    log::info!(
        "Opening USB bridge {:04x}:{:04x}...",
        usb.vendor_id,
        usb.product_id
    );
    let bridge = nandbridge_usb::UsbBridge::open_nth(&usb, index).map_err(|e| {
        format!(
            "Failed to open USB bridge: {}\nMake sure the device is connected and you have permissions.",
            e
        )
    })?;
    Ok(Box::new(bridge))
}

#[cfg(feature = "dummy")]
fn dummy_config(params: &BridgeParams) -> Result<nandbridge_dummy::DummyConfig, BridgeError> {
    params.check_keys("dummy", &["blocks", "bad", "wp", "busy"])?;

    let mut config = nandbridge_dummy::DummyConfig::default();
    if let Some(blocks) = params.number("blocks")? {
        config.blocks_per_unit = blocks;
    }
    if let Some(bad) = params.params.get("bad") {
        config.bad_blocks = bad
            .split('+')
            .filter(|s| !s.is_empty())
            .map(|s| {
                parse_number(s)
                    .and_then(|n| u32::try_from(n).map_err(|_| "out of range".to_string()))
                    .map_err(|reason| BridgeError::InvalidValue {
                        key: "bad".to_string(),
                        value: bad.clone(),
                        reason,
                    })
            })
            .collect::<Result<_, _>>()?;
    }
    if let Some(wp) = params.number::<u8>("wp")? {
        config.write_protected = wp != 0;
    }
    if let Some(busy) = params.number("busy")? {
        config.busy_polls = busy;
    }
    Ok(config)
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &BridgeParams) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    log::info!("Opening dummy NAND emulator...");
    let config = dummy_config(params)?;
    Ok(Box::new(nandbridge_dummy::DummyNand::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let p = parse_bridge_params("usb").unwrap();
        assert_eq!(p.name, "usb");
        assert!(p.params.is_empty());
    }

    #[test]
    fn test_parse_params() {
        let p = parse_bridge_params("usb:vid=0x1209, pid=7").unwrap();
        assert_eq!(p.params.get("vid").map(String::as_str), Some("0x1209"));
        assert_eq!(p.number::<u16>("pid").unwrap(), Some(7));
        assert_eq!(p.number::<u16>("index").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_bare_key() {
        assert!(matches!(
            parse_bridge_params("usb:vid"),
            Err(BridgeError::Format(_))
        ));
    }

    #[test]
    fn test_number_out_of_range() {
        let p = parse_bridge_params("usb:vid=0x10000").unwrap();
        assert!(p.number::<u16>("vid").is_err());
    }

    #[test]
    fn test_unknown_bridge() {
        let err = open_transport("jtag", &Config::default()).err().unwrap();
        assert!(err.to_string().contains("unknown bridge 'jtag'"));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_params() {
        let p = parse_bridge_params("dummy:blocks=256,bad=3+0x9,wp=1").unwrap();
        let config = dummy_config(&p).unwrap();
        assert_eq!(config.blocks_per_unit, 256);
        assert_eq!(config.bad_blocks, vec![3, 9]);
        assert!(config.write_protected);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_rejects_unknown_key() {
        let p = parse_bridge_params("dummy:size=4").unwrap();
        assert!(matches!(
            dummy_config(&p),
            Err(BridgeError::UnknownParameter { bridge: "dummy", .. })
        ));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_open_dummy_session() {
        let nand = open_session(
            "emulator:blocks=32",
            &Config::default(),
            SessionConfig::default(),
        )
        .unwrap();
        assert_eq!(nand.geometry().total_blocks(), 32);
    }

    #[cfg(feature = "usb")]
    #[test]
    fn test_usb_config_precedence() {
        let config = Config::parse("[usb]\nvendor_id = \"0x1209\"\nproduct_id = 2\n").unwrap();
        let p = parse_bridge_params("usb:pid=0x6001,timeout=100").unwrap();
        let usb = usb_config(&p, &config).unwrap();
        assert_eq!(usb.vendor_id, 0x1209);
        assert_eq!(usb.product_id, 0x6001);
        assert_eq!(usb.interface, nandbridge_usb::DEFAULT_INTERFACE);
        assert_eq!(usb.timeout, std::time::Duration::from_millis(100));
    }
}
