//! List command implementation

use crate::bridges::available_bridges;
use crate::config::Config;

/// List every compiled-in bridge, and the USB bridges currently attached
#[allow(unused_variables)]
pub fn list_bridges(config: &Config) {
    println!("Supported bridges:");
    println!();
    for bridge in available_bridges() {
        let aliases = if bridge.aliases.is_empty() {
            String::new()
        } else {
            format!(" (alias: {})", bridge.aliases.join(", "))
        };
        println!("  {:<8} - {}{}", bridge.name, bridge.description, aliases);
    }

    #[cfg(feature = "usb")]
    {
        let defaults = nandbridge_usb::UsbConfig::default();
        let usb = nandbridge_usb::UsbConfig {
            vendor_id: config.usb.vendor_id.unwrap_or(defaults.vendor_id),
            product_id: config.usb.product_id.unwrap_or(defaults.product_id),
            ..defaults
        };
        println!();
        match nandbridge_usb::UsbBridge::list_devices(&usb) {
            Ok(devices) if devices.is_empty() => {
                println!(
                    "No USB bridges ({:04x}:{:04x}) connected",
                    usb.vendor_id, usb.product_id
                );
            }
            Ok(devices) => {
                println!("Connected USB bridges:");
                for (index, device) in devices.iter().enumerate() {
                    println!("  index={}  {}", index, device);
                }
            }
            Err(e) => log::warn!("Could not enumerate USB devices: {}", e),
        }
    }
}
