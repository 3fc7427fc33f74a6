//! Info command

use nandbridge_core::protocol::onfi;
use nandbridge_core::{NandSession, Transport};

use super::format_size;

/// Print identification and geometry of the open device
pub fn run_info<T: Transport>(
    nand: &mut NandSession<T>,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = onfi::read_status(nand)?;
    let g = nand.geometry();

    println!("NAND Flash Information");
    println!("======================");
    println!();
    println!("Vendor:          {}", g.vendor);
    println!("Model:           {}", g.model);
    match nand.jedec_id() {
        Some((manufacturer, device)) => {
            println!("JEDEC ID:        {:02X} {:02X}", manufacturer, device)
        }
        None => println!("JEDEC ID:        unknown"),
    }
    println!(
        "On-die ECC:      {}",
        if nand.internal_ecc() { "enabled" } else { "off" }
    );
    println!(
        "Size:            {} bytes ({})",
        g.total_size(),
        format_size(g.total_size())
    );
    println!(
        "Page size:       {} + {} bytes spare",
        g.bytes_per_page, g.spare_per_page
    );
    println!(
        "Block size:      {} pages ({})",
        g.pages_per_block,
        format_size(g.block_size() as u64)
    );
    println!(
        "Blocks:          {} ({} per unit x {} unit(s))",
        g.total_blocks(),
        g.blocks_per_unit,
        g.unit_count
    );
    println!(
        "Address cycles:  {} row, {} column",
        g.row_address_bytes, g.column_address_bytes
    );
    println!(
        "Write protect:   {}",
        if status.is_write_enabled() {
            "disabled"
        } else {
            "enabled"
        }
    );
    Ok(())
}
