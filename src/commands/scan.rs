//! Bad block scan command

use nandbridge_core::{NandSession, Transport};

/// Scan every block and print the bad ones
pub fn run_scan<T: Transport>(
    nand: &mut NandSession<T>,
) -> Result<(), Box<dyn std::error::Error>> {
    let total = nand.geometry().total_blocks();
    println!("Scanning {} blocks for bad block markers...", total);

    let table = nand.scan_bad_blocks()?;
    if table.is_empty() {
        println!("No bad blocks found");
        return Ok(());
    }

    println!("{} bad block(s) of {}:", table.len(), total);
    for block in table.iter() {
        println!("  block {:5} (0x{:04X})", block, block);
    }
    Ok(())
}
