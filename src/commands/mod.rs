//! CLI command implementations
//!
//! Every command takes an open [`NandSession`](nandbridge_core::NandSession)
//! and works the same over any bridge.

mod info;
mod list;
mod progress;
mod read;
mod scan;
mod write;

pub use info::run_info;
pub use list::list_bridges;
pub use progress::IndicatifProgress;
pub use read::{run_read_image, run_read_page};
pub use scan::run_scan;
pub use write::{run_write_block, run_write_image};

/// Format a byte count with a binary unit
fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{} GiB", bytes / (1024 * 1024 * 1024))
    } else if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
