//! Read commands

use std::fs::File;
use std::io::Write;
use std::path::Path;

use nandbridge_core::protocol::onfi;
use nandbridge_core::{image, NandSession, Transport};

use super::IndicatifProgress;

/// Read one raw page and write it to `output`, or hex dump it
pub fn run_read_page<T: Transport>(
    nand: &mut NandSession<T>,
    page: u32,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = onfi::read_page(nand, page)?;

    match output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(&data)?;
            println!("Wrote {} bytes of page {} to {:?}", data.len(), page, path);
        }
        None => {
            let main = nand.geometry().bytes_per_page as usize;
            println!("Page {} (0x{:X}):", page, page);
            print!("{}", hexdump(&data[..main.min(data.len())], 0));
            if data.len() > main {
                println!("Spare:");
                print!("{}", hexdump(&data[main..], main));
            }
        }
    }
    Ok(())
}

/// Read the image indexed at `index_page` into `output`
pub fn run_read_image<T: Transport>(
    nand: &mut NandSession<T>,
    index_page: u32,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut progress = IndicatifProgress::new();
    let data = image::read_image(nand, index_page, &mut progress)?;
    progress.finish_read();

    let mut file = File::create(output)?;
    file.write_all(&data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Format `data` as 16-byte hex lines labelled from `base`
fn hexdump(data: &[u8], base: usize) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!(
            "{:08x}  {:<47}  |{}|\n",
            base + i * 16,
            hex.join(" "),
            ascii
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump_format() {
        let dump = hexdump(b"ONFI\x00\xff", 0x800);
        assert_eq!(
            dump,
            format!("00000800  4f 4e 46 49 00 ff{}  |ONFI..|\n", " ".repeat(47 - 17))
        );
    }

    #[test]
    fn test_hexdump_splits_lines() {
        let dump = hexdump(&[0u8; 20], 0);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("00000010  00 00 00 00  "));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_read_page_to_file() {
        use nandbridge_core::SessionConfig;
        use nandbridge_dummy::DummyNand;

        let mut dummy = DummyNand::new_default();
        dummy.set_page(3, b"hello");
        let mut nand = NandSession::open(dummy, SessionConfig::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.bin");
        run_read_page(&mut nand, 3, Some(&path)).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), 2048 + 64);
        assert_eq!(&data[..5], b"hello");
        assert_eq!(data[5], 0xFF);
    }
}
