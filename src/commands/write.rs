//! Write commands

use std::path::Path;

use nandbridge_core::{image, NandSession, Transport};

use super::IndicatifProgress;

/// Read file contents into a Vec
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data = std::fs::read(path)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Write `input` across good blocks and record it at `index_page`
pub fn run_write_image<T: Transport>(
    nand: &mut NandSession<T>,
    index_page: u32,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_file(input)?;
    if data.is_empty() {
        return Err(format!("{:?} is empty, nothing to write", input).into());
    }

    let index_block = nand.geometry().block_of(index_page);
    println!(
        "Index page {} is in block {}; that block will be erased",
        index_page, index_block
    );

    let mut progress = IndicatifProgress::new();
    let blocks = image::write_image(nand, index_page, &data, &mut progress)?;
    println!("Image stored in block(s) {:?}", blocks);
    Ok(())
}

/// Erase `block` and program `input` into it
pub fn run_write_block<T: Transport>(
    nand: &mut NandSession<T>,
    block: u32,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_file(input)?;
    let block_size = nand.geometry().block_size();
    if data.len() > block_size {
        return Err(format!(
            "File size ({} bytes) exceeds block size ({} bytes)",
            data.len(),
            block_size
        )
        .into());
    }

    let mut progress = IndicatifProgress::new();
    image::write_block(nand, block, &data, &mut progress)?;
    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::commands::run_read_image;
    use nandbridge_core::SessionConfig;
    use nandbridge_dummy::{DummyConfig, DummyNand};

    fn session(config: DummyConfig) -> NandSession<DummyNand> {
        NandSession::open(DummyNand::new(config), SessionConfig::default()).unwrap()
    }

    #[test]
    fn test_write_then_read_image_files() {
        let mut nand = session(DummyConfig {
            blocks_per_unit: 16,
            bad_blocks: vec![1],
            ..DummyConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.bin");
        let output = dir.path().join("out.bin");
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&input, &data).unwrap();

        run_write_image(&mut nand, 0, &input).unwrap();
        run_read_image(&mut nand, 0, &output).unwrap();

        let back = std::fs::read(&output).unwrap();
        assert_eq!(back.len(), 6144);
        assert_eq!(&back[..5000], &data[..]);
        assert!(back[5000..].iter().all(|&b| b == 0));
        assert_eq!(&nand.into_transport().page(0)[..8], &[2, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_write_image_rejects_empty_file() {
        let mut nand = session(DummyConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.bin");
        std::fs::write(&input, b"").unwrap();
        assert!(run_write_image(&mut nand, 0, &input).is_err());
    }

    #[test]
    fn test_write_block_rejects_oversized_file() {
        let mut nand = session(DummyConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("big.bin");
        std::fs::write(&input, vec![0u8; 2048 * 64 + 1]).unwrap();
        let err = run_write_block(&mut nand, 2, &input).unwrap_err();
        assert!(err.to_string().contains("exceeds block size"));
    }
}
