//! Write roff man pages for nandbridge and each of its subcommands
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]
//!
//! Produces `nandbridge.1` plus `nandbridge-<command>.1` per subcommand.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "../cli.rs"]
#[allow(dead_code)]
mod cli;

const MANUAL: &str = "NAND Programming Manual";
const SOURCE: &str = concat!("nandbridge ", env!("CARGO_PKG_VERSION"));

fn render(cmd: Command, dir: &Path, file: &str) -> std::io::Result<PathBuf> {
    let mut roff = Vec::new();
    Man::new(cmd).manual(MANUAL).source(SOURCE).render(&mut roff)?;
    let path = dir.join(file);
    fs::write(&path, roff)?;
    Ok(path)
}

fn main() -> std::io::Result<()> {
    let dir = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("man"), PathBuf::from);
    fs::create_dir_all(&dir)?;

    let cmd = cli::Cli::command();
    let mut pages = vec![render(cmd.clone(), &dir, "nandbridge.1")?];
    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        let file = format!("nandbridge-{}.1", sub.get_name());
        pages.push(render(sub.clone(), &dir, &file)?);
    }

    for page in &pages {
        println!("wrote {}", page.display());
    }
    println!("\nPreview with `man -l {}`.", pages[0].display());
    println!(
        "Install by copying {}/*.1 into a man1 directory on MANPATH.",
        dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_subcommand_pages() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = cli::Cli::command();
        let sub = cmd.find_subcommand("write-image").unwrap().clone();

        let path = render(sub, dir.path(), "nandbridge-write-image.1").unwrap();
        let roff = fs::read_to_string(path).unwrap();
        assert!(roff.contains(MANUAL));
        assert!(roff.contains("index"));
    }
}
