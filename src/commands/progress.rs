//! Progress reporting with indicatif progress bars

use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nandbridge_core::{Error, ImageProgress, ImageStats};

/// Create a page-counting progress bar with a phase label
fn create_progress_bar_with_phase(
    total: u64,
    phase: &str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} pages ({{per_sec}}, {{eta}}) {}",
                phase
            ))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn create_spinner_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?)
}

/// Progress reporter using indicatif progress bars
pub struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
    /// Bar to return to after an erase spinner
    paused: Option<ProgressBar>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
            paused: None,
        }
    }

    /// Close any bar still open after a read
    pub fn finish_read(&mut self) {
        self.finish("Read complete");
    }

    fn create_bar(&mut self, total: u64, phase: &'static str) {
        self.finish("");
        let pb = self.multi.add(
            create_progress_bar_with_phase(total, phase)
                .unwrap_or_else(|_| ProgressBar::new(total)),
        );
        self.current_bar = Some(pb);
    }

    fn create_spinner(&mut self, message: String) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(message.to_string());
        }
        if let Some(pb) = self.paused.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    /// Drop a finished erase spinner and go back to the page bar
    fn resume(&mut self) {
        if let Some(bar) = self.paused.take() {
            if let Some(spinner) = self.current_bar.replace(bar) {
                spinner.finish_and_clear();
            }
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProgress for IndicatifProgress {
    fn writing(&mut self, total_pages: usize) {
        self.create_bar(total_pages as u64, "Writing");
    }

    fn erasing(&mut self, block: u32) {
        if self.paused.is_none() {
            self.paused = self.current_bar.take();
        } else if let Some(spinner) = self.current_bar.take() {
            spinner.finish_and_clear();
        }
        self.create_spinner(format!("Erasing block {}...", block));
    }

    fn page_written(&mut self, pages_written: usize) {
        self.resume();
        if let Some(pb) = &self.current_bar {
            pb.set_position(pages_written as u64);
        }
    }

    fn retry(&mut self, page: u32, attempt: u32, error: Error) {
        self.resume();
        let _ = self
            .multi
            .println(format!("page {}: {} (attempt {})", page, error, attempt));
    }

    fn reading(&mut self, total_pages: usize) {
        self.create_bar(total_pages as u64, "Reading");
    }

    fn page_read(&mut self, pages_read: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(pages_read as u64);
        }
    }

    fn complete(&mut self, stats: &ImageStats) {
        self.finish("Write complete");
        println!(
            "{} pages written, {} blocks erased, {} blocks skipped, {} retries",
            stats.pages_written, stats.blocks_erased, stats.blocks_skipped, stats.retries
        );
    }
}
