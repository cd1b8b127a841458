use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;

const BAR_TEMPLATE: &str = "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} pieces ({eta})";

/// Counts verified pieces for one download and mirrors them on a progress bar.
#[derive(Clone)]
pub struct ProgressTracker {
	total_pieces: usize,
	downloaded_pieces: Arc<AtomicUsize>,
	start_time: Instant,
	bar: ProgressBar,
}

impl ProgressTracker {
	/// Tracker that draws a bar on stderr.
	pub fn new(total_pieces: usize) -> Self {
		let bar = ProgressBar::new(total_pieces as u64);
		if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
			bar.set_style(style.progress_chars("=> "));
		}
		Self::with_bar(total_pieces, bar)
	}

	/// Tracker that only logs.
	pub fn hidden(total_pieces: usize) -> Self {
		let bar = ProgressBar::with_draw_target(Some(total_pieces as u64), ProgressDrawTarget::hidden());
		Self::with_bar(total_pieces, bar)
	}

	fn with_bar(total_pieces: usize, bar: ProgressBar) -> Self {
		Self {
			total_pieces,
			downloaded_pieces: Arc::new(AtomicUsize::new(0)),
			start_time: Instant::now(),
			bar,
		}
	}

	/// Records one verified piece.
	pub fn increment(&self, piece_index: u32) {
		let downloaded = self.downloaded_pieces.fetch_add(1, Ordering::SeqCst) + 1;
		self.bar.inc(1);

		let percentage = if self.total_pieces == 0 {
			100.0
		} else {
			(downloaded as f64 / self.total_pieces as f64) * 100.0
		};
		let elapsed = self.start_time.elapsed().as_secs_f64();
		let rate = if elapsed > 0.0 { downloaded as f64 / elapsed } else { 0.0 };

		info!(
			"Piece {} done. Progress: {}/{} pieces ({:.1}%) - {:.1} pieces/sec",
			piece_index, downloaded, self.total_pieces, percentage, rate
		);
	}

	pub fn finish(&self) {
		self.bar.finish_and_clear();
	}

	pub fn is_complete(&self) -> bool {
		self.downloaded_pieces.load(Ordering::SeqCst) >= self.total_pieces
	}

	pub fn get_progress(&self) -> (usize, usize) {
		(self.downloaded_pieces.load(Ordering::SeqCst), self.total_pieces)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_progress_counts_pieces() {
		let progress = ProgressTracker::hidden(3);
		assert_eq!(progress.get_progress(), (0, 3));

		progress.increment(2);
		progress.increment(0);
		assert!(!progress.is_complete());

		let shared = progress.clone();
		shared.increment(1);
		assert!(progress.is_complete());
		assert_eq!(progress.get_progress(), (3, 3));
		progress.finish();
	}
}
