use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::info;

/// Counts completed pieces and reports progress through the log facade.
/// Pieces found intact by the resume scan seed the starting position but do
/// not count toward the download rate.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_pieces: usize,
    completed_pieces: Arc<AtomicUsize>,
    preverified: usize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_pieces: usize, preverified: usize) -> Self {
        Self {
            total_pieces,
            completed_pieces: Arc::new(AtomicUsize::new(preverified)),
            preverified,
            start_time: Instant::now(),
        }
    }

    pub fn increment(&self) {
        let completed = self.completed_pieces.fetch_add(1, Ordering::SeqCst) + 1;
        let percentage = (completed as f64 / self.total_pieces as f64) * 100.0;
        let downloaded = completed - self.preverified;
        let rate = downloaded as f64 / self.start_time.elapsed().as_secs_f64();

        info!(
            "progress: {completed}/{} pieces ({percentage:.1}%), {rate:.1} pieces/sec",
            self.total_pieces
        );
    }

    pub fn is_complete(&self) -> bool {
        self.completed_pieces.load(Ordering::SeqCst) >= self.total_pieces
    }

    pub fn completed(&self) -> (usize, usize) {
        (self.completed_pieces.load(Ordering::SeqCst), self.total_pieces)
    }
}
