use std::collections::VecDeque;

use tokio::sync::Mutex;

/// One unit of remaining work: a piece index and how many times it has
/// already failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceWork {
    pub index: u32,
    pub retries: u32,
}

impl PieceWork {
    pub fn new(index: u32) -> Self {
        PieceWork { index, retries: 0 }
    }
}

/// FIFO of pieces still to download, shared between the resume scan and the
/// download loop. A failed piece goes back to the tail carrying its bumped
/// retry count, so workers drain fresh work before revisiting failures.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<PieceWork>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, work: PieceWork) {
        self.items.lock().await.push_back(work);
    }

    pub async fn try_pop(&self) -> Option<PieceWork> {
        self.items.lock().await.pop_front()
    }

    /// Linear scan; only used for resume/progress accounting.
    pub async fn contains(&self, index: u32) -> bool {
        self.items.lock().await.iter().any(|w| w.index == index)
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }
}
