use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dochandle_core::error::{DocumentStoreError, DocumentStoreResult};

#[derive(Debug, Default)]
struct CursorCounts {
    opened: AtomicUsize,
    closed: AtomicUsize,
    abandoned: AtomicUsize,
}

/// Counts cursors opened by an [`InMemoryDriver`](crate::InMemoryDriver) so tests can assert
/// that every cursor was closed.
///
/// A cursor dropped without being closed counts as abandoned. Clones share their counters.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    counts: Arc<CursorCounts>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cursor_opened(&self) {
        self.counts.opened.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cursor_closed(&self) {
        self.counts.closed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn cursor_abandoned(&self) {
        self.counts.abandoned.fetch_add(1, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.counts.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counts.closed.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> usize {
        self.counts.abandoned.load(Ordering::SeqCst)
    }

    /// Cursors opened and still alive without having been closed.
    pub fn open(&self) -> usize {
        self.opened().saturating_sub(self.closed() + self.abandoned())
    }

    /// Fails with [`DocumentStoreError::ResourceLeak`] if any cursor is still open or was abandoned.
    pub fn check(&self) -> DocumentStoreResult<()> {
        let (open, leaked) = (self.open(), self.abandoned());

        if open > 0 || leaked > 0 {
            return Err(DocumentStoreError::ResourceLeak { open, leaked });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_open_and_abandoned_cursors() {
        let tracker = ResourceTracker::new();
        assert!(tracker.check().is_ok());

        tracker.cursor_opened();
        tracker.cursor_opened();
        tracker.cursor_closed();
        assert!(matches!(tracker.check(), Err(DocumentStoreError::ResourceLeak { open: 1, leaked: 0 })));

        tracker.clone().cursor_abandoned();
        assert_eq!(tracker.open(), 0);
        assert!(matches!(tracker.check(), Err(DocumentStoreError::ResourceLeak { open: 0, leaked: 1 })));
    }
}
