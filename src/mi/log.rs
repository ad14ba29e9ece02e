//! Append-only log of out-of-band records
//!
//! The transport reader task is the only writer. Readers scan by index and
//! never remove entries, so any number of matchers can share one log.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::common::Result;

use super::types::OutOfBandRecord;

/// Snapshot of the log's growth, published on every append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogState {
    /// Number of records appended so far
    pub len: usize,
    /// Set once the reader has hit end of stream; no record will follow
    pub closed: bool,
}

/// Shared, insertion-ordered record log
#[derive(Debug)]
pub struct RecordLog {
    records: Mutex<Vec<OutOfBandRecord>>,
    state: watch::Sender<LogState>,
}

impl RecordLog {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(LogState::default());
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            state,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<OutOfBandRecord>> {
        // A panicking scan cannot leave the Vec half-written
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a record and wake every waiting matcher
    pub fn append(&self, record: OutOfBandRecord) {
        let len = {
            let mut records = self.lock();
            records.push(record);
            records.len()
        };
        self.state.send_modify(|s| s.len = len);
    }

    /// Mark the log closed; waiters stop expecting new records
    pub fn close(&self) {
        self.state.send_modify(|s| s.closed = true);
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record received so far
    pub fn snapshot(&self) -> Vec<OutOfBandRecord> {
        self.lock().clone()
    }

    /// Index of the first record at or after `start` satisfying `predicate`
    ///
    /// Records are visited in arrival order. A predicate error stops the scan.
    pub fn find_from<F>(&self, start: usize, mut predicate: F) -> Result<Option<usize>>
    where
        F: FnMut(&OutOfBandRecord) -> Result<bool>,
    {
        let records = self.lock();
        for (index, record) in records.iter().enumerate().skip(start) {
            if predicate(record)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn get(&self, index: usize) -> Option<OutOfBandRecord> {
        self.lock().get(index).cloned()
    }

    /// Receiver notified on every append and on close
    pub fn subscribe(&self) -> watch::Receiver<LogState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::types::StreamKind;

    fn console(text: &str) -> OutOfBandRecord {
        OutOfBandRecord::Stream {
            kind: StreamKind::Console,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_scan_is_in_arrival_order_and_non_destructive() {
        let log = RecordLog::new();
        log.append(console("a"));
        log.append(console("b"));
        log.append(console("a"));

        let is_a = |r: &OutOfBandRecord| Ok(matches!(r, OutOfBandRecord::Stream { text, .. } if text == "a"));
        assert_eq!(log.find_from(0, is_a).unwrap(), Some(0));
        assert_eq!(log.find_from(1, is_a).unwrap(), Some(2));
        assert_eq!(log.find_from(3, is_a).unwrap(), None);
        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshot().len(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_appends_and_close() {
        let log = RecordLog::new();
        let mut rx = log.subscribe();

        log.append(console("x"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len, 1);

        log.close();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().closed);
        assert!(log.is_closed());
    }
}
