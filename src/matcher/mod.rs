//! Event predicate matcher
//!
//! Answers "did event X eventually occur" against the shared record log.
//! Every match claims its record: the cursor moves just past it and later
//! assertions only see records that arrived after it.

pub mod predicate;

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::common::{location_tag, Error, Result};
use crate::mi::{OutOfBandRecord, RecordLog};

pub use predicate::{FuncMatch, Frame, Predicate, StopEvent, StopPredicate, StopReason, OUTDATED_MARKER};

/// Scans the record log for awaited events
///
/// A single cursor serves every assertion. Claiming a record moves the cursor
/// past it, so unclaimed records that arrived earlier are skipped for good:
/// a later assertion cannot match them even if its predicate would.
#[derive(Debug)]
pub struct EventMatcher {
    log: Arc<RecordLog>,
    /// Index just past the most recently claimed record
    cursor: usize,
    timeout: Duration,
}

impl EventMatcher {
    pub fn new(log: Arc<RecordLog>, timeout: Duration) -> Self {
        Self {
            log,
            cursor: 0,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Position the next scan starts from
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Wait for the next record satisfying `predicate` and claim it
    ///
    /// Returns `None` once the timeout (measured from this call) elapses or
    /// the transport has closed with no matching record left.
    pub async fn next_match<P>(&mut self, predicate: &P) -> Result<Option<OutOfBandRecord>>
    where
        P: Predicate + ?Sized,
    {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.log.subscribe();

        loop {
            // Read the state before scanning so an append racing the scan
            // still shows up as a change below
            let closed = state.borrow_and_update().closed;

            if let Some(index) = self.log.find_from(self.cursor, |r| predicate.matches(r))? {
                self.cursor = index + 1;
                let record = self
                    .log
                    .get(index)
                    .ok_or_else(|| Error::Internal(format!("record {} vanished from log", index)))?;
                tracing::debug!(index, expected = %predicate.describe(), "Matched event");
                return Ok(Some(record));
            }

            if closed {
                tracing::debug!(expected = %predicate.describe(), "Transport closed before match");
                return Ok(None);
            }

            match tokio::time::timeout_at(deadline, state.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(None),
            }
        }
    }

    /// Whether a record satisfying `predicate` arrives in time
    pub async fn is_event_received<P>(&mut self, predicate: &P) -> Result<bool>
    where
        P: Predicate + ?Sized,
    {
        Ok(self.next_match(predicate).await?.is_some())
    }

    /// Assert that a matching record arrives, reporting the caller on failure
    #[track_caller]
    pub fn expect<'a, P>(
        &'a mut self,
        predicate: &'a P,
    ) -> impl Future<Output = Result<OutOfBandRecord>> + 'a
    where
        P: Predicate + ?Sized,
    {
        let location = Location::caller();
        self.expect_at(predicate, location)
    }

    /// [`expect`](Self::expect) with an explicit location
    pub async fn expect_at<P>(
        &mut self,
        predicate: &P,
        location: &Location<'_>,
    ) -> Result<OutOfBandRecord>
    where
        P: Predicate + ?Sized,
    {
        match self.next_match(predicate).await? {
            Some(record) => Ok(record),
            None => Err(Error::PredicateTimeout {
                expected: predicate.describe(),
                actual: self.next_unclaimed_stop()?.map(|r| r.to_string()),
                timeout_secs: self.timeout.as_secs(),
                location: location_tag(location),
            }),
        }
    }

    /// First `*stopped` record past the cursor, without claiming it
    fn next_unclaimed_stop(&self) -> Result<Option<OutOfBandRecord>> {
        let index = self.log.find_from(self.cursor, |r| Ok(r.is_stopped()))?;
        Ok(index.and_then(|i| self.log.get(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mi::codec::parse_line;
    use crate::mi::MiOutput;

    fn append(log: &RecordLog, line: &str) {
        match parse_line(line).unwrap() {
            MiOutput::OutOfBand(record) => log.append(record),
            other => panic!("Expected out-of-band record, got {other:?}"),
        }
    }

    fn stop_at(line: u32) -> String {
        format!(
            r#"*stopped,reason="breakpoint-hit",frame={{file="Program.cs",line="{}"}}"#,
            line
        )
    }

    #[tokio::test]
    async fn test_match_claims_record() {
        let log = RecordLog::new();
        append(&log, &stop_at(15));
        let mut matcher = EventMatcher::new(Arc::clone(&log), Duration::from_millis(50));

        let hit = StopPredicate::breakpoint_hit().line(15);
        assert!(matcher.is_event_received(&hit).await.unwrap());
        assert_eq!(matcher.cursor(), 1);
        // The same record never satisfies a second assertion
        assert!(!matcher.is_event_received(&hit).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_match_in_arrival_order() {
        let log = RecordLog::new();
        append(&log, &stop_at(15));
        append(&log, &stop_at(18));
        append(&log, &stop_at(15));
        let mut matcher = EventMatcher::new(Arc::clone(&log), Duration::from_millis(50));

        assert!(matcher.is_event_received(&StopPredicate::new().line(15)).await.unwrap());
        assert_eq!(matcher.cursor(), 1);
        assert!(matcher.is_event_received(&StopPredicate::new().line(15)).await.unwrap());
        assert_eq!(matcher.cursor(), 3);
    }

    #[tokio::test]
    async fn test_claim_skips_earlier_records() {
        let log = RecordLog::new();
        append(&log, &stop_at(18));
        append(&log, &stop_at(15));
        let mut matcher = EventMatcher::new(Arc::clone(&log), Duration::from_millis(50));

        assert!(matcher.is_event_received(&StopPredicate::new().line(15)).await.unwrap());
        assert_eq!(matcher.cursor(), 2);
        // Line 18 arrived first and is now behind the cursor
        assert!(!matcher.is_event_received(&StopPredicate::new().line(18)).await.unwrap());
    }

    #[tokio::test]
    async fn test_waits_for_late_record() {
        let log = RecordLog::new();
        let mut matcher = EventMatcher::new(Arc::clone(&log), Duration::from_secs(5));

        let writer = Arc::clone(&log);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            append(&writer, r#"=thread-created,id="1""#);
            append(&writer, r#"*stopped,reason="exited",exit-code="0""#);
        });

        assert!(matcher.is_event_received(&StopPredicate::exited(0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_transport_ends_wait() {
        let log = RecordLog::new();
        let mut matcher = EventMatcher::new(Arc::clone(&log), Duration::from_secs(30));
        log.close();

        let started = std::time::Instant::now();
        assert!(!matcher.is_event_received(&StopPredicate::new()).await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_expect_reports_location_on_timeout() {
        let log = RecordLog::new();
        let mut matcher = EventMatcher::new(log, Duration::from_millis(20));

        let err = matcher.expect(&StopPredicate::entry_point()).await.unwrap_err();
        match err {
            Error::PredicateTimeout {
                expected,
                actual,
                location,
                ..
            } => {
                assert!(expected.contains("entry-point-hit"));
                assert!(location.contains("matcher"));
                assert!(actual.is_none());
            }
            other => panic!("Expected PredicateTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_reports_next_stop() {
        let log = RecordLog::new();
        append(&log, &stop_at(15));
        append(&log, &stop_at(18));
        let mut matcher = EventMatcher::new(Arc::clone(&log), Duration::from_millis(20));

        matcher.expect(&StopPredicate::new().line(15)).await.unwrap();
        let err = matcher.expect(&StopPredicate::new().line(22)).await.unwrap_err();
        match &err {
            Error::PredicateTimeout { actual, .. } => {
                let actual = actual.as_deref().unwrap();
                assert!(actual.contains("line=\"18\""), "{actual}");
            }
            other => panic!("Expected PredicateTimeout, got {other:?}"),
        }
        assert!(err.to_string().contains("next stop"));
        // Reporting does not claim the record
        assert_eq!(matcher.cursor(), 1);
    }

    #[tokio::test]
    async fn test_closure_predicates_and_errors() {
        let log = RecordLog::new();
        append(&log, r#"~"Hello, World!\n""#);
        append(&log, r#"*stopped,reason="breakpoint-hit""#);
        let mut matcher = EventMatcher::new(Arc::clone(&log), Duration::from_millis(20));

        let console = |r: &OutOfBandRecord| -> Result<bool> {
            Ok(matches!(r, OutOfBandRecord::Stream { text, .. } if text.starts_with("Hello")))
        };
        assert!(matcher.is_event_received(&console).await.unwrap());

        // Breakpoint hit without a frame is a protocol violation, not a miss
        let err = matcher
            .is_event_received(&StopPredicate::new().line(15))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
    }
}
