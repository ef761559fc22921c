//! Keeps only the newest validation result when several run concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::validation::ValidationReport;

/// Generation captured when a validation starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// A result is committed only if no newer validation has begun since its
/// ticket was issued.
#[derive(Debug, Default)]
pub struct ValidationSession {
    generation: AtomicU64,
    latest: Mutex<Option<(Ticket, ValidationReport)>>,
}

impl ValidationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }

    /// Store `report` if `ticket` is still the latest generation.
    /// Returns `false` when the result is stale and was dropped.
    pub fn commit(&self, ticket: Ticket, report: ValidationReport) -> bool {
        let mut latest = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Checked under the lock so a newer commit cannot be overwritten.
        if !self.is_current(ticket) {
            tracing::debug!(generation = ticket.0, "dropping stale validation result");
            return false;
        }
        *latest = Some((ticket, report));
        true
    }

    pub fn latest(&self) -> Option<ValidationReport> {
        let latest = match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        latest.as_ref().map(|(_, report)| report.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_archive;
    use std::sync::Arc;
    use std::thread;

    fn report(design_count: usize) -> ValidationReport {
        let mut report = validate_archive(b"", 1);
        report.design_count = design_count;
        report
    }

    #[test]
    fn tickets_increase() {
        let session = ValidationSession::new();
        let first = session.begin();
        let second = session.begin();

        assert!(second.generation() > first.generation());
        assert!(!session.is_current(first));
        assert!(session.is_current(second));
    }

    #[test]
    fn stale_result_is_dropped() {
        let session = ValidationSession::new();
        let old = session.begin();
        let new = session.begin();

        assert!(session.commit(new, report(2)));
        assert!(!session.commit(old, report(1)));
        assert_eq!(session.latest().map(|r| r.design_count), Some(2));
    }

    #[test]
    fn latest_is_empty_until_commit() {
        let session = ValidationSession::new();
        let ticket = session.begin();

        assert!(session.latest().is_none());
        assert!(session.commit(ticket, report(3)));
        assert_eq!(session.latest().map(|r| r.design_count), Some(3));
    }

    #[test]
    fn slow_worker_cannot_overwrite_newer_result() {
        let session = Arc::new(ValidationSession::new());
        let slow_ticket = session.begin();

        let slow = {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(50));
                session.commit(slow_ticket, report(1))
            })
        };

        let fast_ticket = session.begin();
        assert!(session.commit(fast_ticket, report(9)));

        assert!(!slow.join().unwrap());
        assert_eq!(session.latest().map(|r| r.design_count), Some(9));
    }
}
