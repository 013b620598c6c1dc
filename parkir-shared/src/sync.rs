//! Client-side helpers for consuming the notification stream.
//!
//! Push delivery is best-effort: events may be duplicated, dropped or arrive
//! after the pull query already reflected them. `DeliveryMonitor` decides when
//! a consumer must fall back to polling, and `OptimisticLog` merges locally
//! applied entries with the authoritative ones by correlation id.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Push,
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Next expected sequence; apply it.
    Fresh,
    /// Already seen; drop it.
    Duplicate,
    /// Sequences were skipped; resync through the pull query.
    Gap { missing_from: u64, missing_to: u64 },
}

#[derive(Debug, Clone)]
pub struct DeliveryMonitor {
    mode: DeliveryMode,
    consecutive_failures: u32,
    failure_threshold: u32,
    last_seq: Option<u64>,
}

impl DeliveryMonitor {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            mode: DeliveryMode::Push,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            last_seq: None,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Record a failed push attempt (disconnect, subscription error).
    pub fn record_failure(&mut self) -> DeliveryMode {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_threshold {
            self.mode = DeliveryMode::Poll;
        }
        self.mode
    }

    /// Classify an incoming pushed sequence number.
    pub fn observe(&mut self, seq: u64) -> Observation {
        let Some(last) = self.last_seq else {
            self.last_seq = Some(seq);
            self.consecutive_failures = 0;
            return Observation::Fresh;
        };

        if seq <= last {
            return Observation::Duplicate;
        }

        self.last_seq = Some(seq);
        if seq == last + 1 {
            self.consecutive_failures = 0;
            Observation::Fresh
        } else {
            self.mode = DeliveryMode::Poll;
            Observation::Gap {
                missing_from: last + 1,
                missing_to: seq - 1,
            }
        }
    }

    /// The pull query has caught the consumer up; push can be trusted again.
    pub fn resynced(&mut self, through_seq: u64) {
        self.last_seq = Some(self.last_seq.map_or(through_seq, |last| last.max(through_seq)));
        self.consecutive_failures = 0;
        self.mode = DeliveryMode::Push;
    }
}

/// An entry that can be matched against its optimistic placeholder.
pub trait Correlated {
    fn entry_id(&self) -> Uuid;
    fn correlation_id(&self) -> Option<&str>;
}

#[derive(Debug, Clone)]
pub struct OptimisticLog<T> {
    confirmed: Vec<T>,
    pending: Vec<(String, T)>,
}

impl<T: Correlated> OptimisticLog<T> {
    pub fn new() -> Self {
        Self {
            confirmed: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn apply_optimistic(&mut self, correlation_id: impl Into<String>, entry: T) {
        self.pending.push((correlation_id.into(), entry));
    }

    /// Merge an authoritative entry. Returns `false` if it was already known.
    pub fn reconcile(&mut self, entry: T) -> bool {
        if let Some(correlation_id) = entry.correlation_id() {
            self.pending.retain(|(pending_id, _)| pending_id != correlation_id);
        }

        let id = entry.entry_id();
        if self.confirmed.iter().any(|existing| existing.entry_id() == id) {
            return false;
        }
        self.confirmed.push(entry);
        true
    }

    /// Drop a placeholder whose send failed.
    pub fn discard(&mut self, correlation_id: &str) {
        self.pending.retain(|(pending_id, _)| pending_id != correlation_id);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Confirmed entries followed by still-unconfirmed optimistic ones.
    pub fn entries(&self) -> impl Iterator<Item = &T> {
        self.confirmed
            .iter()
            .chain(self.pending.iter().map(|(_, entry)| entry))
    }
}

impl<T: Correlated> Default for OptimisticLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Line {
        id: Uuid,
        client_id: Option<String>,
        text: &'static str,
    }

    impl Correlated for Line {
        fn entry_id(&self) -> Uuid {
            self.id
        }

        fn correlation_id(&self) -> Option<&str> {
            self.client_id.as_deref()
        }
    }

    #[test]
    fn gap_forces_polling_until_resync() {
        let mut monitor = DeliveryMonitor::new(3);
        assert_eq!(monitor.observe(1), Observation::Fresh);
        assert_eq!(monitor.observe(2), Observation::Fresh);
        assert_eq!(monitor.observe(2), Observation::Duplicate);
        assert_eq!(
            monitor.observe(5),
            Observation::Gap { missing_from: 3, missing_to: 4 }
        );
        assert_eq!(monitor.mode(), DeliveryMode::Poll);

        monitor.resynced(5);
        assert_eq!(monitor.mode(), DeliveryMode::Push);
        assert_eq!(monitor.observe(6), Observation::Fresh);
    }

    #[test]
    fn repeated_push_failures_degrade_to_poll() {
        let mut monitor = DeliveryMonitor::new(2);
        assert_eq!(monitor.record_failure(), DeliveryMode::Push);
        assert_eq!(monitor.record_failure(), DeliveryMode::Poll);
    }

    #[test]
    fn authoritative_entry_replaces_placeholder() {
        let mut log = OptimisticLog::new();
        log.apply_optimistic(
            "c-1",
            Line { id: Uuid::new_v4(), client_id: Some("c-1".into()), text: "sending" },
        );
        assert_eq!(log.pending_count(), 1);

        let server = Line { id: Uuid::new_v4(), client_id: Some("c-1".into()), text: "sent" };
        assert!(log.reconcile(server.clone()));
        assert_eq!(log.pending_count(), 0);

        // duplicate push delivery
        assert!(!log.reconcile(server));
        let texts: Vec<_> = log.entries().map(|l| l.text).collect();
        assert_eq!(texts, vec!["sent"]);
    }
}
