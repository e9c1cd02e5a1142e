use std::collections::BinaryHeap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, warn};

use super::{CheckSummary, Inconsistency, InconsistencyKind, RecordType, Severity};

/// Receives every finding as it is reported.
pub trait InconsistencyLogger: Send + Sync {
    /// Called once per finding, possibly from several threads at once.
    fn log(&self, finding: &Inconsistency);
}

/// Emits each finding as a `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl InconsistencyLogger for TracingLogger {
    fn log(&self, finding: &Inconsistency) {
        match finding.severity {
            Severity::Error => error!(
                record_type = %finding.record_type,
                id = finding.id,
                kind = %finding.kind,
                field = %finding.field,
                expected = %finding.expected,
                actual = %finding.actual,
                "consistency.inconsistency"
            ),
            Severity::Warning => warn!(
                record_type = %finding.record_type,
                id = finding.id,
                kind = %finding.kind,
                field = %finding.field,
                expected = %finding.expected,
                actual = %finding.actual,
                "consistency.inconsistency"
            ),
        }
    }
}

/// Keeps every finding in memory.
#[derive(Debug, Default)]
pub struct CollectingLogger {
    findings: Mutex<Vec<Inconsistency>>,
}

impl CollectingLogger {
    /// Empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far, sorted.
    pub fn findings(&self) -> Vec<Inconsistency> {
        let mut findings = self.findings.lock().clone();
        findings.sort();
        findings
    }
}

impl InconsistencyLogger for CollectingLogger {
    fn log(&self, finding: &Inconsistency) {
        self.findings.lock().push(finding.clone());
    }
}

/// Run-wide sink: counts every finding, forwards it to the logger and
/// retains a bounded, deterministic sample for the summary.
pub struct InconsistencyReport {
    logger: Arc<dyn InconsistencyLogger>,
    counts: [AtomicU64; RecordType::ALL.len()],
    kinds: [AtomicU64; InconsistencyKind::ALL.len()],
    errors: AtomicU64,
    warnings: AtomicU64,
    retained: Mutex<BinaryHeap<Inconsistency>>,
    max_retained: usize,
}

impl InconsistencyReport {
    /// Sink forwarding to `logger` and retaining at most `max_retained` findings.
    pub fn new(logger: Arc<dyn InconsistencyLogger>, max_retained: usize) -> Self {
        Self {
            logger,
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            kinds: std::array::from_fn(|_| AtomicU64::new(0)),
            errors: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            retained: Mutex::new(BinaryHeap::new()),
            max_retained,
        }
    }

    /// Records one finding.
    pub fn report(&self, finding: Inconsistency) {
        self.counts[finding.record_type.index()].fetch_add(1, Ordering::Relaxed);
        self.kinds[finding.kind.index()].fetch_add(1, Ordering::Relaxed);
        match finding.severity {
            Severity::Error => self.errors.fetch_add(1, Ordering::Relaxed),
            Severity::Warning => self.warnings.fetch_add(1, Ordering::Relaxed),
        };
        self.logger.log(&finding);
        if self.max_retained == 0 {
            return;
        }
        let mut retained = self.retained.lock();
        if retained.len() < self.max_retained {
            retained.push(finding);
        } else if retained.peek().is_some_and(|largest| finding < *largest) {
            retained.pop();
            retained.push(finding);
        }
    }

    /// Findings reported so far.
    pub fn total(&self) -> u64 {
        self.errors.load(Ordering::Relaxed) + self.warnings.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters and retained findings.
    pub fn summary(&self) -> CheckSummary {
        let counts = RecordType::ALL
            .iter()
            .map(|ty| (*ty, self.counts[ty.index()].load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();
        let kinds = InconsistencyKind::ALL
            .iter()
            .map(|kind| (*kind, self.kinds[kind.index()].load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();
        let errors = self.errors.load(Ordering::Relaxed);
        CheckSummary {
            consistent: errors == 0,
            errors,
            warnings: self.warnings.load(Ordering::Relaxed),
            counts,
            kinds,
            findings: self.retained.lock().clone().into_sorted_vec(),
        }
    }
}

/// Handle through which one task reports, optionally bound to a node round.
///
/// Index and label-scan tasks read their whole entry sequence once per round
/// and only act on entries whose node falls inside the round, so every entry
/// is checked by exactly one round.
#[derive(Clone)]
pub struct ConsistencyReporter<'a> {
    report: &'a InconsistencyReport,
    round: Option<Range<u64>>,
}

impl<'a> ConsistencyReporter<'a> {
    /// Unfiltered reporter.
    pub fn new(report: &'a InconsistencyReport) -> Self {
        Self {
            report,
            round: None,
        }
    }

    /// Reporter bound to the node ids of one round.
    pub fn for_round(report: &'a InconsistencyReport, nodes: Range<u64>) -> Self {
        Self {
            report,
            round: Some(nodes),
        }
    }

    /// Whether entries for `node` belong to this reporter's round.
    pub fn covers_node(&self, node: u64) -> bool {
        self.round.as_ref().map_or(true, |range| range.contains(&node))
    }

    /// Records one finding.
    pub fn report(&self, finding: Inconsistency) {
        self.report.report(finding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(record_type: RecordType, id: u64, kind: InconsistencyKind) -> Inconsistency {
        Inconsistency::new(record_type, id, kind, "f", "x", "y")
    }

    #[test]
    fn counts_by_category_and_severity() {
        let logger = Arc::new(CollectingLogger::new());
        let report = InconsistencyReport::new(logger.clone(), 8);
        report.report(finding(RecordType::Node, 1, InconsistencyKind::ReferenceNotInUse));
        report.report(finding(RecordType::Property, 4, InconsistencyKind::EmptyPropertyRecord));
        let summary = report.summary();
        assert!(!summary.consistent);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.count(RecordType::Node), 1);
        assert_eq!(logger.findings().len(), 2);
    }

    #[test]
    fn warnings_alone_keep_the_store_consistent() {
        let report = InconsistencyReport::new(Arc::new(TracingLogger), 8);
        report.report(finding(RecordType::String, 0, InconsistencyKind::NotFullBlock));
        assert!(report.summary().consistent);
    }

    #[test]
    fn retains_the_lowest_findings_regardless_of_arrival() {
        let report = InconsistencyReport::new(Arc::new(CollectingLogger::new()), 2);
        for id in [9, 3, 7, 1, 5] {
            report.report(finding(RecordType::Node, id, InconsistencyKind::NotChainHead));
        }
        let ids: Vec<u64> = report.summary().findings.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn round_reporter_filters_by_node() {
        let report = InconsistencyReport::new(Arc::new(TracingLogger), 0);
        let round = ConsistencyReporter::for_round(&report, 10..20);
        assert!(round.covers_node(10));
        assert!(!round.covers_node(20));
        assert!(ConsistencyReporter::new(&report).covers_node(u64::MAX));
    }
}
