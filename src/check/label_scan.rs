//! Label-scan index against node label sets, one node round at a time.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::full::multi_pass::{NodeLabelSlice, SliceEntry};
use crate::report::{ConsistencyReporter, Inconsistency, InconsistencyKind, RecordType};
use crate::store::{LabelScanStore, Result};

fn render(labels: &[u32]) -> String {
    format!("{labels:?}")
}

/// Checks every label-scan entry whose node falls in the reporter's round,
/// then every labelled node of the round that has no entry.
///
/// Returns the number of entries examined. A failing entry read is returned
/// as an error and ends the round.
pub fn check_round(
    scan: &dyn LabelScanStore,
    slice: &NodeLabelSlice,
    reporter: &ConsistencyReporter<'_>,
) -> Result<u64> {
    let mut seen = FxHashSet::default();
    let mut examined = 0u64;
    for entry in scan.entries()? {
        let mut entry = entry?;
        if !reporter.covers_node(entry.node) {
            continue;
        }
        examined += 1;
        seen.insert(entry.node);
        match slice.get(entry.node) {
            SliceEntry::NotInUse => reporter.report(Inconsistency::new(
                RecordType::LabelScan,
                entry.node,
                InconsistencyKind::NodeNotInUse,
                "node",
                "in-use node",
                "not in use",
            )),
            SliceEntry::Unreadable => {}
            SliceEntry::Labels { labels, .. } => {
                entry.labels.sort_unstable();
                entry.labels.dedup();
                if labels.as_slice() != entry.labels.as_slice() {
                    reporter.report(Inconsistency::new(
                        RecordType::LabelScan,
                        entry.node,
                        InconsistencyKind::LabelScanMismatch,
                        "labels",
                        render(labels),
                        render(&entry.labels),
                    ));
                }
            }
        }
    }

    for (node, entry) in slice.iter() {
        if !reporter.covers_node(node) || seen.contains(&node) {
            continue;
        }
        if let SliceEntry::Labels { labels, .. } = entry {
            if !labels.is_empty() {
                reporter.report(Inconsistency::new(
                    RecordType::LabelScan,
                    node,
                    InconsistencyKind::LabelScanMissingEntry,
                    "labels",
                    render(labels),
                    "no entry",
                ));
            }
        }
    }
    debug!(examined, "label_scan.round_checked");
    Ok(examined)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::access::DirectRecordAccess;
    use crate::report::{CheckSummary, CollectingLogger, InconsistencyReport};
    use crate::store::builder::StoreBuilder;
    use crate::store::{MemoryLabelScan, NodeLabelEntry};

    fn run(builder: &StoreBuilder, entries: Vec<NodeLabelEntry>, range: std::ops::Range<u64>) -> (u64, CheckSummary) {
        let stores = builder.build_in_memory().unwrap();
        let access = DirectRecordAccess::new(stores.native_stores().clone());
        let slice = NodeLabelSlice::load(&access, range.clone()).unwrap();
        let report = InconsistencyReport::new(Arc::new(CollectingLogger::new()), 16);
        let reporter = ConsistencyReporter::for_round(&report, range);
        let examined = check_round(&MemoryLabelScan::new(entries), &slice, &reporter).unwrap();
        (examined, report.summary())
    }

    fn entry(node: u64, labels: &[u32]) -> NodeLabelEntry {
        NodeLabelEntry {
            node,
            labels: labels.to_vec(),
        }
    }

    #[test]
    fn builder_entries_match() {
        let b = StoreBuilder::demo();
        let (examined, summary) = run(&b, b.label_scan_entries(), 0..u64::MAX);
        assert_eq!(examined, 5);
        assert!(summary.consistent, "{:?}", summary.findings);
    }

    #[test]
    fn stale_and_missing_entries() {
        let mut b = StoreBuilder::new();
        let a = b.add_label("A");
        let c = b.add_label("C");
        b.add_node(&[a], &[]);
        b.add_node(&[a, c], &[]);
        b.add_node(&[c], &[]);
        let entries = vec![entry(0, &[a]), entry(1, &[c, a]), entry(1, &[a]), entry(9, &[c])];
        let (_, summary) = run(&b, entries, 0..u64::MAX);
        assert_eq!(summary.kind_count(InconsistencyKind::LabelScanMismatch), 1);
        assert_eq!(summary.kind_count(InconsistencyKind::NodeNotInUse), 1);
        assert_eq!(summary.kind_count(InconsistencyKind::LabelScanMissingEntry), 1);
        assert_eq!(summary.count(RecordType::LabelScan), 3);
    }

    #[test]
    fn entries_outside_the_round_are_left_alone() {
        let mut b = StoreBuilder::new();
        let a = b.add_label("A");
        for _ in 0..4 {
            b.add_node(&[a], &[]);
        }
        // node 3 has no entry and node 1's entry is wrong, neither is in 0..1
        let (examined, summary) = run(&b, vec![entry(0, &[a]), entry(1, &[])], 0..1);
        assert_eq!(examined, 1);
        assert_eq!(summary.total(), 0);
    }
}
