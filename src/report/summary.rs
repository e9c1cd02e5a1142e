use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Inconsistency, InconsistencyKind, RecordType};

/// Immutable outcome of a completed check run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    /// Whether no error-severity finding was reported.
    pub consistent: bool,
    /// Error-severity findings.
    pub errors: u64,
    /// Warning-severity findings.
    pub warnings: u64,
    /// Findings per record category; categories without findings are omitted.
    pub counts: BTreeMap<RecordType, u64>,
    /// Findings per defect class; classes without findings are omitted.
    pub kinds: BTreeMap<InconsistencyKind, u64>,
    /// The lowest-ordered findings, kept verbatim.
    pub findings: Vec<Inconsistency>,
}

impl CheckSummary {
    /// Findings tallied under `record_type`.
    pub fn count(&self, record_type: RecordType) -> u64 {
        self.counts.get(&record_type).copied().unwrap_or(0)
    }

    /// Findings of `kind`.
    pub fn kind_count(&self, kind: InconsistencyKind) -> u64 {
        self.kinds.get(&kind).copied().unwrap_or(0)
    }

    /// All findings, errors and warnings.
    pub fn total(&self) -> u64 {
        self.errors + self.warnings
    }

    /// Whether the store set is free of structural errors.
    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Retained findings of `kind`.
    pub fn findings_of(&self, kind: InconsistencyKind) -> impl Iterator<Item = &Inconsistency> {
        self.findings.iter().filter(move |finding| finding.kind == kind)
    }
}

impl fmt::Display for CheckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return f.write_str("no inconsistencies");
        }
        write!(f, "{} errors, {} warnings", self.errors, self.warnings)?;
        let mut first = true;
        for (record_type, count) in &self.counts {
            f.write_str(if first { " (" } else { ", " })?;
            write!(f, "{record_type}: {count}")?;
            first = false;
        }
        if !first {
            f.write_str(")")?;
        }
        Ok(())
    }
}
