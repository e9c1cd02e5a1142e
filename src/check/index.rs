//! Secondary index entries against node labels and property values.

use tracing::debug;

use crate::access::{find_property, resolve_value, RecordAccess, ResolvedValue};
use crate::full::multi_pass::{NodeLabelSlice, SliceEntry};
use crate::report::{ConsistencyReporter, Inconsistency, InconsistencyKind, RecordType};
use crate::store::{IndexAccessors, IndexEntry, IndexValue, Result, SchemaRule};

fn matches(indexed: &IndexValue, stored: &ResolvedValue) -> bool {
    match (indexed, stored) {
        (IndexValue::Bool(a), ResolvedValue::Bool(b)) => a == b,
        (IndexValue::Int(a), ResolvedValue::Int(b)) => a == b,
        (IndexValue::String(a), ResolvedValue::String(b)) => a == b,
        _ => false,
    }
}

fn render_indexed(value: &IndexValue) -> String {
    match value {
        IndexValue::Bool(v) => v.to_string(),
        IndexValue::Int(v) => v.to_string(),
        IndexValue::String(v) => format!("{v:?}"),
    }
}

fn render_stored(value: &ResolvedValue) -> String {
    match value {
        ResolvedValue::Bool(v) => v.to_string(),
        ResolvedValue::Int(v) => v.to_string(),
        ResolvedValue::Float(v) => v.to_string(),
        ResolvedValue::String(v) => format!("{v:?}"),
        ResolvedValue::Array(v) => format!("{v:?}"),
    }
}

/// Checks the entries of `rule`'s index whose node falls in the reporter's
/// round. Findings are filed under the index rule's id.
///
/// Returns the number of entries examined.
pub fn check_round(
    access: &dyn RecordAccess,
    indexes: &dyn IndexAccessors,
    rule: &SchemaRule,
    slice: &NodeLabelSlice,
    reporter: &ConsistencyReporter<'_>,
) -> Result<u64> {
    let mut examined = 0u64;
    for entry in indexes.entries(rule)? {
        let entry = entry?;
        if !reporter.covers_node(entry.node) {
            continue;
        }
        examined += 1;
        check_entry(access, rule, slice.get(entry.node), &entry, reporter)?;
    }
    debug!(rule = rule.id, examined, "index.round_checked");
    Ok(examined)
}

fn check_entry(
    access: &dyn RecordAccess,
    rule: &SchemaRule,
    node: &SliceEntry,
    entry: &IndexEntry,
    reporter: &ConsistencyReporter<'_>,
) -> Result<()> {
    let field = format!("node {}", entry.node);
    let finding = |kind, expected: String, actual: String| {
        Inconsistency::new(RecordType::Index, rule.id, kind, field.clone(), expected, actual)
    };
    let (labels, next_prop) = match node {
        SliceEntry::NotInUse => {
            reporter.report(finding(
                InconsistencyKind::NodeNotInUse,
                "in-use node".to_owned(),
                "not in use".to_owned(),
            ));
            return Ok(());
        }
        SliceEntry::Unreadable => return Ok(()),
        SliceEntry::Labels { labels, next_prop } => (labels, *next_prop),
    };
    if labels.binary_search(&rule.label).is_err() {
        reporter.report(finding(
            InconsistencyKind::IndexMissingLabel,
            format!("label {}", rule.label),
            format!("labels {:?}", labels.as_slice()),
        ));
        return Ok(());
    }
    let Some(value) = find_property(access, next_prop, rule.property_key)? else {
        reporter.report(finding(
            InconsistencyKind::IndexMissingProperty,
            format!("property key {}", rule.property_key),
            "absent".to_owned(),
        ));
        return Ok(());
    };
    // A value whose chain is broken is reported by the dynamic store sweep.
    let Some(stored) = resolve_value(access, &value)? else {
        return Ok(());
    };
    if !matches(&entry.value, &stored) {
        reporter.report(finding(
            InconsistencyKind::IndexValueMismatch,
            render_stored(&stored),
            render_indexed(&entry.value),
        ));
    }
    Ok(())
}
