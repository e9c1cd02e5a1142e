use rustc_hash::FxHashSet;

use super::{property, CheckContext};
use crate::access::{decode_label_ids, read_dynamic_chain};
use crate::report::{Inconsistency, InconsistencyKind, RecordType};
use crate::store::{NodeLabels, NodeRecord, Result};
use crate::types::{is_none, DynamicStore, TokenKind, NO_ID};

/// Checks one node record.
pub fn check(ctx: &CheckContext<'_>, node: &NodeRecord) -> Result<()> {
    if !node.in_use {
        return Ok(());
    }
    check_relationship_head(ctx, node)?;
    property::check_chain_head(ctx, RecordType::Node, node.id, node.next_prop)?;
    ctx.claim_property(node.next_prop, RecordType::Node);
    match &node.labels {
        NodeLabels::Inline(labels) => check_labels(ctx, node.id, labels)?,
        NodeLabels::Dynamic(head) => check_dynamic_labels(ctx, node.id, *head)?,
    }
    Ok(())
}

fn check_relationship_head(ctx: &CheckContext<'_>, node: &NodeRecord) -> Result<()> {
    if is_none(node.next_rel) {
        return Ok(());
    }
    let Some(rel) = ctx.relationship_view(node.next_rel)? else {
        return Ok(());
    };
    if !rel.in_use {
        ctx.report(Inconsistency::new(
            RecordType::Node,
            node.id,
            InconsistencyKind::ReferenceNotInUse,
            "next_rel",
            "in-use relationship",
            Inconsistency::id_text(node.next_rel),
        ));
        return Ok(());
    }
    let Some(side) = rel.side_of(node.id) else {
        ctx.report(Inconsistency::new(
            RecordType::Node,
            node.id,
            InconsistencyKind::NotAnEndpoint,
            "next_rel",
            format!("relationship touching node {}", node.id),
            format!(
                "relationship {} between {} and {}",
                node.next_rel, rel.first_node, rel.second_node
            ),
        ));
        return Ok(());
    };
    let prev = rel.prev(side);
    if prev != NO_ID {
        ctx.report(Inconsistency::new(
            RecordType::Node,
            node.id,
            InconsistencyKind::NotChainHead,
            "next_rel",
            "first relationship of the chain",
            format!("relationship {} preceded by {prev}", node.next_rel),
        ));
    }
    Ok(())
}

fn check_labels(ctx: &CheckContext<'_>, id: u64, labels: &[u32]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for (pos, label) in labels.iter().enumerate() {
        let field = format!("labels[{pos}]");
        if !seen.insert(*label) {
            ctx.report(Inconsistency::new(
                RecordType::Node,
                id,
                InconsistencyKind::DuplicateLabel,
                field,
                "distinct label",
                label,
            ));
            continue;
        }
        ctx.check_token_reference(RecordType::Node, id, &field, TokenKind::Label, u64::from(*label))?;
    }
    Ok(())
}

fn check_dynamic_labels(ctx: &CheckContext<'_>, id: u64, head: u64) -> Result<()> {
    if !ctx.check_dynamic_head(RecordType::Node, id, "labels", DynamicStore::NodeLabel, head)? {
        return Ok(());
    }
    ctx.claim_dynamic(DynamicStore::NodeLabel, head, RecordType::Node);
    // A broken chain is reported by the node-label store sweep.
    let Some(payload) = read_dynamic_chain(ctx.access, DynamicStore::NodeLabel, head)? else {
        return Ok(());
    };
    match decode_label_ids(&payload) {
        Some(labels) => check_labels(ctx, id, &labels),
        None => {
            ctx.report(Inconsistency::new(
                RecordType::Node,
                id,
                InconsistencyKind::UndecodablePayload,
                "labels",
                "sequence of label ids",
                format!("{} bytes", payload.len()),
            ));
            Ok(())
        }
    }
}
