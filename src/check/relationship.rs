use super::{property, CheckContext};
use crate::report::{Inconsistency, InconsistencyKind, RecordType};
use crate::store::record::Side;
use crate::store::{RelationshipRecord, Result};
use crate::types::{is_none, TokenKind};

/// Checks one relationship record.
///
/// A self-loop takes part in its node's chain once, through the source side,
/// so only that side's pointers are checked.
pub fn check(ctx: &CheckContext<'_>, rel: &RelationshipRecord) -> Result<()> {
    if !rel.in_use {
        return Ok(());
    }
    ctx.check_token_reference(
        RecordType::Relationship,
        rel.id,
        "rel_type",
        TokenKind::RelationshipType,
        u64::from(rel.rel_type),
    )?;
    let sides: &[Side] = if rel.first_node == rel.second_node {
        &[Side::Source]
    } else {
        &[Side::Source, Side::Target]
    };
    for side in sides {
        check_side(ctx, rel, *side)?;
    }
    property::check_chain_head(ctx, RecordType::Relationship, rel.id, rel.next_prop)?;
    ctx.claim_property(rel.next_prop, RecordType::Relationship);
    Ok(())
}

fn field(side: Side, pointer: &str) -> String {
    match side {
        Side::Source => format!("first_{pointer}"),
        Side::Target => format!("second_{pointer}"),
    }
}

fn check_side(ctx: &CheckContext<'_>, rel: &RelationshipRecord, side: Side) -> Result<()> {
    let node_id = rel.node(side);
    let Some(node) = ctx.node_view(node_id)? else {
        return Ok(());
    };
    if !node.in_use {
        ctx.report(Inconsistency::new(
            RecordType::Relationship,
            rel.id,
            InconsistencyKind::ReferenceNotInUse,
            field(side, "node"),
            "in-use node",
            Inconsistency::id_text(node_id),
        ));
        return Ok(());
    }

    let prev = rel.prev(side);
    if is_none(prev) {
        if node.next_rel != rel.id {
            ctx.report(Inconsistency::new(
                RecordType::Relationship,
                rel.id,
                InconsistencyKind::ChainLinkMismatch,
                field(side, "prev"),
                format!("node {node_id} starting its chain at {}", rel.id),
                format!(
                    "node {node_id} starting its chain at {}",
                    Inconsistency::id_text(node.next_rel)
                ),
            ));
        }
    } else {
        check_neighbour(ctx, rel, side, node_id, prev, Pointer::Prev)?;
    }

    let next = rel.next(side);
    if !is_none(next) {
        check_neighbour(ctx, rel, side, node_id, next, Pointer::Next)?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Pointer {
    Prev,
    Next,
}

fn check_neighbour(
    ctx: &CheckContext<'_>,
    rel: &RelationshipRecord,
    side: Side,
    node_id: u64,
    neighbour: u64,
    pointer: Pointer,
) -> Result<()> {
    let name = match pointer {
        Pointer::Prev => field(side, "prev"),
        Pointer::Next => field(side, "next"),
    };
    let Some(other) = ctx.relationship_view(neighbour)? else {
        return Ok(());
    };
    if !other.in_use {
        ctx.report(Inconsistency::new(
            RecordType::Relationship,
            rel.id,
            InconsistencyKind::ReferenceNotInUse,
            name,
            "in-use relationship",
            Inconsistency::id_text(neighbour),
        ));
        return Ok(());
    }
    let Some(other_side) = other.side_of(node_id) else {
        ctx.report(Inconsistency::new(
            RecordType::Relationship,
            rel.id,
            InconsistencyKind::ChainLinkMismatch,
            name,
            format!("relationship sharing node {node_id}"),
            format!(
                "relationship {neighbour} between {} and {}",
                other.first_node, other.second_node
            ),
        ));
        return Ok(());
    };
    let back = match pointer {
        Pointer::Prev => other.next(other_side),
        Pointer::Next => other.prev(other_side),
    };
    if back != rel.id {
        ctx.report(Inconsistency::new(
            RecordType::Relationship,
            rel.id,
            InconsistencyKind::ChainLinkMismatch,
            name,
            format!("relationship {neighbour} linking back to {}", rel.id),
            format!(
                "relationship {neighbour} linking to {}",
                Inconsistency::id_text(back)
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::testing::run_checks;
    use crate::check::RecordCheck;
    use crate::store::builder::StoreBuilder;
    use crate::types::NO_ID;

    fn triangle() -> StoreBuilder {
        let mut b = StoreBuilder::new();
        let t = b.add_relationship_type("T");
        let nodes: Vec<u64> = (0..3).map(|_| b.add_node(&[], &[])).collect();
        b.add_relationship(nodes[0], nodes[1], t, &[]);
        b.add_relationship(nodes[1], nodes[2], t, &[]);
        b.add_relationship(nodes[2], nodes[0], t, &[]);
        b.add_relationship(nodes[0], nodes[0], t, &[]);
        b
    }

    #[test]
    fn linked_chains_pass() {
        let summary = run_checks(
            &triangle(),
            &[RecordCheck::Node, RecordCheck::Relationship],
            false,
        );
        assert_eq!(summary.total(), 0, "{:?}", summary.findings);
    }

    #[test]
    fn deleted_endpoint_is_reported() {
        let mut b = triangle();
        b.node_mut(2).unwrap().in_use = false;
        let summary = run_checks(&b, &[RecordCheck::Relationship], false);
        // relationships 1 and 2 both touch node 2
        assert_eq!(summary.kind_count(InconsistencyKind::ReferenceNotInUse), 2);
    }

    #[test]
    fn unlinked_prev_pointer_is_a_chain_mismatch() {
        let mut b = triangle();
        // relationship 0 is not the head of node 0's chain
        b.relationship_mut(0).unwrap().first_prev = NO_ID;
        let summary = run_checks(&b, &[RecordCheck::Relationship], false);
        let mismatches: Vec<_> = summary
            .findings_of(InconsistencyKind::ChainLinkMismatch)
            .map(|f| (f.id, f.field.clone()))
            .collect();
        assert!(mismatches.contains(&(0, "first_prev".to_owned())));
    }

    #[test]
    fn unknown_type_token() {
        let mut b = triangle();
        b.relationship_mut(1).unwrap().rel_type = 5;
        let summary = run_checks(&b, &[RecordCheck::Relationship], false);
        assert_eq!(summary.total(), 1);
        assert_eq!(summary.findings[0].field, "rel_type");
    }
}
