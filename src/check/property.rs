use super::CheckContext;
use crate::full::multi_pass::PropertyView;
use crate::report::{Inconsistency, InconsistencyKind, RecordType};
use crate::store::{PropertyRecord, PropertyValue, Result};
use crate::types::{is_none, DynamicStore, TokenKind};

/// Checks one property record.
pub fn check(ctx: &CheckContext<'_>, record: &PropertyRecord) -> Result<()> {
    if !record.in_use {
        return Ok(());
    }
    let id = record.id;
    if record.blocks.is_empty() {
        ctx.report(Inconsistency::new(
            RecordType::Property,
            id,
            InconsistencyKind::EmptyPropertyRecord,
            "blocks",
            "at least one block",
            0,
        ));
    }
    if is_none(record.prev) {
        if let Some(owners) = ctx.mode.owners() {
            owners.mark_property_head(id);
        }
    } else {
        check_neighbour(ctx, id, "prev", record.prev, |view| view.next)?;
    }
    if !is_none(record.next) {
        check_neighbour(ctx, id, "next", record.next, |view| view.prev)?;
    }
    for (pos, block) in record.blocks.iter().enumerate() {
        ctx.check_token_reference(
            RecordType::Property,
            id,
            &format!("blocks[{pos}].key"),
            TokenKind::PropertyKey,
            u64::from(block.key),
        )?;
        let (store, head) = match block.value {
            PropertyValue::String(head) => (DynamicStore::String, head),
            PropertyValue::Array(head) => (DynamicStore::Array, head),
            _ => continue,
        };
        let field = format!("blocks[{pos}].value");
        if ctx.check_dynamic_head(RecordType::Property, id, &field, store, head)? {
            ctx.claim_dynamic(store, head, RecordType::Property);
        }
    }
    Ok(())
}

fn check_neighbour(
    ctx: &CheckContext<'_>,
    id: u64,
    field: &str,
    neighbour: u64,
    back_pointer: impl Fn(&PropertyView) -> u64,
) -> Result<()> {
    let Some(view) = ctx.property_view(neighbour)? else {
        return Ok(());
    };
    if !view.in_use {
        ctx.report(Inconsistency::new(
            RecordType::Property,
            id,
            InconsistencyKind::ReferenceNotInUse,
            field,
            "in-use property record",
            Inconsistency::id_text(neighbour),
        ));
        return Ok(());
    }
    let back = back_pointer(&view);
    if back != id {
        ctx.report(Inconsistency::new(
            RecordType::Property,
            id,
            InconsistencyKind::ChainLinkMismatch,
            field,
            format!("record {neighbour} linking back to {id}"),
            format!("record {neighbour} linking to {}", Inconsistency::id_text(back)),
        ));
    }
    Ok(())
}

/// Checks a node's or relationship's reference to the head of its property chain.
pub fn check_chain_head(
    ctx: &CheckContext<'_>,
    owner: RecordType,
    owner_id: u64,
    head: u64,
) -> Result<()> {
    if is_none(head) {
        return Ok(());
    }
    let Some(view) = ctx.property_view(head)? else {
        return Ok(());
    };
    if !view.in_use {
        ctx.report(Inconsistency::new(
            owner,
            owner_id,
            InconsistencyKind::ReferenceNotInUse,
            "next_prop",
            "in-use property record",
            Inconsistency::id_text(head),
        ));
    } else if !is_none(view.prev) {
        ctx.report(Inconsistency::new(
            owner,
            owner_id,
            InconsistencyKind::NotChainHead,
            "next_prop",
            "first record of the chain",
            format!("record {head} preceded by {}", view.prev),
        ));
    }
    Ok(())
}
